// emubench: Timed evaluation harness for emulated multi-PoP NFV platforms
// Copyright (C) 2024-2025 The emubench developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Enumerating experiment sweeps and executing their points.

pub mod runner;
pub mod worker;

pub use runner::*;
pub use worker::*;

use std::path::PathBuf;

use itertools::iproduct;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::{
    backend::EmuCtl,
    orchestrator::OsmSettings,
    topology::{Pattern, TopologySource},
};

/// Graph files of the service sweeps, relative to the zoo directory.
pub const DEFAULT_TOPOLOGY_LIST: [&str; 3] = [
    "Abilene.graphml",
    "DeutscheTelekom.graphml",
    "UsCarrier.graphml",
];

/// Workload sizes of the service sweeps.
pub const DEFAULT_SERVICE_SIZES: [usize; 9] = [1, 2, 4, 8, 16, 32, 64, 128, 256];

/// Largest pop count of the pattern scaling sweep.
const SCALING_MAX_POPS: usize = 100;

/// Pop-count cap for mesh patterns, whose link count grows quadratically.
const SCALING_MAX_POPS_MESH: usize = 50;

/// Pop count of the fixed-size pattern service sweep.
const SERVICE2_N_POPS: usize = 50;

/// Errors raised while enumerating sweep points.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid graph file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("cannot read zoo directory entry: {0}")]
    Glob(#[from] glob::GlobError),
}

/// The experiment sweeps the harness can enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SweepKind {
    /// No sweep: a single run of the configured topology, in-process.
    None,
    /// Patterns line/star/mesh over growing pop counts.
    Scaling,
    /// Every graph file in the zoo directory.
    Zoo,
    /// Allow-listed graph files over growing workload sizes.
    Service,
    /// Patterns at a fixed pop count over growing workload sizes.
    Service2,
    /// Like `service`, but driving the full orchestrator lifecycle.
    Osm,
}

/// One fully-specified experiment point of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Where the topology comes from.
    pub source: TopologySource,
    /// Number of workload instances to start, if any.
    pub service_size: Option<usize>,
    /// Whether to drive the full orchestrator lifecycle.
    pub with_lifecycle: bool,
    /// Repetition counter within the parameter combination.
    pub r_id: usize,
    /// Index of the parameter combination within the sweep.
    pub config_id: usize,
}

/// Execution settings shared by every point of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// The emulation control executable.
    pub backend_cmd: String,
    /// Insert settle pauses around the run body.
    pub settle: bool,
    /// Orchestrator connection parameters, required for lifecycle points.
    pub osm: Option<OsmSettings>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            backend_cmd: EmuCtl::DEFAULT_PROGRAM.to_string(),
            settle: true,
            osm: None,
        }
    }
}

/// Everything a worker process needs to execute one experiment point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub point: SweepPoint,
    pub settings: RunSettings,
}

/// Parameters of a sweep, assembled from the command line.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Which sweep to enumerate.
    pub kind: SweepKind,
    /// Pop count of single runs.
    pub n_pops: usize,
    /// Pattern kind of single runs.
    pub topology: String,
    /// Graph file of single runs, taking precedence over `topology`.
    pub graph: Option<PathBuf>,
    /// Repetitions per parameter combination.
    pub repetitions: usize,
    /// Directory holding the topology-zoo graph files.
    pub zoo_path: PathBuf,
    /// Graph files (relative to `zoo_path`) of the service sweeps.
    pub topology_list: Vec<String>,
    /// Workload sizes of the service sweeps.
    pub service_sizes: Vec<usize>,
}

impl SweepConfig {
    /// Pop counts of the scaling sweep: 1, then steps of 5 up to `max`.
    fn pop_counts(max: usize) -> Vec<usize> {
        let mut counts = vec![1];
        counts.extend((5..=max).step_by(5));
        counts
    }

    /// The topology source of a single (non-sweep) run.
    fn single_source(&self) -> TopologySource {
        match &self.graph {
            Some(file) => TopologySource::Graph { file: file.clone() },
            None => TopologySource::Pattern {
                kind: self.topology.clone(),
                n_pops: self.n_pops,
            },
        }
    }

    /// Enumerate all points of the sweep in execution order.
    pub fn points(&self) -> Result<Vec<SweepPoint>, SweepError> {
        let mut points = Vec::new();
        match self.kind {
            SweepKind::None => {
                points.push(SweepPoint {
                    source: self.single_source(),
                    service_size: None,
                    with_lifecycle: false,
                    r_id: 0,
                    config_id: 0,
                });
            }
            SweepKind::Scaling => {
                let mut config_id = 0;
                for pattern in Pattern::iter() {
                    let max = match pattern {
                        Pattern::Mesh => SCALING_MAX_POPS_MESH,
                        _ => SCALING_MAX_POPS,
                    };
                    for n_pops in Self::pop_counts(max) {
                        for r_id in 0..self.repetitions {
                            points.push(SweepPoint {
                                source: TopologySource::Pattern {
                                    kind: pattern.to_string(),
                                    n_pops,
                                },
                                service_size: None,
                                with_lifecycle: false,
                                r_id,
                                config_id,
                            });
                        }
                        config_id += 1;
                    }
                }
            }
            SweepKind::Zoo => {
                let pattern = self.zoo_path.join("*.graphml");
                let mut files = glob::glob(&pattern.to_string_lossy())?
                    .collect::<Result<Vec<_>, _>>()?;
                files.sort();
                for (config_id, file) in files.iter().enumerate() {
                    for r_id in 0..self.repetitions {
                        points.push(SweepPoint {
                            source: TopologySource::Graph { file: file.clone() },
                            service_size: None,
                            with_lifecycle: false,
                            r_id,
                            config_id,
                        });
                    }
                }
            }
            SweepKind::Service | SweepKind::Osm => {
                let with_lifecycle = self.kind == SweepKind::Osm;
                for (config_id, (file, &service_size)) in
                    iproduct!(&self.topology_list, &self.service_sizes).enumerate()
                {
                    let file = self.zoo_path.join(file);
                    for r_id in 0..self.repetitions {
                        points.push(SweepPoint {
                            source: TopologySource::Graph { file: file.clone() },
                            service_size: Some(service_size),
                            with_lifecycle,
                            r_id,
                            config_id,
                        });
                    }
                }
            }
            SweepKind::Service2 => {
                for (config_id, (pattern, &service_size)) in
                    iproduct!(Pattern::iter(), &self.service_sizes).enumerate()
                {
                    for r_id in 0..self.repetitions {
                        points.push(SweepPoint {
                            source: TopologySource::Pattern {
                                kind: pattern.to_string(),
                                n_pops: SERVICE2_N_POPS,
                            },
                            service_size: Some(service_size),
                            with_lifecycle: false,
                            r_id,
                            config_id,
                        });
                    }
                }
            }
        }
        Ok(points)
    }
}
