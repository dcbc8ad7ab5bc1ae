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
//! Topology synthesis: parametric PoP patterns and Topology-Zoo imports.

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::iproduct;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graphml::{self, GraphDescription, GraphEdge};

/// Speed of light in vacuum, in meters per second.
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Propagation speed in fiber relative to the speed of light in vacuum.
/// https://en.wikipedia.org/wiki/Propagation_delay
const PROPAGATION_FACTOR: f64 = 0.77;

/// Advertised real-world capacities are downscaled by this factor so the
/// emulator can shape them reliably.
const BANDWIDTH_DOWNSCALE: f64 = 10.0;

/// Upper bound for emulated link capacity, in Mbps.
const BANDWIDTH_CEILING_MBPS: f64 = 1000.0;

/// Capacity assumed for edges that carry no link label, in Mbps.
const BANDWIDTH_DEFAULT_MBPS: f64 = 1.0;

/// Capacity assumed when a link label cannot be parsed, in Mbps.
const BANDWIDTH_FALLBACK_MBPS: f64 = 1000.0;

/// Errors raised while constructing a [`TopologyModel`].
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("unsupported topology kind `{0}` (expected line, star, or mesh)")]
    UnsupportedTopologyKind(String),
    #[error(transparent)]
    Graph(#[from] graphml::GraphError),
}

/// The parametric PoP patterns the generator understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Pattern {
    Line,
    Star,
    Mesh,
}

/// Selects how the sites and links of a topology model are produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologySource {
    /// A parametric pattern (`line`, `star` or `mesh`) over `n_pops` sites.
    ///
    /// The pattern kind stays a plain string until model construction, so an
    /// unknown kind fails the run that requested it, not the whole sweep.
    Pattern { kind: String, n_pops: usize },
    /// A Topology-Zoo GraphML file.
    Graph { file: PathBuf },
}

impl fmt::Display for TopologySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern { kind, n_pops } => write!(f, "{kind} ({n_pops} pops)"),
            Self::Graph { file } => write!(f, "{}", file.display()),
        }
    }
}

/// One emulated point of presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    /// Site name, unique within a run. Graph imports use the node label and
    /// fall back to `dc<i>` for missing, empty, or already taken labels.
    pub name: String,
    /// Position in [`TopologyModel::sites`], also used to derive the site's
    /// compute API port.
    pub index: usize,
}

/// An undirected link between two sites, identified by their positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub src: usize,
    pub dst: usize,
    /// Geo-derived propagation delay, floored to whole milliseconds. `None`
    /// leaves the backend default in place.
    pub delay_ms: Option<u64>,
    /// Emulated capacity in Mbps, already downscaled and capped. `None`
    /// leaves the backend default in place.
    pub bandwidth_mbps: Option<f64>,
}

impl Link {
    fn plain(src: usize, dst: usize) -> Self {
        Self {
            src,
            dst,
            delay_ms: None,
            bandwidth_mbps: None,
        }
    }
}

/// A synthesized multi-PoP topology, ready to be booted on a backend.
#[derive(Debug, Clone)]
pub struct TopologyModel {
    /// Topology name as it appears in result records: the pattern name, or
    /// the graph file stem.
    pub name: String,
    pub sites: Vec<Site>,
    pub links: Vec<Link>,
}

impl TopologyModel {
    /// Construct the model described by `source`.
    pub fn build(source: &TopologySource) -> Result<Self, TopologyError> {
        match source {
            TopologySource::Pattern { kind, n_pops } => {
                let pattern = Pattern::from_str(kind)
                    .map_err(|_| TopologyError::UnsupportedTopologyKind(kind.clone()))?;
                Ok(Self::pattern(pattern, *n_pops))
            }
            TopologySource::Graph { file } => Self::from_graph(file),
        }
    }

    /// Synthesize a parametric pattern over `n_pops` sites named `dc<i>`.
    pub fn pattern(pattern: Pattern, n_pops: usize) -> Self {
        let sites = (0..n_pops)
            .map(|i| Site {
                name: format!("dc{i}"),
                index: i,
            })
            .collect();
        let links = match pattern {
            Pattern::Line => (1..n_pops).map(|i| Link::plain(i - 1, i)).collect(),
            Pattern::Star => (1..n_pops).map(|i| Link::plain(0, i)).collect(),
            Pattern::Mesh => {
                // one link per unordered site pair, regardless of the order
                // in which the pair is visited
                let mut seen: HashSet<(usize, usize)> = HashSet::new();
                let mut links = Vec::new();
                for (i, j) in iproduct!(0..n_pops, 0..n_pops) {
                    if i == j {
                        continue;
                    }
                    let key = (i.min(j), i.max(j));
                    if seen.insert(key) {
                        links.push(Link::plain(key.0, key.1));
                    }
                }
                links
            }
        };
        Self {
            name: pattern.to_string(),
            sites,
            links,
        }
    }

    /// Import a Topology-Zoo GraphML file.
    pub fn from_graph(file: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let file = file.as_ref();
        let graph = graphml::read_graph(file)?;
        let name = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "graph".to_string());
        log::info!(
            "loaded graph `{name}` with {} nodes and {} edges",
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(Self::from_description(name, &graph))
    }

    /// Build a model from an already parsed graph document.
    pub fn from_description(name: String, graph: &GraphDescription) -> Self {
        let mut used_names: HashSet<String> = HashSet::new();
        let mut sites = Vec::with_capacity(graph.nodes.len());
        for (i, node) in graph.nodes.iter().enumerate() {
            let name = match node.label.as_deref() {
                Some(label) if !label.is_empty() && !used_names.contains(label) => label.to_string(),
                _ => format!("dc{i}"),
            };
            used_names.insert(name.clone());
            sites.push(Site { name, index: i });
        }

        let links = graph
            .edges
            .iter()
            .map(|edge| Link {
                src: edge.source,
                dst: edge.target,
                delay_ms: Some(link_delay_ms(graph, edge)),
                bandwidth_mbps: Some(emulated_bandwidth_mbps(edge)),
            })
            .collect();

        Self { name, sites, links }
    }

    pub fn n_pops(&self) -> usize {
        self.sites.len()
    }

    pub fn n_links(&self) -> usize {
        self.links.len()
    }
}

/// Propagation delay of a graph edge in whole milliseconds, derived from the
/// geographic distance of its endpoints.
fn link_delay_ms(graph: &GraphDescription, edge: &GraphEdge) -> u64 {
    let meters = distance_meters(graph, edge);
    let delay = meters / SPEED_OF_LIGHT * 1000.0 * PROPAGATION_FACTOR;
    log::debug!("delay {}-{} = {delay} ms", edge.source, edge.target);
    delay.floor() as u64
}

/// Distance between the endpoints of an edge in meters. Nodes without
/// coordinates yield 0 so the edge still gets created.
fn distance_meters(graph: &GraphDescription, edge: &GraphEdge) -> f64 {
    let a = &graph.nodes[edge.source];
    let b = &graph.nodes[edge.target];
    match (a.location(), b.location()) {
        (Some(a_loc), Some(b_loc)) => a_loc
            .distance_to(&b_loc)
            .unwrap_or_else(|_| a_loc.haversine_distance_to(&b_loc))
            .meters(),
        _ => {
            log::warn!(
                "missing coordinates for nodes {}/{}, assuming distance 0",
                edge.source,
                edge.target
            );
            0.0
        }
    }
}

/// Emulated capacity for a graph edge, in Mbps.
///
/// Parsed capacities are downscaled and capped; edges without a label get
/// [`BANDWIDTH_DEFAULT_MBPS`] unscaled.
fn emulated_bandwidth_mbps(edge: &GraphEdge) -> f64 {
    let Some(label) = edge.label.as_deref() else {
        return BANDWIDTH_DEFAULT_MBPS;
    };
    let mbps = match parse_bandwidth_mbps(label) {
        Some(mbps) => mbps,
        None => {
            log::warn!("cannot parse link label `{label}`, assuming {BANDWIDTH_FALLBACK_MBPS} Mbps");
            BANDWIDTH_FALLBACK_MBPS
        }
    };
    log::debug!("bandwidth {}-{} = {mbps} Mbps", edge.source, edge.target);
    (mbps / BANDWIDTH_DOWNSCALE).min(BANDWIDTH_CEILING_MBPS)
}

/// Parse an advertised link speed like `"10 Gbps"`, `"< 100 Mbit/s"` or
/// `"512k"` into Mbps.
pub fn parse_bandwidth_mbps(label: &str) -> Option<f64> {
    let label = label.trim_matches(|c| " <>=".contains(c));
    let lower = label.to_lowercase();
    let factor = if lower.contains('g') {
        1000.0
    } else if lower.contains('k') {
        0.001
    } else {
        1.0
    };
    let number = label.trim_matches(|c| "KMGkmpsbit/-+ ".contains(c));
    number.parse::<f64>().ok().map(|value| value * factor)
}
