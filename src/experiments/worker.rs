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
//! Executing a single experiment point end to end.

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    backend::{Backend, BackendError, EmuCtl},
    experiments::{RunSettings, RunSpec},
    instrument::{MemSnapshot, Timers, TIME_SERVICE_START, TIME_TOTAL_ON_BOARD, TIME_TOTAL_VIM_ATTACH},
    orchestrator::{vim_name, LifecycleError, OsmClient},
    records::{ActionRecord, RunRecord},
    testbed::Testbed,
    topology::{TopologyError, TopologyModel},
};

/// Settle pause after the environment is up.
const SETTLE_AFTER_BOOT: Duration = Duration::from_secs(2);

/// Settle pause after the run body, before teardown.
const SETTLE_BEFORE_STOP: Duration = Duration::from_secs(5);

/// Settle pause after teardown.
const SETTLE_AFTER_STOP: Duration = Duration::from_secs(2);

/// Errors of a single experiment run.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot build topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("emulation backend failed: {0}")]
    Backend(#[from] BackendError),
    #[error("orchestrator lifecycle failed: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("lifecycle run requested without orchestrator settings")]
    MissingOsmConfig,
}

/// Everything a run produces: the measurement row and the recorded
/// lifecycle actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub record: RunRecord,
    pub actions: Vec<ActionRecord>,
}

/// Execute one experiment point with the configured backend executable.
pub fn execute_point(spec: &RunSpec) -> Result<RunOutput, WorkerError> {
    let backend = EmuCtl::new(&spec.settings.backend_cmd);
    execute_with_backend(spec, backend)
}

/// Execute one experiment point on an arbitrary backend.
///
/// The phases mirror a manual benchmark session: build the environment,
/// act on it (workload start or orchestrator lifecycle), take a memory
/// snapshot, and tear everything down again. The settle pauses give the
/// emulation platform time to reach a steady state between phases.
pub fn execute_with_backend<B: Backend>(
    spec: &RunSpec,
    backend: B,
) -> Result<RunOutput, WorkerError> {
    let point = &spec.point;
    let run_uuid = Uuid::new_v4();

    let model = TopologyModel::build(&point.source)?;
    log::info!(
        "run {run_uuid}: topology `{}` with {} pops and {} links",
        model.name,
        model.n_pops(),
        model.n_links()
    );

    let mut record = RunRecord::new(
        run_uuid,
        point.r_id,
        point.config_id,
        &model,
        point.service_size.unwrap_or(0),
    );
    let mut timers = Timers::new();
    let mut testbed = Testbed::new(backend, model);

    testbed.build(&mut timers)?;
    settle(&spec.settings, SETTLE_AFTER_BOOT);

    let actions = if point.with_lifecycle {
        run_lifecycle(spec, &mut testbed, &mut timers, run_uuid)?
    } else {
        if let Some(size) = point.service_size.filter(|s| *s > 0) {
            testbed.start_service(size, &mut timers)?;
        }
        Vec::new()
    };
    settle(&spec.settings, SETTLE_BEFORE_STOP);

    // capture while the environment still holds its resources
    record.apply_mem(MemSnapshot::capture());

    testbed.stop()?;
    settle(&spec.settings, SETTLE_AFTER_STOP);

    record.resolve_timers(&timers);
    Ok(RunOutput {
        record,
        actions,
    })
}

/// Drive the orchestrator lifecycle against the running environment: attach
/// all site VIMs, onboard the packages, instantiate and await the services,
/// then unwind everything in reverse order.
fn run_lifecycle<B: Backend>(
    spec: &RunSpec,
    testbed: &mut Testbed<B>,
    timers: &mut Timers,
    run_uuid: Uuid,
) -> Result<Vec<ActionRecord>, WorkerError> {
    let Some(osm) = spec.settings.osm.clone() else {
        return Err(WorkerError::MissingOsmConfig);
    };
    let mut client = OsmClient::new(osm, run_uuid, spec.point.r_id);
    let endpoints = testbed.keystone_endpoints();

    timers.start(TIME_TOTAL_VIM_ATTACH);
    client.attach_vims(&endpoints)?;
    timers.stop(TIME_TOTAL_VIM_ATTACH);

    timers.start(TIME_TOTAL_ON_BOARD);
    client.onboard_packages()?;
    timers.stop(TIME_TOTAL_ON_BOARD);

    let names: Vec<String> = if endpoints.is_empty() {
        Vec::new()
    } else {
        (0..spec.point.service_size.unwrap_or(1))
            .map(|i| format!("ns{i}"))
            .collect()
    };

    timers.start(TIME_SERVICE_START);
    for (i, name) in names.iter().enumerate() {
        let port = endpoints[i % endpoints.len()];
        client.instantiate(name, &vim_name(port))?;
    }
    for name in &names {
        client.wait_for_instantiation(name)?;
    }
    timers.stop(TIME_SERVICE_START);

    for name in &names {
        client.terminate(name)?;
    }
    client.remove_packages()?;
    client.detach_vims(&endpoints)?;

    Ok(client.into_actions())
}

fn settle(settings: &RunSettings, pause: Duration) {
    if settings.settle {
        thread::sleep(pause);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        experiments::SweepPoint,
        testing::RecordingBackend,
        topology::TopologySource,
    };

    fn line_spec(n_pops: usize) -> RunSpec {
        RunSpec {
            point: SweepPoint {
                source: TopologySource::Pattern {
                    kind: "line".to_string(),
                    n_pops,
                },
                service_size: None,
                with_lifecycle: false,
                r_id: 0,
                config_id: 0,
            },
            settings: RunSettings {
                settle: false,
                ..Default::default()
            },
        }
    }

    #[test]
    fn line_run_measures_the_environment() {
        let output = execute_with_backend(&line_spec(3), RecordingBackend::new()).unwrap();
        let record = &output.record;
        assert_eq!(record.topology, "line");
        assert_eq!(record.n_pops, 3);
        assert_eq!(record.n_links, 2);
        for time in [
            record.time_env_boot,
            record.time_pop_create,
            record.time_link_create,
            record.time_topo_start,
            record.time_total,
        ] {
            assert!(time.is_some_and(|t| t >= 0.0));
        }
        assert!(record.time_service_start.is_none());
        assert!(record.mem_total > 0);
        assert!(output.actions.is_empty());
    }

    #[test]
    fn workload_starts_when_a_size_is_set() {
        let mut spec = line_spec(3);
        spec.point.service_size = Some(2);
        let output = execute_with_backend(&spec, RecordingBackend::new()).unwrap();
        assert_eq!(output.record.service_size, 2);
        assert!(output.record.time_service_start.is_some());
    }

    #[test]
    fn unknown_pattern_fails_before_touching_the_backend() {
        let mut spec = line_spec(3);
        spec.point.source = TopologySource::Pattern {
            kind: "ring".to_string(),
            n_pops: 3,
        };
        let err = execute_with_backend(&spec, RecordingBackend::new()).unwrap_err();
        assert!(matches!(err, WorkerError::Topology(_)));
    }

    #[test]
    fn lifecycle_without_settings_is_rejected() {
        let mut spec = line_spec(2);
        spec.point.with_lifecycle = true;
        let err = execute_with_backend(&spec, RecordingBackend::new()).unwrap_err();
        assert!(matches!(err, WorkerError::MissingOsmConfig));
    }
}
