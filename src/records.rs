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
//! Module defining record data types to (de-)serialize measurement results to CSV.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    instrument::{
        MemSnapshot, Timers, TIME_ENV_BOOT, TIME_LINK_CREATE, TIME_POP_CREATE, TIME_SERVICE_START,
        TIME_TOPO_START, TIME_TOTAL, TIME_TOTAL_ON_BOARD, TIME_TOTAL_VIM_ATTACH,
    },
    topology::TopologyModel,
    util,
};

/// Collected measurements for a single experiment run.
///
/// Every phase timing is optional: a run that failed halfway through, or that
/// skipped a phase (e.g. no service requested), leaves the corresponding
/// column empty instead of reporting a bogus duration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunRecord {
    /// Unique id of the experiment run that produced this record.
    pub run_uuid: Uuid,
    /// Human-readable timestamp of when the run started.
    pub timestamp: String,
    /// Repetition counter within the sweep point.
    pub r_id: usize,
    /// Sequential index of the sweep point within the sweep.
    pub config_id: usize,
    /// Topology name: the pattern name or the graph file stem.
    pub topology: String,
    /// Number of emulated points of presence.
    pub n_pops: usize,
    /// Number of inter-PoP links in the topology model.
    pub n_links: usize,
    /// Number of service units requested on the environment (0 for none).
    pub service_size: usize,
    /// Seconds to boot the base emulation environment.
    pub time_env_boot: Option<f64>,
    /// Seconds to create all PoPs and start their compute APIs.
    pub time_pop_create: Option<f64>,
    /// Seconds to wire up all inter-PoP links.
    pub time_link_create: Option<f64>,
    /// Seconds to start the emulated network.
    pub time_topo_start: Option<f64>,
    /// Seconds to start the VNF workload (direct backend path).
    pub time_service_start: Option<f64>,
    /// Seconds to attach all PoPs as orchestrator VIMs.
    pub time_total_vim_attach: Option<f64>,
    /// Seconds to onboard all service descriptor packages.
    pub time_total_on_board: Option<f64>,
    /// Seconds for the complete environment build (all phases).
    pub time_total: Option<f64>,
    /// Total system memory at the end of the run, in bytes.
    pub mem_total: u64,
    /// Available system memory at the end of the run, in bytes.
    pub mem_available: u64,
    /// Used system memory at the end of the run, in bytes.
    pub mem_used: u64,
    /// Free system memory at the end of the run, in bytes.
    pub mem_free: u64,
    /// Used fraction of system memory at the end of the run, in percent.
    pub mem_percent: f64,
}

impl RunRecord {
    /// Create an empty record for a run on the given topology model. All
    /// timings start out unresolved and the memory fields zeroed.
    pub fn new(
        run_uuid: Uuid,
        r_id: usize,
        config_id: usize,
        model: &TopologyModel,
        service_size: usize,
    ) -> Self {
        Self {
            run_uuid,
            timestamp: util::get_timestamp(),
            r_id,
            config_id,
            topology: model.name.clone(),
            n_pops: model.n_pops(),
            n_links: model.n_links(),
            service_size,
            time_env_boot: None,
            time_pop_create: None,
            time_link_create: None,
            time_topo_start: None,
            time_service_start: None,
            time_total_vim_attach: None,
            time_total_on_board: None,
            time_total: None,
            mem_total: 0,
            mem_available: 0,
            mem_used: 0,
            mem_free: 0,
            mem_percent: 0.0,
        }
    }

    /// Copy every completed timer into its column. Timers still running (or
    /// never started) leave their column unresolved.
    pub fn resolve_timers(&mut self, timers: &Timers) {
        self.time_env_boot = timers.secs(TIME_ENV_BOOT);
        self.time_pop_create = timers.secs(TIME_POP_CREATE);
        self.time_link_create = timers.secs(TIME_LINK_CREATE);
        self.time_topo_start = timers.secs(TIME_TOPO_START);
        self.time_service_start = timers.secs(TIME_SERVICE_START);
        self.time_total_vim_attach = timers.secs(TIME_TOTAL_VIM_ATTACH);
        self.time_total_on_board = timers.secs(TIME_TOTAL_ON_BOARD);
        self.time_total = timers.secs(TIME_TOTAL);
    }

    /// Fill in the memory columns from a snapshot.
    pub fn apply_mem(&mut self, snap: MemSnapshot) {
        self.mem_total = snap.total;
        self.mem_available = snap.available;
        self.mem_used = snap.used;
        self.mem_free = snap.free;
        self.mem_percent = snap.percent;
    }
}

/// One orchestrator CLI invocation performed during a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionRecord {
    /// Unique id of the experiment run this action belongs to.
    pub run_uuid: Uuid,
    /// Repetition counter of the owning run.
    pub r_id: usize,
    /// The orchestrator action, e.g. `vim-create`.
    pub action: String,
    /// Wall-clock duration of the CLI invocation in seconds.
    pub time: f64,
    /// Whether the CLI exited with status zero.
    pub success: bool,
    /// Parsed service status, present for status queries only.
    pub status: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_run_record() -> RunRecord {
        RunRecord {
            run_uuid: Uuid::nil(),
            timestamp: "2025-01-01_12-00-00".to_string(),
            r_id: 2,
            config_id: 7,
            topology: "Abilene".to_string(),
            n_pops: 11,
            n_links: 14,
            service_size: 0,
            time_env_boot: Some(0.25),
            time_pop_create: Some(1.5),
            time_link_create: None,
            time_topo_start: Some(0.125),
            time_service_start: None,
            time_total_vim_attach: None,
            time_total_on_board: None,
            time_total: Some(2.0),
            mem_total: 16_000_000_000,
            mem_available: 8_000_000_000,
            mem_used: 8_000_000_000,
            mem_free: 4_000_000_000,
            mem_percent: 50.0,
        }
    }

    #[test]
    fn serialize_run_record() {
        let x = sample_run_record();

        let mut csv = csv::WriterBuilder::new().has_headers(true).from_writer(vec![]);
        csv.serialize(&x).unwrap();
        csv.flush().unwrap();
        let ser = String::from_utf8(csv.into_inner().unwrap()).unwrap();
        let header = ser.lines().next().unwrap();
        assert_eq!(
            header,
            "run_uuid,timestamp,r_id,config_id,topology,n_pops,n_links,service_size,\
             time_env_boot,time_pop_create,time_link_create,time_topo_start,\
             time_service_start,time_total_vim_attach,time_total_on_board,time_total,\
             mem_total,mem_available,mem_used,mem_free,mem_percent"
        );
        // unresolved timings serialize as empty columns
        assert!(ser.lines().nth(1).unwrap().contains(",1.5,,0.125,"));

        let mut csv = csv::ReaderBuilder::new().from_reader(ser.as_bytes());
        let de: RunRecord = csv.deserialize().next().unwrap().unwrap();
        assert_eq!(de, x);
    }

    #[test]
    fn serialize_action_record() {
        let x = ActionRecord {
            run_uuid: Uuid::nil(),
            r_id: 0,
            action: "ns-show".to_string(),
            time: 0.75,
            success: true,
            status: Some("pending".to_string()),
        };

        let mut csv = csv::WriterBuilder::new().has_headers(true).from_writer(vec![]);
        csv.serialize(&x).unwrap();
        csv.flush().unwrap();
        let ser = String::from_utf8(csv.into_inner().unwrap()).unwrap();
        assert_eq!(
            ser,
            "run_uuid,r_id,action,time,success,status\n\
             00000000-0000-0000-0000-000000000000,0,ns-show,0.75,true,pending\n"
        );

        let mut csv = csv::ReaderBuilder::new().from_reader(ser.as_bytes());
        let de: ActionRecord = csv.deserialize().next().unwrap().unwrap();
        assert_eq!(de, x);
    }
}
