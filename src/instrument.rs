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
//! Named wall-clock timers and memory snapshots backing each run record.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Timer key for booting the base emulation environment.
pub const TIME_ENV_BOOT: &str = "time_env_boot";
/// Timer key for creating all PoPs and starting their compute APIs.
pub const TIME_POP_CREATE: &str = "time_pop_create";
/// Timer key for wiring up all inter-PoP links.
pub const TIME_LINK_CREATE: &str = "time_link_create";
/// Timer key for starting the emulated network.
pub const TIME_TOPO_START: &str = "time_topo_start";
/// Timer key spanning all environment build phases.
pub const TIME_TOTAL: &str = "time_total";
/// Timer key for starting the VNF workload on the booted environment.
pub const TIME_SERVICE_START: &str = "time_service_start";
/// Timer key for attaching all emulated PoPs as orchestrator VIMs.
pub const TIME_TOTAL_VIM_ATTACH: &str = "time_total_vim_attach";
/// Timer key for onboarding all service descriptor packages.
pub const TIME_TOTAL_ON_BOARD: &str = "time_total_on_board";

#[derive(Debug, Clone, Copy)]
enum TimerState {
    Running(Instant),
    Done(Duration),
}

/// Collection of named wall-clock timers.
///
/// Re-starting a running timer discards the earlier start, so the resolved
/// duration always spans from the most recent `start` call. Stopping a timer
/// that is not running logs a warning instead of failing, since a missing
/// measurement must never abort the experiment producing it.
#[derive(Debug, Default)]
pub struct Timers {
    inner: HashMap<String, TimerState>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the timer `name` at the current instant.
    pub fn start(&mut self, name: &str) {
        if let Some(TimerState::Running(_)) = self.inner.get(name) {
            log::debug!("timer `{name}` restarted, discarding the earlier start");
        }
        self.inner
            .insert(name.to_string(), TimerState::Running(Instant::now()));
    }

    /// Stop the timer `name` and return its elapsed time.
    ///
    /// Returns `None` after logging a warning if the timer was never started
    /// or is already stopped; an earlier completed measurement is kept.
    pub fn stop(&mut self, name: &str) -> Option<Duration> {
        match self.inner.get_mut(name) {
            Some(state) => match *state {
                TimerState::Running(started) => {
                    let elapsed = started.elapsed();
                    *state = TimerState::Done(elapsed);
                    Some(elapsed)
                }
                TimerState::Done(_) => {
                    log::warn!("timer `{name}` is already stopped");
                    None
                }
            },
            None => {
                log::warn!("timer `{name}` was stopped but never started");
                None
            }
        }
    }

    /// Completed duration of timer `name` in seconds, if it ran to a stop.
    pub fn secs(&self, name: &str) -> Option<f64> {
        match self.inner.get(name) {
            Some(TimerState::Done(elapsed)) => Some(elapsed.as_secs_f64()),
            _ => None,
        }
    }
}

/// Point-in-time system memory usage, in bytes (except for `percent`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemSnapshot {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

impl MemSnapshot {
    /// Capture the current memory usage of the machine running the experiment.
    pub fn capture() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        let used = sys.used_memory();
        Self {
            total,
            available: sys.available_memory(),
            used,
            free: sys.free_memory(),
            percent: if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn start_stop_resolves() {
        let mut timers = Timers::new();
        timers.start(TIME_ENV_BOOT);
        let elapsed = timers.stop(TIME_ENV_BOOT).unwrap();
        assert_eq!(timers.secs(TIME_ENV_BOOT), Some(elapsed.as_secs_f64()));
    }

    #[test]
    fn stop_without_start_is_tolerated() {
        let mut timers = Timers::new();
        assert_eq!(timers.stop("never_started"), None);
        assert_eq!(timers.secs("never_started"), None);
    }

    #[test]
    fn double_stop_keeps_first_measurement() {
        let mut timers = Timers::new();
        timers.start("t");
        let first = timers.stop("t").unwrap();
        assert_eq!(timers.stop("t"), None);
        assert_eq!(timers.secs("t"), Some(first.as_secs_f64()));
    }

    #[test]
    fn restart_discards_earlier_start() {
        let mut timers = Timers::new();
        timers.start("t");
        std::thread::sleep(Duration::from_millis(150));
        timers.start("t");
        let elapsed = timers.stop("t").unwrap();
        assert!(elapsed < Duration::from_millis(100));
    }

    #[test]
    fn unresolved_timer_yields_no_seconds() {
        let mut timers = Timers::new();
        timers.start("t");
        assert_eq!(timers.secs("t"), None);
    }

    #[test]
    fn mem_snapshot_is_plausible() {
        let snap = MemSnapshot::capture();
        assert!(snap.total > 0);
        assert!(snap.used <= snap.total);
        assert!((0.0..=100.0).contains(&snap.percent));
    }
}
