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
//! Fake backend used across the unit tests.

use std::collections::HashSet;

use crate::backend::{Backend, BackendError};

/// Backend that records every operation as one formatted line, in call order.
///
/// Link creation can be made to fail for selected site pairs to exercise the
/// best-effort link phase.
#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    pub ops: Vec<String>,
    failing_links: HashSet<(String, String)>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `add_link` fail for the pair `(src, dst)`.
    pub fn failing_link(mut self, src: &str, dst: &str) -> Self {
        self.failing_links.insert((src.to_string(), dst.to_string()));
        self
    }

    /// All recorded operations starting with `prefix`.
    pub fn ops_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.ops
            .iter()
            .map(String::as_str)
            .filter(|op| op.starts_with(prefix))
            .collect()
    }

    fn record(&mut self, op: String) -> Result<(), BackendError> {
        self.ops.push(op);
        Ok(())
    }
}

impl Backend for RecordingBackend {
    fn start_control_plane(&mut self, port: u16) -> Result<(), BackendError> {
        self.record(format!("rest-start {port}"))
    }

    fn create_network(&mut self) -> Result<(), BackendError> {
        self.record("net-create".to_string())
    }

    fn add_site(&mut self, name: &str) -> Result<(), BackendError> {
        self.record(format!("dc-create {name}"))
    }

    fn start_compute_api(&mut self, name: &str, port: u16) -> Result<(), BackendError> {
        self.record(format!("os-api-start {name} {port}"))
    }

    fn add_link(
        &mut self,
        src: &str,
        dst: &str,
        delay_ms: Option<u64>,
        bandwidth_mbps: Option<f64>,
    ) -> Result<(), BackendError> {
        if self.failing_links.contains(&(src.to_string(), dst.to_string())) {
            return Err(BackendError::Failed {
                program: "recording-backend".to_string(),
                args: format!("link-add {src} {dst}"),
                code: Some(1),
                stderr: "injected link failure".to_string(),
            });
        }
        self.record(format!(
            "link-add {src} {dst} delay_ms={delay_ms:?} bw={bandwidth_mbps:?}"
        ))
    }

    fn start_network(&mut self) -> Result<(), BackendError> {
        self.record("net-start".to_string())
    }

    fn start_compute(&mut self, site: &str, name: &str) -> Result<(), BackendError> {
        self.record(format!("compute-start {site} {name}"))
    }

    fn stop_control_plane(&mut self, port: u16) -> Result<(), BackendError> {
        self.record(format!("rest-stop {port}"))
    }

    fn stop_compute_api(&mut self, port: u16) -> Result<(), BackendError> {
        self.record(format!("os-api-stop {port}"))
    }

    fn stop_network(&mut self) -> Result<(), BackendError> {
        self.record("net-stop".to_string())
    }
}
