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
//! Interface to the network emulation platform.
//!
//! Experiments drive the platform through the narrow [`Backend`] trait. The
//! shipping implementation is [`EmuCtl`], which shells out to the platform's
//! control executable once per operation, so every build phase stays
//! individually timeable from the outside.

use std::process::Command;

use thiserror::Error;

/// Errors raised while driving the emulation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The control executable could not be spawned at all.
    #[error("failed to invoke `{program}`: {source}")]
    Invoke {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The control executable ran but reported failure.
    #[error("`{program} {args}` exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        args: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Operations the experiment harness needs from an emulation platform.
///
/// The platform is expected to wire newly created sites and compute APIs into
/// the shared control plane on its own; the harness only dictates ordering.
/// All operations block until the platform confirms them.
pub trait Backend {
    /// Start the shared control-plane endpoint on `port`.
    fn start_control_plane(&mut self, port: u16) -> Result<(), BackendError>;

    /// Create the base network environment.
    fn create_network(&mut self) -> Result<(), BackendError>;

    /// Add the site `name` to the environment.
    fn add_site(&mut self, name: &str) -> Result<(), BackendError>;

    /// Start the compute API of site `name` on `port`.
    fn start_compute_api(&mut self, name: &str, port: u16) -> Result<(), BackendError>;

    /// Create a link between two sites, optionally shaping delay and rate.
    fn add_link(
        &mut self,
        src: &str,
        dst: &str,
        delay_ms: Option<u64>,
        bandwidth_mbps: Option<f64>,
    ) -> Result<(), BackendError>;

    /// Start the emulated network.
    fn start_network(&mut self) -> Result<(), BackendError>;

    /// Start the compute unit `name` on site `site`.
    fn start_compute(&mut self, site: &str, name: &str) -> Result<(), BackendError>;

    /// Stop the control-plane endpoint on `port`.
    fn stop_control_plane(&mut self, port: u16) -> Result<(), BackendError>;

    /// Stop the compute API listening on `port`.
    fn stop_compute_api(&mut self, port: u16) -> Result<(), BackendError>;

    /// Stop the emulated network.
    fn stop_network(&mut self) -> Result<(), BackendError>;
}

/// Backend driving the emulation platform through its control executable.
#[derive(Debug, Clone)]
pub struct EmuCtl {
    program: String,
}

impl EmuCtl {
    /// Default name of the control executable, resolved through `PATH`.
    pub const DEFAULT_PROGRAM: &'static str = "emuctl";

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), BackendError> {
        log::debug!("CALL {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| BackendError::Invoke {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(BackendError::Failed {
                program: self.program.clone(),
                args: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EmuCtl {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM)
    }
}

impl Backend for EmuCtl {
    fn start_control_plane(&mut self, port: u16) -> Result<(), BackendError> {
        self.run(&["rest-start", "--port", &port.to_string()])
    }

    fn create_network(&mut self) -> Result<(), BackendError> {
        self.run(&["net-create"])
    }

    fn add_site(&mut self, name: &str) -> Result<(), BackendError> {
        self.run(&["dc-create", "--name", name])
    }

    fn start_compute_api(&mut self, name: &str, port: u16) -> Result<(), BackendError> {
        self.run(&["os-api-start", "--dc", name, "--port", &port.to_string()])
    }

    fn add_link(
        &mut self,
        src: &str,
        dst: &str,
        delay_ms: Option<u64>,
        bandwidth_mbps: Option<f64>,
    ) -> Result<(), BackendError> {
        let mut args: Vec<String> = vec![
            "link-add".to_string(),
            "--src".to_string(),
            src.to_string(),
            "--dst".to_string(),
            dst.to_string(),
        ];
        if let Some(delay) = delay_ms {
            args.push("--delay".to_string());
            args.push(format!("{delay}ms"));
        }
        if let Some(bw) = bandwidth_mbps {
            args.push("--bw".to_string());
            args.push(bw.to_string());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)
    }

    fn start_network(&mut self) -> Result<(), BackendError> {
        self.run(&["net-start"])
    }

    fn start_compute(&mut self, site: &str, name: &str) -> Result<(), BackendError> {
        self.run(&["compute-start", "--dc", site, "--name", name])
    }

    fn stop_control_plane(&mut self, port: u16) -> Result<(), BackendError> {
        self.run(&["rest-stop", "--port", &port.to_string()])
    }

    fn stop_compute_api(&mut self, port: u16) -> Result<(), BackendError> {
        self.run(&["os-api-stop", "--port", &port.to_string()])
    }

    fn stop_network(&mut self) -> Result<(), BackendError> {
        self.run(&["net-stop"])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn successful_invocation() {
        let mut backend = EmuCtl::new("true");
        assert!(backend.start_network().is_ok());
    }

    #[test]
    fn failing_invocation_reports_exit_code() {
        let mut backend = EmuCtl::new("false");
        let err = backend.create_network().unwrap_err();
        match err {
            BackendError::Failed { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_reports_invoke_error() {
        let mut backend = EmuCtl::new("/nonexistent/emuctl-test-binary");
        assert!(matches!(
            backend.start_network(),
            Err(BackendError::Invoke { .. })
        ));
    }
}
