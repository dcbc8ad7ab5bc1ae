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
//! Fresh-process isolation for experiment runs.

use std::process::{Command, Stdio};

use anyhow::{bail, Context};

use crate::experiments::{RunOutput, RunSpec};

/// Execute one experiment point in a fresh copy of the current executable.
///
/// Emulation state (helper processes, network namespaces, platform
/// bookkeeping) accumulates within a process; one process per point keeps
/// the measurements of consecutive points independent. The worker inherits
/// stderr, so its log output lands on the console, and reports its result
/// as JSON on stdout.
pub fn run_point(spec: &RunSpec) -> anyhow::Result<RunOutput> {
    let exe = std::env::current_exe().context("cannot locate the current executable")?;
    let payload = serde_json::to_string(spec)?;

    let output = Command::new(&exe)
        .args(["worker", "--point", &payload])
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("cannot spawn worker `{}`", exe.display()))?;

    if !output.status.success() {
        bail!("worker exited with {}", output.status);
    }
    parse_run_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse a worker's stdout. The run output is the last non-empty line, so
/// stray prints from the emulation tooling do not break the protocol.
pub fn parse_run_output(stdout: &str) -> anyhow::Result<RunOutput> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .context("worker produced no output")?;
    serde_json::from_str(line).context("cannot parse the worker output")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        records::RunRecord,
        topology::{TopologyModel, TopologySource},
    };
    use uuid::Uuid;

    fn output_json() -> String {
        let model = TopologyModel::build(&TopologySource::Pattern {
            kind: "star".to_string(),
            n_pops: 3,
        })
        .unwrap();
        let output = RunOutput {
            record: RunRecord::new(Uuid::new_v4(), 0, 0, &model, 0),
            actions: Vec::new(),
        };
        serde_json::to_string(&output).unwrap()
    }

    #[test]
    fn output_is_the_last_non_empty_line() {
        let json = output_json();
        let stdout = format!("some stray banner\n\n{json}\n\n");
        let parsed = parse_run_output(&stdout).unwrap();
        assert_eq!(parsed.record.topology, "star");
        assert_eq!(parsed.record.n_pops, 3);
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_run_output("").is_err());
        assert!(parse_run_output("   \n\n").is_err());
        assert!(parse_run_output("no json here\n").is_err());
    }
}
