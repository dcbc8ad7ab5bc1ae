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
//! Benchmark emulated multi-PoP NFV environments: single runs or full sweeps.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use emubench::{
    experiments::{
        runner, worker, RunSettings, RunSpec, SweepConfig, SweepKind, DEFAULT_SERVICE_SIZES,
        DEFAULT_TOPOLOGY_LIST,
    },
    orchestrator::{self, OsmSettings},
    util,
};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Number of pops for a single run.
    #[arg(short, long, default_value_t = 3)]
    n_pops: usize,
    /// Topology pattern for a single run (line, star, or mesh).
    #[arg(short, long, default_value = "line")]
    topology: String,
    /// Build the topology from a graph file instead of a pattern.
    #[arg(short, long)]
    graph: Option<PathBuf>,
    /// Repetitions per parameter combination.
    #[arg(short, long, default_value_t = 1)]
    repetitions: usize,
    /// Path of the run result table; the action table lands next to it.
    #[arg(long, default_value = "result.csv")]
    result_path: PathBuf,
    /// The sweep to run: none, scaling, zoo, service, service2, or osm.
    #[arg(short, long, default_value = "none")]
    experiment: String,
    /// Enumerate and log the sweep points without executing any run.
    #[arg(long)]
    no_run: bool,
    /// Directory holding the topology-zoo graph files.
    #[arg(long, default_value = "topology_zoo")]
    zoo_path: PathBuf,
    /// Address of the orchestrator SO container; discovered via `lxc list` if absent.
    #[arg(long)]
    osm_hostname: Option<String>,
    /// Address of the orchestrator RO container; discovered via `lxc list` if absent.
    #[arg(long)]
    osm_ro_hostname: Option<String>,
    /// The emulation control executable.
    #[arg(long, default_value = "emuctl")]
    backend_cmd: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a single experiment point and print its output (internal).
    #[command(hide = true)]
    Worker {
        /// The JSON-encoded run spec.
        #[arg(long)]
        point: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();

    let args = Args::parse();

    if let Some(Command::Worker { point }) = args.command {
        let spec: RunSpec = serde_json::from_str(&point)?;
        let output = worker::execute_point(&spec)?;
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let kind: SweepKind = args
        .experiment
        .parse()
        .map_err(|_| format!("unknown experiment `{}`", args.experiment))?;

    let config = SweepConfig {
        kind,
        n_pops: args.n_pops,
        topology: args.topology,
        graph: args.graph,
        repetitions: args.repetitions,
        zoo_path: args.zoo_path,
        topology_list: DEFAULT_TOPOLOGY_LIST.map(String::from).to_vec(),
        service_sizes: DEFAULT_SERVICE_SIZES.to_vec(),
    };

    let osm = if kind == SweepKind::Osm && !args.no_run {
        Some(match (args.osm_hostname, args.osm_ro_hostname) {
            (Some(so), Some(ro)) => OsmSettings::new(so, ro),
            (so, ro) => {
                let (discovered_so, discovered_ro) = orchestrator::discover_osm_hosts()?;
                OsmSettings::new(so.unwrap_or(discovered_so), ro.unwrap_or(discovered_ro))
            }
        })
    } else {
        None
    };

    let settings = RunSettings {
        backend_cmd: args.backend_cmd,
        settle: true,
        osm,
    };

    if kind == SweepKind::None && !args.no_run {
        if let Some(point) = config.points()?.into_iter().next() {
            let spec = RunSpec { point, settings };
            let output = worker::execute_point(&spec)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        return Ok(());
    }

    runner::run_sweep(&config, &settings, args.no_run, &args.result_path)?;

    Ok(())
}
