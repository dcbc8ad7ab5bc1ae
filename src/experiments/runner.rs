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
//! Module that executes a sweep point by point and collects all statistics.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::{error, info};

use super::{RunOutput, RunSettings, RunSpec, SweepConfig, SweepPoint};
use crate::isolation;

/// Path of the action table belonging to the run table at `result_path`.
pub fn actions_path(result_path: &Path) -> PathBuf {
    let stem = result_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result".to_string());
    let mut name = format!("{stem}_actions");
    if let Some(ext) = result_path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    result_path.with_file_name(name)
}

/// Run every point through `exec`, forwarding successful outputs to
/// `on_result`. A failing point is logged with its parameters and skipped;
/// it never aborts the sweep. Errors from `on_result` do abort, as losing
/// the result sink invalidates everything that follows.
pub fn drive<E, S>(points: &[SweepPoint], mut exec: E, mut on_result: S) -> anyhow::Result<()>
where
    E: FnMut(&SweepPoint) -> anyhow::Result<RunOutput>,
    S: FnMut(RunOutput) -> anyhow::Result<()>,
{
    for point in points {
        info!(
            "running experiment: topology {}, service size {:?}, repetition {}",
            point.source, point.service_size, point.r_id
        );
        match exec(point) {
            Ok(output) => on_result(output)?,
            Err(e) => {
                if log::log_enabled!(log::Level::Error) {
                    eprint!(
                        "{}{}",
                        termion::cursor::Left(1000),
                        termion::clear::CurrentLine
                    );
                    error!("Error in experiment: {e:#}");
                    error!(
                        "offending parameters: topology {}, service size {:?}, repetition {}, config {}",
                        point.source, point.service_size, point.r_id, point.config_id
                    );
                }
            }
        }
    }
    Ok(())
}

/// Enumerate the sweep and execute every point in a fresh worker process,
/// streaming the run and action tables to disk as rows arrive.
pub fn run_sweep(
    config: &SweepConfig,
    settings: &RunSettings,
    no_run: bool,
    result_path: &Path,
) -> anyhow::Result<()> {
    let points = config.points()?;
    info!("sweep `{}` with {} points", config.kind, points.len());

    if no_run {
        for point in &points {
            info!(
                "would run: topology {}, service size {:?}, repetition {}, config {}",
                point.source, point.service_size, point.r_id, point.config_id
            );
        }
        return Ok(());
    }

    let mut run_writer = csv::Writer::from_path(result_path)
        .with_context(|| format!("cannot create {}", result_path.display()))?;
    let actions_file = actions_path(result_path);
    let mut action_writer = csv::Writer::from_path(&actions_file)
        .with_context(|| format!("cannot create {}", actions_file.display()))?;

    let bar = ProgressBar::new(points.len() as u64);
    bar.set_style(ProgressStyle::with_template("{wide_bar} time: {elapsed}, eta: {msg} ").unwrap());
    bar.tick();
    bar.set_message("?");

    let start_time = Instant::now();
    drive(
        &points,
        |point| {
            let output = isolation::run_point(&RunSpec {
                point: point.clone(),
                settings: settings.clone(),
            });
            bar.inc(1);
            let scaling = start_time.elapsed().as_secs_f64() / bar.position() as f64;
            bar.set_message(
                HumanDuration(Duration::from_secs_f64(
                    bar.length().unwrap().saturating_sub(bar.position()) as f64 * scaling,
                ))
                .to_string(),
            );
            output
        },
        |output| {
            run_writer.serialize(&output.record)?;
            run_writer.flush()?;
            for action in &output.actions {
                action_writer.serialize(action)?;
            }
            action_writer.flush()?;
            Ok(())
        },
    )?;
    bar.finish();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        experiments::SweepKind,
        records::RunRecord,
        topology::{TopologyModel, TopologySource},
    };
    use uuid::Uuid;

    fn line_points(n: usize) -> Vec<SweepPoint> {
        (0..n)
            .map(|r_id| SweepPoint {
                source: TopologySource::Pattern {
                    kind: "line".to_string(),
                    n_pops: 2,
                },
                service_size: None,
                with_lifecycle: false,
                r_id,
                config_id: 0,
            })
            .collect()
    }

    fn dummy_output(r_id: usize) -> RunOutput {
        let model = TopologyModel::build(&TopologySource::Pattern {
            kind: "line".to_string(),
            n_pops: 2,
        })
        .unwrap();
        RunOutput {
            record: RunRecord::new(Uuid::new_v4(), r_id, 0, &model, 0),
            actions: Vec::new(),
        }
    }

    #[test]
    fn failing_point_does_not_abort_the_sweep() {
        let points = line_points(3);
        let mut collected = Vec::new();
        drive(
            &points,
            |point| {
                if point.r_id == 1 {
                    anyhow::bail!("injected failure");
                }
                Ok(dummy_output(point.r_id))
            },
            |output| {
                collected.push(output.record.r_id);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(collected, vec![0, 2]);
    }

    #[test]
    fn sink_errors_abort_the_sweep() {
        let points = line_points(2);
        let res = drive(
            &points,
            |p| Ok(dummy_output(p.r_id)),
            |_| anyhow::bail!("disk full"),
        );
        assert!(res.is_err());
    }

    #[test]
    fn actions_path_sits_next_to_the_result_file() {
        assert_eq!(
            actions_path(Path::new("result.csv")),
            PathBuf::from("result_actions.csv")
        );
        assert_eq!(
            actions_path(Path::new("out/measurements.csv")),
            PathBuf::from("out/measurements_actions.csv")
        );
        assert_eq!(actions_path(Path::new("plain")), PathBuf::from("plain_actions"));
    }

    #[test]
    fn no_run_only_enumerates() {
        let result_path = std::env::temp_dir().join(format!(
            "emubench-no-run-{}.csv",
            std::process::id()
        ));
        let config = SweepConfig {
            kind: SweepKind::Service2,
            n_pops: 3,
            topology: "line".to_string(),
            graph: None,
            repetitions: 1,
            zoo_path: PathBuf::from("topology_zoo"),
            topology_list: crate::experiments::DEFAULT_TOPOLOGY_LIST
                .map(String::from)
                .to_vec(),
            service_sizes: vec![1],
        };
        run_sweep(&config, &RunSettings::default(), true, &result_path).unwrap();
        assert!(!result_path.exists());
        assert!(!actions_path(&result_path).exists());
    }
}
