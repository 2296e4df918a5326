// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Parallel worker fan-out.
//!
//! In parallel mode the orchestrator never touches the network itself: it
//! partitions the requested hostnames round-robin across `-p` slots and
//! re-executes the current binary once per non-empty slot, with `-o`/`-p`
//! stripped and the slot's hostname subset appended. Each worker is a fully
//! sequential run whose stdout and stderr go to a per-worker log file in the
//! machine-parseable template format. The supervisor reaps workers with
//! non-blocking waits on a 500 ms interval, summarizing the partial logs
//! each round, and performs exactly one final summary pass after the last
//! worker exits.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;

use crate::cli::Cli;
use crate::defaults::WORKER_TIMESTAMP_FORMAT;

use super::logformat::LogEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Flags a worker inherits: everything except `-o`/`-p` and the hostnames.
pub fn worker_flags(cli: &Cli) -> Vec<String> {
    let mut args = Vec::new();
    args.push("-f".to_string());
    args.push(cli.routes_file.to_string_lossy().into_owned());
    args.push("-x".to_string());
    args.push(cli.label_pattern.clone());
    if let Some(config) = &cli.ssh_config {
        args.push("-F".to_string());
        args.push(config.to_string_lossy().into_owned());
    }
    if let Some(environment) = &cli.environment {
        args.push("-E".to_string());
        args.push(environment.clone());
    }
    if cli.stop_on_error {
        args.push("-e".to_string());
    }
    for _ in 0..cli.verbose {
        args.push("-v".to_string());
    }
    args
}

/// Round-robin partition preserving request order within each slot.
pub fn partition_hosts(hostnames: &[String], n_workers: usize) -> Vec<Vec<String>> {
    let mut slots = vec![Vec::new(); n_workers];
    for (i, host) in hostnames.iter().enumerate() {
        slots[i % n_workers].push(host.clone());
    }
    slots
}

/// Spawn the workers and supervise them to completion. Returns the first
/// non-zero worker exit code, or 0.
pub async fn run_workers(cli: &Cli, exe: &Path) -> Result<i32> {
    let n_workers = cli.workers.unwrap_or(1);
    let log_directory = cli
        .log_directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    // one timestamp for every log file of this run
    let tmstr = Local::now().format(WORKER_TIMESTAMP_FORMAT).to_string();

    let flags = worker_flags(cli);
    let mut children: Vec<Option<Child>> = Vec::new();
    let mut log_paths: Vec<PathBuf> = Vec::new();

    for (slot, hosts) in partition_hosts(&cli.hostnames, n_workers)
        .into_iter()
        .enumerate()
    {
        if hosts.is_empty() {
            continue;
        }
        let worker_id = slot + 1;
        let log_path = log_directory.join(format!("{tmstr}.{worker_id}"));
        let log = open_log(&log_path)?;
        let log_err = log.try_clone().with_context(|| "duplicate log handle")?;

        let mut command = Command::new(exe);
        command
            .args(&flags)
            .args(&hosts)
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        for event in LogEvent::ALL {
            command.env(event.env_var(), event.worker_template());
        }
        command.env_remove("HTTP_TRACE");
        command.env_remove("SSH_TRACE");

        let child = command
            .spawn()
            .with_context(|| format!("failed to start worker {worker_id}"))?;
        children.push(Some(child));
        log_paths.push(log_path);
    }

    if children.is_empty() {
        return Ok(0);
    }

    let mut remaining = children.len();
    let mut exit_code = 0;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        for child in children.iter_mut() {
            let Some(running) = child else { continue };
            match running.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code().unwrap_or(1);
                    if code != 0 && exit_code == 0 {
                        exit_code = code;
                    }
                    *child = None;
                    remaining -= 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("wait for worker: {e}"),
            }
        }

        print_summary(&log_paths);
        if remaining == 0 {
            break;
        }
    }

    Ok(exit_code)
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    let mut options = OpenOptions::new();
    options.create(true).read(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }
    options
        .open(path)
        .with_context(|| format!("open {}", path.display()))
}

/// One line per worker with counts extracted from the partial log.
fn print_summary(log_paths: &[PathBuf]) {
    for (i, path) in log_paths.iter().enumerate() {
        let text = std::fs::read_to_string(path).unwrap_or_default();
        let (mut done, mut failed, mut unreachable) = (0u32, 0u32, 0u32);
        for line in text.lines() {
            if line.contains("|EXEC_END|") {
                done += 1;
            } else if line.contains("|EXEC_ERROR|") {
                failed += 1;
            } else if line.contains("|HOST_CONNECT_ERROR|") {
                unreachable += 1;
            }
        }
        println!(
            "worker {}: {} labels done, {} failed, {} hosts unreachable ({})",
            i + 1,
            done,
            failed,
            unreachable,
            path.display()
        );
    }
}
