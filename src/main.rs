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

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;

use bstage::{
    cli::Cli,
    defaults::{ARCHIVE_DIRECTORY, PUBLIC_DIRECTORY, REPLICATED_DIRECTORY},
    exec::{install_signal_handlers, orchestrator, worker, RunOptions},
    server::StageServer,
    session::find_program,
    utils::{fs, init_logging},
};

/// External programs every real run depends on.
const REQUIRED_TOOLS: [&str; 4] = ["ssh", "scp", "tar", "renv"];

/// Utilities replicated into the staging directory of every host.
const REPLICATED_UTILITIES: [&str; 2] = ["rinstall", "rsub"];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    cli.validate()?;

    let label_pattern =
        Regex::new(&cli.label_pattern).map_err(|e| anyhow::anyhow!("bad expression: {e}"))?;

    // Parallel mode: become a supervisor, never touch the network here
    if cli.parallel() {
        let log_directory = cli
            .log_directory
            .as_deref()
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir(log_directory)?;
        let exe = std::env::current_exe().context("locate own executable")?;
        let code = worker::run_workers(&cli, &exe).await?;
        std::process::exit(code);
    }

    let opts = RunOptions {
        routes_file: cli.routes_file.clone(),
        hostnames: cli.hostnames.clone(),
        label_pattern,
        ssh_config: cli.ssh_config.clone(),
        environment_override: cli.environment.clone(),
        stop_on_error: cli.stop_on_error,
        tty: cli.tty,
        dry_run: cli.dry_run,
        archive: cli.archive,
        restore: cli.restore,
    };

    // Dry run: parse and match only
    if cli.dry_run {
        let code = orchestrator::run(&opts, None).await?;
        std::process::exit(code);
    }

    for tool in REQUIRED_TOOLS {
        if find_program(tool).is_none() {
            bail!("{tool}: not found in PATH");
        }
    }

    // Refresh the utilities pushed to every host
    let replicated = PathBuf::from(REPLICATED_DIRECTORY);
    fs::create_dir(&replicated)?;
    for utility in REPLICATED_UTILITIES {
        let source = find_program(utility)
            .with_context(|| format!("{utility}: not found in PATH"))?;
        fs::install_if_new(&source, &replicated.join(utility))?;
    }

    let public = PathBuf::from(PUBLIC_DIRECTORY);
    fs::create_dir(&public)?;
    fs::check_public_dir(&public)?;
    if cli.archive || cli.restore {
        fs::create_dir(Path::new(ARCHIVE_DIRECTORY))?;
    }

    let mut server = StageServer::start(public).await?;
    install_signal_handlers();

    let code = orchestrator::run(&opts, Some(&mut server)).await?;

    server.shutdown();
    std::process::exit(code);
}
