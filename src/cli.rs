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

//! Command-line interface.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::defaults::{DEFAULT_LABEL_PATTERN, MAX_WORKERS, ROUTES_FILE};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "bstage",
    version,
    about = "Stage files and execute scripts on many hosts over SSH",
    after_help = "Parallel mode (-o and -p together) runs one worker process per slot with\nits share of the hostnames, each logging to <log_directory>/<timestamp>.<id>."
)]
pub struct Cli {
    /// Hostnames to execute against (exact alias match)
    #[arg(required = true, value_name = "hostname")]
    pub hostnames: Vec<String>,

    /// Routes file
    #[arg(short = 'f', value_name = "routes_file", default_value = ROUTES_FILE)]
    pub routes_file: PathBuf,

    /// Regular expression selecting which labels run
    #[arg(short = 'x', value_name = "label_pattern", default_value = DEFAULT_LABEL_PATTERN)]
    pub label_pattern: String,

    /// Alternate ssh configuration file
    #[arg(short = 'F', value_name = "ssh_config")]
    pub ssh_config: Option<PathBuf>,

    /// Environment appended after each label's own environment
    #[arg(short = 'E', value_name = "environment")]
    pub environment: Option<String>,

    /// Abort the whole run on the first failing label or connect
    #[arg(short = 'e')]
    pub stop_on_error: bool,

    /// Allocate a tty for remote execution
    #[arg(short = 't')]
    pub tty: bool,

    /// Dry run: show matching hosts and labels, open no connections
    #[arg(short = 'n')]
    pub dry_run: bool,

    /// Copy export paths from each host into the archive directory
    #[arg(short = 'A')]
    pub archive: bool,

    /// Copy archived export paths back to each host
    #[arg(short = 'R')]
    pub restore: bool,

    /// Directory for per-worker log files (parallel mode)
    #[arg(short = 'o', value_name = "log_directory", requires = "workers")]
    pub log_directory: Option<PathBuf>,

    /// Number of parallel worker processes (parallel mode)
    #[arg(short = 'p', value_name = "n_workers", requires = "log_directory")]
    pub workers: Option<usize>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parallel(&self) -> bool {
        self.workers.is_some() || self.log_directory.is_some()
    }

    /// Mode exclusivity beyond what clap expresses.
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_some() != self.log_directory.is_some() {
            bail!("-o and -p must be used together");
        }
        if let Some(n) = self.workers {
            if n == 0 || n > MAX_WORKERS {
                bail!("-p must be between 1 and {MAX_WORKERS}");
            }
            if self.dry_run || self.tty || self.archive || self.restore {
                bail!("-o/-p cannot be combined with -n, -t, -A or -R");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("bstage").chain(args.iter().copied()))
    }

    #[test]
    fn test_hostnames_required() {
        assert!(parse(&[]).is_err());
        let cli = parse(&["web1", "web2"]).unwrap();
        assert_eq!(cli.hostnames, vec!["web1", "web2"]);
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["web1"]).unwrap();
        assert_eq!(cli.routes_file, PathBuf::from("routes.pln"));
        assert_eq!(cli.label_pattern, "^[0-9a-z]");
        assert!(!cli.stop_on_error);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_parallel_flags_require_each_other() {
        assert!(parse(&["-p", "4", "web1"]).is_err());
        assert!(parse(&["-o", "logs", "web1"]).is_err());
        let cli = parse(&["-o", "logs", "-p", "4", "web1"]).unwrap();
        assert!(cli.parallel());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_parallel_excludes_other_modes() {
        for flag in ["-n", "-t", "-A", "-R"] {
            let cli = parse(&["-o", "logs", "-p", "2", flag, "web1"]).unwrap();
            assert!(cli.validate().is_err(), "{flag} should conflict with -o/-p");
        }
    }

    #[test]
    fn test_worker_count_bounds() {
        let cli = parse(&["-o", "logs", "-p", "0", "web1"]).unwrap();
        assert!(cli.validate().is_err());
        let cli = parse(&["-o", "logs", "-p", "21", "web1"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_mode_flags() {
        let cli = parse(&["-e", "-t", "-x", "^deploy$", "-E", "A=1", "db1"]).unwrap();
        assert!(cli.stop_on_error);
        assert!(cli.tty);
        assert_eq!(cli.label_pattern, "^deploy$");
        assert_eq!(cli.environment.as_deref(), Some("A=1"));
    }
}
