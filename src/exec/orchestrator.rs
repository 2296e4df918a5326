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

//! The sequential execution loop.
//!
//! For every route, for every requested hostname matching one of its
//! aliases: open a session, run the matching labels in file order, close
//! the session. Each label runs begin hook -> restore -> remote execution
//! -> archive -> end hook, short-circuiting on the first non-zero exit.
//! Per-host failures are contained unless stop-on-error escalates them;
//! parse and validation failures abort before any network activity.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use regex::Regex;
use tracing::error;

use crate::pln::{read_host_labels, read_route_labels, Label};
use crate::server::StageServer;
use crate::session::{run_local_hook, Session, SessionState, TransportError};
use crate::utils::highlight::{self, Highlight};

use super::logformat::{log_msg, LogContext, LogEvent};
use super::{clear_current_session, set_current_session, CurrentSession};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub routes_file: PathBuf,
    pub hostnames: Vec<String>,
    pub label_pattern: Regex,
    pub ssh_config: Option<PathBuf>,
    pub environment_override: Option<String>,
    pub stop_on_error: bool,
    pub tty: bool,
    pub dry_run: bool,
    pub archive: bool,
    pub restore: bool,
}

/// Parse, match and execute. Returns the process exit code: 0 on success
/// or best-effort completion, the first failing exit code under
/// stop-on-error.
pub async fn run(opts: &RunOptions, mut server: Option<&mut StageServer>) -> Result<i32> {
    let mut routes = read_route_labels(&opts.routes_file).await?;
    for route in &mut routes {
        read_host_labels(route).await?;
    }

    // fail fast, before any network activity
    for host_name in &opts.hostnames {
        if !routes.iter().any(|r| r.has_alias(host_name)) {
            bail!("no route matches host '{host_name}'");
        }
    }
    let matched_labels: usize = routes
        .iter()
        .filter(|r| opts.hostnames.iter().any(|h| r.has_alias(h)))
        .map(|r| {
            r.labels
                .iter()
                .filter(|l| opts.label_pattern.is_match(&l.name))
                .count()
        })
        .sum();
    if matched_labels == 0 {
        bail!("no labels matching '{}'", opts.label_pattern.as_str());
    }
    for route in &routes {
        if !opts.hostnames.iter().any(|h| route.has_alias(h)) {
            continue;
        }
        for path in &route.export_paths {
            if !Path::new(path).exists() {
                bail!("{}: unable to stat '{}'", route.name, path);
            }
        }
    }

    if opts.dry_run {
        dry_run(&routes, opts);
        return Ok(0);
    }

    let Some(server) = server.as_mut() else {
        bail!("staging server required for a real run");
    };
    let http_port = server.port();
    let trace_requests = std::env::var_os("HTTP_TRACE").is_some();

    for route in &mut routes {
        for host_name in &opts.hostnames {
            if !route.has_alias(host_name) {
                continue;
            }

            let mut session = Session::new(
                host_name,
                http_port,
                opts.ssh_config.clone(),
                opts.environment_override.clone(),
            );
            let session_id = session.session_id();
            set_current_session(CurrentSession {
                host_name: host_name.clone(),
                socket_path: session.socket_path().to_path_buf(),
            });

            if let Err(e) = session.connect(&route.export_paths).await {
                error!("{e:#}");
                log_msg(
                    LogEvent::HostConnectError,
                    &LogContext {
                        host_name,
                        label_name: "",
                        exit_code: e.exit_code(),
                        session_id,
                    },
                );
                // a partially opened session still holds a control master
                if session.state() == SessionState::Closing {
                    session.disconnect().await;
                }
                clear_current_session();
                if opts.stop_on_error {
                    return Ok(e.exit_code());
                }
                continue;
            }

            log_msg(
                LogEvent::HostConnect,
                &LogContext {
                    host_name,
                    label_name: "",
                    exit_code: 0,
                    session_id,
                },
            );

            let mut abort_code = None;
            let export_paths = route.export_paths.clone();
            for label in &mut route.labels {
                if !opts.label_pattern.is_match(&label.name) {
                    continue;
                }
                let label_name = label.name.clone();
                let ctx = |exit_code: i32| LogContext {
                    host_name,
                    label_name: &label_name,
                    exit_code,
                    session_id,
                };

                log_msg(LogEvent::LabelExecBegin, &ctx(0));
                let code = run_label(&mut session, label, &export_paths, opts).await?;
                if code != 0 {
                    log_msg(LogEvent::LabelExecError, &ctx(code));
                    if opts.stop_on_error {
                        abort_code = Some(code);
                        break;
                    }
                } else {
                    log_msg(LogEvent::LabelExecEnd, &ctx(0));
                }

                if trace_requests {
                    for line in server.drain_trace() {
                        println!("{}", highlight::hl_range(&line, Highlight::Trace, None));
                    }
                }
            }

            // the session closes on every path out of the label loop
            session.disconnect().await;
            log_msg(
                LogEvent::HostDisconnect,
                &LogContext {
                    host_name,
                    label_name: "",
                    exit_code: abort_code.unwrap_or(0),
                    session_id,
                },
            );
            clear_current_session();

            if let Some(code) = abort_code {
                return Ok(code);
            }
        }
    }

    Ok(0)
}

/// One label against one connected host. Short-circuits on the first
/// non-zero step; spawn failures and malformed environments are fatal.
async fn run_label(
    session: &mut Session,
    label: &mut Label,
    export_paths: &[String],
    opts: &RunOptions,
) -> Result<i32> {
    // hooks run once per label
    let begin = std::mem::take(&mut label.options.begin);
    let end = std::mem::take(&mut label.options.end);

    let code = run_local_hook(&label.options, &begin).await?;
    if code != 0 {
        return Ok(code);
    }

    if opts.restore {
        let code = step_code(session.restore(export_paths).await)?;
        if code != 0 {
            return Ok(code);
        }
    }

    let code = step_code(if opts.tty {
        session.execute_tty(label).await
    } else {
        session.execute_pipe(label).await
    })?;
    if code != 0 {
        return Ok(code);
    }

    if opts.archive {
        let code = step_code(session.archive(export_paths).await)?;
        if code != 0 {
            return Ok(code);
        }
    }

    run_local_hook(&label.options, &end).await
}

/// Fold transport step failures into exit codes; everything else is fatal.
fn step_code(result: Result<i32, TransportError>) -> Result<i32> {
    match result {
        Ok(code) => Ok(code),
        Err(TransportError::StepFailed { code, .. }) => Ok(code),
        Err(TransportError::SocketExists { .. }) => Ok(1),
        Err(TransportError::Other(e)) => Err(e),
    }
}

/// Print the hosts and labels a real invocation would touch, highlighting
/// the matched span of the label filter.
fn dry_run(routes: &[Label], opts: &RunOptions) {
    for route in routes {
        for host_name in &opts.hostnames {
            if !route.has_alias(host_name) {
                continue;
            }
            println!("{}", highlight::hl_range(host_name, Highlight::Host, None));
            for label in &route.labels {
                let Some(found) = opts.label_pattern.find(&label.name) else {
                    continue;
                };
                println!(
                    "{}",
                    highlight::hl_range(
                        &label.name,
                        Highlight::Label,
                        Some((found.start(), found.end()))
                    )
                );
                tracing::debug!("{}", highlight::format_options(&label.options));
            }
        }
    }
}
