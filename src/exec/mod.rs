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

//! Execution orchestration: the route x host x label loop, lifecycle log
//! templates, and the parallel worker supervisor.

pub mod logformat;
pub mod orchestrator;
pub mod worker;

pub use logformat::{log_msg, LogContext, LogEvent};
pub use orchestrator::{run, RunOptions};

use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tokio::signal::unix::{signal, SignalKind};
use tracing::debug;

/// The session the signal handler may need to tear down. Set only while a
/// connection is open, cleared immediately on close.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub host_name: String,
    pub socket_path: PathBuf,
}

static CURRENT_SESSION: Lazy<Mutex<Option<CurrentSession>>> = Lazy::new(|| Mutex::new(None));

pub fn set_current_session(session: CurrentSession) {
    *CURRENT_SESSION.lock().unwrap() = Some(session);
}

pub fn clear_current_session() {
    *CURRENT_SESSION.lock().unwrap() = None;
}

/// One-shot SIGINT/SIGTERM handler: best-effort close of the open control
/// master, then exit. In-flight remote commands are abandoned; closing the
/// multiplexed connection usually takes them down with it.
pub fn install_signal_handlers() {
    tokio::spawn(async {
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to set up SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to set up SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => debug!("received SIGINT"),
            _ = sigterm.recv() => debug!("received SIGTERM"),
        }

        let current = CURRENT_SESSION.lock().unwrap().clone();
        if let Some(session) = current {
            let _ = std::process::Command::new("ssh")
                .args(["-q", "-S"])
                .arg(&session.socket_path)
                .args(["-O", "exit"])
                .arg(&session.host_name)
                .status();
        }
        std::process::exit(1);
    });
}
