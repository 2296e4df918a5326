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

//! Compile-time defaults: file names, path templates, limits and option
//! fallbacks. Everything an operator might need to recognize in an error
//! message or a remote process listing is defined here.

/// Top-level routes file read from the current directory.
pub const ROUTES_FILE: &str = "routes.pln";

/// Directory of utilities replicated to every host at connect time.
pub const REPLICATED_DIRECTORY: &str = "_rutils";

/// Local directory receiving archived copies of export paths.
pub const ARCHIVE_DIRECTORY: &str = "_archive";

/// Directory served read-only by the embedded staging server.
pub const PUBLIC_DIRECTORY: &str = "_sources";

/// Default label filter: labels led by a lowercase letter or digit.
pub const DEFAULT_LABEL_PATTERN: &str = "^[0-9a-z]";

/// Fixed port remote hosts use to reach the staging server through the
/// reverse forwarding set up on connect.
pub const INSTALL_PORT: u16 = 6000;

/// URL exported to remote scripts as `INSTALL_URL`.
pub const INSTALL_URL: &str = "http://localhost:6000/";

/// Option defaults applied when a label leaves them unset.
pub const INTERPRETER: &str = "/bin/sh";
pub const LOCAL_INTERPRETER: &str = "/bin/sh";
pub const ENVIRONMENT_FILE: &str = "/dev/null";

/// Timestamp formats for the `%T` log placeholder and worker log file names.
pub const LOG_TIMESTAMP_FORMAT: &str = "%F %T%z";
pub const WORKER_TIMESTAMP_FORMAT: &str = "%F_%H%M%S";

/// Environment variable overriding the `%T` format.
pub const TIMESTAMP_FORMAT_VAR: &str = "BSTAGE_TIMESTAMP_FORMAT";

/// Upper bound on `-p`.
pub const MAX_WORKERS: usize = 20;

/// Parser limits. These mirror the validation the PLN grammar promises:
/// exceeding any of them is a parse error, never a silent truncation.
pub const MAX_LABELS: usize = 100;
pub const MAX_ALIASES: usize = 100;
pub const MAX_EXPORT_PATHS: usize = 32;
pub const MAX_OPTION_LEN: usize = 64;
pub const MAX_ENVIRONMENT: usize = 20 * 1024;

/// Local control socket for the SSH control master of one host.
pub fn control_socket(host_name: &str) -> String {
    format!("/tmp/bstage_control_{host_name}")
}

/// Remote staging directory, keyed by the negotiated HTTP port so that
/// concurrent runs against different port assignments cannot collide.
pub fn staging_dir(http_port: u16) -> String {
    format!("/tmp/bstage_staging_{http_port}")
}

/// Script file used by tty-mode execution, inside the staging directory.
pub fn staged_script(http_port: u16) -> String {
    format!("{}/_script", staging_dir(http_port))
}
