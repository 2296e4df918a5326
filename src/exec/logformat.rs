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

//! Lifecycle log templates.
//!
//! Every host/label lifecycle event is emitted through a template string:
//!
//! | placeholder | meaning |
//! |-------------|----------------------------------|
//! | `%h`        | hostname |
//! | `%l`        | label name |
//! | `%e`        | exit code |
//! | `%s`        | session id, 8-digit lowercase hex |
//! | `%T`        | timestamp |
//! | `%%`        | literal percent |
//!
//! Templates are read from `BSTAGE_*` environment variables so the worker
//! supervisor can switch its children to a pipe-separated machine format
//! while interactive runs keep the colored defaults. An empty template
//! suppresses the event entirely.

use crate::defaults::{LOG_TIMESTAMP_FORMAT, TIMESTAMP_FORMAT_VAR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    HostConnect,
    HostConnectError,
    LabelExecBegin,
    LabelExecEnd,
    LabelExecError,
    HostDisconnect,
}

impl LogEvent {
    pub const ALL: [LogEvent; 6] = [
        LogEvent::HostConnect,
        LogEvent::HostConnectError,
        LogEvent::LabelExecBegin,
        LogEvent::LabelExecEnd,
        LogEvent::LabelExecError,
        LogEvent::HostDisconnect,
    ];

    pub fn env_var(self) -> &'static str {
        match self {
            LogEvent::HostConnect => "BSTAGE_HOST_CONNECT",
            LogEvent::HostConnectError => "BSTAGE_HOST_CONNECT_ERROR",
            LogEvent::LabelExecBegin => "BSTAGE_LABEL_EXEC_BEGIN",
            LogEvent::LabelExecEnd => "BSTAGE_LABEL_EXEC_END",
            LogEvent::LabelExecError => "BSTAGE_LABEL_EXEC_ERROR",
            LogEvent::HostDisconnect => "BSTAGE_HOST_DISCONNECT",
        }
    }

    /// Interactive defaults: hosts yellow, labels cyan, failures red;
    /// successful completion and disconnect stay quiet.
    fn default_template(self) -> &'static str {
        match self {
            LogEvent::HostConnect => "\x1b[33m%h\x1b[0m",
            LogEvent::HostConnectError => "\x1b[31mcannot connect to %h (%e)\x1b[0m",
            LogEvent::LabelExecBegin => "\x1b[36m%l\x1b[0m",
            LogEvent::LabelExecEnd => "",
            LogEvent::LabelExecError => "\x1b[31m%l exited with code %e\x1b[0m",
            LogEvent::HostDisconnect => "",
        }
    }

    /// Pipe-separated machine format injected into worker environments.
    pub fn worker_template(self) -> &'static str {
        match self {
            LogEvent::HostConnect => "%s|%T|HOST_CONNECT|%h|",
            LogEvent::HostConnectError => "%s|%T|HOST_CONNECT_ERROR|%h|%e",
            LogEvent::LabelExecBegin => "%s|%T|EXEC_BEGIN|%l|",
            LogEvent::LabelExecEnd => "%s|%T|EXEC_END|%l|%e",
            LogEvent::LabelExecError => "%s|%T|EXEC_ERROR|%l|%e",
            LogEvent::HostDisconnect => "%s|%T|HOST_DISCONNECT|%h|%e",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogContext<'a> {
    pub host_name: &'a str,
    pub label_name: &'a str,
    pub exit_code: i32,
    pub session_id: u32,
}

/// Emit one lifecycle event through its template.
pub fn log_msg(event: LogEvent, ctx: &LogContext<'_>) {
    let template = std::env::var(event.env_var())
        .unwrap_or_else(|_| event.default_template().to_string());
    if template.is_empty() {
        return;
    }
    println!("{}", render(&template, ctx));
}

/// Interpolate template placeholders. Unknown `%x` sequences pass through
/// verbatim.
pub fn render(template: &str, ctx: &LogContext<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('h') => out.push_str(ctx.host_name),
            Some('l') => out.push_str(ctx.label_name),
            Some('e') => out.push_str(&ctx.exit_code.to_string()),
            Some('s') => out.push_str(&format!("{:08x}", ctx.session_id)),
            Some('T') => out.push_str(&timestamp()),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    out
}

fn timestamp() -> String {
    let format = std::env::var(TIMESTAMP_FORMAT_VAR)
        .unwrap_or_else(|_| LOG_TIMESTAMP_FORMAT.to_string());
    chrono::Local::now().format(&format).to_string()
}
