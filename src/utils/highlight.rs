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

//! Output highlighting for the dry-run preview and request traces.

use owo_colors::OwoColorize;

use crate::pln::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    Host,
    Label,
    Error,
    Trace,
}

fn paint(s: &str, color: Highlight) -> String {
    match color {
        Highlight::Host => s.yellow().to_string(),
        Highlight::Label => s.cyan().to_string(),
        Highlight::Error => s.red().to_string(),
        Highlight::Trace => s.reversed().to_string(),
    }
}

/// Colorize a line, reversing the span `(start, end)` when given — used to
/// show which part of a label name the filter matched.
pub fn hl_range(s: &str, color: Highlight, span: Option<(usize, usize)>) -> String {
    match span {
        None | Some((0, 0)) => paint(s, color),
        Some((start, end)) => {
            let start = start.min(s.len());
            let end = end.clamp(start, s.len());
            format!(
                "{}{}{}",
                paint(&s[..start], color),
                (&s[start..end]).reversed(),
                paint(&s[end..], color)
            )
        }
    }
}

/// Concise one-line rendering of the options that affect execution.
pub fn format_options(op: &Options) -> String {
    let mut parts = Vec::new();
    if !op.interpreter.is_empty() {
        parts.push(format!("interpreter={}", op.interpreter));
    }
    if !op.local_interpreter.is_empty() {
        parts.push(format!("local_interpreter={}", op.local_interpreter));
    }
    if !op.execute_with.is_empty() {
        parts.push(format!("execute_with={}", op.execute_with));
    }
    parts.join(",")
}
