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

//! Environment text validation and line splitting.
//!
//! Inline environment options hold space-delimited `NAME="value"` entries on
//! one line. Before upload each entry must land on its own physical line;
//! the split point is a space immediately following a closing double quote,
//! so spaces inside quoted values survive. The same quote-balance rule is
//! applied eagerly at parse time so a malformed environment fails the run
//! before any network activity.

use std::io::Read;
use std::path::Path;

use crate::defaults::MAX_ENVIRONMENT;

use super::error::PlnError;

/// Split space-delimited `NAME="value"` text into one entry per line.
///
/// A trailing newline is appended to non-empty input. An odd number of
/// double quotes is an error naming `option_value` (the text the operator
/// wrote, for environment files the path).
pub fn env_split_lines(s: &str, option_value: &str, file: &str) -> Result<String, PlnError> {
    let mut out = s.as_bytes().to_vec();
    if !out.is_empty() {
        out.push(b'\n');
    }

    let mut quotes = 0usize;
    for i in 0..out.len() {
        if out[i] == b'"' {
            quotes += 1;
            // a closing quote followed by a space ends an entry
            if quotes % 2 == 0 && out.get(i + 1) == Some(&b' ') {
                out[i + 1] = b'\n';
            }
        }
    }

    if quotes % 2 == 1 {
        return Err(PlnError::UnbalancedQuotes {
            file: file.to_string(),
            value: option_value.to_string(),
        });
    }

    // input was valid UTF-8 and only spaces were rewritten
    Ok(String::from_utf8(out).unwrap_or_default())
}

/// Read an environment file, bounded by [`MAX_ENVIRONMENT`].
///
/// A file at or over the limit is an error: a truncated environment would
/// poison every subsequent remote command.
pub fn read_environment_file(path: &str, file: &str) -> Result<String, PlnError> {
    let io_err = |source| PlnError::Io {
        file: file.to_string(),
        path: Path::new(path).to_path_buf(),
        source,
    };

    let mut buf = Vec::with_capacity(4096);
    let handle = std::fs::File::open(path).map_err(io_err)?;
    let len = handle
        .take(MAX_ENVIRONMENT as u64)
        .read_to_end(&mut buf)
        .map_err(io_err)?;

    if len == MAX_ENVIRONMENT {
        return Err(PlnError::EnvironmentTooLarge {
            file: file.to_string(),
            path: path.to_string(),
            limit: MAX_ENVIRONMENT / 1024,
        });
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}
