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

//! Error types for PLN parsing.
//!
//! Parse errors are fatal to the whole run and always name the file being
//! read; line-shaped errors also carry the physical line number.

use std::path::PathBuf;

use thiserror::Error;

use super::range::RangeError;

#[derive(Debug, Error)]
pub enum PlnError {
    #[error("{file}: invalid leading character on line {line}: ' '")]
    LeadingWhitespace { file: String, line: u32 },

    #[error("{file}: invalid trailing characters on line {line}: '{text}'")]
    TrailingCharacters {
        file: String,
        line: u32,
        text: String,
    },

    #[error("{file}: unknown symbol at line {line}: '{text}'")]
    UnknownSymbol {
        file: String,
        line: u32,
        text: String,
    },

    #[error("{file}: content on line {line} precedes a label")]
    ContentBeforeLabel { file: String, line: u32 },

    #[error("{file}: local execution block still open at end of file")]
    UnterminatedBlock { file: String },

    #[error("{file}: local execution for label '{label}' exited with code {code}")]
    LocalExecFailed {
        file: String,
        label: String,
        code: i32,
    },

    #[error("{file}: output of local execution for the label '{label}' must end with a newline")]
    LocalExecNoNewline { file: String, label: String },

    #[error("{file}: unknown option '{key}={value}'")]
    UnknownOption {
        file: String,
        key: String,
        value: String,
    },

    #[error("{file}: option '{key}' too long: {len} > {max}")]
    OptionTooLong {
        file: String,
        key: String,
        len: usize,
        max: usize,
    },

    #[error("{file}: no closing quote: {value}")]
    UnbalancedQuotes { file: String, value: String },

    #[error("{file}: environment file {path} exceeds {limit}kB")]
    EnvironmentTooLarge {
        file: String,
        path: String,
        limit: usize,
    },

    #[error("{file}: maximum number of labels ({max}) exceeded")]
    TooManyLabels { file: String, max: usize },

    #[error("{file}: > {max} aliases specified for label '{label}'")]
    TooManyAliases {
        file: String,
        label: String,
        max: usize,
    },

    #[error("{file}: > {max} export paths specified for label '{label}'")]
    TooManyExportPaths {
        file: String,
        label: String,
        max: usize,
    },

    #[error("{file}: invalid leading character for label alias on line {line}: ' '")]
    AliasLeadingSpace { file: String, line: u32 },

    #[error("{file}: export path on label '{label}' may only be specified in the routes file")]
    ExportPathPlacement { file: String, label: String },

    #[error("{file}: {source}")]
    Range {
        file: String,
        #[source]
        source: RangeError,
    },

    #[error("{file}: {path}: {source}")]
    Io {
        file: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: {source}")]
    LocalExec {
        file: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlnError::UnknownSymbol {
            file: "routes.pln".to_string(),
            line: 7,
            text: "oops".to_string(),
        };
        assert_eq!(err.to_string(), "routes.pln: unknown symbol at line 7: 'oops'");

        let err = PlnError::ExportPathPlacement {
            file: "hosts/web.pln".to_string(),
            label: "deploy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "hosts/web.pln: export path on label 'deploy' may only be specified in the routes file"
        );
    }
}
