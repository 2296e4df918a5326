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

//! Line-oriented PLN parser.
//!
//! State is carried in an explicit [`ParserState`] threaded through the
//! parse calls: the option accumulator and the route/host mode. The per-file
//! state (local-execution context, currently open label) lives on the stack
//! of [`parse_pln`]. Parse errors are fatal and carry file and line number.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::defaults::{MAX_ALIASES, MAX_EXPORT_PATHS, MAX_LABELS, MAX_OPTION_LEN};
use crate::session::CommandLine;

use super::environment::{env_split_lines, read_environment_file};
use super::error::PlnError;
use super::range::expand_numeric_range;
use super::types::{Label, Options};

/// Whether export paths are permitted on labels in this file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlnMode {
    Route,
    Host,
}

/// Parse-time accumulator, threaded through all parse calls.
#[derive(Debug, Clone)]
pub struct ParserState {
    pub mode: PlnMode,
    pub options: Options,
}

impl ParserState {
    pub fn routes() -> Self {
        Self {
            mode: PlnMode::Route,
            options: Options::default(),
        }
    }

    pub fn host(options: Options) -> Self {
        Self {
            mode: PlnMode::Host,
            options,
        }
    }
}

/// Read the top-level routes file.
pub async fn read_route_labels(path: &Path) -> Result<Vec<Label>, PlnError> {
    let mut state = ParserState::routes();
    parse_pln(path, &mut state).await
}

/// Read every per-host file named in a route's content and attach the
/// resulting labels to the route.
///
/// Each host file starts from the route's option snapshot; option state does
/// not leak between host files.
pub async fn read_host_labels(route: &mut Label) -> Result<(), PlnError> {
    let content = String::from_utf8_lossy(&route.content).into_owned();
    let mut labels = Vec::new();

    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        let mut state = ParserState::host(route.options.clone());
        labels.extend(parse_pln(Path::new(line), &mut state).await?);
        if labels.len() >= MAX_LABELS {
            return Err(PlnError::TooManyLabels {
                file: line.to_string(),
                max: MAX_LABELS,
            });
        }
    }

    route.labels = labels;
    Ok(())
}

/// Parse one PLN file into an ordered list of labels.
pub async fn parse_pln(path: &Path, state: &mut ParserState) -> Result<Vec<Label>, PlnError> {
    let file = path.display().to_string();
    let bytes = tokio::fs::read(path).await.map_err(|source| PlnError::Io {
        file: file.clone(),
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);

    let mut labels: Vec<Label> = Vec::new();
    let mut spool: Option<NamedTempFile> = None;
    let mut line_no: u32 = 0;

    for raw in text.split_inclusive('\n') {
        line_no += 1;
        let line = raw.strip_suffix('\n').unwrap_or(raw);

        match raw.as_bytes().first().copied() {
            // empty lines and comments
            None | Some(b'\n') | Some(b'#') => {}

            Some(b' ') => {
                return Err(PlnError::LeadingWhitespace {
                    file,
                    line: line_no,
                });
            }

            // { ... } local execution
            Some(b'{') => {
                if raw.len() > 2 {
                    return Err(PlnError::TrailingCharacters {
                        file,
                        line: line_no,
                        text: line.to_string(),
                    });
                }
                if labels.is_empty() {
                    return Err(PlnError::ContentBeforeLabel {
                        file,
                        line: line_no,
                    });
                }
                let tmp = tempfile::Builder::new()
                    .prefix("bstage_local.")
                    .tempfile()
                    .map_err(|source| PlnError::Io {
                        file: file.clone(),
                        path: std::env::temp_dir(),
                        source,
                    })?;
                spool = Some(tmp);
            }

            Some(b'}') => {
                if raw.len() > 2 {
                    return Err(PlnError::TrailingCharacters {
                        file,
                        line: line_no,
                        text: line.to_string(),
                    });
                }
                if let Some(tmp) = spool.take() {
                    let label = labels.last_mut().unwrap_or_else(|| unreachable!());
                    run_local_block(&file, tmp, label).await?;
                }
            }

            // tab-indented content
            Some(b'\t') => match spool.as_mut() {
                Some(tmp) => {
                    tmp.write_all(&raw.as_bytes()[1..])
                        .map_err(|source| PlnError::Io {
                            file: file.clone(),
                            path: tmp.path().to_path_buf(),
                            source,
                        })?;
                }
                None => match labels.last_mut() {
                    Some(label) => label.content.extend_from_slice(&raw.as_bytes()[1..]),
                    None => {
                        return Err(PlnError::ContentBeforeLabel {
                            file,
                            line: line_no,
                        });
                    }
                },
            },

            // option
            _ if line.contains('=') => read_option(line, state, &file)?,

            // label
            _ if line.contains(':') => {
                let label = read_label(line, state, &file, line_no)?;
                labels.push(label);
                if labels.len() == MAX_LABELS {
                    return Err(PlnError::TooManyLabels {
                        file,
                        max: MAX_LABELS,
                    });
                }
            }

            // unknown
            _ => {
                return Err(PlnError::UnknownSymbol {
                    file,
                    line: line_no,
                    text: line.to_string(),
                });
            }
        }
    }

    if spool.is_some() {
        return Err(PlnError::UnterminatedBlock { file });
    }

    Ok(labels)
}

/// Execute a completed local block and capture its stdout as the label
/// content.
async fn run_local_block(
    file: &str,
    spool: NamedTempFile,
    label: &mut Label,
) -> Result<(), PlnError> {
    let spool_path = spool.path().to_string_lossy().into_owned();
    let cmd =
        CommandLine::from_shell_words(label.options.local_interpreter()).arg(spool_path);

    let (output, code) = cmd
        .pipe_stdout()
        .await
        .map_err(|source| PlnError::LocalExec {
            file: file.to_string(),
            source,
        })?;

    if code != 0 {
        return Err(PlnError::LocalExecFailed {
            file: file.to_string(),
            label: label.name.clone(),
            code,
        });
    }
    if !output.is_empty() && output.last() != Some(&b'\n') {
        return Err(PlnError::LocalExecNoNewline {
            file: file.to_string(),
            label: label.name.clone(),
        });
    }

    label.content = output;
    Ok(())
}

/// Populate a label's name, aliases, export paths and option snapshot from a
/// `name[,alias...]: [export_path ...]` line.
fn read_label(
    line: &str,
    state: &mut ParserState,
    file: &str,
    line_no: u32,
) -> Result<Label, PlnError> {
    // split on the last ':'
    let colon = line.rfind(':').unwrap_or_else(|| unreachable!());
    let name_field = &line[..colon];
    let export_field = &line[colon + 1..];

    let mut label = Label::default();

    if name_field.contains(',') {
        label.aliases = name_field
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        label.name = label.aliases.first().cloned().unwrap_or_default();
    } else {
        label.name = name_field.to_string();
        label.aliases =
            expand_numeric_range(name_field, MAX_ALIASES).map_err(|source| PlnError::Range {
                file: file.to_string(),
                source,
            })?;
    }

    if label.aliases.len() >= MAX_ALIASES {
        return Err(PlnError::TooManyAliases {
            file: file.to_string(),
            label: label.name.clone(),
            max: MAX_ALIASES,
        });
    }
    if label.aliases.iter().any(|a| a.starts_with(' ')) {
        return Err(PlnError::AliasLeadingSpace {
            file: file.to_string(),
            line: line_no,
        });
    }

    label.export_paths = export_field
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if label.export_paths.len() >= MAX_EXPORT_PATHS {
        return Err(PlnError::TooManyExportPaths {
            file: file.to_string(),
            label: label.name.clone(),
            max: MAX_EXPORT_PATHS,
        });
    }
    if !label.export_paths.is_empty() && state.mode != PlnMode::Route {
        return Err(PlnError::ExportPathPlacement {
            file: file.to_string(),
            label: label.name.clone(),
        });
    }

    label.options = state.options.clone();

    // options not inherited
    state.options.reset_hooks();

    Ok(label)
}

/// Apply one `key=value` option assignment to the running state.
fn read_option(line: &str, state: &mut ParserState, file: &str) -> Result<(), PlnError> {
    let (key, value) = line.split_once('=').unwrap_or_else(|| unreachable!());

    let check_len = |key: &str, value: &str| {
        if value.len() > MAX_OPTION_LEN {
            Err(PlnError::OptionTooLong {
                file: file.to_string(),
                key: key.to_string(),
                len: value.len(),
                max: MAX_OPTION_LEN,
            })
        } else {
            Ok(())
        }
    };

    match key {
        "execute_with" => {
            check_len(key, value)?;
            state.options.execute_with = value.to_string();
        }
        "interpreter" => {
            check_len(key, value)?;
            state.options.interpreter = value.to_string();
        }
        "local_interpreter" => {
            check_len(key, value)?;
            state.options.local_interpreter = value.to_string();
        }
        "environment" => {
            check_len(key, value)?;
            env_split_lines(value, value, file)?;
            state.options.environment = value.to_string();
        }
        "environment_file" => {
            check_len(key, value)?;
            if !value.is_empty() {
                let content = read_environment_file(value, file)?;
                env_split_lines(&content, value, file)?;
            }
            state.options.environment_file = value.to_string();
        }
        "begin" => state.options.begin = value.to_string(),
        "end" => state.options.end = value.to_string(),
        _ => {
            return Err(PlnError::UnknownOption {
                file: file.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }
    }

    Ok(())
}
