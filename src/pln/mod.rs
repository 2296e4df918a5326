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

//! PLN route/label parsing.
//!
//! PLN files are line-oriented: a `name:` line opens a label, tab-indented
//! lines accumulate its script content, `key=value` lines set options that
//! later labels inherit, and `{`/`}` bracket a block whose lines are executed
//! locally with the captured output becoming the label content.
//!
//! Parsing is two-pass: the routes file produces route labels whose content
//! is a list of per-host file paths; [`read_host_labels`] re-runs the same
//! grammar over each of those files to populate the route's child labels.
//!
//! # Examples
//!
//! A routes file:
//!
//! ```text
//! web{1..3},db1: /etc/app
//!     hosts/common.pln
//!     hosts/web.pln
//! ```
//!
//! A per-host file:
//!
//! ```text
//! interpreter=/bin/ksh
//! deploy:
//!     echo hi
//! ```

mod environment;
mod error;
mod parser;
mod range;
mod types;

pub use environment::{env_split_lines, read_environment_file};
pub use error::PlnError;
pub use parser::{parse_pln, read_host_labels, read_route_labels, ParserState, PlnMode};
pub use range::{expand_numeric_range, RangeError};
pub use types::{Label, Options};
