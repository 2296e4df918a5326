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

//! Label and option data model.

use crate::defaults;

/// Named execution parameters accumulated while parsing.
///
/// Every label takes a snapshot of the state current at the line where it is
/// opened. `begin` and `end` are the exception: they are captured by the next
/// label and then reset, so a hook never leaks into a later label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub execute_with: String,
    pub interpreter: String,
    pub local_interpreter: String,
    pub environment: String,
    pub environment_file: String,
    /// Local hook scripts, not inherited across labels.
    pub begin: String,
    pub end: String,
}

impl Options {
    pub fn interpreter(&self) -> &str {
        or_default(&self.interpreter, defaults::INTERPRETER)
    }

    pub fn local_interpreter(&self) -> &str {
        or_default(&self.local_interpreter, defaults::LOCAL_INTERPRETER)
    }

    pub fn environment_file(&self) -> &str {
        or_default(&self.environment_file, defaults::ENVIRONMENT_FILE)
    }

    /// Reset the fields a label snapshot does not inherit.
    pub fn reset_hooks(&mut self) {
        self.begin.clear();
        self.end.clear();
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

/// A route entry or a host label.
///
/// Routes come from the routes file: their aliases are the hostnames the
/// route answers to, `export_paths` name local trees replicated to the host,
/// and `content` lists per-host PLN files, parsed into `labels` in a second
/// pass. Host labels carry the script to run in `content` and always have an
/// empty `labels` list.
#[derive(Debug, Clone, Default)]
pub struct Label {
    pub name: String,
    /// Never empty once parsed; defaults to the label's own name.
    pub aliases: Vec<String>,
    /// Route level only; a validation error inside a host file.
    pub export_paths: Vec<String>,
    /// Raw script bytes, accumulated line by line. Grows without bound.
    pub content: Vec<u8>,
    pub options: Options,
    /// Child host labels; populated for routes only.
    pub labels: Vec<Label>,
}

impl Label {
    pub fn content_size(&self) -> usize {
        self.content.len()
    }

    pub fn has_alias(&self, host_name: &str) -> bool {
        self.aliases.iter().any(|a| a == host_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_defaults() {
        let op = Options::default();
        assert_eq!(op.interpreter(), "/bin/sh");
        assert_eq!(op.local_interpreter(), "/bin/sh");
        assert_eq!(op.environment_file(), "/dev/null");

        let op = Options {
            interpreter: "/bin/ksh".to_string(),
            ..Options::default()
        };
        assert_eq!(op.interpreter(), "/bin/ksh");
    }

    #[test]
    fn test_reset_hooks() {
        let mut op = Options {
            begin: "date".to_string(),
            end: "uptime".to_string(),
            interpreter: "/bin/ksh".to_string(),
            ..Options::default()
        };
        op.reset_hooks();
        assert!(op.begin.is_empty());
        assert!(op.end.is_empty());
        assert_eq!(op.interpreter, "/bin/ksh");
    }

    #[test]
    fn test_has_alias() {
        let label = Label {
            name: "web1".to_string(),
            aliases: vec!["web1".to_string(), "web2".to_string()],
            ..Label::default()
        };
        assert!(label.has_alias("web2"));
        assert!(!label.has_alias("web3"));
    }
}
