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

//! Typed argv construction and subprocess primitives.
//!
//! Every external command — ssh, scp, tar, renv, local interpreters and
//! hooks — is built as a [`CommandLine`] and executed through one of three
//! primitives: [`run`](CommandLine::run) (inherit stdio, wait),
//! [`pipe_stdin`](CommandLine::pipe_stdin) (feed bytes, wait),
//! [`pipe_stdout`](CommandLine::pipe_stdout) (capture output, wait). This is
//! the single seam between the engine and the operating system; tests assert
//! on the argv a transport operation produces rather than spawning anything.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// An ordered list of owned arguments, the first being the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
        }
    }

    /// Split a command string on spaces, the way interpreter options such as
    /// `local_interpreter=/usr/bin/env bash` are written.
    pub fn from_shell_words(command: &str) -> Self {
        let mut argv: Vec<String> = command
            .split(' ')
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        if argv.is_empty() {
            argv.push(String::new());
        }
        Self { argv }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        cmd
    }

    /// Run with inherited stdio and return the exit code.
    pub async fn run(&self) -> Result<i32> {
        let status = self
            .command()
            .status()
            .await
            .with_context(|| format!("could not exec {}", self.program()))?;
        Ok(exit_code(status))
    }

    /// Feed `input` to the child's stdin and return the exit code.
    pub async fn pipe_stdin(&self, input: &[u8]) -> Result<i32> {
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("could not exec {}", self.program()))?;

        let mut stdin = child.stdin.take().context("child stdin unavailable")?;
        stdin
            .write_all(input)
            .await
            .with_context(|| format!("write to {}", self.program()))?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .with_context(|| format!("wait on {}", self.program()))?;
        Ok(exit_code(status))
    }

    /// Capture the child's stdout and return it with the exit code. The
    /// child's stderr stays on the terminal.
    pub async fn pipe_stdout(&self) -> Result<(Vec<u8>, i32)> {
        let child = self
            .command()
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("could not exec {}", self.program()))?;
        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("wait on {}", self.program()))?;
        Ok((output.stdout, exit_code(output.status)))
    }

    /// Feed `input` to stdin while capturing stdout, for filter utilities.
    pub async fn pipe_through(&self, input: &[u8]) -> Result<(Vec<u8>, i32)> {
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("could not exec {}", self.program()))?;

        let mut stdin = child.stdin.take().context("child stdin unavailable")?;
        stdin
            .write_all(input)
            .await
            .with_context(|| format!("write to {}", self.program()))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("wait on {}", self.program()))?;
        Ok((output.stdout, exit_code(output.status)))
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    // signal-terminated children report as failure
    status.code().unwrap_or(1)
}

/// PATH lookup for a required external program.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        let candidate = dir.join(program);
        if let Ok(meta) = std::fs::metadata(&candidate) {
            if meta.is_file() && is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_order() {
        let cmd = CommandLine::new("ssh")
            .arg("-T")
            .args(["-S", "/tmp/sock"])
            .arg("web1");
        assert_eq!(cmd.argv(), &["ssh", "-T", "-S", "/tmp/sock", "web1"]);
    }

    #[test]
    fn test_from_shell_words() {
        let cmd = CommandLine::from_shell_words("/usr/bin/env bash");
        assert_eq!(cmd.argv(), &["/usr/bin/env", "bash"]);

        let cmd = CommandLine::from_shell_words("/bin/sh");
        assert_eq!(cmd.argv(), &["/bin/sh"]);
    }

    #[test]
    fn test_find_program_locates_sh() {
        // /bin/sh exists on every supported platform
        assert!(find_program("sh").is_some());
        assert!(find_program("definitely-not-a-real-program-xyzzy").is_none());
    }

    #[tokio::test]
    async fn test_pipe_stdout_captures() {
        let cmd = CommandLine::new("sh").arg("-c").arg("printf hello");
        let (out, code) = cmd.pipe_stdout().await.unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_pipe_stdin_exit_code() {
        let cmd = CommandLine::new("sh");
        let code = cmd.pipe_stdin(b"exit 3\n").await.unwrap();
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn test_pipe_through_filters() {
        let cmd = CommandLine::new("tr").args(["a-z", "A-Z"]);
        let (out, code) = cmd.pipe_through(b"ok\n").await.unwrap();
        assert_eq!(out, b"OK\n");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let cmd = CommandLine::new("definitely-not-a-real-program-xyzzy");
        assert!(cmd.run().await.is_err());
    }
}
