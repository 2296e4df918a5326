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

//! SSH session lifecycle for one host.
//!
//! ```text
//! Closed -> Connecting -> Open -> Closing -> Closed
//! ```
//!
//! Connect starts an `ssh` control master (`-M`) with a reverse forwarding
//! back to the staging server, creates the remote staging directory, and
//! streams the replicated utilities (and the route's export paths) through
//! tar. Every label execution against the host reuses the control socket.
//! Disconnect is idempotent and best-effort.

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::warn;

use crate::defaults::{
    staged_script, staging_dir, ARCHIVE_DIRECTORY, INSTALL_PORT, INSTALL_URL,
    REPLICATED_DIRECTORY,
};
use crate::pln::{env_split_lines, Label, Options};

use super::command::CommandLine;
use super::generate_session_id;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(
        "socket for '{host}' already exists, check\n  fuser {path}\nand remove the file if no process is listed"
    )]
    SocketExists { host: String, path: String },

    #[error("{step} for '{host}' exited with code {code}")]
    StepFailed {
        host: String,
        step: &'static str,
        code: i32,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    /// Exit code reported through the `%e` log placeholder and aggregated
    /// by the stop-on-error policy.
    pub fn exit_code(&self) -> i32 {
        match self {
            TransportError::SocketExists { .. } => 1,
            TransportError::StepFailed { code, .. } => *code,
            TransportError::Other(_) => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Environment upload dedup key. A fresh session id on every connect means
/// switching hosts always forces a new upload, while consecutive labels with
/// the same composed environment upload once.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EnvSync {
    session_id: u32,
    environment: String,
    environment_file: String,
}

fn needs_update(current: &Option<EnvSync>, next: &EnvSync) -> bool {
    current.as_ref() != Some(next)
}

pub struct Session {
    host_name: String,
    socket_path: PathBuf,
    http_port: u16,
    session_id: u32,
    ssh_config: Option<PathBuf>,
    environment_override: Option<String>,
    state: SessionState,
    env_sync: Option<EnvSync>,
}

impl Session {
    pub fn new(
        host_name: &str,
        http_port: u16,
        ssh_config: Option<PathBuf>,
        environment_override: Option<String>,
    ) -> Self {
        Self {
            host_name: host_name.to_string(),
            socket_path: PathBuf::from(crate::defaults::control_socket(host_name)),
            http_port,
            session_id: generate_session_id(),
            ssh_config,
            environment_override,
            state: SessionState::Closed,
            env_sync: None,
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn socket(&self) -> String {
        self.socket_path.to_string_lossy().into_owned()
    }

    /// `ssh -S <socket>` base for commands multiplexed over the master.
    fn ssh_muxed(&self) -> CommandLine {
        CommandLine::new("ssh").args(["-S".to_string(), self.socket()])
    }

    fn step_failed(&self, step: &'static str, code: i32) -> TransportError {
        TransportError::StepFailed {
            host: self.host_name.clone(),
            step,
            code,
        }
    }

    /// Argv for the control master. Kept separate so tests can assert the
    /// exact command without spawning ssh.
    fn master_command(&self) -> CommandLine {
        let forwarding = format!("{}:localhost:{}", INSTALL_PORT, self.http_port);
        let mut cmd = CommandLine::new("ssh")
            .args(["-fN", "-R"])
            .arg(forwarding)
            .arg("-S")
            .arg(self.socket())
            .arg("-M");
        if let Some(config) = &self.ssh_config {
            cmd = cmd.arg("-F").arg(config.to_string_lossy());
        }
        cmd.arg(&self.host_name)
    }

    /// Open the control master and stage the replicated utilities and the
    /// route's export paths on the remote host.
    pub async fn connect(&mut self, export_paths: &[String]) -> Result<(), TransportError> {
        self.state = SessionState::Connecting;

        if self.socket_path.exists() {
            self.state = SessionState::Closed;
            return Err(TransportError::SocketExists {
                host: self.host_name.clone(),
                path: self.socket(),
            });
        }

        let code = self.master_command().run().await?;
        if code == 255 {
            self.state = SessionState::Closed;
            return Err(self.step_failed("ssh control master", code));
        }

        let code = self
            .ssh_muxed()
            .arg(&self.host_name)
            .arg(format!("mkdir {}", staging_dir(self.http_port)))
            .run()
            .await?;
        if code != 0 {
            self.state = SessionState::Closing;
            return Err(self.step_failed("create staging directory", code));
        }

        self.transfer(
            vec!["-C".to_string(), REPLICATED_DIRECTORY.to_string(), "./".to_string()],
            "transfer of replicated utilities",
        )
        .await?;

        if !export_paths.is_empty() {
            self.transfer(export_paths.to_vec(), "transfer of export paths")
                .await?;
        }

        self.state = SessionState::Open;
        Ok(())
    }

    /// Stream one tar archive into the remote staging directory.
    async fn transfer(
        &mut self,
        tar_args: Vec<String>,
        step: &'static str,
    ) -> Result<(), TransportError> {
        let (archive, code) = CommandLine::new("tar")
            .args(["-cf", "-"])
            .args(tar_args)
            .pipe_stdout()
            .await?;
        if code != 0 {
            self.state = SessionState::Closing;
            return Err(self.step_failed(step, code));
        }

        let code = self
            .ssh_muxed()
            .arg("-q")
            .arg(&self.host_name)
            .arg(format!("tar -xf - -C {}", staging_dir(self.http_port)))
            .pipe_stdin(&archive)
            .await?;
        if code != 0 {
            self.state = SessionState::Closing;
            return Err(self.step_failed(step, code));
        }
        Ok(())
    }

    /// Upload the composed environment when it changed for this session.
    async fn update_environment_file(&mut self, label: &Label) -> Result<(), TransportError> {
        let sync = EnvSync {
            session_id: self.session_id,
            environment: label.options.environment.clone(),
            environment_file: label.options.environment_file().to_string(),
        };
        if !needs_update(&self.env_sync, &sync) {
            return Ok(());
        }

        let mut composed = String::new();

        let file_content = std::fs::read_to_string(&sync.environment_file)
            .with_context(|| format!("unable to read {}", sync.environment_file))?;
        composed.push_str(
            &env_split_lines(&file_content, &sync.environment_file, &self.host_name)
                .map_err(anyhow::Error::from)?,
        );
        composed.push_str(
            &env_split_lines(&sync.environment, &sync.environment, &self.host_name)
                .map_err(anyhow::Error::from)?,
        );
        if let Some(over) = &self.environment_override {
            composed.push_str(
                &env_split_lines(over, over, &self.host_name).map_err(anyhow::Error::from)?,
            );
        }

        let (normalized, code) = CommandLine::new("renv")
            .pipe_through(composed.as_bytes())
            .await?;
        if code != 0 {
            // a bad environment would poison every later command
            return Err(TransportError::Other(anyhow::anyhow!(
                "environment for '{}' rejected by renv with code {code}",
                self.host_name
            )));
        }

        let code = self
            .ssh_muxed()
            .arg("-q")
            .arg(&self.host_name)
            .arg(format!("cat > {}/final.env", staging_dir(self.http_port)))
            .pipe_stdin(&normalized)
            .await?;
        if code != 0 {
            return Err(self.step_failed("environment upload", code));
        }

        self.env_sync = Some(sync);
        Ok(())
    }

    /// Execute a label by piping its content to a remote interpreter.
    pub async fn execute_pipe(&mut self, label: &Label) -> Result<i32, TransportError> {
        self.update_environment_file(label).await?;

        let code = self
            .ssh_muxed()
            .arg("-T")
            .arg(&self.host_name)
            .arg(remote_invocation(&label.options, self.http_port, None))
            .pipe_stdin(&label.content)
            .await?;
        Ok(code)
    }

    /// Execute a label on a real terminal: stage the script to a file first,
    /// then run the interpreter against it under `ssh -t`.
    pub async fn execute_tty(&mut self, label: &Label) -> Result<i32, TransportError> {
        self.update_environment_file(label).await?;

        let script = staged_script(self.http_port);
        let code = self
            .ssh_muxed()
            .arg("-T")
            .arg(&self.host_name)
            .arg(format!("cat > {script}"))
            .pipe_stdin(&label.content)
            .await?;
        if code != 0 {
            return Err(self.step_failed("script staging", code));
        }

        let code = self
            .ssh_muxed()
            .arg("-t")
            .arg(&self.host_name)
            .arg(remote_invocation(&label.options, self.http_port, Some(&script)))
            .run()
            .await?;
        Ok(code)
    }

    /// Copy each export path remote -> local under the archive directory.
    pub async fn archive(&self, export_paths: &[String]) -> Result<i32, TransportError> {
        for path in export_paths {
            let local = self.archive_target(path);
            if let Some(parent) = Path::new(&local).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let code = self
                .scp()
                .arg(format!("{}:{}", self.host_name, path))
                .arg(local)
                .run()
                .await?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }

    /// Copy each archived export path local -> remote.
    pub async fn restore(&self, export_paths: &[String]) -> Result<i32, TransportError> {
        for path in export_paths {
            let parent = Path::new(path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| "/".to_string());
            let code = self
                .scp()
                .arg(self.archive_target(path))
                .arg(format!("{}:{}", self.host_name, parent))
                .run()
                .await?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }

    fn scp(&self) -> CommandLine {
        CommandLine::new("scp")
            .args(["-q", "-r", "-o"])
            .arg(format!("ControlPath={}", self.socket()))
    }

    /// Deterministic local name for an export path: host plus basename.
    fn archive_target(&self, export_path: &str) -> String {
        let base = Path::new(export_path)
            .file_name()
            .map(|b| b.to_string_lossy().into_owned())
            .unwrap_or_else(|| "_".to_string());
        format!("{}/{}/{}", ARCHIVE_DIRECTORY, self.host_name, base)
    }

    /// Tear the session down: remove the remote staging directory and stop
    /// the control master. Both steps are best-effort; a vanished socket
    /// means there is nothing to do.
    pub async fn disconnect(&mut self) {
        self.state = SessionState::Closing;

        if !self.socket_path.exists() {
            self.state = SessionState::Closed;
            return;
        }

        let removal = self
            .ssh_muxed()
            .arg(&self.host_name)
            .args(["rm", "-rf"])
            .arg(staging_dir(self.http_port))
            .run()
            .await;
        match removal {
            Ok(0) => {}
            Ok(code) => warn!("removal of remote staging directory exited with code {code}"),
            Err(e) => warn!("removal of remote staging directory: {e:#}"),
        }

        let exit = self
            .ssh_muxed()
            .arg("-q")
            .args(["-O", "exit"])
            .arg(&self.host_name)
            .run()
            .await;
        match exit {
            Ok(0) => {}
            Ok(code) => warn!("ssh -O exit exited with code {code}"),
            Err(e) => warn!("ssh -O exit: {e:#}"),
        }

        self.state = SessionState::Closed;
    }
}

/// The remote interpreter invocation: source the per-session environment,
/// export the staging directory and install URL, exec the interpreter.
fn remote_invocation(options: &Options, http_port: u16, script: Option<&str>) -> String {
    let sd = staging_dir(http_port);
    let exec = match script {
        Some(path) => format!("exec {} {}", options.interpreter(), path),
        None => format!("exec {}", options.interpreter()),
    };
    format!(
        "{} sh -a -c \"cd {sd}; . ./final.env; SD='{sd}' INSTALL_URL='{INSTALL_URL}'; {exec}\"",
        options.execute_with
    )
    .trim_start()
    .to_string()
}

/// Run a `begin`/`end` hook locally, feeding the script to the label's
/// local interpreter on stdin. Empty hooks succeed without spawning.
pub async fn run_local_hook(options: &Options, script: &str) -> anyhow::Result<i32> {
    if script.is_empty() {
        return Ok(0);
    }
    CommandLine::from_shell_words(options.local_interpreter())
        .pipe_stdin(script.as_bytes())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("web1", 8192, None, None)
    }

    #[test]
    fn test_master_command_argv() {
        let s = session();
        assert_eq!(
            s.master_command().argv(),
            &[
                "ssh",
                "-fN",
                "-R",
                "6000:localhost:8192",
                "-S",
                "/tmp/bstage_control_web1",
                "-M",
                "web1",
            ]
        );
    }

    #[test]
    fn test_master_command_with_ssh_config() {
        let s = Session::new("web1", 8192, Some(PathBuf::from("ssh_config")), None);
        let argv = s.master_command().argv().to_vec();
        assert_eq!(&argv[argv.len() - 3..], &["-F", "ssh_config", "web1"]);
    }

    #[test]
    fn test_remote_invocation_pipe() {
        let op = Options::default();
        assert_eq!(
            remote_invocation(&op, 8192, None),
            "sh -a -c \"cd /tmp/bstage_staging_8192; . ./final.env; \
             SD='/tmp/bstage_staging_8192' INSTALL_URL='http://localhost:6000/'; exec /bin/sh\""
        );
    }

    #[test]
    fn test_remote_invocation_execute_with() {
        let op = Options {
            execute_with: "doas".to_string(),
            interpreter: "/bin/ksh".to_string(),
            ..Options::default()
        };
        let cmd = remote_invocation(&op, 8192, None);
        assert!(cmd.starts_with("doas sh -a -c"));
        assert!(cmd.ends_with("exec /bin/ksh\""));
    }

    #[test]
    fn test_remote_invocation_tty_names_script() {
        let op = Options::default();
        let cmd = remote_invocation(&op, 8192, Some("/tmp/bstage_staging_8192/_script"));
        assert!(cmd.ends_with("exec /bin/sh /tmp/bstage_staging_8192/_script\""));
    }

    #[test]
    fn test_archive_target_is_deterministic() {
        let s = session();
        assert_eq!(s.archive_target("/etc/app"), "_archive/web1/app");
        assert_eq!(s.archive_target("/var/db/pkg"), "_archive/web1/pkg");
    }

    #[test]
    fn test_env_dedup_same_session() {
        let sync = EnvSync {
            session_id: 7,
            environment: "A=1".to_string(),
            environment_file: "/dev/null".to_string(),
        };
        let mut current = None;
        assert!(needs_update(&current, &sync));
        current = Some(sync.clone());
        // identical composed environment on the same session: no upload
        assert!(!needs_update(&current, &sync));
    }

    #[test]
    fn test_env_dedup_new_session_forces_upload() {
        let first = EnvSync {
            session_id: 7,
            environment: "A=1".to_string(),
            environment_file: "/dev/null".to_string(),
        };
        let current = Some(first.clone());
        // same environment text, different session (a new host connect)
        let next = EnvSync {
            session_id: 8,
            ..first
        };
        assert!(needs_update(&current, &next));
    }

    #[test]
    fn test_env_dedup_changed_environment() {
        let first = EnvSync {
            session_id: 7,
            environment: "A=1".to_string(),
            environment_file: "/dev/null".to_string(),
        };
        let current = Some(first.clone());
        let next = EnvSync {
            environment: "A=2".to_string(),
            ..first
        };
        assert!(needs_update(&current, &next));
    }

    #[tokio::test]
    async fn test_empty_hook_is_noop() {
        let code = run_local_hook(&Options::default(), "").await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_hook_exit_code_propagates() {
        let code = run_local_hook(&Options::default(), "exit 7\n").await.unwrap();
        assert_eq!(code, 7);
    }

    #[test]
    fn test_disconnect_state_on_missing_socket() {
        // disconnect with no socket file is an immediate no-op
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut s = Session::new("no-such-host-for-bstage-tests", 8192, None, None);
        rt.block_on(s.disconnect());
        assert_eq!(s.state(), SessionState::Closed);
    }
}
