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

//! Per-host SSH session transport.
//!
//! A [`Session`] owns one multiplexed SSH connection: an `ssh` control
//! master referenced by a local socket path, a remote staging directory,
//! and the environment upload state for that connection. All operations
//! run external commands built with [`CommandLine`] and block until the
//! subprocess exits; nothing here retries — exit codes propagate to the
//! orchestrator, which applies the failure policy.

pub mod command;
pub mod transport;

pub use command::{find_program, CommandLine};
pub use transport::{run_local_hook, Session, SessionState, TransportError};

/// Fresh random id for one host connection, rendered as `%08x` in log
/// templates and used to invalidate the environment upload cache.
pub fn generate_session_id() -> u32 {
    rand::random()
}
