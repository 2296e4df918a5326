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

//! End-to-end runs against stub ssh/scp/tar/renv tools placed on PATH.
//!
//! The stub `ssh` inspects the command it is asked to run: control-master
//! and teardown calls are recorded and succeed, and the remote interpreter
//! invocation hands the piped script to the local `/bin/sh`, so label exit
//! codes flow back exactly as they would from a real host.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const STUB_SSH: &str = r#"#!/bin/sh
log="${BSTAGE_TEST_LOG:-/dev/null}"
sock=""
prev=""
last=""
for a in "$@"; do
  if [ "$prev" = "-S" ]; then sock="$a"; fi
  prev="$a"
  last="$a"
done
case "$last" in
  *"tar -xf"*) cat >/dev/null; echo "UNPACK" >>"$log"; exit 0;;
  *mkdir*) echo "MKDIR" >>"$log"; exit 0;;
  *"cat > "*) cat >/dev/null; echo "ENVUP" >>"$log"; exit 0;;
  *"sh -a -c"*) echo "EXEC" >>"$log"; exec /bin/sh;;
esac
for a in "$@"; do
  if [ "$a" = "-fN" ]; then : >"$sock"; echo "CONNECT" >>"$log"; exit 0; fi
  if [ "$a" = "-O" ]; then rm -f "$sock"; echo "DISCONNECT" >>"$log"; exit 0; fi
done
echo "OTHER" >>"$log"
exit 0
"#;

const STUB_EXIT_ZERO: &str = "#!/bin/sh\nexit 0\n";
const STUB_CAT: &str = "#!/bin/sh\nexec cat\n";

struct Fleet {
    dir: TempDir,
    stub_path: PathBuf,
    log: PathBuf,
}

impl Fleet {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let stub_path = dir.path().join("bin");
        std::fs::create_dir(&stub_path).unwrap();

        write_stub(&stub_path.join("ssh"), STUB_SSH);
        write_stub(&stub_path.join("scp"), STUB_EXIT_ZERO);
        write_stub(&stub_path.join("tar"), STUB_EXIT_ZERO);
        write_stub(&stub_path.join("renv"), STUB_CAT);
        write_stub(&stub_path.join("rinstall"), STUB_EXIT_ZERO);
        write_stub(&stub_path.join("rsub"), STUB_EXIT_ZERO);

        let log = dir.path().join("stub.log");
        Self { dir, stub_path, log }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn routes(&self, route_line: &str, host_pln: &str) -> PathBuf {
        let host_file = self.write("hosts.pln", host_pln);
        self.write(
            "routes.pln",
            &format!("{route_line}\n\t{}\n", host_file.display()),
        )
    }

    fn command(&self, routes: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("bstage").unwrap();
        cmd.current_dir(self.dir.path())
            .env("PATH", format!("{}:/usr/bin:/bin", self.stub_path.display()))
            .env("BSTAGE_TEST_LOG", &self.log)
            .env_remove("HTTP_TRACE")
            .arg("-f")
            .arg(routes)
            .args(args);
        cmd
    }

    fn log_events(&self, event: &str) -> usize {
        let text = std::fs::read_to_string(&self.log).unwrap_or_default();
        text.lines().filter(|l| *l == event).count()
    }
}

fn write_stub(path: &Path, content: &str) {
    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_single_label_against_one_alias() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web1,web2:", "deploy:\n\techo hi\n");

    fleet
        .command(&routes, &["web1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("web1"))
        .stdout(predicate::str::contains("deploy"));

    // exactly one connection and one execution: web2 was not requested
    assert_eq!(fleet.log_events("CONNECT"), 1);
    assert_eq!(fleet.log_events("EXEC"), 1);
    assert_eq!(fleet.log_events("DISCONNECT"), 1);
}

#[test]
fn test_label_pattern_selects_subset() {
    let fleet = Fleet::new();
    let routes = fleet.routes(
        "web3:",
        "deploy:\n\techo hi\nrollback:\n\techo bye\n",
    );

    fleet
        .command(&routes, &["-x", "^deploy$", "web3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("rollback").not());

    assert_eq!(fleet.log_events("EXEC"), 1);
}

#[test]
fn test_unknown_host_opens_no_connection() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web4:", "deploy:\n\techo hi\n");

    fleet
        .command(&routes, &["db9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no route matches host 'db9'"));

    assert_eq!(fleet.log_events("CONNECT"), 0);
}

#[test]
fn test_stop_on_error_halts_remaining_labels() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web5:", "one:\n\texit 1\ntwo:\n\techo ok\n");

    fleet
        .command(&routes, &["-e", "web5"])
        .assert()
        .failure()
        .code(1);

    // the second label never ran, the session still closed
    assert_eq!(fleet.log_events("EXEC"), 1);
    assert_eq!(fleet.log_events("DISCONNECT"), 1);
}

#[test]
fn test_best_effort_runs_all_labels() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web6:", "one:\n\texit 1\ntwo:\n\techo ok\n");

    fleet.command(&routes, &["web6"]).assert().success();

    assert_eq!(fleet.log_events("EXEC"), 2);
}

#[test]
fn test_multiple_hosts_connect_in_order() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web{7..8}:", "deploy:\n\techo hi\n");

    fleet
        .command(&routes, &["web7", "web8"])
        .assert()
        .success();

    assert_eq!(fleet.log_events("CONNECT"), 2);
    assert_eq!(fleet.log_events("EXEC"), 2);
    assert_eq!(fleet.log_events("DISCONNECT"), 2);
}

#[test]
fn test_environment_uploaded_once_per_host() {
    let fleet = Fleet::new();
    let routes = fleet.routes(
        "web9:",
        "environment=A=\"1\"\none:\n\techo one\ntwo:\n\techo two\n",
    );

    fleet.command(&routes, &["web9"]).assert().success();

    // identical composed environment across consecutive labels: one upload
    assert_eq!(fleet.log_events("EXEC"), 2);
    assert_eq!(fleet.log_events("ENVUP"), 1);
}

#[test]
fn test_begin_hook_failure_skips_remote_execution() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web10:", "begin=exit 3\none:\n\techo hi\n");

    fleet
        .command(&routes, &["-e", "web10"])
        .assert()
        .failure()
        .code(3);

    assert_eq!(fleet.log_events("EXEC"), 0);
}

#[test]
fn test_dry_run_touches_nothing() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web11:", "deploy:\n\techo hi\n");

    fleet
        .command(&routes, &["-n", "web11"])
        .assert()
        .success()
        .stdout(predicate::str::contains("web11"))
        .stdout(predicate::str::contains("deploy"));

    assert_eq!(fleet.log_events("CONNECT"), 0);
    assert_eq!(fleet.log_events("EXEC"), 0);
}

#[test]
fn test_parallel_workers_write_per_worker_logs() {
    let fleet = Fleet::new();
    let routes = fleet.routes("w{20..21}:", "deploy:\n\techo hi\n");
    let log_dir = fleet.dir.path().join("logs");
    std::fs::create_dir(&log_dir).unwrap();

    fleet
        .command(
            &routes,
            &["-o", log_dir.to_str().unwrap(), "-p", "2", "w20", "w21"],
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("worker 1"))
        .stdout(predicate::str::contains("worker 2"));

    let logs: Vec<_> = std::fs::read_dir(&log_dir).unwrap().collect();
    assert_eq!(logs.len(), 2);
    for entry in logs {
        let text = std::fs::read_to_string(entry.unwrap().path()).unwrap();
        assert!(text.contains("|EXEC_END|deploy|0"), "log was: {text}");
    }
}

#[test]
fn test_parallel_mode_rejects_dry_run() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web12:", "deploy:\n\techo hi\n");

    fleet
        .command(&routes, &["-o", "logs", "-p", "2", "-n", "web12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be combined"));
}

#[test]
fn test_bad_label_pattern_is_usage_error() {
    let fleet = Fleet::new();
    let routes = fleet.routes("web13:", "deploy:\n\techo hi\n");

    fleet
        .command(&routes, &["-x", "([", "web13"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad expression"));
}
