#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Nothing listens here, so every probe is refused immediately.
pub const UNREACHABLE_BASE_URL: &str = "http://127.0.0.1:1/api";

pub struct TestContext {
    pub cmd: Command,
    pub volume: TempDir,
}

impl TestContext {
    /// Fresh command sharing this context's data volume.
    pub fn new_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_svcinit");
        let mut cmd = Command::new(bin_path);
        cmd.timeout(Duration::from_secs(30));
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn credential_path(&self) -> PathBuf {
        self.volume.path().join("data").join("credential")
    }

    /// `svcinit credential` against this volume.
    pub fn credential_cmd(&self) -> Command {
        let mut cmd = self.new_cmd();
        cmd.arg("credential")
            .arg("--credential-path")
            .arg(self.credential_path());
        cmd
    }

    /// `svcinit` against an unreachable service with a short readiness window.
    pub fn run_cmd(&self) -> Command {
        let mut cmd = self.new_cmd();
        cmd.args(["--base-url", UNREACHABLE_BASE_URL])
            .arg("--credential-path")
            .arg(self.credential_path())
            .args(["--no-sentinel", "--poll-interval", "200ms", "--poll-timeout", "1s"]);
        cmd
    }
}

pub fn svcinit() -> TestContext {
    let volume = tempfile::tempdir().expect("Failed to create temp volume");
    let bin_path = env!("CARGO_BIN_EXE_svcinit");
    let mut cmd = Command::new(bin_path);
    cmd.timeout(Duration::from_secs(30));
    cmd.env_remove("RUST_LOG");

    TestContext { cmd, volume }
}
