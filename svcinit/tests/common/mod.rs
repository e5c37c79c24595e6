//! Shared fixtures for svcinit integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use svcinit::{BootstrapOptions, BootstrapSequencer};
use svcinit_test_utils::{FakeClock, Scripted, ScriptedTransport};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const STATUS: &str = "/system/status";
pub const CHECK: &str = "/users/admin/check";
pub const INIT: &str = "/users/admin/init";
pub const AUTH: &str = "/auth";
pub const ENDPOINTS: &str = "/endpoints";

pub struct Harness {
    pub volume: TempDir,
    pub options: BootstrapOptions,
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<FakeClock>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        let volume = TempDir::new().unwrap();
        let options = svcinit_test_utils::test_options(volume.path());
        Self {
            volume,
            options,
            transport: Arc::new(ScriptedTransport::new()),
            clock: Arc::new(FakeClock::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// A service that is up, uninitialized and accepts everything.
    pub fn fresh_service() -> Self {
        let harness = Self::new();
        harness
            .transport
            .on_get(STATUS, [Scripted::status(200)])
            .on_get(CHECK, [Scripted::status(404)])
            .on_post(INIT, [Scripted::body(200, r#"{"Id":1,"Username":"admin"}"#)])
            .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
            .on_get(ENDPOINTS, [Scripted::body(200, "[]")])
            .on_post(ENDPOINTS, [Scripted::body(201, r#"{"Id":1}"#)]);
        harness
    }

    pub fn sequencer(&self) -> BootstrapSequencer {
        BootstrapSequencer::new(
            self.options.clone(),
            self.transport.clone(),
            self.clock.clone(),
            self.cancel.clone(),
        )
    }

    pub fn credential_path(&self) -> &std::path::Path {
        &self.options.credential_path
    }

    pub fn pending_path(&self) -> std::path::PathBuf {
        let mut path = self.options.credential_path.clone().into_os_string();
        path.push(".pending");
        path.into()
    }

    pub fn read_credential(&self) -> String {
        std::fs::read_to_string(self.credential_path()).unwrap()
    }

    pub fn write_credential(&self, secret: &str) {
        std::fs::create_dir_all(self.credential_path().parent().unwrap()).unwrap();
        std::fs::write(self.credential_path(), secret).unwrap();
    }
}

/// `password` field of a recorded JSON body.
pub fn password_of(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    value["password"].as_str().unwrap().to_string()
}
