//! Shared constants between the bootstrap library and the CLI
//!
//! Defaults mirror the container image the bootstrapper ships in: the
//! managed service listens on localhost:9000 and keeps its state in /data.

/// Managed-service REST API paths (relative to the API base URL).
pub mod api {
    /// Default API base URL of the managed service inside the container.
    pub const DEFAULT_BASE_URL: &str = "http://localhost:9000/api";

    /// Readiness probe, any 2xx means the API is serving.
    pub const STATUS_PATH: &str = "/system/status";

    /// Admin account check: 204 initialized, 404 not initialized.
    pub const ADMIN_CHECK_PATH: &str = "/users/admin/check";

    /// One-time admin account creation.
    pub const ADMIN_INIT_PATH: &str = "/users/admin/init";

    /// Username/password authentication returning a JWT.
    pub const AUTH_PATH: &str = "/auth";

    /// Endpoint (environment) inventory.
    pub const ENDPOINTS_PATH: &str = "/endpoints";
}

/// Filesystem locations on the data volume.
pub mod paths {
    /// Credential file holding the raw admin secret.
    pub const CREDENTIAL_FILE: &str = "/data/credential";

    /// Sentinel touched after a completed bootstrap.
    pub const INIT_SENTINEL: &str = "/data/init";

    /// Suffix of the staged secret written before the admin account exists.
    pub const PENDING_SUFFIX: &str = ".pending";

    /// Advisory lock file name, created next to the credential file.
    pub const LOCK_FILE: &str = ".svcinit.lock";
}

/// Managed-service process defaults.
pub mod service {
    /// Executable launched as the supervised child.
    pub const DEFAULT_PROGRAM: &str = "./portainer";

    /// Flag the managed service accepts to seed its admin password from a file.
    pub const ADMIN_PASSWORD_FILE_FLAG: &str = "--admin-password-file";
}

/// Admin account and inventory defaults.
pub mod account {
    /// Administrator username.
    pub const DEFAULT_USERNAME: &str = "admin";

    /// Default generated secret length.
    pub const DEFAULT_SECRET_LENGTH: usize = 16;

    /// Shortest secret the managed service accepts.
    pub const MIN_SECRET_LENGTH: usize = 12;

    /// Reserved name of the local endpoint.
    pub const DEFAULT_RESOURCE_NAME: &str = "local";

    /// Connection descriptor of the local endpoint.
    pub const DEFAULT_RESOURCE_URL: &str = "unix:///var/run/docker.sock";
}

/// Timing defaults, in milliseconds.
pub mod timing {
    pub const POLL_INTERVAL_MS: u64 = 2_000;
    pub const POLL_TIMEOUT_MS: u64 = 60_000;
    pub const RETRY_COUNT: u32 = 5;
    pub const RETRY_BACKOFF_MS: u64 = 5_000;
    pub const REQUEST_TIMEOUT_MS: u64 = 10_000;
}

/// Process exit codes (sysexits.h where one fits).
pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const NO_INPUT: i32 = 66;
    pub const UNAVAILABLE: i32 = 69;
    pub const SOFTWARE: i32 = 70;
    pub const OS_ERR: i32 = 71;
    pub const CANT_CREATE: i32 = 73;
    pub const TEMP_FAIL: i32 = 75;
    pub const PROTOCOL: i32 = 76;
    pub const CONFIG: i32 = 78;
    /// 128 + SIGINT
    pub const INTERRUPTED: i32 = 130;
}
