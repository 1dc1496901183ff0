//! Server configuration.
//!
//! The bind address, data directory and static directory come from CLI
//! flags; the remaining knobs come from environment variables with
//! defaults suitable for add-on deployment.

/// Runtime configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:8099`.
    pub addr: String,
    /// Directory holding the SQLite database.
    pub data_dir: String,
    /// Directory of static frontend files.
    pub static_dir: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown grace budget in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Build configuration from CLI flags plus environment overrides.
    ///
    /// | Env Var                 | Default |
    /// |-------------------------|---------|
    /// | `REQUEST_TIMEOUT_SECS`  | `30`    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`    |
    pub fn new(addr: String, data_dir: String, static_dir: String) -> Self {
        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs = env_u64("SHUTDOWN_TIMEOUT_SECS", 30);

        Self {
            addr,
            data_dir,
            static_dir,
            request_timeout_secs,
            shutdown_timeout_secs,
        }
    }

    /// Path of the SQLite database inside the data directory.
    pub fn database_path(&self) -> String {
        format!("{}/keyway.db", self.data_dir.trim_end_matches('/'))
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
