// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the netvigil server.
#[derive(Debug, Clone, clap::Args)]
pub struct ServerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "NETVIGIL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8443, env = "NETVIGIL_PORT")]
    pub port: u16,

    /// Shared API key for operator REST auth. If unset, auth is disabled
    /// (development only — the server logs a warning at startup).
    #[arg(long, env = "NETVIGIL_API_KEY")]
    pub api_key: Option<String>,

    /// Database connection URL, e.g. `sqlite:///var/lib/netvigil/netvigil.db`.
    #[arg(long, env = "NETVIGIL_DATABASE_URL", default_value = "sqlite://netvigil.db")]
    pub database_url: String,

    /// Base64-encoded 32-byte AES-256-GCM key for credential encryption.
    #[arg(long, env = "NETVIGIL_ENCRYPTION_KEY")]
    pub encryption_key: String,

    /// Root directory backup artifacts are written under.
    #[arg(long, env = "NETVIGIL_BACKUP_ROOT", default_value = "./backups")]
    pub backup_root: std::path::PathBuf,

    /// Heartbeat interval agents are told to use, in milliseconds.
    #[arg(long, default_value_t = 20_000, env = "NETVIGIL_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Seconds an agent has to send its first `hello` after the WS upgrade.
    #[arg(long, default_value_t = 10, env = "NETVIGIL_HELLO_TIMEOUT_SECS")]
    pub hello_timeout_secs: u64,

    /// Seconds an approved agent has to reconnect with its rotated token
    /// before being forced offline.
    #[arg(long, default_value_t = 60, env = "NETVIGIL_ROTATION_GRACE_SECS")]
    pub rotation_grace_secs: u64,

    /// Default per-agent concurrent inflight RPC cap.
    #[arg(long, default_value_t = 8, env = "NETVIGIL_MAX_INFLIGHT")]
    pub max_inflight: usize,

    /// Default RPC deadline in seconds, used when a caller does not override it.
    #[arg(long, default_value_t = 60, env = "NETVIGIL_DEFAULT_RPC_TIMEOUT_SECS")]
    pub default_rpc_timeout_secs: u64,

    /// Hard ceiling on any RPC deadline, in seconds, regardless of caller override.
    #[arg(long, default_value_t = 900, env = "NETVIGIL_MAX_RPC_TIMEOUT_SECS")]
    pub max_rpc_timeout_secs: u64,

    /// Deadline for scan RPCs, in seconds.
    #[arg(long, default_value_t = 900, env = "NETVIGIL_SCAN_TIMEOUT_SECS")]
    pub scan_timeout_secs: u64,

    /// Deadline for backup RPCs, in seconds.
    #[arg(long, default_value_t = 1800, env = "NETVIGIL_BACKUP_TIMEOUT_SECS")]
    pub backup_timeout_secs: u64,

    /// Interval at which the daily retention sweeper runs, in seconds.
    #[arg(long, default_value_t = 86_400, env = "NETVIGIL_RETENTION_SWEEP_SECS")]
    pub retention_sweep_secs: u64,
}

impl ServerConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_ms)
    }

    pub fn liveness_timeout(&self) -> std::time::Duration {
        self.heartbeat_interval() * 2
    }

    pub fn hello_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.hello_timeout_secs)
    }

    pub fn rotation_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.rotation_grace_secs)
    }

    pub fn default_rpc_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_rpc_timeout_secs)
    }

    pub fn max_rpc_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_rpc_timeout_secs)
    }

    pub fn scan_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn backup_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.backup_timeout_secs)
    }

    pub fn retention_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention_sweep_secs)
    }
}
