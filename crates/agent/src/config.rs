// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration, read from CLI flags with `env` fallbacks exactly as
//! `ServerConfig` is (SPEC_FULL.md §4.12). One struct, composed of the
//! tunables §6's "Configuration" list and §4.2/§4.7 name for the agent side:
//! enrollment identity, dial target, reconnect backoff bounds, and per-probe
//! timeouts.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, clap::Args)]
pub struct AgentConfig {
    /// Identity this agent claims in `hello`. Stable across restarts so the
    /// server recognizes it as the same row rather than re-enrolling.
    #[arg(long, env = "NETVIGIL_AGENT_ID")]
    pub agent_id: String,

    /// `docker` or `mikrotik-container` (SPEC_FULL.md §3 Agent.kind).
    #[arg(long, default_value = "docker", env = "NETVIGIL_AGENT_KIND")]
    pub kind: String,

    /// Base WebSocket URL of the server's agent endpoint, e.g.
    /// `wss://netvigil.example.com/api/v1/agents/ws`.
    #[arg(long, env = "NETVIGIL_SERVER_URL")]
    pub server_url: String,

    /// Path to a file holding the current bearer token. Rewritten in place
    /// when the server pushes a `token_rotation` (§4.4).
    #[arg(long, env = "NETVIGIL_TOKEN_FILE")]
    pub token_file: PathBuf,

    /// Address/port this agent reports in `hello`, used by the operator to
    /// tell agents apart in the UI; not dialed by the server (§4.2 is
    /// agent-initiated only).
    #[arg(long, default_value = "0.0.0.0", env = "NETVIGIL_AGENT_ADDRESS")]
    pub address: String,

    #[arg(long, default_value_t = 0, env = "NETVIGIL_AGENT_PORT")]
    pub port: u16,

    /// Comma-separated capability tags advertised in `hello` (e.g.
    /// `arp,ping,snmp,nmap,ssh,mikrotik`).
    #[arg(long, default_value = "arp,ping,snmp,nmap,ssh,mikrotik", env = "NETVIGIL_CAPABILITIES")]
    pub capabilities: String,

    /// Initial reconnect backoff, in milliseconds, doubled on each failed
    /// dial up to `max_backoff_ms` (mirrors the teacher's upstream bridge
    /// dialer).
    #[arg(long, default_value_t = 100, env = "NETVIGIL_RECONNECT_BACKOFF_MS")]
    pub reconnect_backoff_ms: u64,

    #[arg(long, default_value_t = 5_000, env = "NETVIGIL_RECONNECT_MAX_BACKOFF_MS")]
    pub reconnect_max_backoff_ms: u64,

    /// Seconds to wait for `auth_ok`/`auth_err` after sending `auth`.
    #[arg(long, default_value_t = 10, env = "NETVIGIL_HANDSHAKE_TIMEOUT_SECS")]
    pub handshake_timeout_secs: u64,

    /// Per-host timeout, in milliseconds, used by the ARP/ping sweep probes.
    #[arg(long, default_value_t = 800, env = "NETVIGIL_PROBE_TIMEOUT_MS")]
    pub probe_timeout_ms: u64,

    /// Path to the `nmap` binary, used for `scan_type=nmap`.
    #[arg(long, default_value = "nmap", env = "NETVIGIL_NMAP_PATH")]
    pub nmap_path: String,

    /// Path to the system `ping` binary, used for `scan_type=ping`.
    #[arg(long, default_value = "ping", env = "NETVIGIL_PING_PATH")]
    pub ping_path: String,

    /// SSH connect timeout, in seconds, for backup and command RPCs.
    #[arg(long, default_value_t = 15, env = "NETVIGIL_SSH_TIMEOUT_SECS")]
    pub ssh_timeout_secs: u64,
}

impl AgentConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn reconnect_max_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_backoff_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout_secs)
    }

    pub fn capability_list(&self) -> Vec<String> {
        self.capabilities.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect()
    }

    pub fn ws_url(&self) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), self.agent_id)
    }
}
