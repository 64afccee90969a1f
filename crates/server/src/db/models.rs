// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row types and enums for every entity in SPEC_FULL.md §3. Enums persist as
//! `TEXT` (sqlx's string-backed `Type` derive) so the schema stays readable
//! from a plain `sqlite3` shell, matching the rest of the ecosystem's SQLite
//! conventions rather than packing states into integers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Lan,
    Wan,
    Dmz,
    Guest,
    Management,
    Voip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    Global,
    Customer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Ssh,
    Snmp,
    Mikrotik,
    Wmi,
    Api,
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    Docker,
    MikrotikContainer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Approved,
    Offline,
    Online,
}

/// Source of a Device's identity/attributes. Six-value lattice per §4.6
/// (`manual > snmp > nmap > neighbor > ping > arp`); §3 lists the coarser
/// `{scan,neighbor,manual}` but the merge rule in §4.6 only works with the
/// finer set, so the finer set is what's persisted (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceSource {
    Arp,
    Ping,
    Neighbor,
    Nmap,
    Snmp,
    Manual,
}

impl DeviceSource {
    /// Rank on the monotonic lattice; higher never loses to lower.
    pub fn rank(self) -> u8 {
        match self {
            Self::Arp => 0,
            Self::Ping => 1,
            Self::Neighbor => 2,
            Self::Nmap => 3,
            Self::Snmp => 4,
            Self::Manual => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Arp,
    Ping,
    Nmap,
    Snmp,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scan,
    Backup,
    Command,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Config,
    Binary,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TriggeredBy {
    Schedule,
    Manual,
    PreChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RetentionStrategy {
    Days,
    Count,
    Both,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub customer_id: String,
    pub name: String,
    #[sqlx(rename = "network_type")]
    pub network_type: NetworkType,
    pub cidr: String,
    pub gateway: Option<String>,
    pub vlan_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub scope: CredentialScope,
    pub customer_id: Option<String>,
    pub kind: CredentialKind,
    pub username: Option<String>,
    /// base64 `nonce || ciphertext || tag`, see `netvigil_crypto::CredentialCipher`.
    pub secret_ciphertext: String,
    /// Kind-specific fields (e.g. SNMP community/version) as a JSON blob.
    pub fields: serde_json::Value,
    pub device_filter: Option<String>,
    pub is_default: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub kind: AgentKind,
    pub address: String,
    pub port: i64,
    pub token_hash: String,
    pub token_salt: String,
    pub token_iterations: i64,
    pub status: AgentStatus,
    pub customer_id: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// JSON array of capability strings.
    pub capabilities: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub customer_id: String,
    pub address: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub platform: Option<String>,
    pub role: Option<String>,
    pub monitored: bool,
    pub last_seen_at: DateTime<Utc>,
    pub source: DeviceSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DiscoverySession {
    pub id: String,
    pub customer_id: String,
    pub agent_id: String,
    pub network_cidr: Option<String>,
    pub scan_type: ScanType,
    pub status: DiscoveryStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub found_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// JSON array of target agent ids.
    pub target_agents: serde_json::Value,
    pub status: JobStatus,
    pub devices_total: i64,
    pub devices_success: i64,
    pub devices_failed: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BackupRun {
    pub id: String,
    pub customer_id: String,
    pub device_id: String,
    pub kind: BackupKind,
    pub status: BackupStatus,
    pub file_path: Option<String>,
    pub size: Option<i64>,
    pub checksum: Option<String>,
    pub agent_id: String,
    pub triggered_by: TriggeredBy,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BackupSchedule {
    pub customer_id: String,
    pub enabled: bool,
    pub cadence: Cadence,
    pub at: String,
    /// JSON array of weekday numbers (0=Sunday) for `cadence=weekly`.
    pub days: Option<serde_json::Value>,
    pub day_of_month: Option<i64>,
    pub cron: Option<String>,
    /// JSON array of `BackupKind` strings this schedule produces.
    pub kinds: serde_json::Value,
    pub retention_days: i64,
    pub retention_count: i64,
    pub retention_strategy: RetentionStrategy,
    pub next_fire_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BackupTemplate {
    pub vendor: String,
    /// JSON array of CLI commands issued to produce a config backup.
    pub commands: serde_json::Value,
    /// JSON object of vendor-specific parsing hints (banner regex, etc).
    pub parsing_hints: serde_json::Value,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_source() -> impl Strategy<Value = DeviceSource> {
        prop_oneof![
            Just(DeviceSource::Arp),
            Just(DeviceSource::Ping),
            Just(DeviceSource::Neighbor),
            Just(DeviceSource::Nmap),
            Just(DeviceSource::Snmp),
            Just(DeviceSource::Manual),
        ]
    }

    proptest! {
        /// §4.6: "source upgrades monotonically ... higher wins". Folding any
        /// sequence of reported sources through the upgrade-only rule must
        /// land on the sequence's maximum rank no matter what order the scan
        /// results arrived in — the merge is commutative and idempotent.
        #[test]
        fn source_lattice_fold_is_order_independent(sources in prop::collection::vec(arb_source(), 1..12)) {
            let expected = sources.iter().copied().max_by_key(|s| s.rank()).expect("non-empty by construction");

            let mut forward = sources[0];
            for &s in &sources[1..] {
                if s.rank() > forward.rank() {
                    forward = s;
                }
            }

            let mut reversed: Vec<_> = sources.clone();
            reversed.reverse();
            let mut backward = reversed[0];
            for &s in &reversed[1..] {
                if s.rank() > backward.rank() {
                    backward = s;
                }
            }

            prop_assert_eq!(forward.rank(), expected.rank());
            prop_assert_eq!(backward.rank(), expected.rank());
        }
    }
}
