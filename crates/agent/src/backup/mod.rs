// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agent.backup`: dispatches to the HP/Aruba or MikroTik vendor adapter by
//! `device_kind`, then hands the server a self-describing artifact. The
//! wire shape matches `netvigil_server::backup_engine::BackupResponse`
//! field-for-field.

mod hp_aruba;
mod mikrotik;
pub mod shell;

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::credentials::CredentialCache;
use crate::error::AgentError;

#[derive(Debug, Deserialize)]
pub struct CredentialsRef {
    pub username: String,
    pub secret: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct BackupArgs {
    pub device_ip: String,
    #[serde(default)]
    pub device_kind: String,
    #[serde(default)]
    pub backup_kind: String,
    pub credentials_ref: CredentialsRef,
}

#[derive(Debug, Serialize)]
pub struct BackupResult {
    pub content_base64: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

/// `device_kind` is the device's freeform `platform` string as recorded by
/// the server (default `"unknown"`), not a closed enum — the agent only
/// needs to tell MikroTik apart from everything else, which it treats as
/// HP/Aruba-style SSH gear, the common case among this system's supported
/// vendors.
pub async fn run(args: BackupArgs, config: &AgentConfig, cache: &CredentialCache) -> Result<BackupResult, AgentError> {
    let timeout = config.ssh_timeout();
    let username = args.credentials_ref.username.clone();
    let secret = args.credentials_ref.secret.clone();

    let result = if args.device_kind.to_ascii_lowercase().contains("mikrotik") {
        mikrotik::backup(&args.device_ip, &username, &secret, timeout).await
    } else {
        hp_aruba::backup(&args.device_ip, &username, &secret, timeout).await
    };

    if result.is_ok() {
        cache.remember(&args.device_ip, username, secret);
    }
    result
}
