// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup engine (C7): per-device locking, vendor RPC dispatch, artifact
//! persistence, and retention sweeps. Vendor adapters themselves (SSH
//! sessions to HP/Aruba and MikroTik gear) live on the agent, which is the
//! only side with network reachability to customer devices (§4.7); this
//! module owns everything the server is responsible for.
//!
//! Grounded on the teacher's `upstream/health.rs` retry-with-backoff shape
//! and `transport/http.rs`'s artifact-write-then-rename pattern, generalized
//! to per-device locking and sha256 checksums.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use netvigil_proto::ErrorKind;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::db::models::{BackupKind, BackupRun, BackupStatus, CredentialKind, TriggeredBy};
use crate::error::ApiError;
use crate::state::AppState;

/// Per-device backup locks (§4.7: "at most one concurrent BackupRun per
/// Device"). Keyed by device id; never removed, since the number of devices
/// is bounded and small compared to process lifetime.
pub struct BackupEngine {
    device_locks: dashmap::DashMap<String, Arc<Mutex<()>>>,
}

impl BackupEngine {
    pub fn new() -> Self {
        Self { device_locks: dashmap::DashMap::new() }
    }

    async fn lock_device(&self, device_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock =
            Arc::clone(self.device_locks.entry(device_id.to_owned()).or_insert_with(|| Arc::new(Mutex::new(()))));
        lock.lock_owned().await
    }
}

impl Default for BackupEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct BackupResponse {
    /// Base64-encoded artifact bytes (config text or binary export).
    content_base64: String,
    ext: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    firmware: Option<String>,
    #[serde(default)]
    serial: Option<String>,
}

/// A just-created, still-`running` BackupRun row together with the device
/// lock that must stay held until it reaches a terminal status (§4.7: "at
/// most one concurrent BackupRun per Device"). Returned to callers that need
/// the run's id before the artifact transfer completes (e.g. the REST
/// handler for `POST /devices/{id}/backup`, which answers `202 {backup_id}`
/// immediately — see §6).
pub struct PendingBackup {
    pub run: BackupRun,
    guard: tokio::sync::OwnedMutexGuard<()>,
}

/// Lock the device, check/reserve the single-in-flight slot, and persist the
/// `running` row. Returns `409 conflict` if another run is already in
/// flight for this device, atomically with respect to concurrent callers of
/// this same function (the device lock serializes them).
pub async fn begin_backup(
    state: &Arc<AppState>,
    customer_id: &str,
    device_id: &str,
    kind: BackupKind,
    agent_id: &str,
    triggered_by: TriggeredBy,
) -> Result<PendingBackup, ApiError> {
    let guard = state.backups.lock_device(device_id).await;

    if crate::db::backups::is_running_for_device(&state.db, device_id).await? {
        return Err(ApiError::conflict("a backup is already running for this device"));
    }

    let device = crate::db::devices::get(&state.db, device_id).await?;
    if device.customer_id != customer_id {
        return Err(ApiError::validation("device does not belong to customer"));
    }

    let run = crate::db::backups::create_pending(&state.db, customer_id, device_id, kind, agent_id, triggered_by)
        .await?;

    Ok(PendingBackup { run, guard })
}

/// Dispatch the vendor RPC, persist the artifact, and finalize the row
/// created by [`begin_backup`]. Drops the device lock only once the run is
/// terminal.
pub async fn finish_backup(
    state: &Arc<AppState>,
    pending: PendingBackup,
    agent_id: &str,
    ctx: CancellationToken,
) -> Result<BackupRun, ApiError> {
    let PendingBackup { run, guard } = pending;
    let customer_id = run.customer_id.clone();
    let device_id = run.device_id.clone();
    let kind = run.kind;

    let device = crate::db::devices::get(&state.db, &device_id).await?;

    let credential_kind = if device.vendor.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("mikrotik")) {
        CredentialKind::Mikrotik
    } else {
        CredentialKind::Ssh
    };
    let credential = crate::db::credentials::resolve_for_device(&state.db, &customer_id, credential_kind).await?;
    let secret = crate::db::credentials::decrypt_secret(&state.cipher, &credential).await?;

    let payload = serde_json::json!({
        "device_ip": device.address,
        "device_kind": device.platform.clone().unwrap_or_else(|| "unknown".to_owned()),
        "backup_kind": kind,
        "credentials_ref": {
            "username": credential.username,
            "secret": String::from_utf8_lossy(&secret),
            "fields": credential.fields,
        },
    });
    drop(secret);

    let outcome = call_with_retry(state, agent_id, payload, ctx).await;

    let result = match outcome {
        Ok(envelope) => {
            let response: BackupResponse = match serde_json::from_value(envelope.payload) {
                Ok(r) => r,
                Err(e) => {
                    let msg = format!("malformed agent.backup response: {e}");
                    let failed = crate::db::backups::complete_failed(&state.db, &run.id, &msg).await;
                    drop(guard);
                    failed?;
                    return Err(ApiError::new(ErrorKind::VendorProtocol, msg));
                }
            };

            match persist_artifact(state, &customer_id, &device, &run.id, &response).await {
                Ok((path, size, checksum)) => {
                    crate::db::backups::complete_success(&state.db, &run.id, &path, size, &checksum).await?;
                    sweep_retention_for_customer_device(state, &customer_id, &device_id).await;
                    crate::db::backups::get(&state.db, &run.id).await
                }
                Err(e) => {
                    crate::db::backups::complete_failed(&state.db, &run.id, &e.message).await?;
                    Err(e)
                }
            }
        }
        Err(e) => {
            crate::db::backups::complete_failed(&state.db, &run.id, &e.message).await?;
            Err(e)
        }
    };

    drop(guard);
    result
}

/// Convenience wrapper for callers (e.g. a pre-change backup ahead of a
/// config push) that want the whole lifecycle without composing the two
/// halves themselves.
pub async fn run_backup(
    state: &Arc<AppState>,
    customer_id: &str,
    device_id: &str,
    kind: BackupKind,
    agent_id: &str,
    triggered_by: TriggeredBy,
    ctx: CancellationToken,
) -> Result<BackupRun, ApiError> {
    let pending = begin_backup(state, customer_id, device_id, kind, agent_id, triggered_by).await?;
    finish_backup(state, pending, agent_id, ctx).await
}

/// Transport-level failures retry once with the fixed 1s/5s backoff in §4.7;
/// vendor/parse errors (anything the agent reports as `rpc.error` with a
/// kind other than timeout/transport_closed) are not retried.
async fn call_with_retry(
    state: &Arc<AppState>,
    agent_id: &str,
    payload: serde_json::Value,
    ctx: CancellationToken,
) -> Result<netvigil_proto::Envelope, ApiError> {
    let timeout = state.config.backup_timeout();
    let first = state.hub.call(agent_id, "agent.backup", payload.clone(), timeout, ctx.clone()).await;
    match first {
        Err(e) if matches!(e.kind, ErrorKind::Timeout | ErrorKind::TransportClosed) => {
            tracing::warn!(agent_id, err = %e, "agent.backup transport failure, retrying after backoff");
            tokio::time::sleep(Duration::from_secs(1)).await;
            let second = state.hub.call(agent_id, "agent.backup", payload, timeout, ctx).await;
            if let Err(ref e2) = second {
                tracing::warn!(agent_id, err = %e2, "agent.backup retry failed");
            }
            second
        }
        other => other,
    }
}

async fn persist_artifact(
    state: &Arc<AppState>,
    customer_id: &str,
    device: &crate::db::models::Device,
    run_id: &str,
    response: &BackupResponse,
) -> Result<(String, i64, String), ApiError> {
    use base64::Engine;

    let customer = crate::db::customers::get(&state.db, customer_id).await?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&response.content_base64)
        .map_err(|e| ApiError::new(ErrorKind::VendorProtocol, format!("invalid artifact encoding: {e}")))?;

    let hostname = device.hostname.clone().unwrap_or_else(|| device.address.clone());
    let dir = state.config.backup_root.join(&customer.code).join(sanitize(&hostname));
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::internal(format!("failed to create backup directory: {e}")))?;

    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ");
    let final_path = dir.join(format!("{stamp}.{}", response.ext));
    let partial_path = final_path.with_extension(format!("{}.partial", response.ext));

    tokio::fs::write(&partial_path, &bytes)
        .await
        .map_err(|e| ApiError::internal(format!("failed to write backup artifact: {e}")))?;
    tokio::fs::rename(&partial_path, &final_path)
        .await
        .map_err(|e| ApiError::internal(format!("failed to finalize backup artifact: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(&final_path, std::fs::Permissions::from_mode(0o600)).await;
    }

    let checksum = tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>()
    })
    .await
    .map_err(|e| ApiError::internal(format!("checksum task panicked: {e}")))?;

    tracing::info!(
        run_id,
        model = ?response.model,
        firmware = ?response.firmware,
        serial = ?response.serial,
        path = %final_path.display(),
        "backup artifact persisted"
    );

    Ok((final_path.display().to_string(), final_path.metadata().map(|m| m.len() as i64).unwrap_or(0), checksum))
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' }).collect()
}

/// Delete artifacts past retention, keyed off the customer's schedule if one
/// exists (no schedule ⇒ no automatic retention policy for ad hoc backups).
async fn sweep_retention_for_customer_device(state: &Arc<AppState>, customer_id: &str, device_id: &str) {
    let Ok(schedule) = crate::db::schedules::get(&state.db, customer_id).await else { return };
    if let Err(e) = sweep_device(
        &state.db,
        device_id,
        schedule.retention_days,
        schedule.retention_count,
        schedule.retention_strategy,
    )
    .await
    {
        tracing::warn!(device_id, err = %e, "retention sweep failed");
    }
}

/// Apply a retention policy to one device's successful runs. The most
/// recent success is never deleted regardless of policy (§4.7, §8).
pub async fn sweep_device(
    db: &crate::db::Db,
    device_id: &str,
    retention_days: i64,
    retention_count: i64,
    strategy: crate::db::models::RetentionStrategy,
) -> Result<(), ApiError> {
    use crate::db::models::RetentionStrategy;

    let runs = crate::db::backups::successful_runs_for_device(db, device_id).await?;
    if runs.len() <= 1 {
        return Ok(());
    }

    let cutoff = crate::db::backups::cutoff(retention_days);
    // Skip index 0: the single most-recent success is never deleted.
    for (index, run) in runs.iter().enumerate().skip(1) {
        let past_days = run.finished_at.map(|f| f < cutoff).unwrap_or(false);
        let past_count = (index as i64) >= retention_count;
        let should_delete = match strategy {
            RetentionStrategy::Days => past_days,
            RetentionStrategy::Count => past_count,
            RetentionStrategy::Both => past_days && past_count,
        };
        if should_delete {
            if let Some(path) = &run.file_path {
                let _ = tokio::fs::remove_file(path).await;
            }
            crate::db::backups::delete_run(db, &run.id).await?;
        }
    }

    Ok(())
}

/// Daily sweeper (§4.8): runs retention across every customer/device pair
/// that has ever produced a backup, using each customer's schedule.
pub async fn sweep_all(db: &crate::db::Db) {
    let Ok(pairs) = crate::db::backups::all_customer_device_ids(db).await else { return };
    for (customer_id, device_id) in pairs {
        let Ok(schedule) = crate::db::schedules::get(db, &customer_id).await else { continue };
        if let Err(e) =
            sweep_device(db, &device_id, schedule.retention_days, schedule.retention_count, schedule.retention_strategy)
                .await
        {
            tracing::warn!(device_id, err = %e, "daily retention sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize("core/sw-1"), "core_sw-1");
    }
}
