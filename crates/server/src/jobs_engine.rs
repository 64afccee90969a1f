// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job engine (C5): turns one REST call into one or more in-flight agent
//! RPCs, aggregates per-agent outcomes into a Job row, and supports
//! cooperative cancellation. Grounded on the teacher's `upstream/poller.rs`
//! dispatch-then-collect pattern, generalized from one upstream target to
//! an arbitrary set of agents.

use std::sync::Arc;

use dashmap::DashMap;
use netvigil_proto::ErrorKind;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::backup_engine;
use crate::db::models::{BackupKind, Job, JobKind, JobStatus, ScanType, TriggeredBy};
use crate::error::ApiError;
use crate::ingest::{self, RawScanRecord};
use crate::state::AppState;

/// Tracks the cancellation context for every non-terminal Job so
/// `DELETE /jobs/{id}` can reach it (§6, §8 scenario 6).
pub struct JobsEngine {
    running: DashMap<String, CancellationToken>,
}

impl JobsEngine {
    pub fn new() -> Self {
        Self { running: DashMap::new() }
    }

    fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.running.insert(job_id.to_owned(), token.clone());
        token
    }

    fn finish(&self, job_id: &str) {
        self.running.remove(job_id);
    }

    /// Cancel a running job's RPCs. Returns `false` if the job is not
    /// currently tracked (already terminal, or unknown).
    pub fn cancel(&self, job_id: &str) -> bool {
        if let Some(token) = self.running.get(job_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.running.contains_key(job_id)
    }
}

impl Default for JobsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    records: Vec<RawScanRecord>,
}

/// Dispatch a discovery scan against one agent (§4.5, §6 `POST /discovery/scans`).
/// Returns immediately with the created Job; the scan itself runs on a
/// spawned task.
pub async fn dispatch_scan(
    state: &Arc<AppState>,
    customer_id: &str,
    agent_id: &str,
    network_cidr: Option<String>,
    scan_type: ScanType,
    scan_ports: Option<Vec<u16>>,
) -> Result<Job, ApiError> {
    if !state.hub.is_online(agent_id) {
        return Err(ApiError::new(ErrorKind::AgentOffline, format!("agent {agent_id} is not online")));
    }

    let job = crate::db::jobs::create(&state.db, JobKind::Scan, &[agent_id.to_owned()]).await?;
    let discovery = crate::db::discovery::create(
        &state.db,
        customer_id,
        agent_id,
        network_cidr.as_deref(),
        scan_type,
    )
    .await?;

    let state = Arc::clone(state);
    let customer_id = customer_id.to_owned();
    let agent_id = agent_id.to_owned();
    let job_id = job.id.clone();
    let discovery_id = discovery.id.clone();
    tokio::spawn(async move {
        run_scan(state, job_id, discovery_id, customer_id, agent_id, network_cidr, scan_type, scan_ports).await;
    });

    Ok(job)
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    state: Arc<AppState>,
    job_id: String,
    discovery_id: String,
    customer_id: String,
    agent_id: String,
    network_cidr: Option<String>,
    scan_type: ScanType,
    scan_ports: Option<Vec<u16>>,
) {
    let token = state.jobs.register(&job_id);
    let _ = crate::db::jobs::set_status(&state.db, &job_id, JobStatus::Running).await;
    let _ = crate::db::discovery::mark_running(&state.db, &discovery_id).await;

    let payload = serde_json::json!({
        "network_cidr": network_cidr,
        "scan_type": scan_type,
        "scan_ports": scan_ports,
    });

    let outcome =
        state.hub.call(&agent_id, "agent.scan", payload, state.config.scan_timeout(), token.clone()).await;

    let (job_status, discovery_status, found_count) = match outcome {
        Ok(envelope) => match serde_json::from_value::<ScanResponse>(envelope.payload) {
            Ok(response) => {
                let lock = state.db.lock_customer(&customer_id).await;
                let ingest_result = ingest::ingest_scan(&state.db, &customer_id, &response.records).await;
                drop(lock);
                match ingest_result {
                    Ok(result) => {
                        for device in &result.upserted {
                            tracing::info!(
                                device_id = %device.id,
                                customer_id = %customer_id,
                                address = %device.address,
                                source = ?device.source,
                                "device_upserted"
                            );
                        }
                        let _ = crate::db::jobs::record_device_outcome(&state.db, &job_id, true).await;
                        (JobStatus::Completed, crate::db::models::DiscoveryStatus::Completed, result.found_count)
                    }
                    Err(e) => {
                        tracing::error!(err = %e, job_id = %job_id, "scan ingest failed");
                        (JobStatus::Failed, crate::db::models::DiscoveryStatus::Failed, 0)
                    }
                }
            }
            Err(e) => {
                tracing::error!(err = %e, job_id = %job_id, "malformed agent.scan response");
                (JobStatus::Failed, crate::db::models::DiscoveryStatus::Failed, 0)
            }
        },
        Err(e) if e.kind == ErrorKind::Cancelled => {
            (JobStatus::Cancelled, crate::db::models::DiscoveryStatus::Cancelled, 0)
        }
        Err(e) => {
            tracing::warn!(err = %e, job_id = %job_id, "agent.scan failed");
            let _ = crate::db::jobs::record_device_outcome(&state.db, &job_id, false).await;
            (JobStatus::Failed, crate::db::models::DiscoveryStatus::Failed, 0)
        }
    };

    let _ = crate::db::jobs::finish(&state.db, &job_id, job_status).await;
    let _ = crate::db::discovery::finish(&state.db, &discovery_id, discovery_status, found_count).await;
    state.jobs.finish(&job_id);
}

/// Dispatch a backup against a single device (§6 `POST /devices/{id}/backup`).
/// The `BackupRun` row is created synchronously so its id is available to the
/// caller immediately — the response to `POST /devices/{id}/backup` names
/// this id as `backup_id`, and it must round-trip against
/// `GET /backups/{id}` (§6) — while the RPC/artifact transfer itself still
/// runs on a spawned task.
pub async fn dispatch_backup(
    state: &Arc<AppState>,
    customer_id: &str,
    device_id: &str,
    agent_id: &str,
    kind: BackupKind,
) -> Result<(Job, crate::db::models::BackupRun), ApiError> {
    if !state.hub.is_online(agent_id) {
        return Err(ApiError::new(ErrorKind::AgentOffline, format!("agent {agent_id} is not online")));
    }

    let pending = backup_engine::begin_backup(state, customer_id, device_id, kind, agent_id, TriggeredBy::Manual).await?;
    let run = pending.run.clone();

    let job = crate::db::jobs::create(&state.db, JobKind::Backup, &[agent_id.to_owned()]).await?;
    crate::db::jobs::set_devices_total(&state.db, &job.id, 1).await?;

    let state = Arc::clone(state);
    let agent_id = agent_id.to_owned();
    let job_id = job.id.clone();
    tokio::spawn(async move {
        let token = state.jobs.register(&job_id);
        let result = backup_engine::finish_backup(&state, pending, &agent_id, token).await;

        let success = result.is_ok();
        let _ = crate::db::jobs::record_device_outcome(&state.db, &job_id, success).await;
        let status = if success { JobStatus::Completed } else { JobStatus::Failed };
        let _ = crate::db::jobs::finish(&state.db, &job_id, status).await;
        state.jobs.finish(&job_id);
    });

    Ok((job, run))
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    output: Option<String>,
}

/// Dispatch arbitrary command execution, with an optional synchronous
/// pre-change backup (§4.5, §4.7, §6 `POST /commands`, §8 scenario 4).
pub async fn dispatch_command(
    state: &Arc<AppState>,
    customer_id: &str,
    device_id: &str,
    agent_id: &str,
    commands: Vec<String>,
    backup_before: bool,
) -> Result<serde_json::Value, ApiError> {
    if !state.hub.is_online(agent_id) {
        return Err(ApiError::new(ErrorKind::AgentOffline, format!("agent {agent_id} is not online")));
    }

    if backup_before {
        backup_engine::run_backup(
            state,
            customer_id,
            device_id,
            BackupKind::Config,
            agent_id,
            TriggeredBy::PreChange,
            CancellationToken::new(),
        )
        .await
        .map_err(|e| {
            ApiError::new(ErrorKind::PreChangeBackupFailed, format!("pre-change backup failed: {e}"))
        })?;
    }

    let device = crate::db::devices::get(&state.db, device_id).await?;
    let payload = serde_json::json!({
        "device_ip": device.address,
        "commands": commands,
        "backup_before": false,
    });

    let envelope = state
        .hub
        .call(agent_id, "agent.command", payload, state.config.default_rpc_timeout(), CancellationToken::new())
        .await?;

    let response: CommandResponse = serde_json::from_value(envelope.payload)
        .map_err(|e| ApiError::internal(format!("malformed agent.command response: {e}")))?;

    if !response.ok {
        return Err(ApiError::new(ErrorKind::VendorProtocol, "command execution failed on device"));
    }

    Ok(serde_json::json!({ "ok": true, "output": response.output }))
}

/// Liveness probe issued by `POST /agents/{id}/test` (§4.5 "Test jobs").
pub async fn ping_agent(state: &Arc<AppState>, agent_id: &str) -> Result<std::time::Duration, ApiError> {
    if !state.hub.is_online(agent_id) {
        return Err(ApiError::new(ErrorKind::AgentOffline, format!("agent {agent_id} is not online")));
    }
    let started = std::time::Instant::now();
    state
        .hub
        .call(agent_id, "agent.ping_device", serde_json::Value::Null, std::time::Duration::from_secs(10), CancellationToken::new())
        .await?;
    Ok(started.elapsed())
}
