// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers (C9, SPEC_FULL.md §6). Thin: validate input, call into
//! C3-C7/C10-C11, serialize. Never talks to an agent except through the Hub.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::db::agents as agents_db;
use crate::db::credentials::NewCredential;
use crate::db::models::*;
use crate::db::networks::NewNetwork;
use crate::db::schedules::NewSchedule;
use crate::db::{customers, devices, networks};
use crate::error::ApiError;
use crate::jobs_engine;
use crate::state::AppState;

fn location(path: impl std::fmt::Display) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&path.to_string()) {
        headers.insert(axum::http::header::LOCATION, v);
    }
    headers
}

// --- customers --------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCustomer {
    pub code: String,
    pub name: String,
}

pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCustomer>,
) -> Result<Response, ApiError> {
    let customer = customers::create(&state.db, &body.code, &body.name).await?;
    Ok((StatusCode::CREATED, Json(customer)).into_response())
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    Ok(Json(customers::get(&state.db, &id).await?))
}

pub async fn list_customers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Customer>>, ApiError> {
    Ok(Json(customers::list(&state.db).await?))
}

// --- networks -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateNetwork {
    pub name: String,
    pub network_type: NetworkType,
    pub cidr: String,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub vlan_id: Option<i64>,
}

pub async fn create_network(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Json(body): Json<CreateNetwork>,
) -> Result<Response, ApiError> {
    let network = networks::create(
        &state.db,
        &customer_id,
        NewNetwork {
            name: body.name,
            network_type: body.network_type,
            cidr: body.cidr,
            gateway: body.gateway,
            vlan_id: body.vlan_id,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(network)).into_response())
}

pub async fn list_networks(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<Network>>, ApiError> {
    Ok(Json(networks::list_for_customer(&state.db, &customer_id).await?))
}

// --- credentials ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCredential {
    pub scope: CredentialScope,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub kind: CredentialKind,
    #[serde(default)]
    pub username: Option<String>,
    pub secret: String,
    #[serde(default)]
    pub fields: serde_json::Value,
    #[serde(default)]
    pub device_filter: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

pub async fn create_credential(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCredential>,
) -> Result<Response, ApiError> {
    let credential = crate::db::credentials::create(
        &state.db,
        &state.cipher,
        NewCredential {
            scope: body.scope,
            customer_id: body.customer_id,
            kind: body.kind,
            username: body.username,
            secret: zeroize::Zeroizing::new(body.secret.into_bytes()),
            fields: body.fields,
            device_filter: body.device_filter,
            is_default: body.is_default,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(credential)).into_response())
}

// --- agents -----------------------------------------------------------

pub async fn list_pending_agents(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(agents_db::list_pending(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct ApproveAgent {
    pub customer_id: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ApproveAgentResponse {
    #[serde(flatten)]
    pub agent: Agent,
    pub token: String,
}

pub async fn approve_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<ApproveAgent>,
) -> Result<Json<ApproveAgentResponse>, ApiError> {
    let token = crate::registry::approve(&state.db, &state.hub, &agent_id, &body.customer_id).await?;
    let agent = agents_db::get(&state.db, &agent_id).await?;
    Ok(Json(ApproveAgentResponse { agent, token }))
}

pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    crate::registry::reject(&state.db, &state.hub, &agent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, serde::Serialize)]
pub struct TestAgentResponse {
    pub ok: bool,
    pub latency_ms: u128,
}

pub async fn test_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<TestAgentResponse>, ApiError> {
    let latency = jobs_engine::ping_agent(&state, &agent_id).await?;
    Ok(Json(TestAgentResponse { ok: true, latency_ms: latency.as_millis() }))
}

// --- discovery / scans --------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateScan {
    pub customer: String,
    pub agent: String,
    #[serde(rename = "type")]
    pub scan_type: ScanType,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub scan_ports: Option<Vec<u16>>,
}

#[derive(Debug, serde::Serialize)]
pub struct CreateScanResponse {
    pub job_id: String,
}

pub async fn create_scan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateScan>,
) -> Result<Response, ApiError> {
    let job = jobs_engine::dispatch_scan(&state, &body.customer, &body.agent, body.cidr, body.scan_type, body.scan_ports)
        .await?;
    let headers = location(format!("/api/v1/jobs/{}", job.id));
    Ok((StatusCode::ACCEPTED, headers, Json(CreateScanResponse { job_id: job.id })).into_response())
}

// --- jobs --------------------------------------------------------------

pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Job>, ApiError> {
    Ok(Json(crate::db::jobs::get(&state.db, &id).await?))
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job = crate::db::jobs::get(&state.db, &id).await?;
    if job.status.is_terminal() {
        return Err(ApiError::conflict("job already finished"));
    }
    if !state.jobs.cancel(&id) {
        return Err(ApiError::not_found("job is not running"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- devices / backups ---------------------------------------------------

pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<Device>>, ApiError> {
    Ok(Json(devices::list_for_customer(&state.db, &customer_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BackupDevice {
    pub kind: BackupKind,
}

#[derive(Debug, serde::Serialize)]
pub struct BackupDeviceResponse {
    pub backup_id: String,
}

pub async fn backup_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(body): Json<BackupDevice>,
) -> Result<Response, ApiError> {
    let device = devices::get(&state.db, &device_id).await?;
    let agents = agents_db::list_for_customer(&state.db, &device.customer_id).await?;
    let agent = agents
        .iter()
        .find(|a| state.hub.is_online(&a.id))
        .ok_or_else(|| ApiError::new(netvigil_proto::ErrorKind::AgentOffline, "no online agent for this customer"))?;

    let (_job, run) = jobs_engine::dispatch_backup(&state, &device.customer_id, &device_id, &agent.id, body.kind).await?;
    let headers = location(format!("/api/v1/backups/{}", run.id));
    Ok((StatusCode::ACCEPTED, headers, Json(BackupDeviceResponse { backup_id: run.id })).into_response())
}

pub async fn get_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BackupRun>, ApiError> {
    Ok(Json(crate::db::backups::get(&state.db, &id).await?))
}

pub async fn get_backup_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    // An unknown `id` is a 404 (the row itself never existed); a known run
    // whose artifact has since been swept by retention is a distinct 410 —
    // the BackupRun row still exists, only its bytes are gone (§4.7, §8).
    let run = crate::db::backups::get(&state.db, &id).await?;
    let Some(path) = run.file_path else {
        return Err(ApiError::new(netvigil_proto::ErrorKind::ArtifactPurged, "backup artifact purged"));
    };
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::new(netvigil_proto::ErrorKind::ArtifactPurged, "backup artifact purged"))?;
    Ok((StatusCode::OK, Bytes::from(bytes)).into_response())
}

// --- backup schedules -----------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateSchedule {
    pub customer_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub cadence: Cadence,
    pub at: String,
    #[serde(default)]
    pub days: Option<serde_json::Value>,
    #[serde(default)]
    pub day_of_month: Option<i64>,
    #[serde(default)]
    pub cron: Option<String>,
    pub kinds: Vec<BackupKind>,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_retention_count")]
    pub retention_count: i64,
    #[serde(default = "default_retention_strategy")]
    pub retention_strategy: RetentionStrategy,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    90
}

fn default_retention_count() -> i64 {
    10
}

fn default_retention_strategy() -> RetentionStrategy {
    RetentionStrategy::Both
}

pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSchedule>,
) -> Result<Response, ApiError> {
    if body.cadence == Cadence::Cron && body.cron.is_none() {
        return Err(ApiError::validation("cadence=cron requires a cron expression"));
    }
    if body.cadence == Cadence::Weekly && body.days.is_none() {
        return Err(ApiError::validation("cadence=weekly requires days"));
    }
    if body.cadence == Cadence::Monthly && body.day_of_month.is_none() {
        return Err(ApiError::validation("cadence=monthly requires day_of_month"));
    }
    if body.kinds.is_empty() {
        return Err(ApiError::validation("kinds must not be empty"));
    }

    let schedule = crate::db::schedules::upsert(
        &state.db,
        NewSchedule {
            customer_id: body.customer_id,
            enabled: body.enabled,
            cadence: body.cadence,
            at: body.at,
            days: body.days,
            day_of_month: body.day_of_month,
            cron: body.cron,
            kinds: serde_json::to_value(&body.kinds).unwrap_or_default(),
            retention_days: body.retention_days,
            retention_count: body.retention_count,
            retention_strategy: body.retention_strategy,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(schedule)).into_response())
}

// --- commands -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RunCommand {
    pub device: String,
    pub commands: Vec<String>,
    #[serde(default)]
    pub backup_before: bool,
}

pub async fn run_command(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunCommand>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let device = devices::get(&state.db, &body.device).await?;
    let agents = agents_db::list_for_customer(&state.db, &device.customer_id).await?;
    let agent = agents
        .iter()
        .find(|a| state.hub.is_online(&a.id))
        .ok_or_else(|| ApiError::new(netvigil_proto::ErrorKind::AgentOffline, "no online agent for this customer"))?;

    let result = jobs_engine::dispatch_command(
        &state,
        &device.customer_id,
        &body.device,
        &agent.id,
        body.commands,
        body.backup_before,
    )
    .await?;
    Ok(Json(result))
}
