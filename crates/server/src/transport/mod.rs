// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the operator control plane (C9).

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse { status: "ok" })
}

/// Build the axum `Router` serving every REST endpoint in SPEC_FULL.md §6
/// plus the agent-facing WebSocket upgrade.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/customers", post(http::create_customer).get(http::list_customers))
        .route("/api/v1/customers/{id}", get(http::get_customer))
        .route(
            "/api/v1/customers/{id}/networks",
            post(http::create_network).get(http::list_networks),
        )
        .route("/api/v1/customers/{id}/devices", get(http::list_devices))
        .route("/api/v1/credentials", post(http::create_credential))
        .route("/api/v1/agents/pending", get(http::list_pending_agents))
        .route("/api/v1/agents/{id}/approve", post(http::approve_agent))
        .route("/api/v1/agents/{id}", delete(http::delete_agent))
        .route("/api/v1/agents/{id}/test", post(http::test_agent))
        .route("/api/v1/agents/ws/{agent_id}", get(ws::ws_handler))
        .route("/api/v1/discovery/scans", post(http::create_scan))
        .route("/api/v1/jobs/{id}", get(http::get_job).delete(http::delete_job))
        .route("/api/v1/devices/{id}/backup", post(http::backup_device))
        .route("/api/v1/backups/{id}", get(http::get_backup))
        .route("/api/v1/backups/{id}/artifact", get(http::get_backup_artifact))
        .route("/api/v1/backups/schedules", post(http::create_schedule))
        .route("/api/v1/commands", post(http::run_command))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
