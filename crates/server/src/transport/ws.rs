// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-initiated WebSocket endpoint (§4.2, §6: `GET /api/v1/agents/ws/{agent_id}`).

use std::sync::{Arc, Mutex};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::db::agents as agents_db;
use crate::registry;
use crate::session;
use crate::state::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle(socket, state, agent_id))
}

async fn handle(socket: axum::extract::ws::WebSocket, state: Arc<AppState>, expected_agent_id: String) {
    let max_inflight = state.config.max_inflight;
    let hello_timeout = state.config.hello_timeout();
    let heartbeat_interval = state.config.heartbeat_interval();
    let liveness_timeout = state.config.liveness_timeout();

    let auth_state = Arc::clone(&state);
    let authenticate = move |hello, nonce, auth_payload| {
        let db = auth_state.db.clone();
        async move { registry::authenticate(&db, hello, nonce, auth_payload).await }
    };

    // Shared between `on_session` and `on_close` so a dying session only
    // unregisters itself from the Hub, never a newer session that replaced it.
    let session_id: Arc<Mutex<Option<Uuid>>> = Arc::new(Mutex::new(None));

    let register_state = Arc::clone(&state);
    let register_session_id = Arc::clone(&session_id);
    let on_session = move |sess: Arc<session::AgentSession>| {
        if sess.agent_id != expected_agent_id {
            tracing::warn!(
                path_agent_id = %expected_agent_id,
                hello_agent_id = %sess.agent_id,
                "agent claimed a different id in hello than the WS path"
            );
        }
        *register_session_id.lock().unwrap_or_else(|p| p.into_inner()) = Some(sess.session_id);
        register_state.hub.register(Arc::clone(&sess));
        let db = register_state.db.clone();
        let agent_id = sess.agent_id.clone();
        tokio::spawn(async move {
            let _ = agents_db::mark_online(&db, &agent_id).await;
        });
    };

    let close_state = Arc::clone(&state);
    let close_session_id = Arc::clone(&session_id);
    let on_close = move |agent_id: &str| {
        if let Some(id) = *close_session_id.lock().unwrap_or_else(|p| p.into_inner()) {
            close_state.hub.unregister(agent_id, id);
        }
        let db = close_state.db.clone();
        let agent_id = agent_id.to_owned();
        tokio::spawn(async move {
            let _ = agents_db::mark_offline(&db, &agent_id).await;
        });
    };

    session::run(socket, max_inflight, hello_timeout, heartbeat_interval, liveness_timeout, authenticate, on_session, on_close)
        .await;
}
