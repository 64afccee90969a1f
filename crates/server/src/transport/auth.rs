// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use netvigil_proto::{ErrorBody, ErrorKind};

use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers against the configured
/// operator API key. `None` disables auth (development only).
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorBody> {
    let Some(expected) = expected else { return Ok(()) };

    let unauthorized = || ErrorBody::new(ErrorKind::Validation, "missing or invalid Authorization header");

    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or_else(unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

/// Axum middleware enforcing the operator API key on every REST call.
/// Exempt: `/api/v1/agents/ws/{agent_id}` (the agent-facing WebSocket
/// endpoint authenticates agents via its own `hello`/`auth` handshake, not
/// the operator bearer token).
pub async fn auth_layer(state: State<Arc<AppState>>, req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path();

    if path.starts_with("/api/v1/agents/ws/") {
        return next.run(req).await;
    }

    if let Err(body) = validate_bearer(req.headers(), state.config.api_key.as_deref()) {
        return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    }

    next.run(req).await
}
