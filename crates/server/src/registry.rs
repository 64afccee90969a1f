// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry & lifecycle (C4): enrollment on first `hello`, approval,
//! token rotation with a reconnect grace period, and the heartbeat/offline
//! transitions driven by the Hub. Grounded on the teacher's
//! `crates/cli/src/broker/registry.rs` `PodRegistry` pending/approved shape
//! and `upstream/health.rs`'s eviction loop.

use std::sync::Arc;
use std::time::Duration;

use netvigil_crypto::{hash_token, verify_token, CredentialCipher};
use netvigil_proto::{Envelope, ErrorKind, MessageType};
use serde::Deserialize;

use crate::db::models::{AgentKind, AgentStatus};
use crate::db::{agents as agents_db, Db};
use crate::error::ApiError;
use crate::hub::Hub;

#[derive(Debug, Deserialize)]
pub struct HelloPayload {
    pub agent_id: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    /// The bearer token itself (see DESIGN.md: `verify_token` against the
    /// stored salted hash stands in for the HMAC-over-nonce scheme, since a
    /// one-way hash cannot serve as an HMAC key). Transport confidentiality
    /// is provided by the WSS/TLS layer, not by this field.
    pub token: String,
}

/// Resolve (enroll if unknown, else verify) an agent's identity from its
/// `hello`/`auth` pair. Returns `(agent_id, approved)` on success.
pub async fn authenticate(
    db: &Db,
    hello: Envelope,
    _nonce: String,
    auth_payload: serde_json::Value,
) -> Result<(String, bool), ApiError> {
    let hello: HelloPayload = serde_json::from_value(hello.payload)
        .map_err(|e| ApiError::validation(format!("malformed hello: {e}")))?;
    let auth: AuthPayload = serde_json::from_value(auth_payload)
        .map_err(|e| ApiError::validation(format!("malformed auth: {e}")))?;

    match agents_db::try_get(db, &hello.agent_id).await? {
        None => {
            // Trust-on-first-connect (§4.4): whatever token the agent
            // presents on its first `hello`/`auth` pair becomes the
            // credential the server hashes and verifies against from then on.
            let token_hash = hash_token(&auth.token);
            let capabilities = serde_json::to_value(&hello.capabilities).unwrap_or_default();
            let agent = agents_db::enroll(
                db,
                &hello.agent_id,
                &hello.agent_id,
                hello.kind,
                &hello.address,
                hello.port as i64,
                &token_hash,
                &capabilities,
            )
            .await?;
            tracing::info!(agent_id = %agent.id, "enrolled new pending agent");
            Ok((agent.id, false))
        }
        Some(agent) => {
            let stored = netvigil_crypto::TokenHash {
                salt: agent.token_salt.clone(),
                hash: agent.token_hash.clone(),
                iterations: agent.token_iterations as u32,
            };
            verify_token(&auth.token, &stored)
                .map_err(|_| ApiError::new(ErrorKind::Internal, "token verification failed"))?;
            // A still-pending agent has no customer yet (invariant (i), §3):
            // only stamp its heartbeat, never promote it to `online` before
            // it has been approved.
            if agent.status == AgentStatus::Pending {
                agents_db::touch_heartbeat(db, &agent.id).await?;
            } else {
                agents_db::mark_online(db, &agent.id).await?;
            }
            Ok((agent.id, agent.status != AgentStatus::Pending))
        }
    }
}

/// Operator action (§4.4): bind a pending agent to a customer, rotate its
/// token, and push the new token over the live session. The agent must
/// reconnect with the rotated token within `rotation_grace` or it is forced
/// offline by [`enforce_rotation_grace`].
pub async fn approve(db: &Db, hub: &Hub, agent_id: &str, customer_id: &str) -> Result<String, ApiError> {
    let plaintext_token = netvigil_crypto::generate_token();
    let new_hash = hash_token(&plaintext_token);
    agents_db::approve(db, agent_id, customer_id, &new_hash).await?;

    if let Some(session) = hub.get(agent_id) {
        let env = Envelope::new(MessageType::Config, uuid::Uuid::new_v4().to_string())
            .with_payload(serde_json::json!({ "token_rotation": { "token": plaintext_token } }));
        session.send_event("token_rotation", env.payload.clone());
    }

    Ok(plaintext_token)
}

pub async fn reject(db: &Db, hub: &Hub, agent_id: &str) -> Result<(), ApiError> {
    agents_db::reject(db, agent_id).await?;
    if let Some(session) = hub.get(agent_id) {
        session.close("rejected");
    }
    Ok(())
}

/// Spawn the background sweep that forces an approved-but-not-yet-reconnected
/// agent offline once `rotation_grace` elapses without a new session.
pub fn spawn_rotation_grace_watchdog(db: Arc<Db>, hub: Arc<Hub>, grace: Duration, shutdown: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5).min(grace));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Ok(pending_like) = sqlx::query_as::<_, crate::db::models::Agent>(
                "SELECT * FROM agents WHERE status = 'approved'",
            )
            .fetch_all(&db.pool)
            .await
            {
                for agent in pending_like {
                    if hub.is_online(&agent.id) {
                        continue;
                    }
                    let stale = agent
                        .last_seen_at
                        .map(|t| chrono::Utc::now() - t > chrono::Duration::from_std(grace).unwrap_or_default())
                        .unwrap_or(true);
                    if stale {
                        let _ = agents_db::mark_offline(&db, &agent.id).await;
                    }
                }
            }
        }
    });
}
