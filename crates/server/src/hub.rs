// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub (C3): process-wide registry mapping `agent_id -> live Session`,
//! routing operator RPCs to agents with timeout, cancellation and per-agent
//! concurrency limits. Grounded on the teacher's `state.rs` `MuxState.sessions`
//! map plus `upstream/bridge.rs`'s correlation-table pattern.

use std::sync::Arc;

use dashmap::DashMap;
use netvigil_proto::{Envelope, ErrorKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::session::AgentSession;

pub struct Hub {
    sessions: DashMap<String, Arc<AgentSession>>,
}

impl Hub {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Atomic insert; if a session for this `agent_id` is already
    /// registered, the older one is closed first so a restarted agent is
    /// never locked out by a stale half-open connection (§4.3 `Register`).
    pub fn register(&self, session: Arc<AgentSession>) {
        if let Some(old) = self.sessions.insert(session.agent_id.clone(), Arc::clone(&session)) {
            if old.session_id != session.session_id {
                tracing::info!(agent_id = %old.agent_id, "replacing stale session with newly connected one");
                old.close("replaced_by_newer_session");
            }
        }
    }

    /// Removes only if the currently registered session's identity matches
    /// `session_id`, so a dying session can never unregister its replacement
    /// (§4.3 `Unregister`).
    pub fn unregister(&self, agent_id: &str, session_id: uuid::Uuid) {
        self.sessions.remove_if(agent_id, |_, s| s.session_id == session_id);
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.get(agent_id).map(|s| Arc::clone(&s))
    }

    pub fn is_online(&self, agent_id: &str) -> bool {
        self.sessions.contains_key(agent_id)
    }

    /// Synchronous RPC (§4.3 `Call`).
    pub async fn call(
        &self,
        agent_id: &str,
        method: &str,
        payload: serde_json::Value,
        timeout: std::time::Duration,
        ctx: CancellationToken,
    ) -> Result<Envelope, ApiError> {
        let session = self.get(agent_id).ok_or_else(|| {
            ApiError::new(ErrorKind::AgentOffline, format!("agent {agent_id} has no live session"))
        })?;
        session.call(method, payload, timeout, ctx, None).await
    }

    /// Streaming RPC (§4.3 `Stream`): returns a channel of `rpc.progress`
    /// frames and a handle resolving to the terminal response.
    pub fn stream(
        &self,
        agent_id: &str,
        method: &str,
        payload: serde_json::Value,
        timeout: std::time::Duration,
        ctx: CancellationToken,
    ) -> Result<(mpsc::UnboundedReceiver<Envelope>, tokio::task::JoinHandle<Result<Envelope, ApiError>>), ApiError>
    {
        let session = self.get(agent_id).ok_or_else(|| {
            ApiError::new(ErrorKind::AgentOffline, format!("agent {agent_id} has no live session"))
        })?;
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let method = method.to_owned();
        let handle = tokio::spawn(async move { session.call(&method, payload, timeout, ctx, Some(progress_tx)).await });
        Ok((progress_rx, handle))
    }

    /// Fire-and-forget event to every session matching `predicate`
    /// (§4.3 `Broadcast`); no delivery guarantee beyond best-effort write.
    pub fn broadcast(&self, predicate: impl Fn(&str) -> bool, event_name: &str, payload: serde_json::Value) {
        for entry in self.sessions.iter() {
            if predicate(entry.key()) {
                entry.value().send_event(event_name, payload.clone());
            }
        }
    }

    pub fn online_agent_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
