// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handle for writing frames onto the one live connection. A
//! WebSocket has exactly one writer (SPEC_FULL.md §4.2), so every task that
//! wants to speak — the liveness ticker, the dispatcher, a scan handler
//! emitting progress — goes through this queue instead of touching the
//! socket directly.

use netvigil_proto::{Envelope, MessageType};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    pub fn next_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn send(&self, env: &Envelope) {
        if let Ok(text) = serde_json::to_string(env) {
            let _ = self.tx.send(Message::Text(text.into()));
        }
    }

    /// Same as [`Self::send`] but takes ownership, for callers (e.g. the
    /// reader task answering a `ping`) that build a one-off envelope inline.
    pub fn send_raw(&self, env: Envelope) {
        self.send(&env);
    }

    /// One `rpc.progress` frame correlated to `request_id` (§4.1, §4.5: per
    /// device outcome during a scan or batch backup).
    pub fn progress(&self, request_id: &str, payload: serde_json::Value) {
        let env = Envelope::new(MessageType::RpcProgress, Self::next_id())
            .with_correlation(request_id)
            .with_payload(payload);
        self.send(&env);
    }

    pub fn response(&self, request_id: &str, payload: serde_json::Value) {
        let env = Envelope::new(MessageType::RpcResponse, Self::next_id())
            .with_correlation(request_id)
            .with_payload(payload);
        self.send(&env);
    }

    pub fn error(&self, request_id: &str, error: &crate::error::AgentError) {
        let env = Envelope::new(MessageType::RpcError, Self::next_id())
            .with_correlation(request_id)
            .with_payload(error.to_payload());
        self.send(&env);
    }
}

/// Handed to a scan/backup handler so it can stream progress without
/// reaching into the connection internals directly.
#[derive(Clone)]
pub struct ProgressSink {
    outbound: Outbound,
    request_id: String,
}

impl ProgressSink {
    pub fn new(outbound: Outbound, request_id: String) -> Self {
        Self { outbound, request_id }
    }

    pub fn emit(&self, payload: serde_json::Value) {
        self.outbound.progress(&self.request_id, payload);
    }
}
