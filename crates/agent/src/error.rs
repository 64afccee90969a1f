// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-side error type. Every handler returns `Result<_, AgentError>`; the
//! dispatcher turns an `Err` into an `rpc.error` frame carrying the same
//! `{error, message, details?}` shape the server's `ApiError` produces
//! (SPEC_FULL.md §7: "Agents see `rpc.error` with the same shape").

use netvigil_proto::ErrorKind;

#[derive(Debug, Clone)]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn vendor_protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::VendorProtocol, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.kind, "message": self.message })
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AgentError {}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        Self::vendor_protocol(e.to_string())
    }
}

impl From<russh::Error> for AgentError {
    fn from(e: russh::Error) -> Self {
        Self::vendor_protocol(e.to_string())
    }
}
