// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

/// Categorical error kinds shared by the REST surface and the `rpc.error`
/// wire frame, per SPEC_FULL.md §7. Kept as a single enum so the server's
/// HTTP mapping and the agent's RPC error replies can never disagree on
/// what a kind is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PreconditionFailed,
    AgentOffline,
    AgentNotApproved,
    Timeout,
    Cancelled,
    PreChangeBackupFailed,
    VendorProtocol,
    CredentialDecrypt,
    TransportClosed,
    ReplacedByNewerSession,
    ArtifactPurged,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind maps to on the REST surface (SPEC_FULL.md §6).
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PreconditionFailed | Self::PreChangeBackupFailed => 412,
            Self::AgentOffline => 503,
            Self::AgentNotApproved => 409,
            Self::Timeout => 504,
            Self::Cancelled => 499,
            Self::VendorProtocol => 502,
            Self::CredentialDecrypt => 500,
            Self::TransportClosed => 503,
            Self::ReplacedByNewerSession => 409,
            Self::ArtifactPurged => 410,
            Self::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PreconditionFailed => "precondition_failed",
            Self::AgentOffline => "agent_offline",
            Self::AgentNotApproved => "agent_not_approved",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::PreChangeBackupFailed => "pre_change_backup_failed",
            Self::VendorProtocol => "vendor_protocol",
            Self::CredentialDecrypt => "credential_decrypt",
            Self::TransportClosed => "transport_closed",
            Self::ReplacedByNewerSession => "replaced_by_newer_session",
            Self::ArtifactPurged => "artifact_purged",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{error, message, details?}` body, used verbatim by both the REST surface
/// and `rpc.error` payloads (SPEC_FULL.md §7: "Agents see `rpc.error` with
/// the same shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self { error, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Errors the codec itself can raise while decoding a frame, before any
/// `ErrorKind`-level classification is possible.
#[derive(Debug)]
pub enum CodecError {
    TooLarge { size: usize, max: usize },
    Malformed(serde_json::Error),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge { size, max } => write!(f, "frame of {size} bytes exceeds max {max}"),
            Self::Malformed(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            Self::TooLarge { .. } => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e)
    }
}
