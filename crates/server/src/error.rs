// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use netvigil_proto::{ErrorBody, ErrorKind};

/// Server-side error, categorical per SPEC_FULL.md §7. Every layer wraps
/// lower-level failures into one of these; the REST layer is the only place
/// that turns a kind into an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.kind, self.message.clone())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Never let a decrypt failure, timeout cause, or internal detail leak
        // credential/token material; those kinds get a fixed, generic message.
        let body = match self.kind {
            ErrorKind::CredentialDecrypt => {
                ErrorBody::new(self.kind, "credential could not be decrypted")
            }
            ErrorKind::Internal => ErrorBody::new(self.kind, "internal error"),
            _ => self.to_body(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::not_found("row not found"),
            other => {
                tracing::error!(err = %other, "database error");
                ApiError::internal("database error")
            }
        }
    }
}

impl From<netvigil_crypto::CryptoError> for ApiError {
    fn from(e: netvigil_crypto::CryptoError) -> Self {
        tracing::warn!(err = %e, "credential decryption failed");
        ApiError::new(ErrorKind::CredentialDecrypt, "credential could not be decrypted")
    }
}
