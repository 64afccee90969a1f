// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;
use netvigil_crypto::CredentialCipher;
use zeroize::Zeroizing;

use super::models::{new_id, Credential, CredentialKind, CredentialScope};
use super::Db;
use crate::error::ApiError;

pub struct NewCredential {
    pub scope: CredentialScope,
    pub customer_id: Option<String>,
    pub kind: CredentialKind,
    pub username: Option<String>,
    pub secret: Zeroizing<Vec<u8>>,
    pub fields: serde_json::Value,
    pub device_filter: Option<String>,
    pub is_default: bool,
}

/// A view of a Credential with the secret redacted (§3: "REST responses
/// carry redacted views").
#[derive(Debug, Clone, serde::Serialize)]
pub struct RedactedCredential {
    pub id: String,
    pub scope: CredentialScope,
    pub customer_id: Option<String>,
    pub kind: CredentialKind,
    pub username: Option<String>,
    pub fields: serde_json::Value,
    pub device_filter: Option<String>,
    pub is_default: bool,
    pub active: bool,
}

impl From<Credential> for RedactedCredential {
    fn from(c: Credential) -> Self {
        Self {
            id: c.id,
            scope: c.scope,
            customer_id: c.customer_id,
            kind: c.kind,
            username: c.username,
            fields: c.fields,
            device_filter: c.device_filter,
            is_default: c.is_default,
            active: c.active,
        }
    }
}

pub async fn create(
    db: &Db,
    cipher: &CredentialCipher,
    new: NewCredential,
) -> Result<RedactedCredential, ApiError> {
    if new.scope == CredentialScope::Customer && new.customer_id.is_none() {
        return Err(ApiError::validation("customer-scoped credential requires customer_id"));
    }

    let secret_ciphertext = cipher.encrypt(&new.secret)?;

    let credential = Credential {
        id: new_id(),
        scope: new.scope,
        customer_id: new.customer_id,
        kind: new.kind,
        username: new.username,
        secret_ciphertext,
        fields: new.fields,
        device_filter: new.device_filter,
        is_default: new.is_default,
        active: true,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO credentials
            (id, scope, customer_id, kind, username, secret_ciphertext, fields, device_filter, is_default, active, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&credential.id)
    .bind(credential.scope)
    .bind(&credential.customer_id)
    .bind(credential.kind)
    .bind(&credential.username)
    .bind(&credential.secret_ciphertext)
    .bind(&credential.fields)
    .bind(&credential.device_filter)
    .bind(credential.is_default)
    .bind(credential.active)
    .bind(credential.created_at)
    .execute(&db.pool)
    .await?;

    Ok(credential.into())
}

/// Resolve the best-matching active credential for a device, preferring a
/// customer-scoped, non-default, filter-matching row over a global default.
/// Used by the backup/command dispatch path (C5) to fill `credentials_ref`.
pub async fn resolve_for_device(
    db: &Db,
    customer_id: &str,
    kind: CredentialKind,
) -> Result<Credential, ApiError> {
    sqlx::query_as::<_, Credential>(
        "SELECT * FROM credentials
         WHERE kind = ? AND active = 1 AND (customer_id = ? OR scope = 'global')
         ORDER BY (customer_id = ?) DESC, is_default DESC
         LIMIT 1",
    )
    .bind(kind)
    .bind(customer_id)
    .bind(customer_id)
    .fetch_optional(&db.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("no matching credential for device"))
}

/// Decrypt a credential's secret. Callers must drop the result as soon as
/// it has been used; it zeroizes on drop.
pub async fn decrypt_secret(
    cipher: &CredentialCipher,
    credential: &Credential,
) -> Result<Zeroizing<Vec<u8>>, ApiError> {
    Ok(cipher.decrypt(&credential.secret_ciphertext)?)
}
