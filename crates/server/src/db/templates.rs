// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::models::BackupTemplate;
use super::Db;
use crate::error::ApiError;

/// Seed data (§3): per-vendor command list and parsing hints consulted by
/// the backup adapters on the agent side.
pub async fn get(db: &Db, vendor: &str) -> Result<BackupTemplate, ApiError> {
    sqlx::query_as::<_, BackupTemplate>("SELECT * FROM backup_templates WHERE vendor = ?")
        .bind(vendor)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no backup template for vendor {vendor}")))
}

pub async fn list(db: &Db) -> Result<Vec<BackupTemplate>, ApiError> {
    Ok(sqlx::query_as::<_, BackupTemplate>("SELECT * FROM backup_templates").fetch_all(&db.pool).await?)
}
