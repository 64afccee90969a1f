// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

use super::models::{BackupSchedule, Cadence, RetentionStrategy};
use super::Db;
use crate::error::ApiError;

pub struct NewSchedule {
    pub customer_id: String,
    pub enabled: bool,
    pub cadence: Cadence,
    pub at: String,
    pub days: Option<serde_json::Value>,
    pub day_of_month: Option<i64>,
    pub cron: Option<String>,
    pub kinds: serde_json::Value,
    pub retention_days: i64,
    pub retention_count: i64,
    pub retention_strategy: RetentionStrategy,
}

/// At most one schedule per customer (§3); re-creating replaces it.
pub async fn upsert(db: &Db, new: NewSchedule) -> Result<BackupSchedule, ApiError> {
    sqlx::query(
        "INSERT INTO backup_schedules
            (customer_id, enabled, cadence, at, days, day_of_month, cron, kinds, retention_days, retention_count, retention_strategy, next_fire_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
         ON CONFLICT(customer_id) DO UPDATE SET
            enabled = excluded.enabled, cadence = excluded.cadence, at = excluded.at, days = excluded.days,
            day_of_month = excluded.day_of_month, cron = excluded.cron, kinds = excluded.kinds,
            retention_days = excluded.retention_days, retention_count = excluded.retention_count,
            retention_strategy = excluded.retention_strategy, next_fire_at = NULL",
    )
    .bind(&new.customer_id)
    .bind(new.enabled)
    .bind(new.cadence)
    .bind(&new.at)
    .bind(&new.days)
    .bind(new.day_of_month)
    .bind(&new.cron)
    .bind(&new.kinds)
    .bind(new.retention_days)
    .bind(new.retention_count)
    .bind(new.retention_strategy)
    .execute(&db.pool)
    .await?;

    get(db, &new.customer_id).await
}

pub async fn get(db: &Db, customer_id: &str) -> Result<BackupSchedule, ApiError> {
    sqlx::query_as::<_, BackupSchedule>("SELECT * FROM backup_schedules WHERE customer_id = ?")
        .bind(customer_id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("schedule not found"))
}

pub async fn list_enabled(db: &Db) -> Result<Vec<BackupSchedule>, ApiError> {
    Ok(sqlx::query_as::<_, BackupSchedule>("SELECT * FROM backup_schedules WHERE enabled = 1").fetch_all(&db.pool).await?)
}

pub async fn set_next_fire_at(db: &Db, customer_id: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
    sqlx::query("UPDATE backup_schedules SET next_fire_at = ? WHERE customer_id = ?")
        .bind(at)
        .bind(customer_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}
