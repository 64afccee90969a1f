// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

use super::models::{new_id, BackupKind, BackupRun, BackupStatus, TriggeredBy};
use super::Db;
use crate::error::ApiError;

pub async fn create_pending(
    db: &Db,
    customer_id: &str,
    device_id: &str,
    kind: BackupKind,
    agent_id: &str,
    triggered_by: TriggeredBy,
) -> Result<BackupRun, ApiError> {
    let run = BackupRun {
        id: new_id(),
        customer_id: customer_id.to_owned(),
        device_id: device_id.to_owned(),
        kind,
        status: BackupStatus::Running,
        file_path: None,
        size: None,
        checksum: None,
        agent_id: agent_id.to_owned(),
        triggered_by,
        started_at: Utc::now(),
        finished_at: None,
        error: None,
    };

    sqlx::query(
        "INSERT INTO backup_runs (id, customer_id, device_id, kind, status, file_path, size, checksum, agent_id, triggered_by, started_at, finished_at, error)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&run.id)
    .bind(&run.customer_id)
    .bind(&run.device_id)
    .bind(run.kind)
    .bind(run.status)
    .bind(&run.file_path)
    .bind(run.size)
    .bind(&run.checksum)
    .bind(&run.agent_id)
    .bind(run.triggered_by)
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(&run.error)
    .execute(&db.pool)
    .await?;

    Ok(run)
}

pub async fn complete_success(
    db: &Db,
    id: &str,
    file_path: &str,
    size: i64,
    checksum: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE backup_runs SET status = 'success', file_path = ?, size = ?, checksum = ?, finished_at = ? WHERE id = ?",
    )
    .bind(file_path)
    .bind(size)
    .bind(checksum)
    .bind(Utc::now())
    .bind(id)
    .execute(&db.pool)
    .await?;
    Ok(())
}

pub async fn complete_failed(db: &Db, id: &str, error: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE backup_runs SET status = 'failed', error = ?, finished_at = ? WHERE id = ?")
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

pub async fn get(db: &Db, id: &str) -> Result<BackupRun, ApiError> {
    sqlx::query_as::<_, BackupRun>("SELECT * FROM backup_runs WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("backup run not found"))
}

pub async fn is_running_for_device(db: &Db, device_id: &str) -> Result<bool, ApiError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT id FROM backup_runs WHERE device_id = ? AND status = 'running'")
            .bind(device_id)
            .fetch_optional(&db.pool)
            .await?;
    Ok(row.is_some())
}

/// Successful runs for a device, newest first — used by the retention sweep
/// (§4.7) to decide what may be deleted.
pub async fn successful_runs_for_device(db: &Db, device_id: &str) -> Result<Vec<BackupRun>, ApiError> {
    Ok(sqlx::query_as::<_, BackupRun>(
        "SELECT * FROM backup_runs WHERE device_id = ? AND status = 'success' ORDER BY finished_at DESC",
    )
    .bind(device_id)
    .fetch_all(&db.pool)
    .await?)
}

pub async fn delete_run(db: &Db, id: &str) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM backup_runs WHERE id = ?").bind(id).execute(&db.pool).await?;
    Ok(())
}

pub async fn all_customer_device_ids(db: &Db) -> Result<Vec<(String, String)>, ApiError> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT DISTINCT customer_id, device_id FROM backup_runs").fetch_all(&db.pool).await?;
    Ok(rows)
}

pub fn cutoff(retention_days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(retention_days)
}
