// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;

use super::models::{new_id, Job, JobKind, JobStatus};
use super::Db;
use crate::error::ApiError;

pub async fn create(db: &Db, kind: JobKind, target_agents: &[String]) -> Result<Job, ApiError> {
    let job = Job {
        id: new_id(),
        kind,
        target_agents: serde_json::to_value(target_agents).unwrap_or_default(),
        status: JobStatus::Pending,
        devices_total: 0,
        devices_success: 0,
        devices_failed: 0,
        started_at: Utc::now(),
        finished_at: None,
    };

    sqlx::query(
        "INSERT INTO jobs (id, kind, target_agents, status, devices_total, devices_success, devices_failed, started_at, finished_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&job.id)
    .bind(job.kind)
    .bind(&job.target_agents)
    .bind(job.status)
    .bind(job.devices_total)
    .bind(job.devices_success)
    .bind(job.devices_failed)
    .bind(job.started_at)
    .bind(job.finished_at)
    .execute(&db.pool)
    .await?;

    Ok(job)
}

pub async fn get(db: &Db, id: &str) -> Result<Job, ApiError> {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("job not found"))
}

pub async fn set_status(db: &Db, id: &str, status: JobStatus) -> Result<(), ApiError> {
    sqlx::query("UPDATE jobs SET status = ? WHERE id = ?").bind(status).bind(id).execute(&db.pool).await?;
    Ok(())
}

pub async fn set_devices_total(db: &Db, id: &str, total: i64) -> Result<(), ApiError> {
    sqlx::query("UPDATE jobs SET devices_total = ? WHERE id = ?").bind(total).bind(id).execute(&db.pool).await?;
    Ok(())
}

pub async fn record_device_outcome(db: &Db, id: &str, success: bool) -> Result<(), ApiError> {
    let column = if success { "devices_success" } else { "devices_failed" };
    sqlx::query(&format!("UPDATE jobs SET {column} = {column} + 1 WHERE id = ?")).bind(id).execute(&db.pool).await?;
    Ok(())
}

pub async fn finish(db: &Db, id: &str, status: JobStatus) -> Result<(), ApiError> {
    sqlx::query("UPDATE jobs SET status = ?, finished_at = ? WHERE id = ?")
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .execute(&db.pool)
        .await?;
    Ok(())
}
