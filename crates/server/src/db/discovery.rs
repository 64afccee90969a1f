// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;

use super::models::{new_id, DiscoverySession, DiscoveryStatus, ScanType};
use super::Db;
use crate::error::ApiError;

pub async fn create(
    db: &Db,
    customer_id: &str,
    agent_id: &str,
    network_cidr: Option<&str>,
    scan_type: ScanType,
) -> Result<DiscoverySession, ApiError> {
    let session = DiscoverySession {
        id: new_id(),
        customer_id: customer_id.to_owned(),
        agent_id: agent_id.to_owned(),
        network_cidr: network_cidr.map(str::to_owned),
        scan_type,
        status: DiscoveryStatus::Pending,
        started_at: Utc::now(),
        finished_at: None,
        found_count: 0,
    };

    sqlx::query(
        "INSERT INTO discovery_sessions (id, customer_id, agent_id, network_cidr, scan_type, status, started_at, finished_at, found_count)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&session.id)
    .bind(&session.customer_id)
    .bind(&session.agent_id)
    .bind(&session.network_cidr)
    .bind(session.scan_type)
    .bind(session.status)
    .bind(session.started_at)
    .bind(session.finished_at)
    .bind(session.found_count)
    .execute(&db.pool)
    .await?;

    Ok(session)
}

pub async fn mark_running(db: &Db, id: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE discovery_sessions SET status = 'running' WHERE id = ?").bind(id).execute(&db.pool).await?;
    Ok(())
}

/// Finish a session, setting `found_count` and a terminal status (§8: a
/// scan with 0 devices still completes with `found_count=0`).
pub async fn finish(
    db: &Db,
    id: &str,
    status: DiscoveryStatus,
    found_count: i64,
) -> Result<(), ApiError> {
    sqlx::query("UPDATE discovery_sessions SET status = ?, finished_at = ?, found_count = ? WHERE id = ?")
        .bind(status)
        .bind(Utc::now())
        .bind(found_count)
        .bind(id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

pub async fn get(db: &Db, id: &str) -> Result<DiscoverySession, ApiError> {
    sqlx::query_as::<_, DiscoverySession>("SELECT * FROM discovery_sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("discovery session not found"))
}
