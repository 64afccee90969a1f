// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;
use netvigil_crypto::TokenHash;

use super::models::{Agent, AgentKind, AgentStatus};
use super::Db;
use crate::error::ApiError;

pub async fn get(db: &Db, id: &str) -> Result<Agent, ApiError> {
    sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("agent not found"))
}

pub async fn try_get(db: &Db, id: &str) -> Result<Option<Agent>, ApiError> {
    Ok(sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = ?").bind(id).fetch_optional(&db.pool).await?)
}

pub async fn list_pending(db: &Db) -> Result<Vec<Agent>, ApiError> {
    Ok(sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE status = 'pending' ORDER BY created_at")
        .fetch_all(&db.pool)
        .await?)
}

/// Agents bound to `customer_id` that have completed approval, used to
/// resolve a Job's target set (§4.5) when an operator call does not name a
/// single agent (e.g. a schedule-fired backup wave).
pub async fn list_for_customer(db: &Db, customer_id: &str) -> Result<Vec<Agent>, ApiError> {
    Ok(sqlx::query_as::<_, Agent>(
        "SELECT * FROM agents WHERE customer_id = ? AND status IN ('approved', 'online', 'offline') ORDER BY created_at",
    )
    .bind(customer_id)
    .fetch_all(&db.pool)
    .await?)
}

/// Create the `pending` row for an agent claiming `agent_id` on first `hello`
/// (§4.4). The asserted id is the primary key; re-enrollment after a
/// `DELETE` produces a fresh row because the old one no longer exists.
pub async fn enroll(
    db: &Db,
    agent_id: &str,
    display_name: &str,
    kind: AgentKind,
    address: &str,
    port: i64,
    token_hash: &TokenHash,
    capabilities: &serde_json::Value,
) -> Result<Agent, ApiError> {
    let agent = Agent {
        id: agent_id.to_owned(),
        display_name: display_name.to_owned(),
        kind,
        address: address.to_owned(),
        port,
        token_hash: token_hash.hash.clone(),
        token_salt: token_hash.salt.clone(),
        token_iterations: token_hash.iterations as i64,
        status: AgentStatus::Pending,
        customer_id: None,
        last_seen_at: None,
        capabilities: capabilities.clone(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO agents
            (id, display_name, kind, address, port, token_hash, token_salt, token_iterations, status, customer_id, last_seen_at, capabilities, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&agent.id)
    .bind(&agent.display_name)
    .bind(agent.kind)
    .bind(&agent.address)
    .bind(agent.port)
    .bind(&agent.token_hash)
    .bind(&agent.token_salt)
    .bind(agent.token_iterations)
    .bind(agent.status)
    .bind(&agent.customer_id)
    .bind(agent.last_seen_at)
    .bind(&agent.capabilities)
    .bind(agent.created_at)
    .execute(&db.pool)
    .await?;

    Ok(agent)
}

/// Approve a pending agent: bind it to `customer_id`, flip status, and
/// persist the rotated token hash (§4.4). Returns the updated row.
pub async fn approve(
    db: &Db,
    agent_id: &str,
    customer_id: &str,
    new_token_hash: &TokenHash,
) -> Result<Agent, ApiError> {
    let agent = get(db, agent_id).await?;
    if agent.status != AgentStatus::Pending {
        return Err(ApiError::conflict("agent is not pending"));
    }

    sqlx::query(
        "UPDATE agents SET status = 'approved', customer_id = ?, token_hash = ?, token_salt = ?, token_iterations = ?
         WHERE id = ?",
    )
    .bind(customer_id)
    .bind(&new_token_hash.hash)
    .bind(&new_token_hash.salt)
    .bind(new_token_hash.iterations as i64)
    .bind(agent_id)
    .execute(&db.pool)
    .await?;

    get(db, agent_id).await
}

pub async fn reject(db: &Db, agent_id: &str) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM agents WHERE id = ?").bind(agent_id).execute(&db.pool).await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("agent not found"));
    }
    Ok(())
}

/// Flips a non-pending agent `online` and stamps `last_seen_at`. A `pending`
/// agent has no `customer_id` yet, so promoting it to `online` would violate
/// invariant (i) (§3, §8) and drop it out of `GET /agents/pending`; callers
/// reconnecting a still-pending agent should use [`touch_heartbeat`] instead.
pub async fn mark_online(db: &Db, agent_id: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE agents SET status = 'online', last_seen_at = ? WHERE id = ? AND status != 'pending'")
        .bind(Utc::now())
        .bind(agent_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

pub async fn touch_heartbeat(db: &Db, agent_id: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE agents SET last_seen_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(agent_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

pub async fn mark_offline(db: &Db, agent_id: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE agents SET status = 'offline' WHERE id = ? AND status != 'pending'")
        .bind(agent_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}
