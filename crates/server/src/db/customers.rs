// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;

use super::models::{new_id, Customer};
use super::Db;
use crate::error::ApiError;

pub async fn create(db: &Db, code: &str, name: &str) -> Result<Customer, ApiError> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM customers WHERE code = ?").bind(code).fetch_optional(&db.pool).await?;
    if existing.is_some() {
        return Err(ApiError::conflict(format!("customer code {code} already exists")));
    }

    let customer = Customer { id: new_id(), code: code.to_owned(), name: name.to_owned(), active: true, created_at: Utc::now() };
    sqlx::query(
        "INSERT INTO customers (id, code, name, active, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&customer.id)
    .bind(&customer.code)
    .bind(&customer.name)
    .bind(customer.active)
    .bind(customer.created_at)
    .execute(&db.pool)
    .await?;

    Ok(customer)
}

pub async fn get(db: &Db, id: &str) -> Result<Customer, ApiError> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("customer not found"))
}

pub async fn list(db: &Db) -> Result<Vec<Customer>, ApiError> {
    Ok(sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY created_at").fetch_all(&db.pool).await?)
}

/// Soft-delete: a Customer is never hard-deleted while dependent rows exist (§3).
pub async fn deactivate(db: &Db, id: &str) -> Result<(), ApiError> {
    let result = sqlx::query("UPDATE customers SET active = 0 WHERE id = ?").bind(id).execute(&db.pool).await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("customer not found"));
    }
    Ok(())
}
