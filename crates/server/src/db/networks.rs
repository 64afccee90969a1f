// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;

use super::models::{new_id, Network, NetworkType};
use super::Db;
use crate::error::ApiError;

pub struct NewNetwork {
    pub name: String,
    pub network_type: NetworkType,
    pub cidr: String,
    pub gateway: Option<String>,
    pub vlan_id: Option<i64>,
}

/// (cidr, vlan_id) must be unique within a customer (§3); overlap across
/// customers is allowed.
pub async fn create(db: &Db, customer_id: &str, new: NewNetwork) -> Result<Network, ApiError> {
    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM networks WHERE customer_id = ? AND cidr = ? AND vlan_id IS ?",
    )
    .bind(customer_id)
    .bind(&new.cidr)
    .bind(new.vlan_id)
    .fetch_optional(&db.pool)
    .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("network with this cidr/vlan already exists for customer"));
    }

    let network = Network {
        id: new_id(),
        customer_id: customer_id.to_owned(),
        name: new.name,
        network_type: new.network_type,
        cidr: new.cidr,
        gateway: new.gateway,
        vlan_id: new.vlan_id,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO networks (id, customer_id, name, network_type, cidr, gateway, vlan_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&network.id)
    .bind(&network.customer_id)
    .bind(&network.name)
    .bind(network.network_type)
    .bind(&network.cidr)
    .bind(&network.gateway)
    .bind(network.vlan_id)
    .bind(network.created_at)
    .execute(&db.pool)
    .await?;

    Ok(network)
}

pub async fn list_for_customer(db: &Db, customer_id: &str) -> Result<Vec<Network>, ApiError> {
    Ok(sqlx::query_as::<_, Network>("SELECT * FROM networks WHERE customer_id = ? ORDER BY created_at")
        .bind(customer_id)
        .fetch_all(&db.pool)
        .await?)
}
