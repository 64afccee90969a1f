// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;

use super::models::{new_id, Device, DeviceSource};
use super::Db;
use crate::error::ApiError;

/// A single scan record as reported by an agent's `scan.complete` (§4.6),
/// prior to identity resolution and merge.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub address: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub platform: Option<String>,
    pub source: DeviceSource,
}

pub async fn find_by_identity(
    db: &Db,
    customer_id: &str,
    mac: Option<&str>,
    address: &str,
) -> Result<Option<Device>, ApiError> {
    let existing = if let Some(mac) = mac {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE customer_id = ? AND mac = ?")
            .bind(customer_id)
            .bind(mac)
            .fetch_optional(&db.pool)
            .await?
    } else {
        sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE customer_id = ? AND address = ? AND mac IS NULL",
        )
        .bind(customer_id)
        .bind(address)
        .fetch_optional(&db.pool)
        .await?
    };
    Ok(existing)
}

pub async fn insert(db: &Db, customer_id: &str, record: &ScanRecord) -> Result<Device, ApiError> {
    let device = Device {
        id: new_id(),
        customer_id: customer_id.to_owned(),
        address: record.address.clone(),
        mac: record.mac.clone(),
        hostname: record.hostname.clone(),
        vendor: record.vendor.clone(),
        platform: record.platform.clone(),
        role: None,
        monitored: true,
        last_seen_at: Utc::now(),
        source: record.source,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO devices (id, customer_id, address, mac, hostname, vendor, platform, role, monitored, last_seen_at, source, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&device.id)
    .bind(&device.customer_id)
    .bind(&device.address)
    .bind(&device.mac)
    .bind(&device.hostname)
    .bind(&device.vendor)
    .bind(&device.platform)
    .bind(&device.role)
    .bind(device.monitored)
    .bind(device.last_seen_at)
    .bind(device.source)
    .bind(device.created_at)
    .execute(&db.pool)
    .await?;

    Ok(device)
}

/// Outcome of merging a scan record into an existing Device.
pub struct MergeResult {
    pub device: Device,
    pub changed: bool,
}

/// Last-writer-wins merge of non-empty fields; `source` only moves up the
/// lattice (§4.6 step 2). Returns whether any persisted field besides
/// `last_seen_at` actually changed, so callers can decide whether to emit
/// `device_upserted`.
pub async fn merge(db: &Db, existing: &Device, record: &ScanRecord) -> Result<MergeResult, ApiError> {
    let mut changed = false;

    let address = if record.address != existing.address && !record.address.is_empty() {
        changed = true;
        record.address.clone()
    } else {
        existing.address.clone()
    };

    let hostname = merge_opt_string(&existing.hostname, &record.hostname, &mut changed);
    let vendor = merge_opt_string(&existing.vendor, &record.vendor, &mut changed);
    let platform = merge_opt_string(&existing.platform, &record.platform, &mut changed);

    let source = if record.source.rank() > existing.source.rank() {
        changed = true;
        record.source
    } else {
        existing.source
    };

    let now = Utc::now();

    sqlx::query(
        "UPDATE devices SET address = ?, hostname = ?, vendor = ?, platform = ?, source = ?, last_seen_at = ?
         WHERE id = ?",
    )
    .bind(&address)
    .bind(&hostname)
    .bind(&vendor)
    .bind(&platform)
    .bind(source)
    .bind(now)
    .bind(&existing.id)
    .execute(&db.pool)
    .await?;

    let device = Device {
        address,
        hostname,
        vendor,
        platform,
        source,
        last_seen_at: now,
        ..existing.clone()
    };

    Ok(MergeResult { device, changed })
}

fn merge_opt_string(existing: &Option<String>, incoming: &Option<String>, changed: &mut bool) -> Option<String> {
    match incoming {
        Some(v) if !v.is_empty() && existing.as_deref() != Some(v.as_str()) => {
            *changed = true;
            Some(v.clone())
        }
        _ => existing.clone(),
    }
}

pub async fn list_for_customer(db: &Db, customer_id: &str) -> Result<Vec<Device>, ApiError> {
    Ok(sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE customer_id = ? ORDER BY last_seen_at DESC")
        .bind(customer_id)
        .fetch_all(&db.pool)
        .await?)
}

pub async fn get(db: &Db, id: &str) -> Result<Device, ApiError> {
    sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("device not found"))
}
