// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery ingest (C6): normalize and deduplicate `agent.scan` results and
//! merge them into a customer's inventory in one transaction per scan (§4.6).
//! Grounded on the teacher's `events.rs` cache-merge pattern
//! (`cache.write().await.entry(...).or_default()....= Some(...)`), generalized
//! from a single cached field to the full Device merge.

use serde::Deserialize;

use crate::db::devices::{self, ScanRecord};
use crate::db::models::{Device, DeviceSource};
use crate::db::Db;
use crate::error::ApiError;

/// One device record as reported in an `agent.scan` RPC response, before
/// identity resolution (§4.6).
#[derive(Debug, Clone, Deserialize)]
pub struct RawScanRecord {
    pub address: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub open_ports: Vec<u16>,
    pub source: DeviceSource,
}

/// Outcome of ingesting one scan's worth of records: the devices that
/// actually changed (for `device_upserted` emission) and the total distinct
/// identities seen, which becomes the DiscoverySession's `found_count`.
pub struct IngestOutcome {
    pub upserted: Vec<Device>,
    pub found_count: i64,
}

/// Normalize, dedupe, and merge `records` into `customer_id`'s inventory.
/// Callers MUST hold `db.lock_customer(customer_id)` for the duration of
/// this call (§4.10, §5: per-customer advisory lock serializes concurrent
/// scan ingests).
pub async fn ingest_scan(
    db: &Db,
    customer_id: &str,
    records: &[RawScanRecord],
) -> Result<IngestOutcome, ApiError> {
    // Step: collapse duplicate records within this scan by identity
    // (§4.6: "Duplicate records within the same scan are collapsed by
    // identity before step 2"). Records sharing a MAC collapse to the last
    // one seen; a record with no MAC is keyed by address instead.
    let mut by_identity: Vec<(Identity, RawScanRecord)> = Vec::new();
    for record in records {
        let identity = Identity::of(record);
        if let Some(slot) = by_identity.iter_mut().find(|(id, _)| *id == identity) {
            slot.1 = record.clone();
        } else {
            by_identity.push((identity, record.clone()));
        }
    }

    let mut upserted = Vec::new();
    for (identity, record) in &by_identity {
        let existing = devices::find_by_identity(
            db,
            customer_id,
            identity.mac(),
            &record.address,
        )
        .await?;

        let scan_record = ScanRecord {
            address: record.address.clone(),
            mac: record.mac.clone(),
            hostname: record.hostname.clone(),
            vendor: record.vendor.clone(),
            platform: record.platform.clone(),
            source: record.source,
        };

        match existing {
            None => {
                let device = devices::insert(db, customer_id, &scan_record).await?;
                upserted.push(device);
            }
            Some(device) => {
                let merge = devices::merge(db, &device, &scan_record).await?;
                if merge.changed {
                    upserted.push(merge.device);
                }
                // Re-submitting an unchanged record is idempotent: only
                // `last_seen_at` moves, no `device_upserted` event (§8).
            }
        }
    }

    Ok(IngestOutcome { upserted, found_count: by_identity.len() as i64 })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identity {
    Mac(String),
    Address(String),
}

impl Identity {
    fn of(record: &RawScanRecord) -> Self {
        match &record.mac {
            Some(mac) if !mac.is_empty() => Self::Mac(mac.clone()),
            _ => Self::Address(record.address.clone()),
        }
    }

    fn mac(&self) -> Option<&str> {
        match self {
            Self::Mac(m) => Some(m.as_str()),
            Self::Address(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, mac: Option<&str>) -> RawScanRecord {
        RawScanRecord {
            address: address.to_owned(),
            mac: mac.map(str::to_owned),
            hostname: None,
            vendor: None,
            platform: None,
            open_ports: vec![],
            source: DeviceSource::Arp,
        }
    }

    #[test]
    fn identity_prefers_mac_over_address() {
        let a = record("192.168.1.10", Some("aa:bb:cc:00:00:01"));
        let b = record("192.168.1.10", Some("aa:bb:cc:00:00:01"));
        assert_eq!(Identity::of(&a), Identity::of(&b));
    }

    #[test]
    fn identity_falls_back_to_address_without_mac() {
        let a = record("192.168.1.11", None);
        assert_eq!(Identity::of(&a), Identity::Address("192.168.1.11".into()));
    }

    #[test]
    fn duplicate_records_collapse_before_persistence() {
        // Mirrors §8 scenario 2: three raw records, two of which share an
        // identity, dedupe down to two distinct identities pre-insert.
        let records = vec![
            record("192.168.1.10", Some("aa:bb:cc:00:00:01")),
            record("192.168.1.10", Some("aa:bb:cc:00:00:01")),
            record("192.168.1.11", None),
        ];
        let mut seen = Vec::new();
        for r in &records {
            let id = Identity::of(r);
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        assert_eq!(seen.len(), 2);
    }
}
