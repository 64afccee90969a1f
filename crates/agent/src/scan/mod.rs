// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agent.scan` (C5/C6 counterpart on the agent side): runs one or more of
//! the ARP/ping/SNMP/Nmap probes against a CIDR and reports device records.
//! The wire shape of each record matches `netvigil_server::ingest::RawScanRecord`
//! field-for-field — both sides agree on the JSON, not on a shared Rust type,
//! since the agent has no reason to depend on the server crate.

pub mod arp;
pub mod cidr;
pub mod nmap;
pub mod ping;
pub mod snmp;

use serde::{Deserialize, Serialize};

pub use cidr::Cidr;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::outbound::ProgressSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Arp,
    Ping,
    Nmap,
    Snmp,
    All,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSource {
    Arp,
    Ping,
    Neighbor,
    Nmap,
    Snmp,
    Manual,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Record {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub open_ports: Vec<u16>,
    pub source: Option<DeviceSource>,
}

#[derive(Debug, Deserialize)]
pub struct ScanArgs {
    #[serde(default)]
    pub network_cidr: Option<String>,
    pub scan_type: ScanType,
    #[serde(default)]
    pub scan_ports: Option<Vec<u16>>,
}

/// Run one `agent.scan` RPC end to end. The server always supplies a
/// concrete `network_cidr` — when an operator omits it, the server resolves
/// every network assigned to the target customer and fans out one
/// `agent.scan` RPC per network (§4.5), so the agent itself never needs to
/// know its customer's network list.
pub async fn run(args: ScanArgs, config: &AgentConfig, progress: ProgressSink) -> Result<Vec<Record>, AgentError> {
    let Some(raw_cidr) = args.network_cidr else {
        return Err(AgentError::new(netvigil_proto::ErrorKind::Validation, "agent.scan requires network_cidr"));
    };
    let network = Cidr::parse(&raw_cidr)
        .map_err(|e| AgentError::new(netvigil_proto::ErrorKind::Validation, format!("invalid CIDR {raw_cidr}: {e}")))?;

    let mut records: Vec<Record> = Vec::new();
    let kinds: Vec<ScanType> = match args.scan_type {
        ScanType::All => vec![ScanType::Arp, ScanType::Ping, ScanType::Nmap, ScanType::Snmp],
        other => vec![other],
    };

    for kind in kinds {
        let found = match kind {
            ScanType::Arp => arp::scan(network).await?,
            ScanType::Ping => ping::scan(network, config).await?,
            ScanType::Nmap => nmap::scan(network, args.scan_ports.as_deref(), config).await?,
            ScanType::Snmp => snmp::scan(network, config).await?,
            ScanType::All => unreachable!("expanded above"),
        };
        for record in found {
            progress.emit(serde_json::json!({ "address": record.address, "source": record.source }));
            records.push(record);
        }
    }

    Ok(records)
}
