// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ARP scan: reads the kernel's neighbor table rather than emitting raw ARP
//! frames (no raw-socket capability is assumed inside the agent's container).
//! This is the cheapest, most reliable signal for "what has this host talked
//! to recently" and matches what a container-confined agent can actually do.

use std::net::Ipv4Addr;

use super::{Cidr, DeviceSource, Record};
use crate::error::AgentError;

pub async fn scan(network: Cidr) -> Result<Vec<Record>, AgentError> {
    let table = tokio::task::spawn_blocking(read_arp_table)
        .await
        .map_err(|e| AgentError::internal(format!("arp scan task panicked: {e}")))??;

    let members: std::collections::HashSet<Ipv4Addr> = network.hosts().into_iter().collect();
    Ok(table
        .into_iter()
        .filter(|(addr, _)| members.contains(addr))
        .map(|(addr, mac)| Record {
            address: addr.to_string(),
            mac: Some(mac),
            source: Some(DeviceSource::Arp),
            ..Default::default()
        })
        .collect())
}

#[cfg(target_os = "linux")]
fn read_arp_table() -> Result<Vec<(Ipv4Addr, String)>, AgentError> {
    let contents = std::fs::read_to_string("/proc/net/arp")
        .map_err(|e| AgentError::vendor_protocol(format!("failed to read /proc/net/arp: {e}")))?;
    Ok(parse_arp_table(&contents))
}

#[cfg(not(target_os = "linux"))]
fn read_arp_table() -> Result<Vec<(Ipv4Addr, String)>, AgentError> {
    tracing::debug!("ARP table read is only supported on linux agents; returning no entries");
    Ok(Vec::new())
}

/// Parse the whitespace-separated `/proc/net/arp` format:
/// `IP address   HW type   Flags   HW address          Mask  Device`.
/// Incomplete entries (HW address `00:00:00:00:00:00`) are skipped.
fn parse_arp_table(contents: &str) -> Vec<(Ipv4Addr, String)> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let addr: Ipv4Addr = columns.next()?.parse().ok()?;
            let _hw_type = columns.next()?;
            let _flags = columns.next()?;
            let mac = columns.next()?.to_owned();
            if mac == "00:00:00:00:00:00" {
                return None;
            }
            Some((addr, mac))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "IP address       HW type     Flags       HW address            Mask     Device\n\
192.168.1.1      0x1         0x2         aa:bb:cc:00:00:01     *        eth0\n\
192.168.1.50     0x1         0x0         00:00:00:00:00:00     *        eth0\n";

    #[test]
    fn parses_complete_entries_and_skips_incomplete() {
        let entries = parse_arp_table(SAMPLE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(entries[0].1, "aa:bb:cc:00:00:01");
    }
}
