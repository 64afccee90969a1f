// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ping scan: shells out to the system `ping` binary rather than building
//! raw ICMP sockets, since raw sockets need privileges the agent's container
//! may not be granted (§1 non-goal: "does not prescribe how the agent's
//! probes are implemented internally"). Concurrency is bounded so a /24
//! sweep doesn't fork 254 processes at once.

use std::net::Ipv4Addr;
use std::process::Stdio;

use futures_util::stream::{self, StreamExt};

use super::{Cidr, DeviceSource, Record};
use crate::config::AgentConfig;
use crate::error::AgentError;

const MAX_CONCURRENT: usize = 32;

pub async fn scan(network: Cidr, config: &AgentConfig) -> Result<Vec<Record>, AgentError> {
    let hosts = network.hosts();
    let timeout_secs = config.probe_timeout().as_secs().max(1);
    let ping_path = config.ping_path.clone();

    let results = stream::iter(hosts.into_iter())
        .map(|addr| {
            let ping_path = ping_path.clone();
            async move { (addr, probe_one(&ping_path, addr, timeout_secs).await) }
        })
        .buffer_unordered(MAX_CONCURRENT)
        .collect::<Vec<_>>()
        .await;

    Ok(results
        .into_iter()
        .filter_map(|(addr, reachable)| {
            reachable.then(|| Record { address: addr.to_string(), source: Some(DeviceSource::Ping), ..Default::default() })
        })
        .collect())
}

async fn probe_one(ping_path: &str, addr: Ipv4Addr, timeout_secs: u64) -> bool {
    let status = tokio::process::Command::new(ping_path)
        .arg("-c")
        .arg("1")
        .arg("-W")
        .arg(timeout_secs.to_string())
        .arg(addr.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    matches!(status, Ok(status) if status.success())
}
