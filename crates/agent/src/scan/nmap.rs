// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nmap scan: shells out to the real `nmap` binary and parses its grepable
//! (`-oG -`) output, the cheapest stable format to parse without an XML
//! dependency. Each `Host:` line with a `Status: Up` becomes a [`Record`];
//! a trailing `Ports:` field, when present, populates `open_ports`.

use std::process::Stdio;

use regex::Regex;
use std::sync::OnceLock;

use super::{Cidr, DeviceSource, Record};
use crate::config::AgentConfig;
use crate::error::AgentError;

#[allow(clippy::expect_used)]
fn host_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Host:\s+(\S+)\s+(?:\(([^)]*)\))?.*?Status:\s+(\S+)").expect("static regex is valid")
    })
}

#[allow(clippy::expect_used)]
fn port_entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)/open").expect("static regex is valid"))
}

pub async fn scan(network: Cidr, ports: Option<&[u16]>, config: &AgentConfig) -> Result<Vec<Record>, AgentError> {
    let cidr_arg = network_to_arg(network);
    let mut command = tokio::process::Command::new(&config.nmap_path);
    command.arg("-oG").arg("-").arg("-n");
    if let Some(ports) = ports {
        if !ports.is_empty() {
            let joined = ports.iter().map(u16::to_string).collect::<Vec<_>>().join(",");
            command.arg("-p").arg(joined);
        }
    } else {
        command.arg("-F");
    }
    command.arg(cidr_arg).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());

    let output = command.output().await.map_err(|e| {
        AgentError::vendor_protocol(format!("failed to run nmap ({}): {e}", config.nmap_path))
    })?;
    if !output.status.success() {
        return Err(AgentError::vendor_protocol(format!("nmap exited with status {}", output.status)));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_grepable(&text))
}

fn network_to_arg(network: Cidr) -> String {
    // `Cidr` doesn't expose its base/prefix directly; reconstruct from the
    // first host and block size, which is all `nmap` needs as a CLI target.
    let hosts = network.hosts();
    match hosts.first() {
        Some(first) => format!("{first}/{}", prefix_len_for(hosts.len())),
        None => "127.0.0.1/32".to_owned(),
    }
}

fn prefix_len_for(usable_hosts: usize) -> u32 {
    let block = (usable_hosts + 2).next_power_of_two();
    32 - (block as f64).log2().round() as u32
}

fn parse_grepable(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for line in text.lines() {
        let Some(caps) = host_line_re().captures(line) else { continue };
        if !caps.get(3).map(|m| m.as_str()).unwrap_or_default().eq_ignore_ascii_case("Up") {
            continue;
        }
        let address = caps.get(1).map(|m| m.as_str().to_owned()).unwrap_or_default();
        let hostname = caps.get(2).map(|m| m.as_str().to_owned()).filter(|s| !s.is_empty());
        let open_ports: Vec<u16> =
            port_entry_re().captures_iter(line).filter_map(|c| c.get(1)?.as_str().parse().ok()).collect();

        records.push(Record { address, hostname, open_ports, source: Some(DeviceSource::Nmap), ..Default::default() });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_up_host_with_open_ports() {
        let line = "Host: 192.168.1.10 (switch1.lan)\tStatus: Up";
        let ports_line = "Host: 192.168.1.10 ()\tPorts: 22/open/tcp//ssh///, 80/closed/tcp//http///\tStatus: Up";
        let records = parse_grepable(&format!("{line}\n{ports_line}\n"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hostname.as_deref(), Some("switch1.lan"));
        assert_eq!(records[1].open_ports, vec![22]);
    }

    #[test]
    fn skips_down_hosts() {
        let line = "Host: 192.168.1.11 ()\tStatus: Down";
        assert!(parse_grepable(line).is_empty());
    }

    #[test]
    fn prefix_len_roundtrips_slash_24() {
        assert_eq!(prefix_len_for(254), 24);
    }
}
