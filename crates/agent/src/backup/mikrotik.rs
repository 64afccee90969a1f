// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MikroTik RouterOS backup adapter: SSH in and run `/export` to get a
//! replayable RouterOS script rather than the binary `/system backup save`
//! format, so the artifact is diffable and restorable without the original
//! device's licence key.

use super::shell::SshShell;
use super::BackupResult;
use crate::error::AgentError;

pub async fn backup(
    device_ip: &str,
    username: &str,
    secret: &str,
    timeout: std::time::Duration,
) -> Result<BackupResult, AgentError> {
    let mut shell = SshShell::connect(device_ip, username, secret, timeout).await?;

    let config = shell.exec("/export verbose").await?;
    let identity = shell.exec("/system identity print").await.unwrap_or_default();
    let resource = shell.exec("/system resource print").await.unwrap_or_default();
    let routerboard = shell.exec("/system routerboard print").await.unwrap_or_default();
    shell.close().await;

    Ok(BackupResult {
        content_base64: encode(config.as_bytes()),
        ext: "rsc".to_owned(),
        model: extract_value(&resource, "board-name").or_else(|| extract_value(&identity, "name")),
        firmware: extract_value(&resource, "version"),
        serial: extract_value(&routerboard, "serial-number"),
    })
}

fn encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// RouterOS `print` output is `key: value` pairs, one per line, with
/// variable leading whitespace.
fn extract_value(text: &str, key: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.trim().strip_prefix(key)?.trim().strip_prefix(':'))
        .map(|value| value.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_value_parses_routeros_print_output() {
        let text = "board-name: RB4011\nversion: 7.12 (stable)\n";
        assert_eq!(extract_value(text, "board-name"), Some("RB4011".to_owned()));
        assert_eq!(extract_value(text, "version"), Some("7.12 (stable)".to_owned()));
        assert_eq!(extract_value(text, "missing"), None);
    }
}
