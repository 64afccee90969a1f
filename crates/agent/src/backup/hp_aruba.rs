// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HP/Aruba (ArubaOS-CX and ArubaOS-Switch both answer `show running-config`)
//! backup adapter: SSH in, capture the running config as plain text.

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

    // `no page`/`skip-page-display` keeps the switch from pausing with
    // `--More--` part way through a config that spans more than a screen.
    let _ = shell.exec("no page").await;
    let _ = shell.exec("skip-page-display").await;

    let config = shell.exec("show running-config").await?;
    let version = shell.exec("show version").await.unwrap_or_default();
    shell.close().await;

    Ok(BackupResult {
        content_base64: encode(config.as_bytes()),
        ext: "txt".to_owned(),
        model: extract_after(&version, "Model"),
        firmware: extract_after(&version, "Version"),
        serial: extract_after(&version, "Serial"),
    })
}

fn encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// HP/Aruba `show version` output is free text with lines like
/// `Serial Number    : SG12345678`; pull the value after the first colon on
/// a line that starts with `label`.
fn extract_after(text: &str, label: &str) -> Option<String> {
    text.lines()
        .find(|line| line.trim_start().starts_with(label))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_after_parses_labelled_line() {
        let text = "Model Name       : Aruba 2930F\nSerial Number    : SG12345678\n";
        assert_eq!(extract_after(text, "Serial Number"), Some("SG12345678".to_owned()));
        assert_eq!(extract_after(text, "Uptime"), None);
    }
}
