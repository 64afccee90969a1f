// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agent.command`: runs a list of CLI lines against a device over the same
//! SSH shell the backup adapters use, returning combined stdout.

use serde::{Deserialize, Serialize};

use crate::backup::shell::SshShell;
use crate::config::AgentConfig;
use crate::credentials::CredentialCache;
use crate::error::AgentError;

#[derive(Debug, Deserialize)]
pub struct CommandArgs {
    pub device_ip: String,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub backup_before: bool,
}

#[derive(Debug, Serialize, Default)]
pub struct CommandResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

pub async fn run(args: CommandArgs, config: &AgentConfig, cache: &CredentialCache) -> Result<CommandResult, AgentError> {
    let Some(credential) = cache.get(&args.device_ip) else {
        return Err(AgentError::vendor_protocol(format!(
            "no known credentials for {}; run a backup for this device first",
            args.device_ip
        )));
    };

    let mut shell = SshShell::connect(&args.device_ip, &credential.username, &credential.secret, config.ssh_timeout()).await?;
    let output = shell.exec_many(&args.commands).await?;
    shell.close().await;

    Ok(CommandResult { ok: true, output: Some(output) })
}
