// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin SSH shell client shared by every vendor adapter: connect,
//! authenticate with a username/password, run one or more commands, collect
//! their combined stdout. Vendor adapters differ only in which commands they
//! run and how they classify the output, not in how they talk SSH.

use std::sync::Arc;
use std::time::Duration;

use russh::client::{Config, Handle, Handler};
use russh::keys::key::PublicKey;
use russh::{ChannelMsg, Disconnect};

use crate::error::AgentError;

/// Accepts any host key. Customer network gear rarely carries a CA-signed
/// host key and the agent has no out-of-band way to pin one; the transport
/// already assumes a trusted management network (§4.7 non-goal: backup
/// transport authenticity is out of scope for this system).
struct AcceptAnyKey;

#[async_trait::async_trait]
impl Handler for AcceptAnyKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshShell {
    handle: Handle<AcceptAnyKey>,
}

impl SshShell {
    pub async fn connect(
        device_ip: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let config = Arc::new(Config { inactivity_timeout: Some(timeout), ..Default::default() });
        let mut handle = tokio::time::timeout(timeout, russh::client::connect(config, (device_ip, 22), AcceptAnyKey))
            .await
            .map_err(|_| AgentError::timeout(format!("ssh connect to {device_ip} timed out")))?
            .map_err(|e| AgentError::vendor_protocol(format!("ssh connect to {device_ip} failed: {e}")))?;

        let authenticated = handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| AgentError::vendor_protocol(format!("ssh auth to {device_ip} failed: {e}")))?;
        if !authenticated {
            return Err(AgentError::vendor_protocol(format!("ssh auth to {device_ip} rejected")));
        }

        Ok(Self { handle })
    }

    /// Run `command` in its own channel and return its combined stdout.
    pub async fn exec(&mut self, command: &str) -> Result<String, AgentError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| AgentError::vendor_protocol(format!("ssh channel open failed: {e}")))?;
        channel.exec(true, command).await.map_err(|e| AgentError::vendor_protocol(format!("ssh exec failed: {e}")))?;

        let mut output = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, .. } => output.extend_from_slice(&data),
                ChannelMsg::ExitStatus { .. } | ChannelMsg::Eof => break,
                _ => {}
            }
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Run each command in sequence, concatenating their outputs. Used by
    /// command-execution jobs where the operator supplies a list of lines to
    /// apply one after another.
    pub async fn exec_many(&mut self, commands: &[String]) -> Result<String, AgentError> {
        let mut combined = String::new();
        for command in commands {
            combined.push_str(&self.exec(command).await?);
            combined.push('\n');
        }
        Ok(combined)
    }

    pub async fn close(mut self) {
        let _ = self.handle.disconnect(Disconnect::ByApplication, "", "English").await;
    }
}
