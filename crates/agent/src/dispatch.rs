// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC dispatch: turns one `rpc.request` envelope into a call against the
//! scan/backup/command handler named by its `method`, then writes back
//! `rpc.response` or `rpc.error`. The request envelope's payload is always
//! `{method, args}` — the shape `AgentSession::call` on the server wraps its
//! calls in (see `netvigil_server::session::AgentSession::call`).

use netvigil_proto::{Envelope, ErrorKind};
use serde::Deserialize;

use crate::config::AgentConfig;
use crate::credentials::CredentialCache;
use crate::error::AgentError;
use crate::outbound::{Outbound, ProgressSink};

pub struct AgentState {
    pub config: AgentConfig,
    pub credentials: CredentialCache,
}

impl AgentState {
    pub fn new(config: AgentConfig) -> Self {
        Self { config, credentials: CredentialCache::new() }
    }
}

#[derive(Debug, Deserialize)]
struct RpcRequestPayload {
    method: String,
    #[serde(default)]
    args: serde_json::Value,
}

pub async fn handle_request(env: Envelope, outbound: Outbound, state: std::sync::Arc<AgentState>) {
    let request_id = env.id.clone();
    let request: RpcRequestPayload = match serde_json::from_value(env.payload) {
        Ok(r) => r,
        Err(e) => {
            outbound.error(&request_id, &AgentError::new(ErrorKind::Validation, format!("malformed rpc.request: {e}")));
            return;
        }
    };

    let progress = ProgressSink::new(outbound.clone(), request_id.clone());
    let result = route(&request.method, request.args, &state, progress).await;
    match result {
        Ok(payload) => outbound.response(&request_id, payload),
        Err(e) => outbound.error(&request_id, &e),
    }
}

async fn route(
    method: &str,
    args: serde_json::Value,
    state: &AgentState,
    progress: ProgressSink,
) -> Result<serde_json::Value, AgentError> {
    match method {
        "agent.scan" => {
            let args: crate::scan::ScanArgs = serde_json::from_value(args)
                .map_err(|e| AgentError::new(ErrorKind::Validation, format!("malformed agent.scan args: {e}")))?;
            let records = crate::scan::run(args, &state.config, progress).await?;
            Ok(serde_json::json!({ "records": records }))
        }
        "agent.backup" => {
            let args: crate::backup::BackupArgs = serde_json::from_value(args)
                .map_err(|e| AgentError::new(ErrorKind::Validation, format!("malformed agent.backup args: {e}")))?;
            let result = crate::backup::run(args, &state.config, &state.credentials).await?;
            serde_json::to_value(result).map_err(|e| AgentError::internal(e.to_string()))
        }
        "agent.command" => {
            let args: crate::command::CommandArgs = serde_json::from_value(args)
                .map_err(|e| AgentError::new(ErrorKind::Validation, format!("malformed agent.command args: {e}")))?;
            let result = crate::command::run(args, &state.config, &state.credentials).await?;
            serde_json::to_value(result).map_err(|e| AgentError::internal(e.to_string()))
        }
        "agent.ping_device" => Ok(serde_json::json!({ "ok": true })),
        other => Err(AgentError::new(ErrorKind::Validation, format!("unknown method: {other}"))),
    }
}
