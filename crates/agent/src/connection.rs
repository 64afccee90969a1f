// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dialer: connect to the server's agent WebSocket endpoint, complete the
//! `hello`/`auth` handshake, then run reader/writer tasks until the socket
//! drops, reconnecting with exponential backoff. Grounded on the teacher's
//! `crates/mux/src/upstream/bridge.rs::run_loop`, inverted from "dial one
//! fixed upstream and proxy its frames" to "dial the server and answer its
//! RPCs".

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use netvigil_proto::{Envelope, MessageType};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::dispatch::AgentState;
use crate::error::AgentError;

/// Dial, authenticate, and serve RPCs until `shutdown` is cancelled. Never
/// returns early on a transport error: every failure just feeds the next
/// backoff and retry, exactly like the teacher's upstream dialer.
pub async fn run(config: AgentConfig, token_path: std::path::PathBuf, shutdown: CancellationToken) {
    let mut backoff = config.reconnect_backoff();
    let state = std::sync::Arc::new(AgentState::new(config.clone()));

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let token = match crate::token::load_or_create(&token_path).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(err = %e, "failed to load agent token, retrying after backoff");
                sleep_with_shutdown(backoff, &shutdown).await;
                backoff = next_backoff(backoff, &config);
                continue;
            }
        };

        match connect_and_serve(&config, &token, &token_path, std::sync::Arc::clone(&state), shutdown.clone()).await {
            Ok(()) => {
                tracing::info!("session ended cleanly, reconnecting");
                backoff = config.reconnect_backoff();
            }
            Err(e) => {
                tracing::warn!(err = %e, backoff_ms = backoff.as_millis() as u64, "session failed, backing off");
            }
        }

        if shutdown.is_cancelled() {
            break;
        }
        sleep_with_shutdown(backoff, &shutdown).await;
        backoff = next_backoff(backoff, &config);
    }
}

fn next_backoff(current: Duration, config: &AgentConfig) -> Duration {
    (current * 2).min(config.reconnect_max_backoff())
}

async fn sleep_with_shutdown(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.cancelled() => {}
    }
}

async fn connect_and_serve(
    config: &AgentConfig,
    token: &str,
    token_path: &std::path::Path,
    state: std::sync::Arc<AgentState>,
    shutdown: CancellationToken,
) -> Result<(), AgentError> {
    let (ws, _response) = tokio_tungstenite::connect_async(config.ws_url())
        .await
        .map_err(|e| AgentError::vendor_protocol(format!("failed to connect to {}: {e}", config.ws_url())))?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let hello = Envelope::new(MessageType::Hello, uuid::Uuid::new_v4().to_string()).with_payload(serde_json::json!({
        "agent_id": config.agent_id,
        "kind": config.kind,
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": config.capability_list(),
        "address": config.address,
        "port": config.port,
    }));
    send(&mut ws_tx, &hello).await?;

    let challenge = recv_within(&mut ws_rx, config.handshake_timeout()).await?;
    if challenge.message_type() != Some(MessageType::Auth) {
        return Err(AgentError::vendor_protocol("expected auth challenge after hello"));
    }

    let auth = Envelope::new(MessageType::Auth, uuid::Uuid::new_v4().to_string())
        .with_payload(serde_json::json!({ "token": token }));
    send(&mut ws_tx, &auth).await?;

    let outcome = recv_within(&mut ws_rx, config.handshake_timeout()).await?;
    match outcome.message_type() {
        Some(MessageType::AuthOk) => {
            tracing::info!(agent_id = %config.agent_id, "authenticated");
        }
        Some(MessageType::AuthErr) => {
            return Err(AgentError::vendor_protocol(format!("server rejected authentication: {}", outcome.payload)));
        }
        _ => return Err(AgentError::vendor_protocol("expected auth_ok/auth_err after auth")),
    }

    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let session_cancel = CancellationToken::new();

    let writer_cancel = session_cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            if ws_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let outbound = crate::outbound::Outbound::new(outbound_tx);

    let reader_cancel = session_cancel.clone();
    let reader_outbound = outbound.clone();
    let reader_state = std::sync::Arc::clone(&state);
    let reader_token_path = token_path.to_owned();
    let reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                frame = ws_rx.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(env) = serde_json::from_str::<Envelope>(&text) else {
                                tracing::debug!("dropping malformed frame");
                                continue;
                            };
                            handle_frame(env, &reader_outbound, &reader_state, &reader_token_path).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            reader_cancel.cancel();
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) => {
                            reader_cancel.cancel();
                            break;
                        }
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = shutdown.cancelled() => {
            session_cancel.cancel();
        }
        _ = session_cancel.cancelled() => {}
    }
    let _ = tokio::join!(reader, writer);
    Ok(())
}

async fn handle_frame(
    env: Envelope,
    outbound: &crate::outbound::Outbound,
    state: &std::sync::Arc<AgentState>,
    token_path: &std::path::Path,
) {
    match env.message_type() {
        Some(MessageType::Ping) => {
            let pong = Envelope::new(MessageType::Pong, uuid::Uuid::new_v4().to_string());
            outbound.send_raw(pong);
        }
        Some(MessageType::RpcRequest) => {
            let outbound = outbound.clone();
            let state = std::sync::Arc::clone(state);
            tokio::spawn(async move {
                crate::dispatch::handle_request(env, outbound, state).await;
            });
        }
        Some(MessageType::Event) => {
            if env.payload.get("event").and_then(|v| v.as_str()) == Some("token_rotation") {
                apply_token_rotation(&env.payload, token_path).await;
            }
        }
        Some(MessageType::Config) => {
            // Present for spec-fidelity (§4.4 names `config` as the
            // rotation envelope); the server in this deployment sends
            // rotation as an `event` instead (see handling above), but a
            // future/different server build that sends it straight is
            // handled too.
            apply_token_rotation(&env.payload, token_path).await;
        }
        Some(MessageType::Close) => {
            tracing::info!(reason = %env.payload, "server closed session");
        }
        None => {
            tracing::debug!(kind = %env.kind, "ignoring unknown message type");
        }
        _ => {}
    }
}

async fn apply_token_rotation(payload: &serde_json::Value, token_path: &std::path::Path) {
    let Some(new_token) = payload
        .get("token_rotation")
        .or_else(|| payload.get("data").and_then(|d| d.get("token_rotation")))
        .and_then(|v| v.get("token"))
        .and_then(|v| v.as_str())
    else {
        return;
    };
    if let Err(e) = crate::token::persist(token_path, new_token).await {
        tracing::error!(err = %e, "failed to persist rotated token");
    } else {
        tracing::info!("persisted rotated token");
    }
}

async fn send(
    ws_tx: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    env: &Envelope,
) -> Result<(), AgentError> {
    let text = serde_json::to_string(env).map_err(|e| AgentError::internal(e.to_string()))?;
    ws_tx.send(Message::Text(text.into())).await.map_err(|e| AgentError::vendor_protocol(e.to_string()))
}

async fn recv_within(
    ws_rx: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    timeout: Duration,
) -> Result<Envelope, AgentError> {
    let frame = tokio::time::timeout(timeout, ws_rx.next())
        .await
        .map_err(|_| AgentError::timeout("handshake frame not received in time"))?;
    match frame {
        Some(Ok(Message::Text(text))) => {
            serde_json::from_str(&text).map_err(|e| AgentError::vendor_protocol(format!("malformed frame: {e}")))
        }
        Some(Ok(_)) => Err(AgentError::vendor_protocol("expected a text frame")),
        Some(Err(e)) => Err(AgentError::vendor_protocol(e.to_string())),
        None => Err(AgentError::vendor_protocol("connection closed during handshake")),
    }
}
