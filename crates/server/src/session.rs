// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session (C2): per-connection state machine, reader/writer/liveness
//! cooperative tasks, and the correlation table an in-flight `Call`/`Stream`
//! waits on. Grounded on the teacher's `transport/ws.rs` `handle_ws` loop and
//! `upstream/bridge.rs`'s `run_loop` + `pending` table, inverted for an
//! agent-initiated connection instead of an upstream dial.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use netvigil_proto::{Envelope, ErrorKind, MessageType};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Authenticating = 1,
    Running = 2,
    Closing = 3,
    Closed = 4,
}

impl From<u8> for SessionState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Authenticating,
            2 => Self::Running,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

struct Waiter {
    progress_tx: Option<mpsc::UnboundedSender<Envelope>>,
    result_tx: oneshot::Sender<Result<Envelope, ApiError>>,
}

/// One authenticated, live WebSocket connection to one agent (§4.2).
/// `session_id` is the identity the Hub uses to tell a session apart from
/// whatever replaces it, so a dying session can never unregister its
/// successor.
pub struct AgentSession {
    pub agent_id: String,
    pub session_id: Uuid,
    outbound_tx: mpsc::UnboundedSender<Message>,
    pending: DashMap<String, Waiter>,
    inflight: Semaphore,
    state: AtomicU8,
    /// Whether the agent bound to this session has completed approval
    /// (§4.4: "the Hub registers the session as pending-visible: operator-
    /// initiated RPCs to a pending agent fail with `agent_not_approved`").
    /// Fixed for the session's lifetime — an approval that arrives while a
    /// pending session is live takes effect on the agent's next connection,
    /// which registers a new session carrying the resolved status.
    approved: AtomicBool,
    pub cancel: CancellationToken,
}

impl AgentSession {
    pub fn state(&self) -> SessionState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_approved(&self) -> bool {
        self.approved.load(Ordering::Acquire)
    }

    fn set_state(&self, s: SessionState) {
        self.state.store(s as u8, Ordering::Release);
    }

    fn next_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn send_envelope(&self, env: &Envelope) -> Result<(), ApiError> {
        let text = serde_json::to_string(env).map_err(|e| ApiError::internal(e.to_string()))?;
        self.outbound_tx
            .send(Message::Text(text.into()))
            .map_err(|_| ApiError::new(ErrorKind::TransportClosed, "session writer closed"))
    }

    /// Synchronous RPC (§4.3 `Call`/`Stream`, unified here): writes
    /// `rpc.request`, waits for the matching `rpc.response`/`rpc.error`,
    /// forwarding any `rpc.progress` frames to `progress_tx` if given.
    /// Enforces `timeout` and honors `ctx` cancellation by sending
    /// `rpc.cancel` and resolving locally with `cancelled` without waiting
    /// for the agent's acknowledgement.
    pub async fn call(
        &self,
        method: &str,
        payload: serde_json::Value,
        timeout: Duration,
        ctx: CancellationToken,
        progress_tx: Option<mpsc::UnboundedSender<Envelope>>,
    ) -> Result<Envelope, ApiError> {
        if !self.is_approved() {
            return Err(ApiError::new(
                ErrorKind::AgentNotApproved,
                format!("agent {} is pending and cannot receive operator RPCs", self.agent_id),
            ));
        }

        let _permit = self
            .inflight
            .acquire()
            .await
            .map_err(|_| ApiError::new(ErrorKind::TransportClosed, "session closed"))?;

        let id = Self::next_id();
        let (result_tx, result_rx) = oneshot::channel();
        self.pending.insert(id.clone(), Waiter { progress_tx, result_tx });

        let mut request = Envelope::new(MessageType::RpcRequest, id.clone())
            .with_payload(serde_json::json!({ "method": method, "args": payload }));
        request.correlation_id = None;
        if let Err(e) = self.send_envelope(&request) {
            self.pending.remove(&id);
            return Err(e);
        }

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                self.pending.remove(&id);
                let cancel = Envelope::new(MessageType::RpcCancel, Self::next_id()).with_correlation(id);
                let _ = self.send_envelope(&cancel);
                Err(ApiError::new(ErrorKind::Cancelled, "request cancelled by caller"))
            }
            res = tokio::time::timeout(timeout, result_rx) => {
                match res {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(ApiError::new(ErrorKind::TransportClosed, "session closed while awaiting response")),
                    Err(_) => {
                        self.pending.remove(&id);
                        let cancel = Envelope::new(MessageType::RpcCancel, Self::next_id()).with_correlation(id);
                        let _ = self.send_envelope(&cancel);
                        Err(ApiError::new(ErrorKind::Timeout, format!("no response within {timeout:?}")))
                    }
                }
            }
        }
    }

    /// Fire-and-forget event, best-effort (§4.3 `Broadcast`'s per-session leg).
    pub fn send_event(&self, event_name: &str, payload: serde_json::Value) {
        let env = Envelope::new(MessageType::Event, Self::next_id())
            .with_payload(serde_json::json!({ "event": event_name, "data": payload }));
        let _ = self.send_envelope(&env);
    }

    pub fn close(&self, reason: &str) {
        let env = Envelope::new(MessageType::Close, Self::next_id())
            .with_payload(serde_json::json!({ "reason": reason }));
        let _ = self.send_envelope(&env);
        self.cancel.cancel();
    }

    fn fail_all_pending(&self, kind: ErrorKind, message: &str) {
        for (_, waiter) in self.pending.clone().into_iter() {
            let _ = waiter.result_tx.send(Err(ApiError::new(kind, message)));
        }
        self.pending.clear();
    }

    fn dispatch_response(&self, env: Envelope) {
        let Some(correlation_id) = env.correlation_id.clone() else { return };
        match env.message_type() {
            Some(MessageType::RpcProgress) => {
                if let Some(waiter) = self.pending.get(&correlation_id) {
                    if let Some(tx) = &waiter.progress_tx {
                        let _ = tx.send(env);
                    }
                }
            }
            Some(MessageType::RpcResponse) => {
                if let Some((_, waiter)) = self.pending.remove(&correlation_id) {
                    let _ = waiter.result_tx.send(Ok(env));
                }
            }
            Some(MessageType::RpcError) => {
                if let Some((_, waiter)) = self.pending.remove(&correlation_id) {
                    let kind = env
                        .payload
                        .get("error")
                        .and_then(|v| v.as_str())
                        .and_then(|s| serde_json::from_value(serde_json::Value::String(s.to_owned())).ok())
                        .unwrap_or(ErrorKind::Internal);
                    let message = env
                        .payload
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("agent reported an error")
                        .to_owned();
                    let _ = waiter.result_tx.send(Err(ApiError::new(kind, message)));
                }
            }
            _ => {}
        }
    }
}

/// Handle to a still-unregistered session driven by [`run`] before and
/// during the authentication handshake; becomes a registered
/// [`AgentSession`] only after `auth_ok`.
pub struct HandshakeOutcome {
    pub session: Arc<AgentSession>,
    pub agent_id: String,
}

/// Drive one agent's WebSocket connection end to end: accepts `hello`/`auth`,
/// then runs the reader/writer/liveness trio until the socket closes, the
/// session is cancelled (e.g. replaced by a newer connection), or the
/// liveness timeout fires. `authenticate` verifies the presented token
/// against the agent registry and returns the resolved `agent_id` plus
/// whether the agent is approved.
pub async fn run<F, Fut>(
    socket: WebSocket,
    max_inflight: usize,
    hello_timeout: Duration,
    heartbeat_interval: Duration,
    liveness_timeout: Duration,
    authenticate: F,
    mut on_session: impl FnMut(Arc<AgentSession>) + Send,
    mut on_close: impl FnMut(&str) + Send,
) where
    F: FnOnce(Envelope, String, serde_json::Value) -> Fut + Send,
    Fut: std::future::Future<Output = Result<(String, bool), ApiError>> + Send,
{
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // -- Handshake: hello -> auth challenge -> auth -> auth_ok/auth_err ----
    let hello = match tokio::time::timeout(hello_timeout, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<Envelope>(&text) {
            Ok(env) if env.message_type() == Some(MessageType::Hello) => env,
            _ => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return;
            }
        },
        _ => {
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };

    let nonce = Uuid::new_v4().to_string();
    let challenge = Envelope::new(MessageType::Auth, Uuid::new_v4().to_string())
        .with_payload(serde_json::json!({ "nonce": nonce }));
    if ws_tx.send(Message::Text(serde_json::to_string(&challenge).unwrap_or_default().into())).await.is_err() {
        return;
    }

    let auth_frame = match tokio::time::timeout(hello_timeout, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<Envelope>(&text) {
            Ok(env) if env.message_type() == Some(MessageType::Auth) => env,
            _ => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return;
            }
        },
        _ => {
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };

    let (agent_id, approved) = match authenticate(hello, nonce, auth_frame.payload.clone()).await {
        Ok(result) => result,
        Err(e) => {
            let err = Envelope::new(MessageType::AuthErr, Uuid::new_v4().to_string())
                .with_payload(serde_json::json!({ "error": e.kind, "message": e.message }));
            let _ = ws_tx.send(Message::Text(serde_json::to_string(&err).unwrap_or_default().into())).await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let _ = auth_frame; // challenge is correlation-free; presence already validated above

    let ok = Envelope::new(MessageType::AuthOk, Uuid::new_v4().to_string());
    if ws_tx.send(Message::Text(serde_json::to_string(&ok).unwrap_or_default().into())).await.is_err() {
        return;
    }

    let session = Arc::new(AgentSession {
        agent_id: agent_id.clone(),
        session_id: Uuid::new_v4(),
        outbound_tx,
        pending: DashMap::new(),
        inflight: Semaphore::new(max_inflight),
        state: AtomicU8::new(SessionState::Running as u8),
        approved: AtomicBool::new(approved),
        cancel: CancellationToken::new(),
    });

    on_session(Arc::clone(&session));

    // -- Writer: drains the outbound queue; a socket has exactly one writer.
    let writer_cancel = session.cancel.clone();
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
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // -- Liveness: ping every heartbeat_interval; dead if nothing arrives
    // within liveness_timeout (§4.2).
    let liveness_session = Arc::clone(&session);
    let liveness = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = liveness_session.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let ping = Envelope::new(MessageType::Ping, Uuid::new_v4().to_string());
                    if liveness_session.send_envelope(&ping).is_err() {
                        liveness_session.cancel.cancel();
                        break;
                    }
                }
            }
        }
    });

    // -- Reader: decode frames, dispatch to correlation table, answer pings.
    let last_frame = Arc::new(tokio::sync::Mutex::new(tokio::time::Instant::now()));
    let reader_session = Arc::clone(&session);
    let reader_last_frame = Arc::clone(&last_frame);
    let reader_cancel = session.cancel.clone();
    let reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                frame = ws_rx.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            *reader_last_frame.lock().await = tokio::time::Instant::now();
                            let Ok(env) = serde_json::from_str::<Envelope>(&text) else {
                                tracing::debug!(agent_id = %reader_session.agent_id, "dropping malformed frame");
                                continue;
                            };
                            match env.message_type() {
                                Some(MessageType::Ping) => {
                                    let pong = Envelope::new(MessageType::Pong, Uuid::new_v4().to_string());
                                    let _ = reader_session.send_envelope(&pong);
                                }
                                Some(MessageType::Pong) | Some(MessageType::Heartbeat) => {}
                                Some(MessageType::RpcProgress) | Some(MessageType::RpcResponse) | Some(MessageType::RpcError) => {
                                    reader_session.dispatch_response(env);
                                }
                                Some(MessageType::Close) => {
                                    reader_cancel.cancel();
                                    break;
                                }
                                None => {
                                    tracing::debug!(agent_id = %reader_session.agent_id, kind = %env.kind, "ignoring unknown message type");
                                }
                                _ => {}
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            *reader_last_frame.lock().await = tokio::time::Instant::now();
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

    // -- Watchdog: declares the session dead if nothing has arrived within
    // liveness_timeout, independent of the ping cadence.
    let watchdog_cancel = session.cancel.clone();
    let watchdog_last_frame = Arc::clone(&last_frame);
    let watchdog = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = watchdog_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if watchdog_last_frame.lock().await.elapsed() > liveness_timeout {
                        watchdog_cancel.cancel();
                        break;
                    }
                }
            }
        }
    });

    session.cancel.cancelled().await;
    session.set_state(SessionState::Closing);
    session.fail_all_pending(ErrorKind::TransportClosed, "session closed");
    let _ = tokio::join!(reader, writer, liveness, watchdog);
    session.set_state(SessionState::Closed);
    on_close(&agent_id);
}
