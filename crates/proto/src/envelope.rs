// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

/// A single control-plane frame.
///
/// `id` is assigned by whichever side originates the message (the server for
/// server→agent frames, the agent for agent→server frames). `correlation_id`
/// is set on replies and progress frames and equals the `id` of the frame
/// being answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: MessageType, id: impl Into<String>) -> Self {
        Self { kind: kind.as_str().to_owned(), id: id.into(), correlation_id: None, payload: serde_json::Value::Null }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Parse `kind` into a known [`MessageType`], or `None` for a forward-compatible
    /// unknown type. Per the codec's compatibility rule, unknown types are logged and
    /// ignored by the caller rather than treated as a parse error.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::parse(&self.kind)
    }
}

/// Known control-plane message types. Any `type` string not covered here is
/// forward-compatible: the frame still deserializes (`Envelope::kind` holds
/// the raw string), but [`Envelope::message_type`] returns `None` and callers
/// log and ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Hello,
    Auth,
    AuthOk,
    AuthErr,
    Heartbeat,
    Ping,
    Pong,
    Register,
    Config,
    RpcRequest,
    RpcProgress,
    RpcResponse,
    RpcError,
    RpcCancel,
    Event,
    Close,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Auth => "auth",
            Self::AuthOk => "auth_ok",
            Self::AuthErr => "auth_err",
            Self::Heartbeat => "heartbeat",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Register => "register",
            Self::Config => "config",
            Self::RpcRequest => "rpc.request",
            Self::RpcProgress => "rpc.progress",
            Self::RpcResponse => "rpc.response",
            Self::RpcError => "rpc.error",
            Self::RpcCancel => "rpc.cancel",
            Self::Event => "event",
            Self::Close => "close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "hello" => Self::Hello,
            "auth" => Self::Auth,
            "auth_ok" => Self::AuthOk,
            "auth_err" => Self::AuthErr,
            "heartbeat" => Self::Heartbeat,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "register" => Self::Register,
            "config" => Self::Config,
            "rpc.request" => Self::RpcRequest,
            "rpc.progress" => Self::RpcProgress,
            "rpc.response" => Self::RpcResponse,
            "rpc.error" => Self::RpcError,
            "rpc.cancel" => Self::RpcCancel,
            "event" => Self::Event,
            "close" => Self::Close,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let env = Envelope::new(MessageType::RpcRequest, "srv-1")
            .with_payload(serde_json::json!({"method": "agent.scan"}));
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, "rpc.request");
        assert_eq!(back.message_type(), Some(MessageType::RpcRequest));
        assert_eq!(back.payload["method"], "agent.scan");
    }

    #[test]
    fn unknown_type_parses_but_has_no_message_type() {
        let json = r#"{"type":"future_frame","id":"1","payload":{}}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.message_type(), None);
        assert_eq!(env.kind, "future_frame");
    }

    #[test]
    fn correlation_id_defaults_to_none() {
        let json = r#"{"type":"ping","id":"1"}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert!(env.correlation_id.is_none());
        assert_eq!(env.payload, serde_json::Value::Null);
    }

    #[test]
    fn missing_id_fails_to_deserialize() {
        let json = r#"{"type":"ping"}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }
}
