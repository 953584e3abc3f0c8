//! Engine.IO v4 / Socket.IO v5 text packet codec
//!
//! Engine.IO frames carry one packet each: a single type digit followed by an
//! optional payload. Socket.IO packets travel inside Engine.IO `message`
//! packets:
//!
//! ```text
//! <type>[<attachments>-][<namespace>,][<ack id>][<json>]
//! 42["score_processing_progress",{"progress":41.6,"processed":5,"total":12}]
//! ```
//!
//! Binary attachments are not used by the backend and are not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::ChannelError;

/// Default namespace
pub const DEFAULT_NAMESPACE: &str = "/";

/// Upper bound on the silence tolerated from the server
pub const MAX_LIVENESS: Duration = Duration::from_secs(600);

/// Engine.IO open handshake payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Server ping period (ms)
    pub ping_interval: u64,
    /// Grace period after a missed ping (ms)
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// How long the connection may stay silent before it counts as dead
    ///
    /// Server-advertised values are untrusted and capped at [`MAX_LIVENESS`].
    pub fn liveness_timeout(&self) -> Duration {
        let millis = self.ping_interval.saturating_add(self.ping_timeout);
        Duration::from_millis(millis).min(MAX_LIVENESS)
    }
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, ChannelError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ChannelError::Protocol("empty Engine.IO packet".to_string()))?;
        let body = chars.as_str();

        match kind {
            '0' => {
                let handshake = serde_json::from_str(body)
                    .map_err(|e| ChannelError::Handshake(format!("bad open packet: {}", e)))?;
                Ok(EnginePacket::Open(handshake))
            }
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => Ok(EnginePacket::Message(body.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ChannelError::Protocol(format!(
                "unknown Engine.IO packet type '{}'",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // Serializing a plain struct of strings and integers cannot fail
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        args: Vec<Value>,
        ack_id: Option<u64>,
    },
    Ack {
        namespace: String,
        ack_id: Option<u64>,
        data: Option<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Event on the default namespace
    pub fn event(name: &str, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            name: name.to_string(),
            args,
            ack_id: None,
        }
    }

    /// Namespace connect request for the default namespace
    pub fn connect() -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Decode the body of an Engine.IO `message` packet
    pub fn decode(text: &str) -> Result<Self, ChannelError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| ChannelError::Protocol(format!("bad Socket.IO packet: {:?}", text)))?;
        let mut rest = chars.as_str();

        if matches!(kind, 5 | 6) {
            return Err(ChannelError::Protocol(
                "binary Socket.IO packets are not supported".to_string(),
            ));
        }

        let mut namespace = DEFAULT_NAMESPACE.to_string();
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    namespace = rest[..idx].to_string();
                    rest = &rest[idx + 1..];
                }
                None => {
                    namespace = rest.to_string();
                    rest = "";
                }
            }
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|e| ChannelError::Protocol(format!("bad ack id: {}", e)))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(rest)
                    .map_err(|e| ChannelError::Protocol(format!("bad packet payload: {}", e)))?,
            )
        };

        match kind {
            0 => Ok(SocketPacket::Connect { namespace, data }),
            1 => Ok(SocketPacket::Disconnect { namespace }),
            2 => {
                let mut args = match data {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(ChannelError::Protocol(
                            "event payload must be a JSON array".to_string(),
                        ))
                    }
                };
                if args.is_empty() {
                    return Err(ChannelError::Protocol("event without a name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(ChannelError::Protocol(format!(
                            "event name must be a string, got {}",
                            other
                        )))
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    name,
                    args,
                    ack_id,
                })
            }
            3 => Ok(SocketPacket::Ack {
                namespace,
                ack_id,
                data,
            }),
            4 => Ok(SocketPacket::ConnectError { namespace, data }),
            other => Err(ChannelError::Protocol(format!(
                "unknown Socket.IO packet type {}",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        fn prefix(kind: u8, namespace: &str) -> String {
            if namespace == DEFAULT_NAMESPACE {
                kind.to_string()
            } else {
                format!("{}{},", kind, namespace)
            }
        }

        match self {
            SocketPacket::Connect { namespace, data } => {
                let mut out = prefix(0, namespace);
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
            SocketPacket::Disconnect { namespace } => prefix(1, namespace),
            SocketPacket::Event {
                namespace,
                name,
                args,
                ack_id,
            } => {
                let mut out = prefix(2, namespace);
                if let Some(id) = ack_id {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&Value::Array(items).to_string());
                out
            }
            SocketPacket::Ack {
                namespace,
                ack_id,
                data,
            } => {
                let mut out = prefix(3, namespace);
                if let Some(id) = ack_id {
                    out.push_str(&id.to_string());
                }
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
            SocketPacket::ConnectError { namespace, data } => {
                let mut out = prefix(4, namespace);
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
        }
    }

    /// Wrap in an Engine.IO message frame
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}
