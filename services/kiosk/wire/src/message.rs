//! Messages exchanged over the control connection.
//!
//! Every message is a JSON object discriminated by its `type` field.
//!
//! ```text
//! server -> client   connected      { device_id, message }
//!                    command        { command_id, command_type, parameters }
//!                    heartbeat_ack  { timestamp }
//! client -> server   ack            { command_id, status, detail? }
//!                    heartbeat      { }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::command::Command;
use crate::error::WireError;

/// Handshake sent by the server once it has accepted the connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Identity the server registered this connection under
    #[serde(default)]
    pub device_id: Option<String>,
    /// Free-form greeting
    #[serde(default)]
    pub message: Option<String>,
}

/// Messages sent by the control server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Handshake acknowledged; the session is live
    Connected(Welcome),
    /// Instruction that must be acknowledged
    Command(Command),
    /// Optional echo of a heartbeat, informational only
    HeartbeatAck {
        /// Server timestamp, in whatever shape the server sent it
        timestamp: Option<Value>,
    },
    /// Well-formed message with a type this client does not know
    Unrecognized {
        /// Value of the `type` field
        kind: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedServerMessage {
    Connected {
        #[serde(default)]
        device_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Command(Command),
    HeartbeatAck {
        #[serde(default)]
        timestamp: Option<Value>,
    },
}

impl From<TaggedServerMessage> for ServerMessage {
    fn from(value: TaggedServerMessage) -> Self {
        match value {
            TaggedServerMessage::Connected { device_id, message } => {
                ServerMessage::Connected(Welcome { device_id, message })
            }
            TaggedServerMessage::Command(command) => ServerMessage::Command(command),
            TaggedServerMessage::HeartbeatAck { timestamp } => {
                ServerMessage::HeartbeatAck { timestamp }
            }
        }
    }
}

const KNOWN_SERVER_TYPES: [&str; 3] = ["connected", "command", "heartbeat_ack"];

impl ServerMessage {
    /// Decode a raw text frame
    pub fn decode(raw: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(raw).map_err(WireError::Json)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(WireError::MissingType)?
            .to_string();

        if !KNOWN_SERVER_TYPES.contains(&kind.as_str()) {
            trace!("Unrecognized message type {:?}", kind);
            return Ok(ServerMessage::Unrecognized { kind });
        }

        serde_json::from_value::<TaggedServerMessage>(value)
            .map(ServerMessage::from)
            .map_err(|source| WireError::Invalid { kind, source })
    }

    /// Wire name of this message's type
    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::Connected(_) => "connected",
            ServerMessage::Command(_) => "command",
            ServerMessage::HeartbeatAck { .. } => "heartbeat_ack",
            ServerMessage::Unrecognized { kind } => kind,
        }
    }
}

/// Outcome reported in an acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// The command was carried out
    Completed,
    /// The handler reported a failure
    Failed,
}

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Command receipt confirmation
    Ack {
        /// Echo of the command's id
        command_id: String,
        /// Handler outcome
        status: AckStatus,
        /// Failure detail, omitted on success
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Liveness ping
    Heartbeat,
}

impl ClientMessage {
    /// Acknowledgment without detail
    pub fn ack(command_id: impl Into<String>, status: AckStatus) -> Self {
        ClientMessage::Ack {
            command_id: command_id.into(),
            status,
            detail: None,
        }
    }

    /// Failed acknowledgment carrying the handler's reason
    pub fn ack_failed(command_id: impl Into<String>, detail: impl Into<String>) -> Self {
        ClientMessage::Ack {
            command_id: command_id.into(),
            status: AckStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }
}
