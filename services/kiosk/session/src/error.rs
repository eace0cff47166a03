//! Error types for the session crate.

use kiosk_wire::WireError;
use thiserror::Error;

use crate::state::SessionState;

/// Invalid client configuration; fatal to starting a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No device identity supplied
    #[error("device identity is missing")]
    MissingIdentity,

    /// Identity contains whitespace or control characters
    #[error("device identity {0:?} contains whitespace or control characters")]
    InvalidIdentity(String),

    /// Heartbeat interval of zero
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeat,

    /// Backoff parameters out of range
    #[error("invalid backoff: {0}")]
    Backoff(String),
}

/// Failures of the underlying transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// Endpoint could not be turned into a connection URL
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidAddress {
        /// Endpoint as configured
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// Connection attempt refused or unreachable
    #[error("connect failed: {0}")]
    Connect(String),

    /// WebSocket protocol or I/O failure
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection is gone
    #[error("connection closed")]
    Closed,
}

/// Failure to send a message
#[derive(Error, Debug)]
pub enum SendError {
    /// Client is not in the `Connected` state
    #[error("not connected (state: {0})")]
    NotConnected(SessionState),

    /// The transport session is not open
    #[error("transport session is not open")]
    NotOpen,

    /// Message could not be encoded
    #[error(transparent)]
    Encode(#[from] WireError),

    /// Supervisor task has stopped
    #[error(transparent)]
    Stopped(#[from] ClientStopped),
}

/// The supervisor task is no longer running
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("kiosk client has stopped")]
pub struct ClientStopped;

/// Failure reported by a command handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Create a handler error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
