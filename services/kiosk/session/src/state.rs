//! Session state machine values and transition events.

use std::fmt;
use std::time::Duration;

use crate::session::CloseInfo;

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No session and no retry pending
    #[default]
    Disconnected,
    /// A transport session is opening or awaiting the server's welcome
    Connecting,
    /// Socket open and welcome observed
    Connected,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
}

impl SessionState {
    /// Lower-case name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted on every state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// Previous state
    pub from: SessionState,
    /// New state
    pub to: SessionState,
    /// Retry number (1-based), set when entering `Reconnecting`
    pub attempt: Option<u32>,
    /// Scheduled retry delay, set when entering `Reconnecting`
    pub delay: Option<Duration>,
}

/// Payload of `on_reconnecting`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectInfo {
    /// Retry number (1-based)
    pub attempt: u32,
    /// Delay before the retry fires
    pub delay: Duration,
}

/// Read-only snapshot of the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Current state
    pub state: SessionState,
    /// Consecutive failed attempts since the last successful connection
    pub reconnect_attempts: u32,
    /// Number of transport sessions opened so far
    pub epoch: u64,
    /// How the most recent session ended
    pub last_close: Option<CloseInfo>,
}
