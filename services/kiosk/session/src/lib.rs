//! Reconnecting control session for kiosk displays.
//!
//! This crate holds the connection-resilience and command-dispatch core of
//! the kiosk client: a transport session per connection epoch, exponential
//! backoff with jitter between attempts, a heartbeat while connected, and
//! acknowledgment of every server command. Rendering, pairing and speech are
//! external collaborators that subscribe through [`ClientObserver`] and
//! register [`CommandHandler`]s.
//!
//! ## Features
//!
//! - **Session state machine**: `Disconnected`, `Connecting`, `Connected`, `Reconnecting`
//! - **Backoff**: capped exponential delay with symmetric jitter, retried forever
//! - **Heartbeat**: fixed-interval liveness ping, only while connected
//! - **Dispatch**: commands routed by type, acked `completed` or `failed`
//! - **Transports**: WebSocket via `tokio-tungstenite`, in-memory behind the `test-util` feature
//!
//! ## Example
//!
//! ```rust,no_run
//! use kiosk_session::{ClientConfig, HandlerError, KioskClient, SessionState};
//! use kiosk_wire::{Command, CommandType};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::new("wss://control.example/ws/display", "lobby-1");
//!
//! let client = KioskClient::builder(config)
//!     .handler(CommandType::DisplayScene, |command: &Command| -> Result<(), HandlerError> {
//!         println!("Rendering {}", command.parameters);
//!         Ok(())
//!     })
//!     .spawn();
//!
//! client.connect()?;
//! client.wait_for_state(SessionState::Connected).await?;
//! client.send(serde_json::json!({"type": "status", "scene": "idle"})).await?;
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod observer;
pub mod session;
pub mod state;
mod supervisor;
pub mod transport;

// Re-export main types
pub use backoff::{capped_delay, next_delay, Backoff};
pub use client::{KioskClient, KioskClientBuilder};
pub use config::{BackoffConfig, ClientConfig};
pub use dispatcher::{CommandDispatcher, CommandHandler, CommandRegistry, Dispatched};
pub use error::{ClientStopped, ConfigError, HandlerError, SendError, TransportError};
pub use keepalive::HeartbeatMonitor;
pub use observer::{ClientObserver, ErrorEvent, ErrorKind, ObserverSet};
pub use session::{
    CloseInfo, CloseKind, CloseReason, EnvelopeSink, SessionEvent, SessionStats, TransportEvent,
    TransportSession,
};
pub use state::{ReconnectInfo, SessionState, StateTransition, Status};
pub use transport::{Connector, Frame, FrameSink, FrameStream, WebSocketConnector};
#[cfg(any(test, feature = "test-util"))]
pub use transport::{MemoryConnector, MemoryPeer};
