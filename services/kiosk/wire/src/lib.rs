//! JSON wire protocol for the kiosk control connection.
//!
//! This crate defines the messages exchanged between a display client and
//! its control server, together with their decoding and encoding rules. It
//! performs no I/O; the session crate moves these messages over a socket.
//!
//! ## Messages
//!
//! | direction | type | fields |
//! |---|---|---|
//! | server → client | `connected` | `device_id`, `message` |
//! | server → client | `command` | `command_id`, `command_type`, `parameters` |
//! | server → client | `heartbeat_ack` | `timestamp` |
//! | client → server | `ack` | `command_id`, `status` |
//! | client → server | `heartbeat` | |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod close;
pub mod command;
pub mod error;
pub mod message;

// Re-export main types
pub use command::{Command, CommandType};
pub use error::WireError;
pub use message::{AckStatus, ClientMessage, ServerMessage, Welcome};
