//! Inbound message dispatch.
//!
//! Every raw text message from the current session passes through
//! [`CommandDispatcher::dispatch`]. Commands are routed to the handler
//! registered for their type, or to the fallback, and acknowledged through
//! the session right after the handler returns.

use kiosk_wire::{AckStatus, ClientMessage, Command, CommandType, ServerMessage, Welcome};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::HandlerError;
use crate::observer::ObserverSet;
use crate::session::EnvelopeSink;

/// Business logic for one command type.
///
/// Handlers run synchronously on the supervisor task and must not block.
pub trait CommandHandler: Send + Sync {
    /// Handle a command
    fn handle(&self, command: &Command) -> Result<(), HandlerError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&Command) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, command: &Command) -> Result<(), HandlerError> {
        self(command)
    }
}

fn ignore_command(command: &Command) -> Result<(), HandlerError> {
    debug!(
        "No handler for command type {}; ignoring {}",
        command.command_type, command.command_id
    );
    Ok(())
}

/// Handlers keyed by command type, plus a fallback
#[derive(Clone)]
pub struct CommandRegistry {
    handlers: HashMap<CommandType, Arc<dyn CommandHandler>>,
    fallback: Arc<dyn CommandHandler>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("handlers", &types)
            .finish()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(ignore_command),
        }
    }
}

impl CommandRegistry {
    /// Empty registry with a no-op fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `command_type`, replacing any previous one
    pub fn register(&mut self, command_type: CommandType, handler: Arc<dyn CommandHandler>) {
        if self.handlers.insert(command_type.clone(), handler).is_some() {
            debug!("Replaced handler for {}", command_type);
        }
    }

    /// Replace the fallback handler
    pub fn set_fallback(&mut self, handler: Arc<dyn CommandHandler>) {
        self.fallback = handler;
    }

    /// Handler for `command_type`, or the fallback
    pub fn resolve(&self, command_type: &CommandType) -> &Arc<dyn CommandHandler> {
        self.handlers.get(command_type).unwrap_or(&self.fallback)
    }

    /// Whether a dedicated handler exists
    pub fn contains(&self, command_type: &CommandType) -> bool {
        self.handlers.contains_key(command_type)
    }
}

/// Outcome of dispatching one raw message
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Server handshake
    Welcome(Welcome),
    /// A command was handled and an ack attempted
    Command {
        /// Command id echoed in the ack
        command_id: String,
        /// Status reported in the ack
        status: AckStatus,
        /// Whether the ack reached the session
        acked: bool,
    },
    /// Liveness echo
    HeartbeatAck,
    /// Valid message of an unknown type
    Unrecognized(String),
    /// Undecodable message, dropped
    Malformed,
}

/// Routes inbound messages and acknowledges commands
#[derive(Debug)]
pub struct CommandDispatcher {
    registry: CommandRegistry,
    observers: Arc<ObserverSet>,
}

impl CommandDispatcher {
    /// Create a dispatcher
    pub fn new(registry: CommandRegistry, observers: Arc<ObserverSet>) -> Self {
        Self {
            registry,
            observers,
        }
    }

    /// Decode and route one raw message, acking commands through `sink`.
    ///
    /// Never fails: malformed input is logged and dropped, handler failures
    /// and panics turn into `failed` acks.
    pub fn dispatch(&self, raw: &str, sink: &dyn EnvelopeSink) -> Dispatched {
        let message = match ServerMessage::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                trace!("Malformed payload: {}", raw);
                return Dispatched::Malformed;
            }
        };

        match message {
            ServerMessage::Connected(welcome) => Dispatched::Welcome(welcome),
            ServerMessage::Command(command) => self.run_command(command, sink),
            ServerMessage::HeartbeatAck { timestamp } => {
                trace!("Heartbeat acknowledged (timestamp: {:?})", timestamp);
                Dispatched::HeartbeatAck
            }
            ServerMessage::Unrecognized { kind } => {
                debug!("Ignoring message of unrecognized type {:?}", kind);
                Dispatched::Unrecognized(kind)
            }
        }
    }

    fn run_command(&self, command: Command, sink: &dyn EnvelopeSink) -> Dispatched {
        debug!(
            "Dispatching command {} ({})",
            command.command_id, command.command_type
        );
        self.observers.command(&command);

        let handler = self.registry.resolve(&command.command_type);
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(&command)));

        let (status, ack) = match outcome {
            Ok(Ok(())) => (
                AckStatus::Completed,
                ClientMessage::ack(command.command_id.clone(), AckStatus::Completed),
            ),
            Ok(Err(e)) => {
                warn!("Command {} failed: {}", command.command_id, e);
                (
                    AckStatus::Failed,
                    ClientMessage::ack_failed(command.command_id.clone(), e.to_string()),
                )
            }
            Err(_) => {
                warn!(
                    "Handler for {} panicked on command {}",
                    command.command_type, command.command_id
                );
                (
                    AckStatus::Failed,
                    ClientMessage::ack_failed(command.command_id.clone(), "handler panicked"),
                )
            }
        };

        // Fire and forget: a lost ack is never retried
        let acked = match sink.send_envelope(&ack) {
            Ok(()) => true,
            Err(e) => {
                debug!("Ack for {} dropped: {}", command.command_id, e);
                false
            }
        };

        Dispatched::Command {
            command_id: command.command_id,
            status,
            acked,
        }
    }
}
