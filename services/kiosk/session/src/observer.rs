//! Observer contract for the presentation layers.
//!
//! Rendering, pairing and speech live outside the core; they subscribe to
//! client events through [`ClientObserver`]. Observers run on the supervisor
//! task and are isolated from it: a panicking observer is logged and skipped.

use kiosk_wire::{Command, Welcome};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use crate::session::CloseInfo;
use crate::state::{ReconnectInfo, StateTransition};

/// Class of error reported through `on_error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration; no retry is scheduled
    Configuration,
    /// Transport failure; recovered by reconnecting
    Transport,
}

/// Payload of `on_error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Error class
    pub kind: ErrorKind,
    /// Description
    pub message: String,
}

impl ErrorEvent {
    /// Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Configuration,
            message: message.into(),
        }
    }

    /// Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.into(),
        }
    }
}

/// Trait for handling client events.
///
/// All methods default to no-ops so implementors only pick what they need.
pub trait ClientObserver: Send + Sync {
    /// Any state change
    fn on_state_change(&self, _transition: &StateTransition) {}
    /// Welcome received; the session is live
    fn on_connected(&self, _welcome: &Welcome) {}
    /// A session ended
    fn on_disconnected(&self, _info: &CloseInfo) {}
    /// A retry was scheduled
    fn on_reconnecting(&self, _info: &ReconnectInfo) {}
    /// A command arrived, before its handler runs
    fn on_command(&self, _command: &Command) {}
    /// Configuration or transport error
    fn on_error(&self, _error: &ErrorEvent) {}
}

/// Registered observers
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn ClientObserver>>,
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.observers.len())
            .finish()
    }
}

impl ObserverSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn push(&mut self, observer: Arc<dyn ClientObserver>) {
        self.observers.push(observer);
    }

    /// Number of observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn notify(&self, event: &str, f: impl Fn(&dyn ClientObserver)) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                warn!("Observer panicked while handling {}; continuing", event);
            }
        }
    }

    /// Notify a state change
    pub fn state_changed(&self, transition: &StateTransition) {
        self.notify("state change", |o| o.on_state_change(transition));
    }

    /// Notify a live session
    pub fn connected(&self, welcome: &Welcome) {
        self.notify("connected", |o| o.on_connected(welcome));
    }

    /// Notify a session end
    pub fn disconnected(&self, info: &CloseInfo) {
        self.notify("disconnected", |o| o.on_disconnected(info));
    }

    /// Notify a scheduled retry
    pub fn reconnecting(&self, info: &ReconnectInfo) {
        self.notify("reconnecting", |o| o.on_reconnecting(info));
    }

    /// Notify an inbound command
    pub fn command(&self, command: &Command) {
        self.notify("command", |o| o.on_command(command));
    }

    /// Notify an error
    pub fn error(&self, error: &ErrorEvent) {
        self.notify("error", |o| o.on_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Panicking;

    impl ClientObserver for Panicking {
        fn on_error(&self, _error: &ErrorEvent) {
            panic!("observer bug");
        }
    }

    #[derive(Default)]
    struct Counting {
        errors: AtomicUsize,
    }

    impl ClientObserver for Counting {
        fn on_error(&self, _error: &ErrorEvent) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let counting = Arc::new(Counting::default());
        let mut set = ObserverSet::new();
        set.push(Arc::new(Panicking));
        set.push(counting.clone());

        set.error(&ErrorEvent::transport("boom"));
        set.error(&ErrorEvent::configuration("bad identity"));

        assert_eq!(counting.errors.load(Ordering::SeqCst), 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_default_methods_are_noops() {
        struct Silent;
        impl ClientObserver for Silent {}

        let mut set = ObserverSet::new();
        assert!(set.is_empty());
        set.push(Arc::new(Silent));
        set.command(&Command::new("c1", "reload".into(), serde_json::Value::Null));
        set.connected(&Welcome::default());
    }
}
