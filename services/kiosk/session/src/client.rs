//! Client façade.
//!
//! [`KioskClient`] is a cheap, cloneable handle to a supervisor task. Several
//! clients can coexist in one process; they share nothing.

use kiosk_wire::CommandType;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::dispatcher::{CommandDispatcher, CommandHandler, CommandRegistry};
use crate::error::{ClientStopped, SendError};
use crate::observer::{ClientObserver, ObserverSet};
use crate::state::{SessionState, Status};
use crate::supervisor::{Control, Supervisor};
use crate::transport::{Connector, WebSocketConnector};

/// Builder for [`KioskClient`]
pub struct KioskClientBuilder {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    registry: CommandRegistry,
    observers: ObserverSet,
    rng_seed: Option<u64>,
}

impl KioskClientBuilder {
    /// Use `connector` instead of the WebSocket connector
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Register the handler for `command_type`
    pub fn handler<H>(mut self, command_type: CommandType, handler: H) -> Self
    where
        H: CommandHandler + 'static,
    {
        self.registry.register(command_type, Arc::new(handler));
        self
    }

    /// Handler for command types without a dedicated handler
    pub fn fallback<H>(mut self, handler: H) -> Self
    where
        H: CommandHandler + 'static,
    {
        self.registry.set_fallback(Arc::new(handler));
        self
    }

    /// Register an observer
    pub fn observer<O>(mut self, observer: Arc<O>) -> Self
    where
        O: ClientObserver + 'static,
    {
        self.observers.push(observer);
        self
    }

    /// Seed the backoff jitter for reproducible delays
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Spawn the supervisor on the current tokio runtime.
    ///
    /// The client starts `Disconnected`; call [`KioskClient::connect`].
    pub fn spawn(self) -> KioskClient {
        let backoff = match self.rng_seed {
            Some(seed) => Backoff::with_seed(self.config.backoff.clone(), seed),
            None => Backoff::new(self.config.backoff.clone()),
        };
        let observers = Arc::new(self.observers);
        let dispatcher = CommandDispatcher::new(self.registry, observers.clone());

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::default());

        let supervisor = Supervisor::new(
            self.config,
            self.connector,
            dispatcher,
            observers,
            backoff,
            control_rx,
            status_tx,
        );
        tokio::spawn(supervisor.run());

        KioskClient {
            control_tx,
            status_rx,
        }
    }
}

/// Handle to a running kiosk client
#[derive(Clone, Debug)]
pub struct KioskClient {
    control_tx: mpsc::UnboundedSender<Control>,
    status_rx: watch::Receiver<Status>,
}

impl KioskClient {
    /// Start building a client for `config`
    pub fn builder(config: ClientConfig) -> KioskClientBuilder {
        KioskClientBuilder {
            config,
            connector: Arc::new(WebSocketConnector::new()),
            registry: CommandRegistry::new(),
            observers: ObserverSet::new(),
            rng_seed: None,
        }
    }

    fn request(&self, control: Control) -> Result<(), ClientStopped> {
        self.control_tx.send(control).map_err(|_| ClientStopped)
    }

    /// Start connecting; ignored unless `Disconnected`
    pub fn connect(&self) -> Result<(), ClientStopped> {
        self.request(Control::Connect)
    }

    /// Close the session cleanly and cancel any pending retry
    pub fn disconnect(&self) -> Result<(), ClientStopped> {
        self.request(Control::Disconnect)
    }

    /// Drop the current session and connect again immediately, with the
    /// reconnect counter reset
    pub fn force_reconnect(&self) -> Result<(), ClientStopped> {
        self.request(Control::ForceReconnect)
    }

    /// Send an arbitrary JSON message; fails unless `Connected`.
    ///
    /// Messages are never queued: at most once per connection epoch.
    pub async fn send(&self, message: Value) -> Result<(), SendError> {
        let (reply, response) = oneshot::channel();
        self.request(Control::Send { message, reply })?;
        response.await.map_err(|_| ClientStopped)?
    }

    /// Current status snapshot
    pub fn status(&self) -> Status {
        self.status_rx.borrow().clone()
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.status_rx.borrow().state
    }

    /// Receiver of status snapshots
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    /// Wait until `state` is observed
    pub async fn wait_for_state(&self, state: SessionState) -> Result<Status, ClientStopped> {
        let mut rx = self.status_rx.clone();
        let status = rx
            .wait_for(|status| status.state == state)
            .await
            .map_err(|_| ClientStopped)?;
        Ok(status.clone())
    }

    /// Disconnect and stop the supervisor task
    pub async fn shutdown(&self) -> Result<(), ClientStopped> {
        let (done, stopped) = oneshot::channel();
        self.request(Control::Shutdown { done })?;
        stopped.await.map_err(|_| ClientStopped)?;
        debug!("Kiosk client shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnector;
    use std::time::Duration;

    fn config(identity: &str) -> ClientConfig {
        ClientConfig {
            endpoint: "ws://kiosk.test/ws/display".to_string(),
            identity: identity.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let (connector, _peers) = MemoryConnector::new();
        let client = KioskClient::builder(config("lobby-1"))
            .connector(connector)
            .spawn();

        assert_eq!(client.status(), Status::default());
        assert!(matches!(
            client.send(serde_json::json!({"type": "ping"})).await,
            Err(SendError::NotConnected(SessionState::Disconnected))
        ));
    }

    #[tokio::test]
    async fn test_independent_clients() {
        let (first_connector, _first_peers) = MemoryConnector::new();
        let (second_connector, _second_peers) = MemoryConnector::new();
        let first = KioskClient::builder(config("a")).connector(first_connector).spawn();
        let second = KioskClient::builder(config("b")).connector(second_connector).spawn();

        first.connect().unwrap();
        first.wait_for_state(SessionState::Connecting).await.unwrap();
        assert_eq!(second.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_requests_fail_after_shutdown() {
        let (connector, _peers) = MemoryConnector::new();
        let client = KioskClient::builder(config("lobby-1"))
            .connector(connector)
            .spawn();
        let other = client.clone();

        client.shutdown().await.unwrap();
        assert_eq!(other.connect(), Err(ClientStopped));
        assert!(matches!(
            other.send(Value::Null).await,
            Err(SendError::Stopped(ClientStopped))
        ));
    }
}
