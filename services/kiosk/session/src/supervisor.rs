//! Reconnection supervisor.
//!
//! The supervisor is a single task owning every piece of mutable client
//! state: the session state machine, the current transport session, the
//! reconnect counter and both timers. Handles talk to it over a control
//! channel; sessions report over an event channel tagged with their epoch.
//!
//! ```text
//! Disconnected --connect--> Connecting --welcome--> Connected
//!      ^                      |    ^                    |
//!      |              abnormal|    |retry fires         |abnormal close
//!      |                 close v    |                    v
//!      +----disconnect---- Reconnecting <---------------+
//! ```

use kiosk_wire::{ClientMessage, Welcome};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, trace, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::dispatcher::{CommandDispatcher, Dispatched};
use crate::error::SendError;
use crate::handshake::welcome_matches;
use crate::keepalive::HeartbeatMonitor;
use crate::observer::{ErrorEvent, ObserverSet};
use crate::session::{
    CloseInfo, CloseReason, EnvelopeSink, SessionEvent, SessionStats, TransportEvent,
    TransportSession,
};
use crate::state::{ReconnectInfo, SessionState, StateTransition, Status};
use crate::transport::Connector;

/// Requests from client handles
#[derive(Debug)]
pub(crate) enum Control {
    Connect,
    Disconnect,
    ForceReconnect,
    Send {
        message: Value,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

pub(crate) struct Supervisor {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    dispatcher: CommandDispatcher,
    observers: Arc<ObserverSet>,
    backoff: Backoff,

    state: SessionState,
    reconnect_attempts: u32,
    epoch: u64,
    last_close: Option<CloseInfo>,
    session: Option<TransportSession>,
    stats: SessionStats,

    retry: Option<Pin<Box<Sleep>>>,
    heartbeat: HeartbeatMonitor,

    control_rx: mpsc::UnboundedReceiver<Control>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    status_tx: watch::Sender<Status>,
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending::<()>().await,
    }
}

impl Supervisor {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        dispatcher: CommandDispatcher,
        observers: Arc<ObserverSet>,
        backoff: Backoff,
        control_rx: mpsc::UnboundedReceiver<Control>,
        status_tx: watch::Sender<Status>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval);

        Self {
            config,
            connector,
            dispatcher,
            observers,
            backoff,
            state: SessionState::Disconnected,
            reconnect_attempts: 0,
            epoch: 0,
            last_close: None,
            session: None,
            stats: SessionStats::default(),
            retry: None,
            heartbeat,
            control_rx,
            events_tx,
            events_rx,
            status_tx,
        }
    }

    /// Run until shut down or every handle is dropped
    pub(crate) async fn run(mut self) {
        info!(
            "Kiosk supervisor started for device {} ({})",
            self.config.identity, self.config.endpoint
        );

        loop {
            tokio::select! {
                biased;

                control = self.control_rx.recv() => match control {
                    Some(Control::Shutdown { done }) => {
                        self.stop();
                        self.control_rx.close();
                        let _ = done.send(());
                        break;
                    }
                    Some(control) => self.handle_control(control),
                    None => {
                        debug!("All client handles dropped");
                        self.stop();
                        break;
                    }
                },

                Some(event) = self.events_rx.recv() => self.handle_event(event),

                _ = wait_retry(&mut self.retry) => {
                    self.retry = None;
                    self.retry_fired();
                }

                _ = self.heartbeat.tick() => self.send_heartbeat(),
            }
        }

        info!("Kiosk supervisor stopped");
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Connect => self.connect(),
            Control::Disconnect => self.stop(),
            Control::ForceReconnect => self.force_reconnect(),
            Control::Send { message, reply } => {
                let result = self.send(message);
                if reply.send(result).is_err() {
                    trace!("Send caller went away before the reply");
                }
            }
            // Handled by the run loop
            Control::Shutdown { .. } => {}
        }
    }

    fn connect(&mut self) {
        if self.state != SessionState::Disconnected {
            debug!("Connect ignored while {}", self.state);
            return;
        }
        if !self.config_is_valid() {
            return;
        }
        self.reconnect_attempts = 0;
        self.open_session();
    }

    fn force_reconnect(&mut self) {
        info!("Forced reconnect requested while {}", self.state);
        self.cancel_timers();
        self.close_current(CloseReason::going_away());

        if !self.config_is_valid() {
            self.transition(SessionState::Disconnected, None);
            return;
        }
        self.reconnect_attempts = 0;
        self.open_session();
    }

    /// Explicit disconnect: cancel timers, close cleanly, go idle
    fn stop(&mut self) {
        self.cancel_timers();
        self.close_current(CloseReason::normal());
        self.reconnect_attempts = 0;
        if self.state != SessionState::Disconnected {
            info!("Disconnected");
        }
        self.transition(SessionState::Disconnected, None);
    }

    fn send(&mut self, message: Value) -> Result<(), SendError> {
        if self.state != SessionState::Connected {
            return Err(SendError::NotConnected(self.state));
        }
        let session = self.session.as_ref().ok_or(SendError::NotOpen)?;
        session.send(message.to_string())?;
        self.stats.messages_out += 1;
        Ok(())
    }

    fn config_is_valid(&self) -> bool {
        match self.config.validate() {
            Ok(()) => true,
            Err(e) => {
                error!("Invalid client configuration: {}", e);
                self.observers.error(&ErrorEvent::configuration(e.to_string()));
                false
            }
        }
    }

    fn cancel_timers(&mut self) {
        if self.retry.take().is_some() {
            debug!("Cancelled pending retry");
        }
        self.heartbeat.stop();
    }

    fn open_session(&mut self) {
        self.epoch += 1;
        self.stats = SessionStats::default();
        self.session = Some(TransportSession::open(
            self.epoch,
            self.connector.clone(),
            &self.config.endpoint,
            &self.config.identity,
            self.events_tx.clone(),
        ));
        self.transition(SessionState::Connecting, None);
    }

    /// Close the owned session on our own initiative
    fn close_current(&mut self, reason: CloseReason) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let info = CloseInfo::clean(reason.code, reason.reason.clone());
        session.close(reason);
        self.stats.log_summary(session.epoch());
        self.last_close = Some(info.clone());
        self.observers.disconnected(&info);
    }

    fn handle_event(&mut self, event: SessionEvent) {
        if event.epoch != self.epoch || self.session.is_none() {
            trace!("Ignoring {:?} from superseded epoch {}", event.kind, event.epoch);
            return;
        }

        match event.kind {
            TransportEvent::Opened => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_open();
                }
                debug!("Epoch {} open, awaiting welcome", self.epoch);
            }
            TransportEvent::Message(text) => self.handle_message(&text),
            TransportEvent::Error(message) => {
                self.observers.error(&ErrorEvent::transport(message));
            }
            TransportEvent::Closed(info) => self.session_closed(info),
        }
    }

    fn handle_message(&mut self, text: &str) {
        self.stats.messages_in += 1;
        let Some(session) = self.session.as_ref() else {
            return;
        };

        match self.dispatcher.dispatch(text, session) {
            Dispatched::Welcome(welcome) => self.welcome(welcome),
            Dispatched::Command { status, acked, .. } => {
                if acked {
                    self.stats.messages_out += 1;
                    match status {
                        kiosk_wire::AckStatus::Completed => self.stats.commands_completed += 1,
                        kiosk_wire::AckStatus::Failed => self.stats.commands_failed += 1,
                    }
                } else {
                    self.stats.acks_dropped += 1;
                }
            }
            Dispatched::HeartbeatAck | Dispatched::Unrecognized(_) | Dispatched::Malformed => {}
        }
    }

    fn welcome(&mut self, welcome: Welcome) {
        match self.state {
            SessionState::Connecting => {
                // The server owns identity assignment; a mismatch is only reported
                if !welcome_matches(&welcome, &self.config.identity) {
                    warn!(
                        "Welcome names device {:?}, connected as {:?}",
                        welcome.device_id, self.config.identity
                    );
                }
                self.reconnect_attempts = 0;
                self.stats.connected_at = Some(Instant::now());
                info!(
                    "Connected as {} (epoch {}, heartbeat every {:?}){}",
                    self.config.identity,
                    self.epoch,
                    self.heartbeat.period(),
                    welcome
                        .message
                        .as_deref()
                        .map(|m| format!(": {}", m))
                        .unwrap_or_default()
                );
                self.transition(SessionState::Connected, None);
                self.observers.connected(&welcome);
            }
            SessionState::Connected => debug!("Duplicate welcome ignored"),
            other => warn!("Welcome received while {}; ignoring", other),
        }
    }

    fn session_closed(&mut self, info: CloseInfo) {
        self.heartbeat.stop();
        if let Some(session) = self.session.take() {
            self.stats.log_summary(session.epoch());
        }
        info!(
            "Session epoch {} closed: {} {} ({:?})",
            self.epoch, info.code, info.reason, info.kind
        );
        self.last_close = Some(info.clone());
        self.observers.disconnected(&info);

        if info.is_clean() {
            self.transition(SessionState::Disconnected, None);
        } else {
            self.schedule_retry();
        }
    }

    fn schedule_retry(&mut self) {
        if self.retry.is_some() {
            debug!("Retry already pending; not scheduling another");
            return;
        }

        let delay = self.backoff.next_delay(self.reconnect_attempts);
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.retry = Some(Box::pin(sleep(delay)));

        let info = ReconnectInfo {
            attempt: self.reconnect_attempts,
            delay,
        };
        info!("Reconnecting in {:?} (attempt {})", delay, info.attempt);
        self.transition(SessionState::Reconnecting, Some(info));
        self.observers.reconnecting(&info);
    }

    fn retry_fired(&mut self) {
        if self.state != SessionState::Reconnecting {
            debug!("Retry fired while {}; ignoring", self.state);
            return;
        }
        debug!("Retry {} firing", self.reconnect_attempts);
        self.open_session();
    }

    fn send_heartbeat(&mut self) {
        if self.state != SessionState::Connected {
            self.heartbeat.stop();
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        match session.send_envelope(&ClientMessage::Heartbeat) {
            Ok(()) => {
                trace!("Heartbeat sent on epoch {}", self.epoch);
                self.stats.heartbeats_sent += 1;
                self.stats.messages_out += 1;
            }
            Err(e) => debug!("Heartbeat not sent: {}", e),
        }
    }

    /// The only place `state` changes
    fn transition(&mut self, to: SessionState, reconnect: Option<ReconnectInfo>) {
        let from = self.state;
        self.state = to;

        if to == SessionState::Connected {
            self.heartbeat.start();
        } else {
            self.heartbeat.stop();
        }

        self.publish();
        if from != to {
            debug!("State {} -> {}", from, to);
            self.observers.state_changed(&StateTransition {
                from,
                to,
                attempt: reconnect.map(|r| r.attempt),
                delay: reconnect.map(|r| r.delay),
            });
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(Status {
            state: self.state,
            reconnect_attempts: self.reconnect_attempts,
            epoch: self.epoch,
            last_close: self.last_close.clone(),
        });
    }
}
