//! Transport sessions.
//!
//! A [`TransportSession`] represents exactly one connection attempt and its
//! lifetime. It is created fresh per attempt and discarded on close. All I/O
//! runs on a pump task that reports back to the supervisor over a channel;
//! every report is tagged with the session's epoch so the supervisor can drop
//! events from superseded sessions.

use futures::{SinkExt, StreamExt};
use kiosk_wire::close::{ABNORMAL, GOING_AWAY, NORMAL};
use kiosk_wire::ClientMessage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{SendError, TransportError};
use crate::handshake::connection_url;
use crate::transport::{Connector, Frame};

/// Whether a close was requested by the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Requested by the owner through [`TransportSession::close`]
    Clean,
    /// Server close, network failure or protocol error
    Abnormal,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code
    pub code: u16,
    /// Close reason
    pub reason: String,
    /// Clean or abnormal
    pub kind: CloseKind,
}

impl CloseInfo {
    /// Close requested by the owner
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            kind: CloseKind::Clean,
        }
    }

    /// Close not requested by the owner
    pub fn abnormal(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            kind: CloseKind::Abnormal,
        }
    }

    /// Whether the owner requested the close
    pub fn is_clean(&self) -> bool {
        self.kind == CloseKind::Clean
    }
}

/// Code and reason sent with an owner-requested close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close code
    pub code: u16,
    /// Close reason
    pub reason: String,
}

impl CloseReason {
    /// Create a close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Explicit disconnect
    pub fn normal() -> Self {
        Self::new(NORMAL, "client disconnect")
    }

    /// Session replaced by a forced reconnect
    pub fn going_away() -> Self {
        Self::new(GOING_AWAY, "client reconnecting")
    }
}

/// Event reported by a session's pump task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transport established; the welcome is still pending
    Opened,
    /// Inbound text message
    Message(String),
    /// Transport error; always followed by `Closed`
    Error(String),
    /// Session ended; reported exactly once
    Closed(CloseInfo),
}

/// [`TransportEvent`] tagged with the epoch that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Epoch of the reporting session
    pub epoch: u64,
    /// What happened
    pub kind: TransportEvent,
}

/// Per-epoch counters, logged when the epoch ends
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Inbound messages
    pub messages_in: u64,
    /// Outbound messages
    pub messages_out: u64,
    /// Heartbeats sent
    pub heartbeats_sent: u64,
    /// Commands acknowledged as completed
    pub commands_completed: u64,
    /// Commands acknowledged as failed
    pub commands_failed: u64,
    /// Acks dropped because the session was gone
    pub acks_dropped: u64,
    /// When the welcome was observed
    pub connected_at: Option<Instant>,
}

impl SessionStats {
    /// Log a summary line for `epoch`
    pub fn log_summary(&self, epoch: u64) {
        let uptime = self
            .connected_at
            .map(|at| format!("{:?}", at.elapsed()))
            .unwrap_or_else(|| "never connected".to_string());
        info!(
            "Epoch {} ended: {} in, {} out, {} heartbeats, {} completed, {} failed, {} acks dropped, uptime {}",
            epoch,
            self.messages_in,
            self.messages_out,
            self.heartbeats_sent,
            self.commands_completed,
            self.commands_failed,
            self.acks_dropped,
            uptime
        );
    }
}

/// Anything an envelope can be sent through
pub trait EnvelopeSink {
    /// Encode and send one envelope
    fn send_envelope(&self, message: &ClientMessage) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Opening,
    Open,
    Closed,
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(CloseReason),
}

/// One connection attempt and its lifetime
pub struct TransportSession {
    epoch: u64,
    state: LinkState,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl TransportSession {
    /// Start connecting to `endpoint` as `identity`.
    ///
    /// Failures are not returned: they arrive on `events` as `Error`
    /// followed by an abnormal `Closed`.
    pub fn open(
        epoch: u64,
        connector: Arc<dyn Connector>,
        endpoint: &str,
        identity: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let url = connection_url(endpoint, identity);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        debug!("Opening session epoch {} to {}", epoch, endpoint);
        let task = tokio::spawn(pump(epoch, connector, url, outbound_rx, events));

        Self {
            epoch,
            state: LinkState::Opening,
            outbound_tx,
            task,
        }
    }

    /// Epoch this session belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Record the `Opened` report from the pump task
    pub fn mark_open(&mut self) {
        if self.state == LinkState::Opening {
            self.state = LinkState::Open;
        }
    }

    /// Send a text message; fails unless the transport is open
    pub fn send(&self, text: String) -> Result<(), SendError> {
        if self.state != LinkState::Open {
            return Err(SendError::NotOpen);
        }
        self.outbound_tx
            .send(Outbound::Text(text))
            .map_err(|_| SendError::NotOpen)
    }

    /// Close the session; no-op if already closed.
    ///
    /// An open transport gets a close frame and the pump reports a clean
    /// `Closed`. A session still opening is cancelled without a report.
    pub fn close(&mut self, reason: CloseReason) {
        match self.state {
            LinkState::Closed => {}
            LinkState::Opening => {
                debug!("Cancelling session epoch {} while opening", self.epoch);
                self.task.abort();
            }
            LinkState::Open => {
                debug!(
                    "Closing session epoch {} ({} {})",
                    self.epoch, reason.code, reason.reason
                );
                if self.outbound_tx.send(Outbound::Close(reason)).is_err() {
                    trace!("Session epoch {} pump already gone", self.epoch);
                }
            }
        }
        self.state = LinkState::Closed;
    }
}

impl EnvelopeSink for TransportSession {
    fn send_envelope(&self, message: &ClientMessage) -> Result<(), SendError> {
        let text = message.encode()?;
        self.send(text)
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if self.state != LinkState::Closed {
            self.task.abort();
        }
    }
}

async fn pump(
    epoch: u64,
    connector: Arc<dyn Connector>,
    url: Result<Url, TransportError>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let emit = |kind: TransportEvent| {
        // Supervisor gone means nobody cares about this session any more
        let _ = events.send(SessionEvent { epoch, kind });
    };
    let fail = |e: TransportError| {
        warn!("Session epoch {} transport error: {}", epoch, e);
        emit(TransportEvent::Error(e.to_string()));
        emit(TransportEvent::Closed(CloseInfo::abnormal(ABNORMAL, e.to_string())));
    };

    let url = match url {
        Ok(url) => url,
        Err(e) => return fail(e),
    };

    let (mut sink, mut stream) = match connector.connect(&url).await {
        Ok(halves) => halves,
        Err(e) => return fail(e),
    };
    info!("Session epoch {} transport open", epoch);
    emit(TransportEvent::Opened);

    let close = loop {
        tokio::select! {
            request = outbound.recv() => match request {
                Some(Outbound::Text(text)) => {
                    trace!("Session epoch {} sending {} bytes", epoch, text.len());
                    if let Err(e) = sink.send(Frame::Text(text)).await {
                        return fail(e);
                    }
                }
                Some(Outbound::Close(reason)) => {
                    let frame = Frame::Close {
                        code: reason.code,
                        reason: reason.reason.clone(),
                    };
                    if let Err(e) = sink.send(frame).await {
                        debug!("Session epoch {} close frame not sent: {}", epoch, e);
                    }
                    let _ = sink.close().await;
                    break CloseInfo::clean(reason.code, reason.reason);
                }
                None => {
                    // Owner dropped the session
                    let _ = sink.close().await;
                    return;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Frame::Text(text))) => emit(TransportEvent::Message(text)),
                Some(Ok(Frame::Close { code, reason })) => {
                    info!(
                        "Session epoch {} closed by server: {} ({})",
                        epoch,
                        code,
                        kiosk_wire::close::describe(code)
                    );
                    // Echo the close and flush it so the handshake completes
                    let reply = Frame::Close {
                        code,
                        reason: String::new(),
                    };
                    if let Err(e) = sink.send(reply).await {
                        debug!("Session epoch {} close reply not sent: {}", epoch, e);
                    }
                    let _ = sink.close().await;
                    break CloseInfo::abnormal(code, reason);
                }
                Some(Err(e)) => return fail(e),
                None => break CloseInfo::abnormal(ABNORMAL, "connection lost"),
            },
        }
    };

    emit(TransportEvent::Closed(close));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnector;

    const ENDPOINT: &str = "ws://kiosk.test/ws/display";

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> TransportEvent {
        rx.recv().await.expect("event channel closed").kind
    }

    #[tokio::test]
    async fn test_open_send_and_receive() {
        let (connector, mut peers) = MemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut session = TransportSession::open(7, Arc::new(connector), ENDPOINT, "lobby-1", tx);
        assert_eq!(session.epoch(), 7);
        assert!(matches!(
            session.send("early".to_string()),
            Err(SendError::NotOpen)
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.epoch, 7);
        assert_eq!(event.kind, TransportEvent::Opened);
        session.mark_open();
        assert!(session.is_open());

        let mut peer = peers.next().await.unwrap();
        assert_eq!(peer.url.query(), Some("device_id=lobby-1"));

        session
            .send_envelope(&ClientMessage::Heartbeat)
            .unwrap();
        assert_eq!(
            peer.recv().await,
            Some(Frame::Text(r#"{"type":"heartbeat"}"#.to_string()))
        );

        peer.send_text("hello");
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message("hello".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_close_is_abnormal() {
        let (connector, mut peers) = MemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _session = TransportSession::open(1, Arc::new(connector), ENDPOINT, "lobby-1", tx);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);

        let mut peer = peers.next().await.unwrap();
        peer.close(NORMAL, "server restart");
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Closed(CloseInfo::abnormal(NORMAL, "server restart"))
        );

        // The close is answered before the connection goes away
        assert_eq!(
            peer.recv().await,
            Some(Frame::Close {
                code: NORMAL,
                reason: String::new(),
            })
        );
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_connection_reports_1006() {
        let (connector, mut peers) = MemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _session = TransportSession::open(1, Arc::new(connector), ENDPOINT, "lobby-1", tx);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);

        peers.next().await.unwrap().drop_connection();
        match next_event(&mut rx).await {
            TransportEvent::Closed(info) => {
                assert_eq!(info.code, ABNORMAL);
                assert!(!info.is_clean());
            }
            other => panic!("Expected close, got {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_owner_close_is_clean_and_idempotent() {
        let (connector, mut peers) = MemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut session = TransportSession::open(3, Arc::new(connector), ENDPOINT, "lobby-1", tx);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);
        session.mark_open();
        let mut peer = peers.next().await.unwrap();

        session.close(CloseReason::normal());
        session.close(CloseReason::going_away());
        assert!(!session.is_open());
        assert!(matches!(
            session.send("late".to_string()),
            Err(SendError::NotOpen)
        ));

        assert_eq!(
            peer.recv().await,
            Some(Frame::Close {
                code: NORMAL,
                reason: "client disconnect".to_string(),
            })
        );
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Closed(CloseInfo::clean(NORMAL, "client disconnect"))
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        let (connector, _peers) = MemoryConnector::new();
        connector.refuse_next(1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _session = TransportSession::open(1, Arc::new(connector), ENDPOINT, "lobby-1", tx);
        assert!(matches!(next_event(&mut rx).await, TransportEvent::Error(_)));
        match next_event(&mut rx).await {
            TransportEvent::Closed(info) => assert_eq!(info.code, ABNORMAL),
            other => panic!("Expected close, got {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_endpoint_is_a_transport_failure() {
        let (connector, _peers) = MemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _session =
            TransportSession::open(1, Arc::new(connector.clone()), "no scheme here", "lobby-1", tx);
        assert!(matches!(next_event(&mut rx).await, TransportEvent::Error(_)));
        assert!(matches!(
            next_event(&mut rx).await,
            TransportEvent::Closed(CloseInfo { kind: CloseKind::Abnormal, .. })
        ));
        assert_eq!(connector.attempts(), 0);
    }
}
