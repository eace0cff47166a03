//! Transports for kiosk sessions.
//!
//! A [`Connector`] turns a connection URL into a pair of frame sink and frame
//! stream. The production connector speaks WebSocket through
//! `tokio-tungstenite`; the in-memory connector backs the test suites and is
//! compiled in only for tests or with the `test-util` feature.

use async_trait::async_trait;
use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::error::TransportError;

/// Frames the session layer deals in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON text message
    Text(String),
    /// Close handshake with code and reason
    Close {
        /// Close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Outbound half of a connection
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a connection
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Opens connections for transport sessions
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish one connection
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// WebSocket connector
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector
    pub fn new() -> Self {
        Self
    }
}

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

fn message_to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Close(Some(close)) => Some(Frame::Close {
            code: u16::from(close.code),
            reason: close.reason.as_str().to_owned(),
        }),
        Message::Close(None) => Some(Frame::Close {
            code: kiosk_wire::close::NO_STATUS,
            reason: String::new(),
        }),
        Message::Binary(data) => {
            debug!("Ignoring {} byte binary frame", data.len());
            None
        }
        // Ping/pong are answered by tungstenite itself
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), TransportError> {
        debug!("Opening WebSocket to {}", url);
        let (ws, response) = connect_async(url.as_str()).await?;
        trace!("WebSocket upgrade status {}", response.status());

        let (ws_tx, ws_rx) = ws.split();
        let sink = ws_tx
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame_to_message(frame))));
        let stream = ws_rx.filter_map(|message| {
            future::ready(match message {
                Ok(message) => message_to_frame(message).map(Ok),
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// In-process connector, available to tests and with the `test-util` feature.
///
/// Every successful connect hands the server side of the connection to the
/// receiver returned by [`MemoryConnector::new`] as a [`MemoryPeer`].
#[cfg(any(test, feature = "test-util"))]
pub mod memory {
    use super::*;
    use futures::channel::mpsc;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Shared {
        attempts: Vec<Url>,
        refuse_next: usize,
        offline: bool,
    }

    /// Connector handing out in-memory connections
    #[derive(Clone)]
    pub struct MemoryConnector {
        shared: Arc<Mutex<Shared>>,
        accepted: mpsc::UnboundedSender<MemoryPeer>,
    }

    impl MemoryConnector {
        /// Create a connector and the receiver of accepted connections
        pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
            let (accepted, peers) = mpsc::unbounded();
            let connector = Self {
                shared: Arc::new(Mutex::new(Shared::default())),
                accepted,
            };
            (connector, peers)
        }

        fn with_shared<T>(&self, f: impl FnOnce(&mut Shared) -> T) -> T {
            let mut guard = match self.shared.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard)
        }

        /// Refuse the next `n` connection attempts
        pub fn refuse_next(&self, n: usize) {
            self.with_shared(|s| s.refuse_next = n);
        }

        /// Refuse every attempt until set back to `false`
        pub fn set_offline(&self, offline: bool) {
            self.with_shared(|s| s.offline = offline);
        }

        /// Number of connection attempts so far
        pub fn attempts(&self) -> usize {
            self.with_shared(|s| s.attempts.len())
        }

        /// URL of the most recent attempt
        pub fn last_url(&self) -> Option<Url> {
            self.with_shared(|s| s.attempts.last().cloned())
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), TransportError> {
            let refused = self.with_shared(|s| {
                s.attempts.push(url.clone());
                if s.offline {
                    true
                } else if s.refuse_next > 0 {
                    s.refuse_next -= 1;
                    true
                } else {
                    false
                }
            });
            if refused {
                return Err(TransportError::Connect(format!("{} refused", url)));
            }

            let (client_tx, server_rx) = mpsc::unbounded::<Frame>();
            let (server_tx, client_rx) = mpsc::unbounded::<Result<Frame, TransportError>>();

            let peer = MemoryPeer {
                url: url.clone(),
                to_client: server_tx,
                from_client: server_rx,
            };
            self.accepted
                .unbounded_send(peer)
                .map_err(|_| TransportError::Connect("listener gone".to_string()))?;

            let sink = client_tx.sink_map_err(|_| TransportError::Closed);
            Ok((Box::pin(sink), Box::pin(client_rx)))
        }
    }

    /// Server side of an in-memory connection
    pub struct MemoryPeer {
        /// URL the client connected with
        pub url: Url,
        to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
        from_client: mpsc::UnboundedReceiver<Frame>,
    }

    impl MemoryPeer {
        /// Send a text frame; false if the client side is gone
        pub fn send_text(&self, text: impl Into<String>) -> bool {
            self.to_client
                .unbounded_send(Ok(Frame::Text(text.into())))
                .is_ok()
        }

        /// Send a JSON value as a text frame
        pub fn send_json(&self, value: &serde_json::Value) -> bool {
            self.send_text(value.to_string())
        }

        /// Send a close frame
        pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
            self.to_client
                .unbounded_send(Ok(Frame::Close {
                    code,
                    reason: reason.into(),
                }))
                .is_ok()
        }

        /// Inject a transport error
        pub fn fail(&self, reason: impl Into<String>) -> bool {
            self.to_client
                .unbounded_send(Err(TransportError::Connect(reason.into())))
                .is_ok()
        }

        /// Next frame from the client; `None` once the client side is gone
        pub async fn recv(&mut self) -> Option<Frame> {
            self.from_client.next().await
        }

        /// Frame already sent by the client, without waiting
        pub fn try_recv(&mut self) -> Option<Frame> {
            self.from_client.next().now_or_never().flatten()
        }

        /// Drop the connection without a close frame
        pub fn drop_connection(self) {
            drop(self);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryPeer};
