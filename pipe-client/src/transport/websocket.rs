//! WebSocket relay channel.
//!
//! Connects to `<relay>/ws`, joins the rendezvous slot, then splits the
//! stream: writes go through a locked sink, reads are pumped by a background
//! task into a channel so that `close()` can abort the task and unblock any
//! pending `recv()` immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pipe_types::ControlMessage;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::{ChannelFrame, JoinStatus, RelayEndpoint, Transport, TransportError};
use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Inbound = mpsc::Receiver<Result<ChannelFrame, TransportError>>;

/// Frames buffered between the reader task and `recv()`.
const INBOUND_BUFFER: usize = 16;

/// Grace period for the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Relay channel over a WebSocket.
pub struct WebSocketTransport {
    connect_timeout: Duration,
    write_timeout: Duration,
    sink: Mutex<Option<WsSink>>,
    inbound: Mutex<Option<Inbound>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl WebSocketTransport {
    /// Create a transport with default timeouts.
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT)
    }

    /// Create a transport with explicit connect and write timeouts.
    pub fn with_timeouts(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            write_timeout,
            sink: Mutex::new(None),
            inbound: Mutex::new(None),
            reader: std::sync::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn open(
        &self,
        endpoint: &RelayEndpoint,
    ) -> Result<(WsSink, SplitStream<WsStream>, JoinStatus), TransportError> {
        let url = endpoint.websocket_url();
        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{url}: {e}")))?;
        debug!(status = %response.status(), %url, "relay websocket open");

        let (mut sink, mut stream) = ws_stream.split();

        let join = endpoint
            .join_message()
            .to_json()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        sink.send(Message::Text(join))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        // The first control signal acknowledges the join
        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(TransportError::ConnectionFailed(e.to_string())),
                None => {
                    return Err(TransportError::ConnectionFailed(
                        "relay closed before acknowledging join".into(),
                    ))
                }
            };
            match decode(message)? {
                Some(ChannelFrame::Control(ControlMessage::Waiting)) => {
                    return Ok((sink, stream, JoinStatus::Waiting))
                }
                Some(ChannelFrame::Control(ControlMessage::PeerJoined)) => {
                    return Ok((sink, stream, JoinStatus::PeerPresent))
                }
                Some(ChannelFrame::Control(ControlMessage::Error { message })) => {
                    return Err(TransportError::Rejected(message))
                }
                None => continue,
                Some(other) => {
                    return Err(TransportError::Protocol(format!(
                        "unexpected frame before join acknowledgement: {other:?}"
                    )))
                }
            }
        }
    }

    fn spawn_reader(&self, mut stream: SplitStream<WsStream>) -> Inbound {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let connected = Arc::clone(&self.connected);

        let handle = tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                let frame = match next {
                    Ok(message) => match decode(message) {
                        Ok(Some(frame)) => Ok(frame),
                        Ok(None) => continue,
                        Err(TransportError::ConnectionClosed) => break,
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
                };
                let failed = frame.is_err();
                if tx.send(frame).await.is_err() || failed {
                    break;
                }
            }
            connected.store(false, Ordering::SeqCst);
            trace!("relay reader finished");
        });

        if let Ok(mut reader) = self.reader.lock() {
            if let Some(old) = reader.replace(handle) {
                old.abort();
            }
        }
        rx
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}

/// Map a WebSocket message to a channel frame; `None` for keepalives.
fn decode(message: Message) -> Result<Option<ChannelFrame>, TransportError> {
    match message {
        Message::Text(text) => ControlMessage::from_json(&text)
            .map(|control| Some(ChannelFrame::Control(control)))
            .map_err(|e| TransportError::Protocol(format!("bad control frame: {e}"))),
        Message::Binary(data) => Ok(Some(ChannelFrame::Payload(data))),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
        Message::Close(_) => Err(TransportError::ConnectionClosed),
        Message::Frame(_) => Err(TransportError::Protocol("unexpected raw frame".into())),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &RelayEndpoint) -> Result<JoinStatus, TransportError> {
        if self.is_connected() {
            return Err(TransportError::ConnectionFailed("already connected".into()));
        }

        let (sink, stream, status) = timeout(self.connect_timeout, self.open(endpoint))
            .await
            .map_err(|_| TransportError::Timeout)??;

        self.connected.store(true, Ordering::SeqCst);
        let inbound = self.spawn_reader(stream);
        *self.sink.lock().await = Some(sink);
        *self.inbound.lock().await = Some(inbound);

        debug!(role = %endpoint.role, token = %endpoint.token, ?status, "joined relay slot");
        Ok(status)
    }

    async fn send(&self, frame: ChannelFrame) -> Result<(), TransportError> {
        let message = match frame {
            ChannelFrame::Control(control) => Message::Text(
                control
                    .to_json()
                    .map_err(|e| TransportError::SendFailed(e.to_string()))?,
            ),
            ChannelFrame::Payload(bytes) => Message::Binary(bytes),
        };

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        timeout(self.write_timeout, sink.send(message))
            .await
            .map_err(|_| TransportError::SendFailed("write timed out".into()))?
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<ChannelFrame, TransportError> {
        let mut guard = self.inbound.lock().await;
        let inbound = guard.as_mut().ok_or(TransportError::NotConnected)?;
        match inbound.recv().await {
            Some(result) => result,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);

        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match timeout(CLOSE_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => debug!("relay channel closed"),
                Ok(Err(e)) => debug!(error = %e, "relay close handshake failed"),
                Err(_) => warn!("relay close handshake timed out"),
            }
        }
        Ok(())
    }
}
