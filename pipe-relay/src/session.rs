//! Per-connection session management.
//!
//! Each upgraded connection gets a Session. It waits for the client's
//! join, places it in a slot, then forwards binary frames to the partner
//! until either side goes away. Payload is never decoded here.

use crate::error::{RelayError, Result};
use crate::server::{JoinOutcome, Outbound, PeerHandle, PipeRelay};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pipe_types::{ControlMessage, Role, Token};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Session state machine states.
#[derive(Debug)]
pub enum SessionState {
    /// Waiting for the join message.
    AwaitingJoin,
    /// Joined; the other role has not arrived.
    Waiting {
        /// Slot token.
        token: Token,
        /// Role held by this connection.
        role: Role,
    },
    /// Both roles present; frames go to `partner`.
    Paired {
        /// Slot token.
        token: Token,
        /// Role held by this connection.
        role: Role,
        /// The other connection.
        partner: PeerHandle,
    },
    /// Session is closing.
    Closing,
}

/// A per-connection session.
pub struct Session {
    relay: Arc<PipeRelay>,
    id: u64,
    state: SessionState,
}

impl Session {
    /// Create a new session for connection `id`.
    pub fn new(relay: Arc<PipeRelay>, id: u64) -> Self {
        Self {
            relay,
            id,
            state: SessionState::AwaitingJoin,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session until completion.
    pub async fn run(mut self, ws: WebSocketStream<TcpStream>) -> Result<()> {
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::channel(self.relay.config().limits.outbound_queue.max(1));

        let result = match self.join(&mut sink, &mut stream, tx).await {
            Ok(()) => self.forward(&mut sink, &mut stream, &mut rx).await,
            Err(e) => {
                let reply = ControlMessage::Error {
                    message: e.to_string(),
                };
                send_control(&mut sink, &reply).await.ok();
                Err(e)
            }
        };

        sink.close().await.ok();
        self.cleanup().await;
        result
    }

    async fn join(
        &mut self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        tx: mpsc::Sender<Outbound>,
    ) -> Result<()> {
        let timeout = self.relay.config().limits.join_timeout();
        let first = match tokio::time::timeout(timeout, next_data(stream)).await {
            Ok(message) => message?,
            Err(_) => {
                self.relay.metrics().join_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Join timeout ({:?}) for connection {}", timeout, self.id);
                return Err(RelayError::Protocol("join timed out".into()));
            }
        };

        let (token, role) = match first {
            Message::Text(text) => match ControlMessage::from_json(&text) {
                Ok(ControlMessage::Join { token, role }) => (token, role),
                Ok(other) => return Err(self.reject(format!("expected join, got {other:?}"))),
                Err(e) => return Err(self.reject(format!("malformed join: {e}"))),
            },
            _ => return Err(self.reject("expected join".to_string())),
        };

        let handle = PeerHandle::new(self.id, tx);
        match self.relay.join(token, role, handle).await? {
            JoinOutcome::Waiting => {
                self.state = SessionState::Waiting { token, role };
                send_control(sink, &ControlMessage::Waiting).await
            }
            JoinOutcome::Paired(partner) => {
                self.state = SessionState::Paired {
                    token,
                    role,
                    partner,
                };
                send_control(sink, &ControlMessage::PeerJoined).await
            }
        }
    }

    async fn forward(
        &mut self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        rx: &mut mpsc::Receiver<Outbound>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Binary(frame))) => self.relay_frame(frame).await,
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("Connection {} closed", self.id);
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                outbound = rx.recv() => match outbound {
                    Some(Outbound::Paired(partner)) => {
                        if let SessionState::Waiting { token, role } = self.state {
                            self.state = SessionState::Paired { token, role, partner };
                        }
                        send_control(sink, &ControlMessage::PeerJoined).await?;
                    }
                    Some(Outbound::Frame(frame)) => {
                        sink.send(Message::Binary(frame)).await?;
                    }
                    Some(Outbound::PeerLeft) => {
                        tracing::debug!("Partner of connection {} left", self.id);
                        send_control(sink, &ControlMessage::PeerLeft).await?;
                        return Ok(());
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    async fn relay_frame(&self, frame: Vec<u8>) {
        let SessionState::Paired { partner, .. } = &self.state else {
            tracing::warn!(
                "Dropping {} byte frame from unpaired connection {}",
                frame.len(),
                self.id
            );
            return;
        };

        let len = frame.len() as u64;
        if partner.deliver(Outbound::Frame(frame)).await {
            let metrics = self.relay.metrics();
            metrics.frames_forwarded.fetch_add(1, Ordering::Relaxed);
            metrics.bytes_forwarded.fetch_add(len, Ordering::Relaxed);
        }
    }

    async fn cleanup(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closing);
        let (token, role) = match state {
            SessionState::Waiting { token, role } | SessionState::Paired { token, role, .. } => {
                (token, role)
            }
            SessionState::AwaitingJoin | SessionState::Closing => return,
        };

        if let Some(partner) = self.relay.leave(&token, role, self.id) {
            partner.deliver(Outbound::PeerLeft).await;
        }
    }

    fn reject(&self, reason: String) -> RelayError {
        self.relay.metrics().joins_rejected.fetch_add(1, Ordering::Relaxed);
        RelayError::Protocol(reason)
    }
}

/// Next text or binary message, skipping pings and pongs.
async fn next_data(stream: &mut WsStream) -> Result<Message> {
    while let Some(message) = stream.next().await {
        match message? {
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            Message::Close(_) => break,
            other => return Ok(other),
        }
    }
    Err(RelayError::Protocol("connection closed before join".into()))
}

async fn send_control(sink: &mut WsSink, message: &ControlMessage) -> Result<()> {
    let text = message
        .to_json()
        .map_err(|e| RelayError::Protocol(e.to_string()))?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
