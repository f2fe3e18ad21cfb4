//! Main PipeRelay server coordination.
//!
//! PipeRelay owns the rendezvous slots and hands each accepted connection
//! to a [`Session`]. A slot holds at most one connection per role; when the
//! second role arrives the two connections are introduced to each other and
//! from then on forward frames directly through each other's queues.

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::session::Session;
use dashmap::DashMap;
use pipe_types::{Role, Token};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Path clients upgrade on.
pub const WEBSOCKET_PATH: &str = "/ws";

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total TCP connections accepted.
    pub connections_total: AtomicU64,
    /// Total slots where both roles met.
    pub pairings_total: AtomicU64,
    /// Total payload frames forwarded.
    pub frames_forwarded: AtomicU64,
    /// Total payload bytes forwarded (ciphertext).
    pub bytes_forwarded: AtomicU64,
    /// Total joins refused (role taken, capacity, malformed).
    pub joins_rejected: AtomicU64,
    /// Total connections dropped for not joining in time.
    pub join_timeouts: AtomicU64,
}

/// What a connection's session is told by the relay or its partner.
#[derive(Debug)]
pub enum Outbound {
    /// The partner arrived; forward payload to it from now on.
    Paired(PeerHandle),
    /// Payload frame from the partner, to be written verbatim.
    Frame(Vec<u8>),
    /// The partner disconnected.
    PeerLeft,
}

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: u64,
    tx: mpsc::Sender<Outbound>,
}

impl PeerHandle {
    /// Create a handle for connection `id`.
    pub fn new(id: u64, tx: mpsc::Sender<Outbound>) -> Self {
        Self { id, tx }
    }

    /// Connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a message; waits while the partner's queue is full.
    ///
    /// Returns false if the partner is gone.
    pub async fn deliver(&self, message: Outbound) -> bool {
        self.tx.send(message).await.is_ok()
    }
}

/// Result of a successful join.
#[derive(Debug)]
pub enum JoinOutcome {
    /// First in the slot.
    Waiting,
    /// The other role was already waiting.
    Paired(PeerHandle),
}

#[derive(Debug, Default)]
struct Slot {
    offer: Option<PeerHandle>,
    accept: Option<PeerHandle>,
}

impl Slot {
    fn side(&mut self, role: Role) -> &mut Option<PeerHandle> {
        match role {
            Role::Offer => &mut self.offer,
            Role::Accept => &mut self.accept,
        }
    }

    fn is_pending(&self) -> bool {
        self.offer.is_some() != self.accept.is_some()
    }

    fn is_empty(&self) -> bool {
        self.offer.is_none() && self.accept.is_none()
    }
}

/// Main relay server.
pub struct PipeRelay {
    config: Config,
    metrics: RelayMetrics,
    slots: DashMap<Token, Slot>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for PipeRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeRelay")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("slots_count", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl PipeRelay {
    /// Create a new PipeRelay with the given config.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            metrics: RelayMetrics::default(),
            slots: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Allocate a connection id.
    pub fn next_connection_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of slots with at least one connection.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Place a connection in the slot for `token`.
    ///
    /// If the other role is waiting, it is sent [`Outbound::Paired`] with
    /// this connection's handle and its own handle is returned.
    pub async fn join(&self, token: Token, role: Role, handle: PeerHandle) -> Result<JoinOutcome> {
        if !self.slots.contains_key(&token) {
            let limit = self.config.limits.max_pending_sessions;
            let pending = self.slots.iter().filter(|slot| slot.is_pending()).count();
            if pending >= limit {
                self.metrics.joins_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(RelayError::AtCapacity { limit });
            }
        }

        let partner = {
            let mut slot = self.slots.entry(token).or_default();
            if slot.side(role).is_some() {
                self.metrics.joins_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(RelayError::RoleTaken { role });
            }
            *slot.side(role) = Some(handle.clone());
            slot.side(role.peer()).clone()
        };

        match partner {
            None => {
                tracing::debug!("Connection {} waiting as {} on {:?}", handle.id, role, token);
                Ok(JoinOutcome::Waiting)
            }
            Some(partner) => {
                self.metrics.pairings_total.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "Paired connections {} ({}) and {} ({}) on {:?}",
                    handle.id,
                    role,
                    partner.id,
                    role.peer(),
                    token
                );
                partner.deliver(Outbound::Paired(handle)).await;
                Ok(JoinOutcome::Paired(partner))
            }
        }
    }

    /// Remove a connection from its slot.
    ///
    /// Returns the partner still in the slot, if any, so it can be told.
    pub fn leave(&self, token: &Token, role: Role, id: u64) -> Option<PeerHandle> {
        let mut partner = None;
        let mut now_empty = false;

        if let Some(mut slot) = self.slots.get_mut(token) {
            if slot.side(role).as_ref().map(PeerHandle::id) == Some(id) {
                *slot.side(role) = None;
                partner = slot.side(role.peer()).clone();
            }
            now_empty = slot.is_empty();
        }

        if now_empty {
            self.slots.remove_if(token, |_, slot| slot.is_empty());
        }
        partner
    }
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, relay: Arc<PipeRelay>) -> Result<()> {
    tracing::info!("Relay listening on {}", listener.local_addr()?);

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                continue;
            }
        };
        relay.metrics.connections_total.fetch_add(1, Ordering::Relaxed);

        let relay = Arc::clone(&relay);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(relay, stream, remote).await {
                tracing::debug!("Connection {} ended with error: {}", remote, e);
            }
        });
    }
}

async fn handle_connection(relay: Arc<PipeRelay>, stream: TcpStream, remote: SocketAddr) -> Result<()> {
    let limits = &relay.config().limits;

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(limits.max_message_size);
    ws_config.max_frame_size = Some(limits.max_message_size);

    let check_path = |request: &Request, response: Response| {
        if request.uri().path() == WEBSOCKET_PATH {
            Ok(response)
        } else {
            let mut error = ErrorResponse::new(Some("not found".to_string()));
            *error.status_mut() = StatusCode::NOT_FOUND;
            Err(error)
        }
    };

    let upgrade = tokio_tungstenite::accept_hdr_async_with_config(stream, check_path, Some(ws_config));
    let ws = match timeout(limits.join_timeout(), upgrade).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return Err(RelayError::Handshake(e.to_string())),
        Err(_) => {
            relay.metrics.join_timeouts.fetch_add(1, Ordering::Relaxed);
            return Err(RelayError::Handshake("upgrade timed out".into()));
        }
    };

    let id = relay.next_connection_id();
    tracing::debug!("Connection {} upgraded from {}", id, remote);
    Session::new(relay, id).run(ws).await
}
