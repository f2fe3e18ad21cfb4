//! Sender and Receiver sessions.
//!
//! Thin orchestrators that own the relay channel and handshake coordinator
//! for their lifetime and hand a paired channel to the transfer engine.
//!
//! ```text
//! Application -> Sender/Receiver -> Coordinator -> Transport -> Relay
//!                       |                 |
//!                     engine      pipe-core (pure state machine)
//! ```
//!
//! The file always flows from the `Offer` role to the `Accept` role. Which
//! side shares the link does not matter: a sender's link uses `/d/`, a
//! receiver's link uses `/u/`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipe_core::{Event, HandshakeState, PairingError, PairingLink};
use pipe_types::{ControlMessage, Role};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::engine::{self, TransferSummary};
use crate::error::TransferError;
use crate::handshake::Coordinator;
use crate::transport::{ChannelFrame, RelayEndpoint, Transport, WebSocketTransport};

fn coordinator<T: Transport>(config: &SessionConfig, role: Role, transport: T) -> Coordinator<T> {
    let endpoint = RelayEndpoint::new(&config.relay_url, config.token, role);
    Coordinator::new(endpoint, Arc::new(transport))
}

async fn ensure_paired<T: Transport>(
    coordinator: &mut Coordinator<T>,
    peer_timeout: Duration,
) -> Result<(), TransferError> {
    if coordinator.state().is_paired() {
        return Ok(());
    }
    debug!(?peer_timeout, "transfer requested before pairing, waiting for peer");
    coordinator.wait_for_peer(peer_timeout).await
}

async fn settle<T: Transport>(
    coordinator: &mut Coordinator<T>,
    result: &Result<TransferSummary, TransferError>,
) {
    let event = match result {
        Ok(_) => Event::TransferFinished,
        Err(e) => Event::ChannelFailed {
            reason: e.to_string(),
        },
    };
    coordinator.apply(event).await;
}

/// Offering side of a transfer.
pub struct Sender<T: Transport + 'static = WebSocketTransport> {
    config: SessionConfig,
    coordinator: Coordinator<T>,
}

impl Sender<WebSocketTransport> {
    /// Create a sender that talks to the relay over WebSocket.
    pub fn new(config: SessionConfig) -> Self {
        let transport =
            WebSocketTransport::with_timeouts(config.connect_timeout, config.write_timeout);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport + 'static> Sender<T> {
    /// Create a sender over an explicit transport.
    pub fn with_transport(config: SessionConfig, transport: T) -> Self {
        let coordinator = coordinator(&config, Role::Offer, transport);
        Self {
            config,
            coordinator,
        }
    }

    /// Link the receiving party opens to join this session.
    pub fn pairing_link(&self) -> Result<PairingLink, PairingError> {
        self.config.pairing_link(Role::Offer)
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current handshake state.
    pub fn state(&self) -> &HandshakeState {
        self.coordinator.state()
    }

    /// Open the relay channel and join the slot.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        self.coordinator.connect().await
    }

    /// Block until the receiver joins or `timeout` elapses.
    pub async fn wait_for_peer(&mut self, timeout: Duration) -> Result<(), TransferError> {
        self.coordinator.wait_for_peer(timeout).await
    }

    /// Stream a file to the receiver.
    ///
    /// Waits for the peer first (up to the configured peer timeout) if it
    /// has not arrived yet. The channel is closed when this returns.
    pub async fn send_file<F>(
        &mut self,
        path: &Path,
        on_progress: F,
    ) -> Result<TransferSummary, TransferError>
    where
        F: FnMut(u64, u64) + Send,
    {
        ensure_paired(&mut self.coordinator, self.config.peer_timeout).await?;
        self.coordinator.apply(Event::TransferStarted).await;

        let peer_left = Arc::new(AtomicBool::new(false));
        let watcher = spawn_watcher(
            Arc::clone(self.coordinator.transport()),
            Arc::clone(&peer_left),
        );

        let transport = Arc::clone(self.coordinator.transport());
        let result = engine::send_file(
            transport.as_ref(),
            &self.config.key,
            self.coordinator.endpoint().role,
            path,
            self.config.chunk_size,
            &peer_left,
            on_progress,
        )
        .await;
        watcher.abort();

        settle(&mut self.coordinator, &result).await;
        result
    }

    /// Release the channel. Safe at any point.
    pub async fn close(&mut self) {
        self.coordinator.close().await;
    }
}

/// Observe control signals while the engine pushes chunks.
///
/// Only raises the flag; sequence numbers and progress stay with the engine.
fn spawn_watcher<T: Transport + 'static>(
    transport: Arc<T>,
    peer_left: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match transport.recv().await {
                Ok(ChannelFrame::Control(ControlMessage::PeerLeft)) => {
                    info!("receiver left during transfer");
                    break;
                }
                Ok(ChannelFrame::Control(ControlMessage::Error { message })) => {
                    info!(%message, "relay error during transfer");
                    break;
                }
                Ok(ChannelFrame::Payload(bytes)) => {
                    debug!(len = bytes.len(), "ignoring payload frame sent to the sender");
                }
                Ok(ChannelFrame::Control(control)) => {
                    debug!(?control, "ignoring control signal during transfer");
                }
                Err(e) => {
                    debug!(error = %e, "control watcher stopped");
                    break;
                }
            }
        }
        peer_left.store(true, Ordering::SeqCst);
    })
}

/// Accepting side of a transfer.
pub struct Receiver<T: Transport + 'static = WebSocketTransport> {
    config: SessionConfig,
    coordinator: Coordinator<T>,
}

impl Receiver<WebSocketTransport> {
    /// Create a receiver that talks to the relay over WebSocket.
    pub fn new(config: SessionConfig) -> Self {
        let transport =
            WebSocketTransport::with_timeouts(config.connect_timeout, config.write_timeout);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport + 'static> Receiver<T> {
    /// Create a receiver over an explicit transport.
    pub fn with_transport(config: SessionConfig, transport: T) -> Self {
        let coordinator = coordinator(&config, Role::Accept, transport);
        Self {
            config,
            coordinator,
        }
    }

    /// Link the sending party opens to join this session.
    pub fn pairing_link(&self) -> Result<PairingLink, PairingError> {
        self.config.pairing_link(Role::Accept)
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current handshake state.
    pub fn state(&self) -> &HandshakeState {
        self.coordinator.state()
    }

    /// Open the relay channel and join the slot.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        self.coordinator.connect().await
    }

    /// Block until the sender joins or `timeout` elapses.
    pub async fn wait_for_peer(&mut self, timeout: Duration) -> Result<(), TransferError> {
        self.coordinator.wait_for_peer(timeout).await
    }

    /// Receive one file into `dest_dir`; returns where it was saved.
    ///
    /// Waits for the peer first (up to the configured peer timeout) if it
    /// has not arrived yet. The channel is closed when this returns.
    pub async fn receive_file<F>(
        &mut self,
        dest_dir: &Path,
        on_progress: F,
    ) -> Result<TransferSummary, TransferError>
    where
        F: FnMut(u64, u64) + Send,
    {
        ensure_paired(&mut self.coordinator, self.config.peer_timeout).await?;
        self.coordinator.apply(Event::TransferStarted).await;

        let transport = Arc::clone(self.coordinator.transport());
        let result = engine::receive_file(
            transport.as_ref(),
            &self.config.key,
            self.coordinator.endpoint().role.peer(),
            dest_dir,
            on_progress,
        )
        .await;

        settle(&mut self.coordinator, &result).await;
        result
    }

    /// Release the channel. Safe at any point.
    pub async fn close(&mut self) {
        self.coordinator.close().await;
    }
}
