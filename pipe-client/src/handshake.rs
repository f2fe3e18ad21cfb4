//! Handshake coordinator.
//!
//! Drives the pure [`HandshakeState`] machine from pipe-core with real
//! channel I/O: joins the relay slot, consumes control frames until the peer
//! arrives, and executes the actions the machine emits.

use std::sync::Arc;
use std::time::Duration;

use pipe_core::{Action, Event, HandshakeState};
use pipe_types::ControlMessage;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::transport::{ChannelFrame, JoinStatus, RelayEndpoint, Transport};

/// Owns the relay channel and the handshake state of one session.
pub struct Coordinator<T: Transport> {
    endpoint: RelayEndpoint,
    transport: Arc<T>,
    state: HandshakeState,
}

impl<T: Transport> Coordinator<T> {
    /// Create a coordinator in the Idle state.
    pub fn new(endpoint: RelayEndpoint, transport: Arc<T>) -> Self {
        Self {
            endpoint,
            transport,
            state: HandshakeState::new(),
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Slot and role this coordinator joins.
    pub fn endpoint(&self) -> &RelayEndpoint {
        &self.endpoint
    }

    /// Shared handle to the relay channel.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Feed an event to the state machine and execute the resulting actions.
    pub async fn apply(&mut self, event: Event) -> Vec<Action> {
        let (next, actions) = self.state.clone().on_event(event);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "handshake transition");
        }
        self.state = next;

        for action in &actions {
            if *action == Action::CloseChannel {
                if let Err(e) = self.transport.close().await {
                    debug!(error = %e, "close after terminal transition failed");
                }
            }
        }
        actions
    }

    /// Open the relay channel and join the slot.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        if self.state != HandshakeState::Idle {
            return Err(TransferError::ConnectFailed(format!(
                "session already {:?}",
                self.state
            )));
        }

        match self.transport.connect(&self.endpoint).await {
            Ok(JoinStatus::Waiting) => {
                info!(role = %self.endpoint.role, "joined relay, waiting for peer");
                self.apply(Event::Joined).await;
                Ok(())
            }
            Ok(JoinStatus::PeerPresent) => {
                info!(role = %self.endpoint.role, "joined relay, peer already present");
                self.apply(Event::JoinedWithPeer).await;
                Ok(())
            }
            Err(e) => {
                let err = TransferError::from(e);
                warn!(error = %err, "relay join failed");
                self.apply(Event::ChannelFailed {
                    reason: err.to_string(),
                })
                .await;
                Err(err)
            }
        }
    }

    /// Block until the peer is present or `timeout` elapses.
    ///
    /// A zero timeout with no pending peer signal returns `Timeout` at once.
    pub async fn wait_for_peer(&mut self, timeout: Duration) -> Result<(), TransferError> {
        if self.state.is_paired() {
            return Ok(());
        }
        match &self.state {
            HandshakeState::Connected | HandshakeState::WaitingForPeer => {}
            HandshakeState::TimedOut => return Err(TransferError::Timeout { waited: timeout }),
            _ => return Err(TransferError::NotConnected),
        }

        self.apply(Event::WaitStarted).await;
        let deadline = Instant::now() + timeout;

        loop {
            let frame = match timeout_at(deadline, self.transport.recv()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(?timeout, "no peer joined in time");
                    self.apply(Event::TimeoutElapsed).await;
                    return Err(TransferError::Timeout { waited: timeout });
                }
            };

            let reason = match frame {
                Ok(ChannelFrame::Control(ControlMessage::PeerJoined)) => {
                    info!(role = %self.endpoint.role, "peer joined");
                    self.apply(Event::PeerJoined).await;
                    return Ok(());
                }
                Ok(ChannelFrame::Control(ControlMessage::Waiting)) => continue,
                Ok(ChannelFrame::Control(ControlMessage::PeerLeft)) => "peer left".to_string(),
                Ok(ChannelFrame::Control(ControlMessage::Error { message })) => message,
                Ok(other) => {
                    let err =
                        TransferError::Protocol(format!("unexpected frame while waiting: {other:?}"));
                    self.apply(Event::ChannelFailed {
                        reason: err.to_string(),
                    })
                    .await;
                    return Err(err);
                }
                Err(e) => e.to_string(),
            };

            self.apply(Event::ChannelFailed {
                reason: reason.clone(),
            })
            .await;
            return Err(TransferError::ConnectionLost {
                sequence: 0,
                bytes_transferred: 0,
                reason,
            });
        }
    }

    /// Close the channel. Safe at any point, including after a failed connect.
    pub async fn close(&mut self) {
        if !self.state.is_terminal() {
            self.apply(Event::ChannelFailed {
                reason: "closed by caller".into(),
            })
            .await;
        }
        // Terminal transitions already closed once; closing again is harmless
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "close failed");
        }
    }
}

impl<T: Transport> std::fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use pipe_types::{Role, Token};

    fn coordinator(role: Role) -> (Coordinator<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let endpoint = RelayEndpoint::new("ws://relay.test", Token::from_bytes([5; 16]), role);
        (
            Coordinator::new(endpoint, Arc::new(transport.clone())),
            transport,
        )
    }

    #[tokio::test]
    async fn connect_then_peer_joins() {
        let (mut coord, transport) = coordinator(Role::Offer);
        coord.connect().await.unwrap();
        assert_eq!(*coord.state(), HandshakeState::Connected);

        transport.queue_control(ControlMessage::PeerJoined);
        coord
            .wait_for_peer(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(*coord.state(), HandshakeState::Paired);
    }

    #[tokio::test]
    async fn peer_present_at_join_skips_wait() {
        let (mut coord, transport) = coordinator(Role::Accept);
        transport.set_peer_present(true);
        coord.connect().await.unwrap();
        assert!(coord.state().is_paired());

        coord.wait_for_peer(Duration::ZERO).await.unwrap();
        assert!(coord.state().is_paired());
    }

    #[tokio::test]
    async fn zero_timeout_without_peer_times_out_promptly() {
        let (mut coord, transport) = coordinator(Role::Offer);
        coord.connect().await.unwrap();

        let started = std::time::Instant::now();
        let result = coord.wait_for_peer(Duration::ZERO).await;

        assert!(matches!(result, Err(TransferError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(*coord.state(), HandshakeState::TimedOut);
        assert!(!transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_after_deadline() {
        let (mut coord, _transport) = coordinator(Role::Accept);
        coord.connect().await.unwrap();

        let result = coord.wait_for_peer(Duration::from_secs(300)).await;
        assert!(matches!(
            result,
            Err(TransferError::Timeout { waited }) if waited == Duration::from_secs(300)
        ));
    }

    #[tokio::test]
    async fn relay_error_while_waiting_fails() {
        let (mut coord, transport) = coordinator(Role::Offer);
        coord.connect().await.unwrap();
        transport.queue_control(ControlMessage::Error {
            message: "slot expired".into(),
        });

        let result = coord.wait_for_peer(Duration::from_secs(5)).await;
        assert!(matches!(
            result,
            Err(TransferError::ConnectionLost { ref reason, .. }) if reason == "slot expired"
        ));
        assert!(coord.state().is_terminal());
    }

    #[tokio::test]
    async fn channel_drop_while_waiting_is_connection_lost() {
        let (mut coord, transport) = coordinator(Role::Offer);
        coord.connect().await.unwrap();
        transport.end_input();

        let result = coord.wait_for_peer(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TransferError::ConnectionLost { .. })));
    }

    #[tokio::test]
    async fn rejected_join_is_handshake_rejected() {
        let (mut coord, transport) = coordinator(Role::Offer);
        transport.reject_next_connect("role already taken");

        let result = coord.connect().await;
        assert!(matches!(result, Err(TransferError::HandshakeRejected(_))));
        assert!(coord.state().is_terminal());

        // close after a failed connect is safe
        coord.close().await;
        coord.close().await;
    }

    #[tokio::test]
    async fn wait_before_connect_is_not_connected() {
        let (mut coord, _transport) = coordinator(Role::Offer);
        assert!(matches!(
            coord.wait_for_peer(Duration::ZERO).await,
            Err(TransferError::NotConnected)
        ));
    }
}
