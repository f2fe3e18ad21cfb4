//! Mock transport for testing.
//!
//! Allows queueing inbound frames and capturing sent frames for
//! verification. Two mocks created with [`MockTransport::pair`] behave like
//! two connections joined to the same relay slot.

use super::{ChannelFrame, JoinStatus, RelayEndpoint, Transport, TransportError};
use async_trait::async_trait;
use pipe_types::ControlMessage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// `recv()` blocks while the queue is empty, like a real channel; call
/// [`MockTransport::end_input`] to make it report a closed connection once
/// the queue drains. After that, sends fail as if the relay hung up.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
    peer: Option<Arc<Shared>>,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<MockTransportInner>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    endpoint: Option<RelayEndpoint>,
    sent_frames: Vec<ChannelFrame>,
    receive_queue: VecDeque<ChannelFrame>,
    end_of_input: bool,
    peer_present: bool,
    reject_next_connect: Option<String>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl Shared {
    fn deliver(&self, frame: ChannelFrame) {
        let mut inner = self.inner.lock().unwrap();
        inner.receive_queue.push_back(frame);
        drop(inner);
        self.notify.notify_waiters();
    }

    fn hang_up(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.receive_queue.push_back(ChannelFrame::Control(ControlMessage::PeerLeft));
        inner.end_of_input = true;
        drop(inner);
        self.notify.notify_waiters();
    }
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create two transports joined through an in-memory relay slot.
    ///
    /// Payload frames sent on one arrive on the other; closing one delivers
    /// `peer-left` to the other and then ends its input.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Shared::default());
        let b = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&a),
                peer: Some(Arc::clone(&b)),
            },
            Self {
                shared: b,
                peer: Some(a),
            },
        )
    }

    /// Queue a frame to be returned by a later `recv()` call.
    pub fn queue_frame(&self, frame: ChannelFrame) {
        self.shared.deliver(frame);
    }

    /// Queue a control signal.
    pub fn queue_control(&self, message: ControlMessage) {
        self.queue_frame(ChannelFrame::Control(message));
    }

    /// Queue an encoded payload frame.
    pub fn queue_payload(&self, bytes: Vec<u8>) {
        self.queue_frame(ChannelFrame::Payload(bytes));
    }

    /// Report `ConnectionClosed` once the queue is drained.
    pub fn end_input(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.end_of_input = true;
        drop(inner);
        self.shared.notify.notify_waiters();
    }

    /// Make `connect()` report that the peer is already present.
    pub fn set_peer_present(&self, present: bool) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.peer_present = present;
    }

    /// Get all frames that were sent, including the join announcement.
    pub fn sent_frames(&self) -> Vec<ChannelFrame> {
        let inner = self.shared.inner.lock().unwrap();
        inner.sent_frames.clone()
    }

    /// Get the payload frames that were sent.
    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                ChannelFrame::Payload(bytes) => Some(bytes),
                ChannelFrame::Control(_) => None,
            })
            .collect()
    }

    /// Get the endpoint that was joined.
    pub fn endpoint(&self) -> Option<RelayEndpoint> {
        let inner = self.shared.inner.lock().unwrap();
        inner.endpoint.clone()
    }

    /// Cause the next connect() to be rejected by the "relay".
    pub fn reject_next_connect(&self, reason: &str) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.reject_next_connect = Some(reason.to_string());
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.fail_next_recv = Some(error.to_string());
        drop(inner);
        self.shared.notify.notify_waiters();
    }

    fn peer_connected(&self) -> bool {
        self.peer
            .as_ref()
            .map(|peer| peer.inner.lock().unwrap().connected)
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &RelayEndpoint) -> Result<JoinStatus, TransportError> {
        let peer_connected = self.peer_connected();
        let mut inner = self.shared.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }
        if let Some(reason) = inner.reject_next_connect.take() {
            return Err(TransportError::Rejected(reason));
        }

        inner.connected = true;
        inner.endpoint = Some(endpoint.clone());
        inner
            .sent_frames
            .push(ChannelFrame::Control(endpoint.join_message()));
        let peer_present = inner.peer_present || peer_connected;
        drop(inner);

        if peer_connected {
            if let Some(peer) = &self.peer {
                peer.deliver(ChannelFrame::Control(ControlMessage::PeerJoined));
            }
        }

        Ok(if peer_present {
            JoinStatus::PeerPresent
        } else {
            JoinStatus::Waiting
        })
    }

    async fn send(&self, frame: ChannelFrame) -> Result<(), TransportError> {
        {
            let mut inner = self.shared.inner.lock().unwrap();

            if !inner.connected {
                return Err(TransportError::NotConnected);
            }
            if inner.end_of_input {
                return Err(TransportError::ConnectionClosed);
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(TransportError::SendFailed(error));
            }

            inner.sent_frames.push(frame.clone());
        }

        if let (Some(peer), ChannelFrame::Payload(_)) = (&self.peer, &frame) {
            peer.deliver(frame);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<ChannelFrame, TransportError> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.shared.inner.lock().unwrap();

                if !inner.connected {
                    return Err(TransportError::NotConnected);
                }

                // Check for forced failure
                if let Some(error) = inner.fail_next_recv.take() {
                    return Err(TransportError::ReceiveFailed(error));
                }

                if let Some(frame) = inner.receive_queue.pop_front() {
                    return Ok(frame);
                }

                if inner.end_of_input {
                    return Err(TransportError::ConnectionClosed);
                }
            }

            notified.await;
        }
    }

    fn is_connected(&self) -> bool {
        let inner = self.shared.inner.lock().unwrap();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let was_connected = {
            let mut inner = self.shared.inner.lock().unwrap();
            std::mem::replace(&mut inner.connected, false)
        };
        self.shared.notify.notify_waiters();

        if was_connected {
            if let Some(peer) = &self.peer {
                peer.hang_up();
            }
        }
        Ok(())
    }
}
