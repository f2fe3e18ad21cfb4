//! Rendezvous state machine for AirPipe.
//!
//! Both roles run the same machine:
//!
//! ```text
//! Idle -> Connected -> WaitingForPeer -> Paired -> Transferring -> Done
//!                                  \-> TimedOut (terminal failure)
//!        \-> Failed (terminal failure, any state)
//! ```
//!
//! The machine takes events as input and produces a new state plus a list of
//! actions. The actual I/O (reading control frames, closing the channel) is
//! performed by pipe-client, not by this module.

/// Handshake state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Relay channel not opened yet.
    Idle,
    /// Joined the rendezvous slot, peer not observed yet.
    Connected,
    /// Blocking on a peer-joined signal.
    WaitingForPeer,
    /// Both roles are present at the relay.
    Paired,
    /// Transfer engine is running.
    Transferring,
    /// Transfer completed.
    Done,
    /// No peer arrived within the wait timeout.
    TimedOut,
    /// Connection failed or the peer left.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl HandshakeState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is responsible
    /// for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Terminal states absorb everything
            (state, _) if state.is_terminal() => (state, vec![]),

            // From Idle
            (Self::Idle, Event::Joined) => (Self::Connected, vec![]),
            (Self::Idle, Event::JoinedWithPeer) => (Self::Paired, vec![Action::ReportPaired]),

            // From Connected: the peer may show up before anyone waits for it
            (Self::Connected, Event::WaitStarted) => (Self::WaitingForPeer, vec![Action::AwaitPeer]),
            (Self::Connected, Event::PeerJoined) => (Self::Paired, vec![Action::ReportPaired]),

            // From WaitingForPeer
            (Self::WaitingForPeer, Event::PeerJoined) => {
                (Self::Paired, vec![Action::ReportPaired])
            }
            (Self::WaitingForPeer, Event::TimeoutElapsed) => {
                (Self::TimedOut, vec![Action::CloseChannel])
            }

            // From Paired
            (Self::Paired, Event::WaitStarted) => (Self::Paired, vec![Action::ReportPaired]),
            (Self::Paired, Event::TransferStarted) => (Self::Transferring, vec![]),

            // From Transferring
            (Self::Transferring, Event::TransferFinished) => {
                (Self::Done, vec![Action::CloseChannel])
            }

            // Failures from any live state
            (_, Event::PeerLeft) => (
                Self::Failed {
                    reason: "peer left".into(),
                },
                vec![Action::CloseChannel],
            ),
            (_, Event::ChannelFailed { reason }) => {
                (Self::Failed { reason }, vec![Action::CloseChannel])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if both roles are present (and the transfer has not ended).
    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Paired | Self::Transferring)
    }

    /// Check if the relay channel has been opened.
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }

    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::TimedOut | Self::Failed { .. })
    }
}

impl Default for HandshakeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events observed by the handshake coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Relay accepted the join, peer absent.
    Joined,
    /// Relay accepted the join and the peer was already there.
    JoinedWithPeer,
    /// Caller started waiting for the peer.
    WaitStarted,
    /// Relay signalled peer-joined.
    PeerJoined,
    /// Relay signalled peer-left.
    PeerLeft,
    /// The wait deadline passed.
    TimeoutElapsed,
    /// Transfer engine started.
    TransferStarted,
    /// Transfer engine finished cleanly.
    TransferFinished,
    /// Relay channel failed.
    ChannelFailed {
        /// Error message describing the failure.
        reason: String,
    },
}

/// Actions to be executed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Read control frames until the peer arrives.
    AwaitPeer,
    /// The peer is present; the wait can return.
    ReportPaired,
    /// Close the relay channel.
    CloseChannel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(events: Vec<Event>) -> (HandshakeState, Vec<Action>) {
        let mut state = HandshakeState::new();
        let mut last = vec![];
        for event in events {
            let (next, actions) = state.on_event(event);
            state = next;
            last = actions;
        }
        (state, last)
    }

    #[test]
    fn starts_idle() {
        let state = HandshakeState::new();
        assert_eq!(state, HandshakeState::Idle);
        assert!(!state.is_connected());
    }

    #[test]
    fn happy_path_reaches_done() {
        let (state, actions) = drive(vec![
            Event::Joined,
            Event::WaitStarted,
            Event::PeerJoined,
            Event::TransferStarted,
            Event::TransferFinished,
        ]);
        assert_eq!(state, HandshakeState::Done);
        assert_eq!(actions, vec![Action::CloseChannel]);
    }

    #[test]
    fn wait_emits_await_peer() {
        let (state, actions) = drive(vec![Event::Joined, Event::WaitStarted]);
        assert_eq!(state, HandshakeState::WaitingForPeer);
        assert_eq!(actions, vec![Action::AwaitPeer]);
    }

    #[test]
    fn peer_present_at_join_pairs_immediately() {
        let (state, actions) = drive(vec![Event::JoinedWithPeer]);
        assert!(state.is_paired());
        assert_eq!(actions, vec![Action::ReportPaired]);

        // Waiting afterwards returns straight away
        let (state, actions) = state.on_event(Event::WaitStarted);
        assert_eq!(state, HandshakeState::Paired);
        assert_eq!(actions, vec![Action::ReportPaired]);
    }

    #[test]
    fn early_peer_joined_before_wait() {
        let (state, _) = drive(vec![Event::Joined, Event::PeerJoined]);
        assert_eq!(state, HandshakeState::Paired);
    }

    #[test]
    fn timeout_is_terminal() {
        let (state, actions) = drive(vec![
            Event::Joined,
            Event::WaitStarted,
            Event::TimeoutElapsed,
        ]);
        assert_eq!(state, HandshakeState::TimedOut);
        assert_eq!(actions, vec![Action::CloseChannel]);
        assert!(state.is_terminal());

        // A late peer-joined does not revive the session
        let (state, actions) = state.on_event(Event::PeerJoined);
        assert_eq!(state, HandshakeState::TimedOut);
        assert!(actions.is_empty());
    }

    #[test]
    fn peer_left_mid_transfer_fails() {
        let (state, actions) = drive(vec![
            Event::JoinedWithPeer,
            Event::TransferStarted,
            Event::PeerLeft,
        ]);
        assert!(matches!(state, HandshakeState::Failed { .. }));
        assert_eq!(actions, vec![Action::CloseChannel]);
    }

    #[test]
    fn channel_failure_records_reason() {
        let (state, _) = drive(vec![
            Event::Joined,
            Event::ChannelFailed {
                reason: "reset by peer".into(),
            },
        ]);
        assert_eq!(
            state,
            HandshakeState::Failed {
                reason: "reset by peer".into()
            }
        );
    }

    #[test]
    fn timeout_outside_wait_is_ignored() {
        let (state, actions) = drive(vec![Event::Joined, Event::TimeoutElapsed]);
        assert_eq!(state, HandshakeState::Connected);
        assert!(actions.is_empty());
    }

    #[test]
    fn transfer_cannot_start_before_pairing() {
        let (state, _) = drive(vec![Event::Joined, Event::TransferStarted]);
        assert_eq!(state, HandshakeState::Connected);
    }
}
