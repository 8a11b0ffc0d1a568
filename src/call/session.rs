//! Call session state
//!
//! Exactly one session exists per client, guarded by one lock in
//! [`CallControl`](crate::call::CallControl). Media egress is permitted
//! only in `Active` with neither side on hold; sequence numbers restart
//! from zero across calls.

use std::net::TcpStream;
use std::time::Instant;

use crate::peer::PeerInfo;

/// Signaling state of the single call session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// Outbound setup in flight
    Dialing,
    /// Incoming CALLING received, waiting for the local answer
    RingingIncoming,
    Active,
    LocalHeld,
    RemoteHeld,
    BothHeld,
    Terminated,
}

impl CallState {
    pub fn is_idle(self) -> bool {
        matches!(self, CallState::Idle)
    }

    /// A connected call in any hold combination
    pub fn in_call(self) -> bool {
        matches!(
            self,
            CallState::Active | CallState::LocalHeld | CallState::RemoteHeld | CallState::BothHeld
        )
    }
}

pub struct Session {
    pub state: CallState,
    pub peer: Option<PeerInfo>,
    /// Negotiated protocol tag for the current call
    pub protocol: Option<String>,
    pub we_on_hold: bool,
    pub they_on_hold: bool,
    /// Control-channel socket; the per-call reader owns a clone
    pub socket: Option<TcpStream>,
    /// Most recent CALL_CONGESTED received from the peer (V1+)
    pub last_congested_recv: Option<Instant>,
    next_seq: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: CallState::Idle,
            peer: None,
            protocol: None,
            we_on_hold: false,
            they_on_hold: false,
            socket: None,
            last_congested_recv: None,
            next_seq: 0,
        }
    }

    /// Media egress/ingress gate: connected and nobody on hold
    pub fn media_may_flow(&self) -> bool {
        self.state == CallState::Active
    }

    /// Strictly increasing within a call; `None` outside one
    pub fn next_sequence(&mut self) -> Option<u64> {
        if self.state.in_call() {
            self.next_seq += 1;
            Some(self.next_seq)
        } else {
            None
        }
    }

    pub fn set_local_hold(&mut self, held: bool) {
        self.we_on_hold = held;
        self.recompute_hold_state();
    }

    pub fn set_remote_hold(&mut self, held: bool) {
        self.they_on_hold = held;
        self.recompute_hold_state();
    }

    fn recompute_hold_state(&mut self) {
        if self.state.in_call() {
            self.state = match (self.we_on_hold, self.they_on_hold) {
                (false, false) => CallState::Active,
                (true, false) => CallState::LocalHeld,
                (false, true) => CallState::RemoteHeld,
                (true, true) => CallState::BothHeld,
            };
        }
    }

    /// Back to pristine idle. Dropping the socket closes it. Idempotent.
    pub fn reset(&mut self) {
        self.state = CallState::Idle;
        self.peer = None;
        self.protocol = None;
        self.we_on_hold = false;
        self.they_on_hold = false;
        self.socket = None;
        self.last_congested_recv = None;
        self.next_seq = 0;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
