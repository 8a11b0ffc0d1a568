//! Congestion feedback
//!
//! Each render tick feeds the buffer quality into this controller, which
//! decides how the sender adapts. Under V0 the connection is assumed
//! symmetric and the local sender shrinks its own frames; under V1+ a
//! CALL_CONGESTED notice asks the remote sender to adapt instead, rate
//! limited to one notice per interval. A notice received from the peer
//! keeps our sender in extreme-compression mode until the interval since
//! the most recent notice elapses.

use std::time::Instant;

use crate::constants::CONGESTED_INTERVAL;
use crate::media::buffer::BufferQuality;

/// What the renderer should apply after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionDecision {
    /// Desired state of the sender's half-resolution mode
    pub extreme_compression: bool,
    /// Emit one CALL_CONGESTED now (already rate limited)
    pub emit_congested: bool,
}

/// Snapshot of the inputs the decision depends on
#[derive(Debug, Clone, Copy)]
pub struct CongestionInput {
    pub in_call: bool,
    /// Negotiated protocol is the V0 baseline
    pub v0: bool,
    pub quality: BufferQuality,
    /// Most recent CALL_CONGESTED received from the peer
    pub last_remote_notice: Option<Instant>,
}

pub struct CongestionController {
    last_sent: Option<Instant>,
}

impl CongestionController {
    pub fn new() -> Self {
        Self { last_sent: None }
    }

    pub fn on_tick(&mut self, now: Instant, input: CongestionInput) -> CongestionDecision {
        let local_congestion = input.in_call && input.quality < BufferQuality::Medium;

        let emit_congested = local_congestion
            && !input.v0
            && self
                .last_sent
                .map_or(true, |at| now.duration_since(at) >= CONGESTED_INTERVAL);
        if emit_congested {
            self.last_sent = Some(now);
        }

        let remote_recent = input
            .last_remote_notice
            .map_or(false, |at| now.duration_since(at) < CONGESTED_INTERVAL);

        CongestionDecision {
            extreme_compression: (input.v0 && local_congestion) || remote_recent,
            emit_congested,
        }
    }
}

impl Default for CongestionController {
    fn default() -> Self {
        Self::new()
    }
}
