//! Jitter buffer
//!
//! Presents a smooth, in-order stream of compressed payloads to the
//! renderer, absorbing arrival jitter and limited reordering while emitting
//! a coarse quality signal that drives congestion adaptation.
//!
//! Bookkeeping distinguishes *holes* (sequence gaps internal to the buffer
//! that a late arrival may still fill) from *lost* packets (gaps observed at
//! consume time, past the playback point). Delay and jitter are tracked as
//! exponential moving averages; the expected frame interval follows the
//! advertised fps and is shortened when the buffer backs up.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::constants::{
    BUFFER_MAX, CONSUME_SPEEDUP, EWMA_WEIGHT, MIN_INITIAL_FRAMES,
};
use crate::media::datagram::{unix_now, MediaDatagram};

/// Coarse buffer health classification, ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BufferQuality {
    SuperLow,
    Low,
    Medium,
    High,
}

impl BufferQuality {
    pub fn label(self) -> &'static str {
        match self {
            BufferQuality::SuperLow => "SUPER_LOW",
            BufferQuality::Low => "LOW",
            BufferQuality::Medium => "MEDIUM",
            BufferQuality::High => "HIGH",
        }
    }
}

/// Telemetry snapshot returned by [`JitterBuffer::statistics`]
#[derive(Debug, Clone)]
pub struct BufferStats {
    pub quality: BufferQuality,
    pub packages_lost: u64,
    /// EWMA one-way delay, seconds (relative signal; clocks are unsynced)
    pub avg_delay: f64,
    /// EWMA delay deviation, seconds
    pub jitter: f64,
}

/// One buffered payload; the delay computed at arrival has already been
/// folded into the running estimators
struct BufferedDatagram {
    seq: u64,
    payload: Bytes,
}

struct Inner {
    /// Strictly sorted by sequence number
    entries: VecDeque<BufferedDatagram>,
    /// Highest sequence ever popped; only increases
    last_consumed: Option<u64>,
    last_consumed_at: Option<Instant>,
    /// Sequence gaps currently internal to the buffer
    num_holes: u64,
    /// Gaps observed at consume time, never filled
    packages_lost: u64,
    avg_delay: f64,
    jitter: f64,
    /// EWMA of `1/fps`, seconds
    time_between_frames: f64,
    frames_received: u64,
    quality: BufferQuality,
    /// Set once when the initial-frame threshold is first reached
    playable_edge: bool,
    /// Bumped on reset so a stale pacer retires itself
    epoch: u64,
}

impl Inner {
    fn fresh(epoch: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            last_consumed: None,
            last_consumed_at: None,
            num_holes: 0,
            packages_lost: 0,
            avg_delay: 0.0,
            jitter: 0.0,
            time_between_frames: 0.0,
            frames_received: 0,
            quality: BufferQuality::SuperLow,
            playable_edge: false,
            epoch,
        }
    }

    /// Score-based quality classification. `seq` is the sequence of the
    /// datagram that triggered the update, normalizing the loss term over
    /// the stream observed so far.
    fn recompute_quality(&mut self, seq: u64) {
        let mut score = 5.0 * self.num_holes as f64
            + 2.0 * self.packages_lost as f64 / (seq + 1) as f64;
        if self.avg_delay >= 0.300 {
            score += 30.0;
        } else if self.avg_delay > 0.150 {
            score += 10.0;
        }
        self.quality = if score < 5.0 {
            BufferQuality::High
        } else if score < 20.0 {
            BufferQuality::Medium
        } else {
            BufferQuality::Low
        };
    }
}

/// Reorder buffer shared between the receive pipeline, the display pacer
/// and the renderer. All mutators and readers go through one internal lock.
pub struct JitterBuffer {
    inner: Mutex<Inner>,
    /// Renderer wake-up channel; one send = one render tick
    wakeup: Sender<()>,
}

impl JitterBuffer {
    pub fn new(wakeup: Sender<()>) -> Self {
        Self {
            inner: Mutex::new(Inner::fresh(0)),
            wakeup,
        }
    }

    /// Insert a received datagram, keeping the buffer sorted by sequence.
    /// Returns `false` when the datagram is late (sequence at or below the
    /// consume point) or a duplicate of a buffered entry.
    pub fn insert(&self, datagram: MediaDatagram) -> bool {
        let arrival = unix_now();
        let delay = arrival - datagram.sent_ts;
        let seq = datagram.seq;

        let mut inner = self.inner.lock();

        if let Some(last) = inner.last_consumed {
            if seq <= last {
                return false;
            }
        }
        // Duplicates would corrupt the hole accounting; reject them outright
        if inner.entries.iter().any(|e| e.seq == seq) {
            return false;
        }

        // Track the expected frame interval; drain faster when backed up
        let interval = 1.0 / datagram.fps;
        if inner.frames_received == 0 {
            inner.time_between_frames = interval;
        } else {
            inner.time_between_frames = (1.0 - EWMA_WEIGHT) * inner.time_between_frames
                + EWMA_WEIGHT * interval;
        }
        if inner.entries.len() >= BUFFER_MAX {
            inner.time_between_frames /= CONSUME_SPEEDUP;
        }

        inner.frames_received += 1;
        if inner.frames_received == 1 {
            inner.avg_delay = delay;
        }
        if inner.frames_received == MIN_INITIAL_FRAMES {
            inner.playable_edge = true;
        }

        let entry = BufferedDatagram {
            seq,
            payload: datagram.payload,
        };
        let head_seq = inner.entries.front().map(|e| e.seq);
        let tail_seq = inner.entries.back().map(|e| e.seq);
        match (head_seq, tail_seq) {
            (None, _) => inner.entries.push_back(entry),
            (Some(head), _) if seq < head => {
                inner.num_holes += head - seq - 1;
                inner.entries.push_front(entry);
            }
            (_, Some(tail)) if seq > tail => {
                inner.num_holes += seq - tail - 1;
                inner.entries.push_back(entry);
            }
            _ => {
                // Interior insertion fills one previously counted hole
                let position = inner
                    .entries
                    .iter()
                    .position(|e| e.seq > seq)
                    .unwrap_or(inner.entries.len());
                inner.num_holes = inner.num_holes.saturating_sub(1);
                inner.entries.insert(position, entry);
            }
        }

        inner.avg_delay = (1.0 - EWMA_WEIGHT) * inner.avg_delay + EWMA_WEIGHT * delay;
        let deviation = (delay - inner.avg_delay).abs();
        inner.jitter = (1.0 - EWMA_WEIGHT) * inner.jitter + EWMA_WEIGHT * deviation;

        inner.recompute_quality(seq);
        true
    }

    /// Pop the next in-order payload, or `None` when pacing forbids it, the
    /// warm-up threshold has not been reached, or the buffer is empty.
    pub fn consume(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock();

        if let Some(at) = inner.last_consumed_at {
            if at.elapsed().as_secs_f64() < inner.time_between_frames {
                return None;
            }
        }
        if inner.frames_received < MIN_INITIAL_FRAMES {
            return None;
        }
        let head = match inner.entries.pop_front() {
            Some(head) => head,
            None => {
                inner.quality = BufferQuality::SuperLow;
                return None;
            }
        };

        let expected = inner.last_consumed.map_or(head.seq, |last| last + 1);
        inner.packages_lost += head.seq - expected;
        inner.last_consumed = Some(head.seq);
        inner.last_consumed_at = Some(Instant::now());

        match inner.entries.front().map(|e| e.seq) {
            Some(next_seq) => {
                // The gap up to the new head leaves the buffer; it will be
                // accounted as lost when the new head is consumed
                let gap = next_seq - head.seq - 1;
                inner.num_holes = inner.num_holes.saturating_sub(gap);
            }
            None => inner.quality = BufferQuality::SuperLow,
        }

        Some(head.payload)
    }

    /// Quality, loss and timing snapshot for telemetry and congestion logic
    pub fn statistics(&self) -> BufferStats {
        let inner = self.inner.lock();
        let quality = if inner.entries.is_empty() {
            BufferQuality::SuperLow
        } else {
            inner.quality
        };
        BufferStats {
            quality,
            packages_lost: inner.packages_lost,
            avg_delay: inner.avg_delay,
            jitter: inner.jitter,
        }
    }

    /// Edge-triggered: true exactly once, when the warm-up threshold is
    /// first reached and the display pacer should start
    pub fn take_playable_edge(&self) -> bool {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.playable_edge)
    }

    /// Current expected frame interval, floored so a pacer never spins
    pub fn frame_interval(&self) -> Duration {
        let inner = self.inner.lock();
        Duration::from_secs_f64(inner.time_between_frames.max(0.001))
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// True while a pacer started under `epoch` should keep ticking
    pub fn pacer_alive(&self, epoch: u64) -> bool {
        let inner = self.inner.lock();
        inner.epoch == epoch && inner.frames_received >= MIN_INITIAL_FRAMES
    }

    /// Wake the renderer: one send = one render tick
    pub fn wake(&self) -> bool {
        self.wakeup.send(()).is_ok()
    }

    /// Flush everything back to the pristine state (call teardown). Any
    /// running pacer observes the epoch change and retires.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let epoch = inner.epoch + 1;
        *inner = Inner::fresh(epoch);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::datagram::Resolution;
    use proptest::prelude::*;
    use std::time::Duration;

    /// High fps keeps the pacing gate effectively open in tests
    const TEST_FPS: f64 = 1e9;

    fn buffer() -> JitterBuffer {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::mem::forget(rx);
        JitterBuffer::new(tx)
    }

    fn datagram(seq: u64) -> MediaDatagram {
        datagram_at(seq, TEST_FPS)
    }

    fn datagram_at(seq: u64, fps: f64) -> MediaDatagram {
        MediaDatagram {
            seq,
            sent_ts: unix_now(),
            resolution: Resolution::new(640, 480),
            fps,
            payload: Bytes::from(seq.to_be_bytes().to_vec()),
        }
    }

    /// Consume with a deadline, riding out the pacing gate
    fn consume_blocking(buf: &JitterBuffer) -> Option<Bytes> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(payload) = buf.consume() {
                return Some(payload);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    fn seq_of(payload: &Bytes) -> u64 {
        u64::from_be_bytes(payload.as_ref().try_into().unwrap())
    }

    #[test]
    fn reordered_arrivals_consume_in_order() {
        let buf = buffer();
        for seq in [1, 3, 2, 4, 6, 5] {
            assert!(buf.insert(datagram(seq)));
        }
        let consumed: Vec<u64> = (0..6)
            .map(|_| seq_of(&consume_blocking(&buf).unwrap()))
            .collect();
        assert_eq!(consumed, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.statistics().packages_lost, 0);
    }

    #[test]
    fn missing_sequence_counts_as_lost() {
        let buf = buffer();
        for seq in [1, 2, 4, 5] {
            assert!(buf.insert(datagram(seq)));
        }
        // Below warm-up until the fifth frame
        assert!(buf.consume().is_none());
        assert!(buf.insert(datagram(6)));

        let consumed: Vec<u64> = (0..5)
            .map(|_| seq_of(&consume_blocking(&buf).unwrap()))
            .collect();
        assert_eq!(consumed, vec![1, 2, 4, 5, 6]);
        assert_eq!(buf.statistics().packages_lost, 1);
    }

    #[test]
    fn steady_state_is_one_consume_per_insert() {
        let buf = buffer();
        for seq in 1..=5 {
            assert!(buf.insert(datagram(seq)));
        }
        for _ in 0..5 {
            assert!(consume_blocking(&buf).is_some());
        }
        // Past warm-up, every in-order insert yields exactly one consume
        for seq in 6..=20 {
            assert!(buf.insert(datagram(seq)));
            assert_eq!(seq_of(&consume_blocking(&buf).unwrap()), seq);
            assert!(buf.consume().is_none());
        }
        assert_eq!(buf.statistics().packages_lost, 0);
    }

    #[test]
    fn late_datagram_is_rejected() {
        let buf = buffer();
        for seq in 1..=10 {
            assert!(buf.insert(datagram(seq)));
        }
        for _ in 0..10 {
            consume_blocking(&buf).unwrap();
        }
        let len_before = buf.len();
        assert!(!buf.insert(datagram(4)));
        assert_eq!(buf.len(), len_before);
    }

    #[test]
    fn duplicate_of_buffered_entry_is_rejected() {
        let buf = buffer();
        assert!(buf.insert(datagram(3)));
        assert!(!buf.insert(datagram(3)));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn empty_buffer_reports_super_low() {
        let buf = buffer();
        assert_eq!(buf.statistics().quality, BufferQuality::SuperLow);
        for seq in 1..=5 {
            buf.insert(datagram(seq));
        }
        assert!(buf.statistics().quality > BufferQuality::SuperLow);
        for _ in 0..5 {
            consume_blocking(&buf).unwrap();
        }
        assert_eq!(buf.statistics().quality, BufferQuality::SuperLow);
    }

    #[test]
    fn warm_up_gate_holds_back_playback() {
        let buf = buffer();
        for seq in 1..=4 {
            buf.insert(datagram(seq));
        }
        assert!(buf.consume().is_none());
        assert!(!buf.take_playable_edge());
        buf.insert(datagram(5));
        assert!(buf.take_playable_edge());
        // The edge fires once
        assert!(!buf.take_playable_edge());
        assert!(consume_blocking(&buf).is_some());
    }

    #[test]
    fn pacing_gates_consecutive_consumes() {
        let buf = buffer();
        // 10 fps: one frame per 100 ms
        for seq in 1..=5 {
            buf.insert(datagram_at(seq, 10.0));
        }
        assert!(buf.consume().is_some());
        // An immediate second consume is paced out
        assert!(buf.consume().is_none());
    }

    #[test]
    fn backlog_shortens_frame_interval() {
        let buf = buffer();
        for seq in 1..=5 {
            buf.insert(datagram_at(seq, 10.0));
        }
        let before = buf.frame_interval();
        // Sixth insert sees a full buffer and divides the interval
        buf.insert(datagram_at(6, 10.0));
        assert!(buf.frame_interval() < before);
    }

    #[test]
    fn forward_jump_inflates_holes_then_quality_drops() {
        let buf = buffer();
        buf.insert(datagram(1));
        buf.insert(datagram(50));
        assert_eq!(buf.statistics().quality, BufferQuality::Low);
    }

    #[test]
    fn reset_restores_pristine_state() {
        let buf = buffer();
        for seq in 1..=6 {
            buf.insert(datagram(seq));
        }
        let epoch = buf.epoch();
        buf.reset();
        assert!(!buf.pacer_alive(epoch));
        assert_eq!(buf.statistics().packages_lost, 0);
        assert_eq!(buf.statistics().quality, BufferQuality::SuperLow);
        // Sequences restart across calls
        assert!(buf.insert(datagram(1)));
    }

    proptest! {
        /// P1/P2/P3/P5: consumed sequences strictly increase, the consume
        /// point never regresses, late datagrams are rejected, and after a
        /// drain loss + consumed covers the observed range exactly.
        #[test]
        fn interleavings_preserve_order_and_accounting(
            seqs in proptest::collection::vec(1u64..200, 1..60),
            consume_every in 1usize..5,
        ) {
            let buf = buffer();
            let mut consumed: Vec<u64> = Vec::new();

            for (i, seq) in seqs.iter().enumerate() {
                let inserted = buf.insert(datagram(*seq));
                if let Some(last) = consumed.last() {
                    if *seq <= *last {
                        prop_assert!(!inserted);
                    }
                }
                if i % consume_every == 0 {
                    if let Some(payload) = buf.consume() {
                        consumed.push(seq_of(&payload));
                    }
                }
            }
            while let Some(payload) = buf.consume() {
                consumed.push(seq_of(&payload));
            }

            for pair in consumed.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            if let (Some(first), Some(last)) = (consumed.first(), consumed.last()) {
                let lost = buf.statistics().packages_lost;
                prop_assert_eq!(
                    lost + consumed.len() as u64,
                    last - first + 1
                );
            }
        }
    }
}
