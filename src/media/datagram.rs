//! Media datagram wire format
//!
//! ```text
//! <seq>#<sent_ts>#<WxH>#<fps>#<payload...>
//! ```
//!
//! Four ASCII header fields separated by `#`, then the raw compressed
//! payload. The payload may itself contain `#` bytes, so decoding splits on
//! the first four `#` occurrences only and takes the remainder verbatim.
//! A whole encoded datagram must fit in one UDP payload; senders enforce
//! the limit before transmission.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

/// Frame dimensions carried in the header as `WxH`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Half width, half height (extreme-compression mode)
    pub fn halved(self) -> Self {
        Self {
            width: self.width / 2,
            height: self.height / 2,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s.split_once('x').ok_or(())?;
        Ok(Self {
            width: w.parse().map_err(|_| ())?,
            height: h.parse().map_err(|_| ())?,
        })
    }
}

/// Seconds since the UNIX epoch, fractional
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// One compressed video frame on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDatagram {
    /// Monotonic per-call sequence number
    pub seq: u64,
    /// Sender wall-clock timestamp; meaningful only as a relative signal
    pub sent_ts: f64,
    pub resolution: Resolution,
    pub fps: f64,
    pub payload: Bytes,
}

impl MediaDatagram {
    /// Build a datagram stamped with the current time
    pub fn new(seq: u64, resolution: Resolution, fps: f64, payload: Bytes) -> Self {
        Self {
            seq,
            sent_ts: unix_now(),
            resolution,
            fps,
            payload,
        }
    }

    pub fn encode(&self) -> Bytes {
        let header = format!(
            "{}#{}#{}#{}#",
            self.seq, self.sent_ts, self.resolution, self.fps
        );
        let mut buf = BytesMut::with_capacity(header.len() + self.payload.len());
        buf.put_slice(header.as_bytes());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a received datagram. Malformed input (fewer than four
    /// delimiters, non-numeric fields) yields `None`; media is best-effort
    /// and such packets are dropped silently by the receive path.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut delimiters = [0usize; 4];
        let mut found = 0;
        for (index, byte) in data.iter().enumerate() {
            if *byte == b'#' {
                delimiters[found] = index;
                found += 1;
                if found == 4 {
                    break;
                }
            }
        }
        if found < 4 {
            return None;
        }

        let header = std::str::from_utf8(&data[..delimiters[3]]).ok()?;
        let mut fields = header.split('#');
        let seq: u64 = fields.next()?.parse().ok()?;
        let sent_ts: f64 = fields.next()?.parse().ok()?;
        let resolution: Resolution = fields.next()?.parse().ok()?;
        let fps: f64 = fields.next()?.parse().ok()?;
        if !sent_ts.is_finite() || !fps.is_finite() || fps <= 0.0 {
            return None;
        }

        Some(Self {
            seq,
            sent_ts,
            resolution,
            fps,
            payload: Bytes::copy_from_slice(&data[delimiters[3] + 1..]),
        })
    }
}
