//! Display pacer
//!
//! A dedicated worker, started when the jitter buffer first becomes
//! playable, that wakes the renderer once per expected frame interval. The
//! capture pipeline raises the same wake-up per local frame, so the
//! renderer effectively ticks at the max of the local capture rate and the
//! remote expected rate.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::media::buffer::JitterBuffer;

pub struct DisplayPacer;

impl DisplayPacer {
    /// Spawn the pacer for the buffer's current epoch. The thread retires
    /// when the buffer is reset (epoch change) or the renderer goes away.
    pub fn spawn(buffer: Arc<JitterBuffer>) -> std::io::Result<JoinHandle<()>> {
        let epoch = buffer.epoch();
        thread::Builder::new()
            .name("display-pacer".to_string())
            .spawn(move || {
                tracing::debug!("display pacer started (epoch {epoch})");
                while buffer.pacer_alive(epoch) {
                    thread::sleep(buffer.frame_interval());
                    if !buffer.wake() {
                        break;
                    }
                }
                tracing::debug!("display pacer retired (epoch {epoch})");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::datagram::{MediaDatagram, Resolution};
    use bytes::Bytes;
    use std::time::Duration;

    fn playable_buffer(wakeup: crossbeam_channel::Sender<()>) -> Arc<JitterBuffer> {
        let buffer = Arc::new(JitterBuffer::new(wakeup));
        for seq in 1..=5 {
            buffer.insert(MediaDatagram {
                seq,
                sent_ts: crate::media::datagram::unix_now(),
                resolution: Resolution::new(640, 480),
                fps: 100.0,
                payload: Bytes::from_static(b"frame"),
            });
        }
        assert!(buffer.take_playable_edge());
        buffer
    }

    #[test]
    fn ticks_until_reset() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let buffer = playable_buffer(tx);
        let handle = DisplayPacer::spawn(buffer.clone()).unwrap();

        // 100 fps: expect a handful of ticks well within a second
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(1)).unwrap();
        }

        buffer.reset();
        handle.join().unwrap();
    }
}
