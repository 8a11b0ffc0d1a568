//! Capture/send pipeline
//!
//! One worker pulls frames from the capture source, feeds the local
//! preview queue, wakes the renderer, and — while media egress is
//! permitted — compresses and transmits each frame as a datagram. The loop
//! re-checks the egress gate every iteration and never blocks on a call
//! transition.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::call::CallControl;
use crate::constants::{JPEG_QUALITY, MAX_DATAGRAM_SIZE, VIDEO_HEIGHT, VIDEO_WIDTH};
use crate::media::capture::{CaptureSource, VideoFrame};
use crate::media::codec::FrameEncoder;
use crate::media::datagram::{MediaDatagram, Resolution};

pub struct SendPipeline {
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

/// Everything the worker needs, wired up by the client
pub struct SendPipelineContext {
    pub capture: Arc<Mutex<CaptureSource>>,
    /// Local preview frames for the renderer
    pub frames: Sender<VideoFrame>,
    /// Renderer wake-up: one send per captured frame
    pub wakeup: Sender<()>,
    pub call: Arc<CallControl>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub socket: Arc<UdpSocket>,
    /// Half-resolution mode driven by the congestion feedback loop
    pub extreme_compression: Arc<AtomicBool>,
}

impl SendPipeline {
    pub fn start(context: SendPipelineContext) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("capture-send".to_string())
            .spawn(move || Self::run(context, flag))?;
        Ok(Self {
            thread_handle: Some(handle),
            running,
        })
    }

    fn run(context: SendPipelineContext, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            let (frame, fps) = {
                let mut capture = context.capture.lock();
                (capture.grab(), capture.fps())
            };

            // Local preview first; a lagging renderer just misses this frame
            if context.frames.try_send(frame.clone()).is_err() {
                tracing::debug!("preview queue full, dropping local frame");
            }
            if context.wakeup.send(()).is_err() {
                // Renderer is gone, nothing left to feed
                break;
            }

            if context.call.should_media_flow() {
                Self::encode_and_send(&context, &frame, fps);
            }

            thread::sleep(Duration::from_secs_f64(1.0 / fps.max(1.0)));
        }
    }

    fn encode_and_send(context: &SendPipelineContext, frame: &VideoFrame, fps: f64) {
        let target = if context.extreme_compression.load(Ordering::Relaxed) {
            Resolution::new(VIDEO_WIDTH, VIDEO_HEIGHT).halved()
        } else {
            Resolution::new(VIDEO_WIDTH, VIDEO_HEIGHT)
        };

        let payload = match context.encoder.encode(frame, target, JPEG_QUALITY) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("error compressing a frame: {e}");
                return;
            }
        };

        // The call might have moved away since the gate check
        let Some(seq) = context.call.next_sequence() else {
            return;
        };
        let Some(addr) = context.call.peer_media_addr() else {
            return;
        };

        let datagram = MediaDatagram::new(seq, target, fps, payload).encode();
        if datagram.len() > MAX_DATAGRAM_SIZE {
            tracing::warn!(
                "frame of {} bytes exceeds the datagram limit, skipping",
                datagram.len()
            );
            return;
        }
        if let Err(e) = context.socket.send_to(&datagram, addr) {
            tracing::warn!("failed to send media datagram: {e}");
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SendPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
