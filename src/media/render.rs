//! Renderer worker
//!
//! Blocks on the wake-up channel: one wake equals one render tick, raised
//! by the capture pipeline per local frame and by the display pacer per
//! expected remote frame. Each tick shows the freshest local frame (or the
//! frozen previous one), consumes at most one remote payload from the
//! jitter buffer, publishes statistics, and drives the congestion feedback
//! loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::call::CallControl;
use crate::media::buffer::JitterBuffer;
use crate::media::capture::VideoFrame;
use crate::media::codec::FrameDecoder;
use crate::media::congestion::{CongestionController, CongestionInput};
use crate::ui::{CallDisplay, Gui, MediaStatus};

pub struct RenderPipeline {
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    /// Used to unblock the tick wait during shutdown
    wakeup_tx: Sender<()>,
}

pub struct RenderPipelineContext {
    /// Render ticks (counting semaphore: one send = one tick)
    pub wakeups: Receiver<()>,
    pub wakeup_tx: Sender<()>,
    /// Local preview frames from the capture pipeline
    pub frames: Receiver<VideoFrame>,
    pub buffer: Arc<JitterBuffer>,
    pub call: Arc<CallControl>,
    pub gui: Arc<dyn Gui>,
    pub decoder: Arc<dyn FrameDecoder>,
    pub extreme_compression: Arc<AtomicBool>,
}

impl RenderPipeline {
    pub fn start(context: RenderPipelineContext) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let wakeup_tx = context.wakeup_tx.clone();
        let handle = thread::Builder::new()
            .name("renderer".to_string())
            .spawn(move || Self::run(context, flag))?;
        Ok(Self {
            thread_handle: Some(handle),
            running,
            wakeup_tx,
        })
    }

    fn run(context: RenderPipelineContext, running: Arc<AtomicBool>) {
        let mut congestion = CongestionController::new();
        let mut last_local: Option<VideoFrame> = None;
        let mut last_remote: Option<VideoFrame> = None;

        while running.load(Ordering::Relaxed) {
            if context.wakeups.recv().is_err() {
                // Both producers are gone
                break;
            }

            // Drain to the freshest local frame, frozen frame as fallback
            while let Ok(frame) = context.frames.try_recv() {
                last_local = Some(frame);
            }

            let payload = context.buffer.consume();
            let stats = context.buffer.statistics();

            let decision = congestion.on_tick(
                Instant::now(),
                CongestionInput {
                    in_call: context.call.in_call(),
                    v0: context.call.is_v0(),
                    quality: stats.quality,
                    last_remote_notice: context.call.last_congested_recv(),
                },
            );
            context
                .extreme_compression
                .store(decision.extreme_compression, Ordering::Relaxed);
            if decision.emit_congested {
                context.call.send_congested();
            }

            let fresh_remote = payload.is_some();
            if let Some(payload) = payload {
                match context.decoder.decode(&payload) {
                    Ok(frame) => last_remote = Some(frame),
                    Err(e) => tracing::warn!("undecodable remote frame: {e}"),
                }
            }
            if !context.call.in_call() {
                // Frozen remote frames do not outlive the call
                last_remote = None;
            }

            if let Some(local) = &last_local {
                context.gui.show_frame(local, last_remote.as_ref());
            }
            let media_status = if fresh_remote || last_remote.is_some() {
                Some(MediaStatus::from(&stats))
            } else {
                None
            };
            context.gui.set_status(CallDisplay::Media(media_status));
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.wakeup_tx.send(());
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
