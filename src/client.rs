//! Client orchestration
//!
//! Owns the sockets, the jitter buffer, the capture source and the worker
//! pipelines, and wires them to the call control. The GUI, camera and
//! frame codec are injected as capabilities; the core never reaches out to
//! them beyond their contracts.
//!
//! ```text
//! capture ─> encode ─> pacing ─> send socket ═══> network
//! network ═══> recv socket ─> peer filter ─> jitter buffer ─> renderer
//!                 control socket <═> signaling (call state, holds, congestion)
//! ```

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::call::CallControl;
use crate::constants::FRAME_QUEUE_CAPACITY;
use crate::directory::DirectoryClient;
use crate::error::Result;
use crate::media::buffer::{BufferStats, JitterBuffer};
use crate::media::capture::{CaptureSource, FrameSource};
use crate::media::codec::{FrameDecoder, FrameEncoder};
use crate::media::recv::RecvPipeline;
use crate::media::render::{RenderPipeline, RenderPipelineContext};
use crate::media::send::{SendPipeline, SendPipelineContext};
use crate::net::udp::{create_media_socket, create_send_socket};
use crate::peer::{LocalPeer, PeerInfo};
use crate::ui::Gui;

/// External collaborators injected at construction
pub struct Collaborators {
    pub gui: Arc<dyn Gui>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub decoder: Arc<dyn FrameDecoder>,
    /// `None` enables no-camera mode with the synthesized placeholder
    pub camera: Option<Box<dyn FrameSource>>,
}

pub struct VideoClient {
    local: LocalPeer,
    gui: Arc<dyn Gui>,
    encoder: Arc<dyn FrameEncoder>,
    decoder: Arc<dyn FrameDecoder>,
    call: Arc<CallControl>,
    buffer: Arc<JitterBuffer>,
    extreme_compression: Arc<AtomicBool>,
    capture: Arc<Mutex<CaptureSource>>,
    recv_socket: Arc<UdpSocket>,
    send_socket: Arc<UdpSocket>,
    directory: DirectoryClient,
    /// Known users from the last LIST_USERS refresh
    users: Arc<DashMap<String, PeerInfo>>,
    wakeup_tx: crossbeam_channel::Sender<()>,
    wakeup_rx: Option<crossbeam_channel::Receiver<()>>,
    listener_addr: Option<SocketAddr>,
    send_pipeline: Option<SendPipeline>,
    recv_pipeline: Option<RecvPipeline>,
    render_pipeline: Option<RenderPipeline>,
}

impl VideoClient {
    /// Bind the media sockets and assemble the call control. Workers do
    /// not run until [`start`](Self::start).
    pub fn new(
        mut local: LocalPeer,
        directory: DirectoryClient,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let recv_socket = create_media_socket(local.udp_port())?;
        // Port 0 asks the OS; reflect the real port in what we advertise
        let bound_port = recv_socket
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or_else(|_| local.udp_port());
        local.info.udp_port = Some(bound_port);
        let send_socket = create_send_socket()?;

        let (wakeup_tx, wakeup_rx) = unbounded();
        let buffer = Arc::new(JitterBuffer::new(wakeup_tx.clone()));
        let extreme_compression = Arc::new(AtomicBool::new(false));

        let call = Arc::new(CallControl::new(
            local.clone(),
            directory.clone(),
            collaborators.gui.clone(),
            buffer.clone(),
            extreme_compression.clone(),
        ));

        Ok(Self {
            local,
            gui: collaborators.gui,
            encoder: collaborators.encoder,
            decoder: collaborators.decoder,
            call,
            buffer,
            extreme_compression,
            capture: Arc::new(Mutex::new(CaptureSource::new(collaborators.camera))),
            recv_socket: Arc::new(recv_socket),
            send_socket: Arc::new(send_socket),
            directory,
            users: Arc::new(DashMap::new()),
            wakeup_tx,
            wakeup_rx: Some(wakeup_rx),
            listener_addr: None,
            send_pipeline: None,
            recv_pipeline: None,
            render_pipeline: None,
        })
    }

    /// Spawn the listener and the three media workers. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        let wakeup_rx = match self.wakeup_rx.take() {
            Some(rx) => rx,
            None => return Ok(()),
        };
        let (listener_addr, _handle) = self.call.spawn_listener()?;
        self.listener_addr = Some(listener_addr);

        let (frame_tx, frame_rx) = bounded(FRAME_QUEUE_CAPACITY);

        self.recv_pipeline = Some(RecvPipeline::start(
            self.recv_socket.clone(),
            self.call.clone(),
            self.buffer.clone(),
        )?);
        self.send_pipeline = Some(SendPipeline::start(SendPipelineContext {
            capture: self.capture.clone(),
            frames: frame_tx,
            wakeup: self.wakeup_tx.clone(),
            call: self.call.clone(),
            encoder: self.encoder.clone(),
            socket: self.send_socket.clone(),
            extreme_compression: self.extreme_compression.clone(),
        })?);
        self.render_pipeline = Some(RenderPipeline::start(RenderPipelineContext {
            wakeups: wakeup_rx,
            wakeup_tx: self.wakeup_tx.clone(),
            frames: frame_rx,
            buffer: self.buffer.clone(),
            call: self.call.clone(),
            gui: self.gui.clone(),
            decoder: self.decoder.clone(),
            extreme_compression: self.extreme_compression.clone(),
        })?);

        tracing::info!(
            "client up: control {listener_addr}, media port {}",
            self.local.udp_port()
        );
        Ok(())
    }

    // --- user-facing operations ------------------------------------------

    pub fn call_start(&self, nick: &str) {
        self.call.clone().call_start(nick);
    }

    pub fn call_hold(&self) {
        self.call.clone().call_hold();
    }

    pub fn call_resume(&self) {
        self.call.clone().call_resume();
    }

    pub fn call_end(&self) {
        self.call.clone().call_end();
    }

    /// Refresh the known-users cache from the directory
    pub fn refresh_users(&self) {
        match self.directory.list_users() {
            Ok(users) => {
                self.users.clear();
                for user in users {
                    self.users.insert(user.nick.clone(), user);
                }
                tracing::debug!("user cache refreshed ({} entries)", self.users.len());
            }
            Err(e) => tracing::warn!("could not refresh the user list: {e}"),
        }
    }

    /// Nicknames for completion in the GUI
    pub fn known_users(&self) -> Vec<String> {
        self.users.iter().map(|entry| entry.key().clone()).collect()
    }

    // --- introspection ---------------------------------------------------

    pub fn call_control(&self) -> &Arc<CallControl> {
        &self.call
    }

    pub fn media_stats(&self) -> BufferStats {
        self.buffer.statistics()
    }

    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener_addr
    }

    pub fn media_port(&self) -> u16 {
        self.local.udp_port()
    }

    pub fn capture(&self) -> &Arc<Mutex<CaptureSource>> {
        &self.capture
    }

    /// Hang up if needed and stop every worker. Called on GUI close.
    pub fn stop(&mut self) {
        self.call.hang_up();
        if let Some(mut pipeline) = self.send_pipeline.take() {
            pipeline.stop();
        }
        if let Some(mut pipeline) = self.recv_pipeline.take() {
            pipeline.stop();
        }
        if let Some(mut pipeline) = self.render_pipeline.take() {
            pipeline.stop();
        }
        tracing::info!("client stopped");
    }
}

impl Drop for VideoClient {
    fn drop(&mut self) {
        self.stop();
    }
}
