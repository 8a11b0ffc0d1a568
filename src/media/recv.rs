//! Receive pipeline
//!
//! Reads datagrams from the local media socket, filters them by peer and
//! call state, and inserts them into the jitter buffer. A misbehaving
//! client may keep sending while the call is held; such traffic is
//! discarded here. Malformed datagrams are dropped silently — media is
//! best-effort.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::call::CallControl;
use crate::constants::{MAX_DATAGRAM_SIZE, RECV_POLL_INTERVAL};
use crate::media::buffer::JitterBuffer;
use crate::media::datagram::MediaDatagram;
use crate::media::pacer::DisplayPacer;

pub struct RecvPipeline {
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl RecvPipeline {
    pub fn start(
        socket: Arc<UdpSocket>,
        call: Arc<CallControl>,
        buffer: Arc<JitterBuffer>,
    ) -> std::io::Result<Self> {
        // Short poll so the loop notices shutdown without a stray datagram
        socket.set_read_timeout(Some(RECV_POLL_INTERVAL))?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("media-receive".to_string())
            .spawn(move || Self::run(socket, call, buffer, flag))?;
        Ok(Self {
            thread_handle: Some(handle),
            running,
        })
    }

    fn run(
        socket: Arc<UdpSocket>,
        call: Arc<CallControl>,
        buffer: Arc<JitterBuffer>,
        running: Arc<AtomicBool>,
    ) {
        let mut recv_buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        while running.load(Ordering::Relaxed) {
            let (size, addr) = match socket.recv_from(&mut recv_buffer) {
                Ok(received) => received,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    tracing::warn!("media receive error: {e}");
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    thread::sleep(std::time::Duration::from_millis(1));
                    continue;
                }
            };

            if !call.should_media_flow() {
                continue;
            }
            match call.peer_ip() {
                Some(peer_ip) if peer_ip == addr.ip() => {}
                _ => continue,
            }

            let Some(datagram) = MediaDatagram::decode(&recv_buffer[..size]) else {
                // Malformed media is dropped without ceremony
                continue;
            };
            tracing::trace!(seq = datagram.seq, "media datagram received");
            buffer.insert(datagram);

            if buffer.take_playable_edge() {
                if let Err(e) = DisplayPacer::spawn(buffer.clone()) {
                    tracing::error!("could not start the display pacer: {e}");
                }
            }
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RecvPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
