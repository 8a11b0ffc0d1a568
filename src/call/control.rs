//! Call control
//!
//! Owns the single call session behind one lock, the permanent listener on
//! the local reliable port, outbound call setup (always on its own thread,
//! never the GUI's), and the per-call reader that reacts to unsolicited
//! hold/resume/end/congested events. All user-visible transitions report
//! through the [`Gui`] capability; I/O loops never call back into the GUI
//! beyond posting notifications.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::call::session::{CallState, Session};
use crate::call::signal::SignalMessage;
use crate::constants::{ACCEPT_TIMEOUT, BASE_PROTOCOL, SETUP_TIMEOUT, SIGNAL_BUFFER_SIZE};
use crate::directory::DirectoryClient;
use crate::error::TransportError;
use crate::media::buffer::JitterBuffer;
use crate::peer::{LocalPeer, PeerInfo, ProtocolSet};
use crate::ui::{CallDisplay, Gui};

pub struct CallControl {
    local: LocalPeer,
    directory: DirectoryClient,
    gui: Arc<dyn Gui>,
    buffer: Arc<JitterBuffer>,
    /// Sender-side half-resolution mode, shared with the capture pipeline
    extreme_compression: Arc<AtomicBool>,
    session: Mutex<Session>,
}

impl CallControl {
    pub fn new(
        local: LocalPeer,
        directory: DirectoryClient,
        gui: Arc<dyn Gui>,
        buffer: Arc<JitterBuffer>,
        extreme_compression: Arc<AtomicBool>,
    ) -> Self {
        Self {
            local,
            directory,
            gui,
            buffer,
            extreme_compression,
            session: Mutex::new(Session::new()),
        }
    }

    // --- queries ---------------------------------------------------------

    pub fn state(&self) -> CallState {
        self.session.lock().state
    }

    pub fn in_call(&self) -> bool {
        self.session.lock().state.in_call()
    }

    /// Media egress/ingress gate (active, nobody on hold)
    pub fn should_media_flow(&self) -> bool {
        self.session.lock().media_may_flow()
    }

    /// Next outgoing sequence number; `None` outside a call
    pub fn next_sequence(&self) -> Option<u64> {
        self.session.lock().next_sequence()
    }

    /// Where outgoing media datagrams go
    pub fn peer_media_addr(&self) -> Option<SocketAddr> {
        self.session.lock().peer.as_ref().and_then(|p| p.media_addr())
    }

    /// Source filter for incoming media datagrams
    pub fn peer_ip(&self) -> Option<std::net::IpAddr> {
        self.session.lock().peer.as_ref().map(|p| p.ip)
    }

    pub fn negotiated_protocol(&self) -> Option<String> {
        self.session.lock().protocol.clone()
    }

    /// True when the current call runs the V0 baseline (no congestion
    /// signaling on the wire)
    pub fn is_v0(&self) -> bool {
        self.session
            .lock()
            .protocol
            .as_deref()
            .map_or(true, |p| p == BASE_PROTOCOL)
    }

    pub fn last_congested_recv(&self) -> Option<Instant> {
        self.session.lock().last_congested_recv
    }

    pub fn remote_on_hold(&self) -> bool {
        self.session.lock().they_on_hold
    }

    // --- listener --------------------------------------------------------

    /// Bind the local reliable port and accept connections forever, one at
    /// a time. Returns the bound address (useful when the configured port
    /// is 0) and the listener thread handle.
    pub fn spawn_listener(
        self: &Arc<Self>,
    ) -> Result<(SocketAddr, JoinHandle<()>), TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", self.local.info.tcp_port))
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        let control = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("call-listener".to_string())
            .spawn(move || {
                tracing::info!("listening for calls on {addr}");
                for incoming in listener.incoming() {
                    match incoming {
                        Ok(stream) => {
                            let peer_addr = match stream.peer_addr() {
                                Ok(peer_addr) => peer_addr,
                                Err(e) => {
                                    tracing::warn!("dropping connection without peer address: {e}");
                                    continue;
                                }
                            };
                            Arc::clone(&control).handle_incoming(stream, peer_addr);
                        }
                        Err(e) => tracing::warn!("accept failed: {e}"),
                    }
                }
            })
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        Ok((addr, handle))
    }

    fn handle_incoming(self: Arc<Self>, mut conn: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = conn.set_read_timeout(Some(ACCEPT_TIMEOUT)) {
            tracing::warn!("could not arm accept timeout: {e}");
            return;
        }

        let mut buf = [0u8; SIGNAL_BUFFER_SIZE];
        let n = match conn.read(&mut buf) {
            Ok(0) | Err(_) => {
                tracing::debug!("connection from {peer_addr} closed before CALLING");
                return;
            }
            Ok(n) => n,
        };
        let text = String::from_utf8_lossy(&buf[..n]);
        let message = match SignalMessage::parse_all(&text) {
            Ok(mut messages) => messages.remove(0),
            Err(e) => {
                tracing::error!("unparseable call setup from {peer_addr}: {e}");
                self.write_signal(&mut conn, &SignalMessage::Denied { nick: self.local.nick().to_string() });
                return;
            }
        };
        let SignalMessage::Calling { nick, udp_port, protocol } = message else {
            tracing::error!("expected CALLING from {peer_addr}, got {}", message.verb());
            self.write_signal(&mut conn, &SignalMessage::Denied { nick: self.local.nick().to_string() });
            return;
        };

        {
            let mut session = self.session.lock();
            if !session.state.is_idle() {
                drop(session);
                tracing::info!("busy: rejecting incoming call from {nick}");
                self.write_signal(&mut conn, &SignalMessage::Busy);
                self.gui
                    .notify(&format!("{nick} called you"), &format!("{nick} called you"));
                return;
            }

            let proto = protocol.unwrap_or_else(|| BASE_PROTOCOL.to_string());
            if !self.local.info.protocols.contains(&proto) {
                drop(session);
                tracing::warn!("incoming call from {nick} announced unsupported protocol {proto}");
                self.write_signal(&mut conn, &SignalMessage::Denied { nick: self.local.nick().to_string() });
                return;
            }

            session.state = CallState::RingingIncoming;
            session.protocol = Some(proto);
        }

        let accept = self.gui.ask_incoming(&nick, peer_addr.ip());

        let mut session = self.session.lock();
        if session.state != CallState::RingingIncoming {
            // The session was torn down while the user was deciding
            drop(session);
            self.write_signal(&mut conn, &SignalMessage::Busy);
            return;
        }
        if !accept {
            session.reset();
            drop(session);
            self.write_signal(&mut conn, &SignalMessage::Denied { nick: self.local.nick().to_string() });
            tracing::info!("denied incoming call from {nick}");
            self.gui.set_status(CallDisplay::Idle);
            return;
        }

        if conn.set_read_timeout(None).is_err() {
            session.reset();
            return;
        }
        let reader_stream = match conn.try_clone() {
            Ok(clone) => clone,
            Err(e) => {
                tracing::warn!("could not clone call socket: {e}");
                session.reset();
                return;
            }
        };
        self.write_signal(
            &mut conn,
            &SignalMessage::Accepted {
                nick: self.local.nick().to_string(),
                udp_port: self.local.udp_port(),
            },
        );

        let proto = session.protocol.clone().unwrap_or_else(|| BASE_PROTOCOL.to_string());
        session.peer = Some(PeerInfo {
            nick: nick.clone(),
            ip: peer_addr.ip(),
            tcp_port: peer_addr.port(),
            udp_port: Some(udp_port),
            protocols: ProtocolSet::single(&proto),
        });
        session.socket = Some(conn);
        session.state = CallState::Active;
        drop(session);

        tracing::info!("call with {nick} established ({proto})");
        self.gui.set_status(CallDisplay::InCall { nick: nick.clone() });
        self.spawn_reader(reader_stream);
    }

    // --- outbound call ---------------------------------------------------

    /// Start a call to `nick`. The guard runs synchronously; the network
    /// work is dispatched to a short-lived setup thread so the caller (the
    /// GUI) never blocks on I/O.
    pub fn call_start(self: Arc<Self>, nick: &str) {
        if nick == self.local.nick() {
            tracing::info!("blocked attempt to call ourselves");
            self.gui.notify("Not allowed", "You can't call yourself!");
            return;
        }

        {
            let mut session = self.session.lock();
            match session.state {
                CallState::Idle => session.state = CallState::Dialing,
                CallState::Dialing => {
                    drop(session);
                    self.gui.notify(
                        "You are making a call",
                        "You have to cancel it in order to make a new call",
                    );
                    return;
                }
                _ => {
                    drop(session);
                    self.gui.notify(
                        "You are in a call",
                        "You have to hang up in order to make a new call",
                    );
                    return;
                }
            }
        }
        self.gui.set_status(CallDisplay::Calling { nick: nick.to_string() });

        let nick = nick.to_string();
        let control = Arc::clone(&self);
        let spawned = thread::Builder::new()
            .name("call-setup".to_string())
            .spawn(move || control.run_call_setup(nick));
        if let Err(e) = spawned {
            tracing::error!("could not spawn call setup: {e}");
            self.abort_setup("Call failed", "Internal error starting the call");
        }
    }

    fn run_call_setup(self: Arc<Self>, nick: String) {
        let user = match self.directory.query(&nick) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("directory lookup for {nick} failed: {e}");
                self.abort_setup("Error fetching user", &e.to_string());
                return;
            }
        };

        let Some(protocol) = self.local.negotiate(&user.protocols) else {
            self.abort_setup(
                "No common protocol",
                &format!("No protocol version is shared with {nick}"),
            );
            return;
        };

        let mut stream = match TcpStream::connect_timeout(&user.control_addr(), SETUP_TIMEOUT) {
            Ok(stream) => stream,
            Err(_) => {
                self.abort_setup(
                    "Could not connect",
                    &format!("Could not connect to {} at {}", user.nick, user.control_addr()),
                );
                return;
            }
        };
        if stream.set_read_timeout(Some(SETUP_TIMEOUT)).is_err() {
            self.abort_setup("Call failed", "Could not arm the setup timeout");
            return;
        }

        let calling = SignalMessage::Calling {
            nick: self.local.nick().to_string(),
            udp_port: self.local.udp_port(),
            // V0 peers predate the suffix; omit it for them
            protocol: (protocol != BASE_PROTOCOL).then(|| protocol.clone()),
        };
        if stream.write_all(calling.encode().as_bytes()).is_err() {
            self.abort_setup("Call failed", &format!("Connection to {nick} was lost"));
            return;
        }

        let mut buf = [0u8; SIGNAL_BUFFER_SIZE];
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                self.abort_setup("Call failed", &format!("{nick} closed the connection"));
                return;
            }
            Ok(n) => n,
            Err(e) if is_timeout(&e) => {
                self.abort_setup(
                    "Call not answered",
                    &format!("The user {nick} did not answer the call"),
                );
                return;
            }
            Err(_) => {
                self.abort_setup("Call failed", &format!("Connection to {nick} was lost"));
                return;
            }
        };

        let response = SignalMessage::parse_all(&String::from_utf8_lossy(&buf[..n]))
            .ok()
            .and_then(|mut messages| {
                if messages.is_empty() { None } else { Some(messages.remove(0)) }
            });
        match response {
            Some(SignalMessage::Accepted { udp_port, .. }) => {
                if stream.set_read_timeout(None).is_err() {
                    self.abort_setup("Call failed", "Could not disarm the setup timeout");
                    return;
                }
                let reader_stream = match stream.try_clone() {
                    Ok(clone) => clone,
                    Err(e) => {
                        tracing::warn!("could not clone call socket: {e}");
                        self.abort_setup("Call failed", "Internal socket error");
                        return;
                    }
                };

                let mut session = self.session.lock();
                if session.state != CallState::Dialing {
                    // Torn down while the handshake was in flight
                    return;
                }
                let mut peer = user;
                peer.udp_port = Some(udp_port);
                session.peer = Some(peer);
                session.protocol = Some(protocol.clone());
                session.socket = Some(stream);
                session.state = CallState::Active;
                drop(session);

                tracing::info!("call with {nick} established ({protocol})");
                self.gui.set_status(CallDisplay::InCall { nick: nick.clone() });
                self.spawn_reader(reader_stream);
            }
            Some(SignalMessage::Denied { .. }) => {
                self.abort_setup("Call denied", &format!("The user {nick} denied the call"));
            }
            Some(SignalMessage::Busy) => {
                self.abort_setup("User busy", &format!("The user {nick} is already in a call"));
            }
            _ => {
                tracing::error!("unexpected call setup response from {nick}");
                self.abort_setup(
                    "Error establishing connection",
                    &format!("Error establishing connection with {nick}"),
                );
            }
        }
    }

    /// Setup failed: back to idle with a user-visible reason
    fn abort_setup(&self, title: &str, message: &str) {
        {
            let mut session = self.session.lock();
            if session.state == CallState::Dialing {
                session.reset();
            }
        }
        self.gui.notify(title, message);
        self.gui.set_status(CallDisplay::Idle);
    }

    // --- in-call signaling -----------------------------------------------

    /// Send CALL_END and tear the session down, off the caller's thread
    pub fn call_end(self: Arc<Self>) {
        self.spawn_signal_task("call-end", move |control| control.hang_up());
    }

    /// Synchronous variant of [`call_end`](Self::call_end), used when the
    /// caller needs the teardown finished before proceeding (shutdown)
    pub fn hang_up(&self) {
        if self.in_call() {
            self.send_signal(&SignalMessage::End {
                nick: self.local.nick().to_string(),
            });
        }
        self.cleanup();
    }

    /// Put our side on hold
    pub fn call_hold(self: Arc<Self>) {
        self.spawn_signal_task("call-hold", move |control| {
            control.session.lock().set_local_hold(true);
            tracing::info!("local hold");
            control.send_signal(&SignalMessage::Hold {
                nick: control.local.nick().to_string(),
            });
        });
    }

    /// Resume our side
    pub fn call_resume(self: Arc<Self>) {
        self.spawn_signal_task("call-resume", move |control| {
            control.session.lock().set_local_hold(false);
            tracing::info!("local resume");
            control.send_signal(&SignalMessage::Resume {
                nick: control.local.nick().to_string(),
            });
        });
    }

    /// Notify the peer of congestion. Only meaningful on V1+; a no-op under
    /// V0, where the local sender adapts instead. Rate limiting is the
    /// congestion controller's business.
    pub fn send_congested(&self) {
        if self.is_v0() {
            return;
        }
        tracing::debug!("sending CALL_CONGESTED");
        self.send_signal(&SignalMessage::Congested {
            nick: self.local.nick().to_string(),
        });
    }

    fn spawn_signal_task(
        self: Arc<Self>,
        name: &str,
        task: impl FnOnce(Arc<CallControl>) + Send + 'static,
    ) {
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || task(self));
        if let Err(e) = spawned {
            tracing::error!("could not spawn signaling task: {e}");
        }
    }

    fn send_signal(&self, message: &SignalMessage) -> bool {
        let session = self.session.lock();
        match &session.socket {
            Some(socket) => {
                let mut socket = socket;
                match socket.write_all(message.encode().as_bytes()) {
                    Ok(()) => {
                        tracing::debug!("sent {}", message.verb());
                        true
                    }
                    Err(e) => {
                        tracing::warn!("failed to send {}: {e}", message.verb());
                        false
                    }
                }
            }
            None => false,
        }
    }

    fn write_signal(&self, stream: &mut TcpStream, message: &SignalMessage) {
        if let Err(e) = stream.write_all(message.encode().as_bytes()) {
            tracing::warn!("failed to send {}: {e}", message.verb());
        }
    }

    // --- per-call reader -------------------------------------------------

    fn spawn_reader(self: Arc<Self>, mut stream: TcpStream) {
        let reader_self = self.clone();
        let spawned = thread::Builder::new()
            .name("call-reader".to_string())
            .spawn(move || {
                let self_ = reader_self;
                let mut buf = [0u8; SIGNAL_BUFFER_SIZE];
                loop {
                    let n = match stream.read(&mut buf) {
                        Ok(0) => {
                            tracing::info!("peer closed the control channel");
                            self_.cleanup();
                            return;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            tracing::warn!("control channel error: {e}");
                            self_.cleanup();
                            return;
                        }
                    };
                    let text = String::from_utf8_lossy(&buf[..n]);
                    match SignalMessage::parse_all(&text) {
                        Ok(messages) => {
                            for message in messages {
                                if !self_.handle_in_call(message) {
                                    return;
                                }
                            }
                        }
                        Err(e) => tracing::error!("unparseable control message: {e}"),
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::error!("could not spawn call reader: {e}");
            self.cleanup();
        }
    }

    /// React to one in-call message; returns false when the reader is done
    fn handle_in_call(&self, message: SignalMessage) -> bool {
        match message {
            SignalMessage::Hold { nick } => {
                tracing::info!("{nick} put the call on hold");
                self.session.lock().set_remote_hold(true);
                true
            }
            SignalMessage::Resume { nick } => {
                tracing::info!("{nick} resumed the call");
                self.session.lock().set_remote_hold(false);
                true
            }
            SignalMessage::End { nick } => {
                {
                    let mut session = self.session.lock();
                    session.state = CallState::Terminated;
                }
                self.gui.notify(
                    "Call ended",
                    &format!("The user {nick} has ended the call"),
                );
                self.cleanup();
                false
            }
            SignalMessage::Congested { nick } => {
                let mut session = self.session.lock();
                let v0 = session
                    .protocol
                    .as_deref()
                    .map_or(true, |p| p == BASE_PROTOCOL);
                if v0 {
                    // Congestion notices do not exist under V0
                    tracing::debug!("ignoring CALL_CONGESTED under V0");
                } else {
                    tracing::info!("{nick} reports congestion, shrinking outgoing frames");
                    session.last_congested_recv = Some(Instant::now());
                    drop(session);
                    self.extreme_compression.store(true, Ordering::SeqCst);
                }
                true
            }
            other => {
                tracing::warn!("unexpected {} during a call", other.verb());
                true
            }
        }
    }

    // --- teardown --------------------------------------------------------

    /// Local end-of-call cleanup: reset the session (closing the socket),
    /// clear the compression override, flush the jitter buffer and restore
    /// the GUI defaults. Safe to call repeatedly.
    pub fn cleanup(&self) {
        {
            let mut session = self.session.lock();
            if session.state != CallState::Idle {
                tracing::info!("call teardown");
            }
            session.reset();
        }
        self.extreme_compression.store(false, Ordering::SeqCst);
        self.buffer.reset();
        self.gui.set_status(CallDisplay::Idle);
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
