//! End-to-end signaling scenarios over localhost sockets

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{spawn_directory, wait_until, DirEntry, Registry};
use videolink::call::{CallControl, CallState};
use videolink::directory::DirectoryClient;
use videolink::media::JitterBuffer;
use videolink::peer::{LocalPeer, ProtocolSet};
use videolink::ui::HeadlessGui;

const TIMEOUT: Duration = Duration::from_secs(5);

/// One signaling endpoint with its listener up and registered
struct TestPeer {
    gui: Arc<HeadlessGui>,
    control: Arc<CallControl>,
    extreme: Arc<AtomicBool>,
    // Keeps the renderer wake-up channel connected
    _wakeups: crossbeam_channel::Receiver<()>,
}

impl TestPeer {
    fn spawn(
        nick: &str,
        directory: &DirectoryClient,
        registry: &Registry,
        accept_incoming: bool,
        protocols: &str,
    ) -> Self {
        let gui = Arc::new(HeadlessGui::new(accept_incoming));
        let (wakeup_tx, wakeup_rx) = crossbeam_channel::unbounded();
        let buffer = Arc::new(JitterBuffer::new(wakeup_tx));
        let extreme = Arc::new(AtomicBool::new(false));

        let local = LocalPeer::new(
            nick.to_string(),
            "127.0.0.1".parse().unwrap(),
            0,
            7000,
            "secret".to_string(),
            ProtocolSet::parse(protocols),
        );
        let control = Arc::new(CallControl::new(
            local,
            directory.clone(),
            gui.clone(),
            buffer,
            extreme.clone(),
        ));
        let (addr, _handle) = control.spawn_listener().expect("listener");
        registry.lock().insert(
            nick.to_string(),
            DirEntry {
                addr,
                protocols: protocols.to_string(),
            },
        );

        Self {
            gui,
            control,
            extreme,
            _wakeups: wakeup_rx,
        }
    }

    fn listener_addr(&self, registry: &Registry, nick: &str) -> std::net::SocketAddr {
        registry.lock().get(nick).unwrap().addr
    }
}

fn established_call(
    registry: &Registry,
    directory: &DirectoryClient,
    protocols: &str,
) -> (TestPeer, TestPeer) {
    let callee = TestPeer::spawn("alice", directory, registry, true, protocols);
    let caller = TestPeer::spawn("bob", directory, registry, true, protocols);

    caller.control.clone().call_start("alice");
    assert!(
        wait_until(TIMEOUT, || caller.control.state() == CallState::Active
            && callee.control.state() == CallState::Active),
        "call never became active"
    );
    (caller, callee)
}

#[test]
fn happy_call_reaches_active_on_both_sides() {
    let (directory, registry) = spawn_directory();
    let (caller, callee) = established_call(&registry, &directory, "V0#V1");

    assert!(caller.control.should_media_flow());
    assert!(callee.control.should_media_flow());
    assert_eq!(caller.control.negotiated_protocol(), Some("V1".to_string()));
    assert_eq!(callee.control.negotiated_protocol(), Some("V1".to_string()));

    // The caller learned the callee's media port from CALL_ACCEPTED
    assert_eq!(caller.control.peer_media_addr().unwrap().port(), 7000);
}

#[test]
fn busy_peer_replies_exactly_call_busy() {
    let (directory, registry) = spawn_directory();
    let (_caller, callee) = established_call(&registry, &directory, "V0#V1");

    let addr = callee.listener_addr(&registry, "alice");
    let mut intruder = TcpStream::connect(addr).unwrap();
    intruder.write_all(b"CALLING carol 7002").unwrap();

    let mut buf = [0u8; 64];
    let n = intruder.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"CALL_BUSY");

    // The connection is closed right after
    assert_eq!(intruder.read(&mut buf).unwrap(), 0);
    // And the existing call is untouched
    assert_eq!(callee.control.state(), CallState::Active);
}

#[test]
fn denied_call_returns_to_idle() {
    let (directory, registry) = spawn_directory();
    let callee = TestPeer::spawn("alice", &directory, &registry, false, "V0#V1");
    let caller = TestPeer::spawn("bob", &directory, &registry, true, "V0#V1");

    caller.control.clone().call_start("alice");
    assert!(wait_until(TIMEOUT, || {
        caller
            .gui
            .notifications()
            .iter()
            .any(|(title, _)| title == "Call denied")
    }));
    assert!(wait_until(TIMEOUT, || caller.control.state() == CallState::Idle));
    assert_eq!(callee.control.state(), CallState::Idle);
}

#[test]
fn unknown_user_aborts_the_setup() {
    let (directory, registry) = spawn_directory();
    let caller = TestPeer::spawn("bob", &directory, &registry, true, "V0#V1");

    caller.control.clone().call_start("ghost");
    assert!(wait_until(TIMEOUT, || {
        caller
            .gui
            .notifications()
            .iter()
            .any(|(title, _)| title == "Error fetching user")
    }));
    assert_eq!(caller.control.state(), CallState::Idle);
}

#[test]
fn calling_yourself_is_refused_locally() {
    let (directory, registry) = spawn_directory();
    let peer = TestPeer::spawn("alice", &directory, &registry, true, "V0#V1");

    peer.control.clone().call_start("alice");
    assert!(wait_until(TIMEOUT, || {
        peer.gui
            .notifications()
            .iter()
            .any(|(title, _)| title == "Not allowed")
    }));
    assert_eq!(peer.control.state(), CallState::Idle);
}

#[test]
fn hold_resume_and_end_drive_both_sides() {
    let (directory, registry) = spawn_directory();
    let (caller, callee) = established_call(&registry, &directory, "V0#V1");

    caller.control.clone().call_hold();
    assert!(wait_until(TIMEOUT, || callee.control.remote_on_hold()));
    assert!(wait_until(TIMEOUT, || {
        caller.control.state() == CallState::LocalHeld
            && callee.control.state() == CallState::RemoteHeld
    }));
    assert!(!caller.control.should_media_flow());
    assert!(!callee.control.should_media_flow());

    caller.control.clone().call_resume();
    assert!(wait_until(TIMEOUT, || {
        caller.control.should_media_flow() && callee.control.should_media_flow()
    }));

    callee.control.clone().call_end();
    assert!(wait_until(TIMEOUT, || {
        caller.control.state() == CallState::Idle && callee.control.state() == CallState::Idle
    }));
    assert!(wait_until(TIMEOUT, || {
        caller
            .gui
            .notifications()
            .iter()
            .any(|(title, _)| title == "Call ended")
    }));
}

#[test]
fn sequence_numbers_reset_across_calls() {
    let (directory, registry) = spawn_directory();
    let (caller, callee) = established_call(&registry, &directory, "V0#V1");

    assert_eq!(caller.control.next_sequence(), Some(1));
    assert_eq!(caller.control.next_sequence(), Some(2));

    caller.control.clone().call_end();
    assert!(wait_until(TIMEOUT, || {
        caller.control.state() == CallState::Idle && callee.control.state() == CallState::Idle
    }));
    assert_eq!(caller.control.next_sequence(), None);

    // Second call starts numbering from scratch
    caller.control.clone().call_start("alice");
    assert!(wait_until(TIMEOUT, || caller.control.state() == CallState::Active));
    assert_eq!(caller.control.next_sequence(), Some(1));
}

#[test]
fn congested_notice_reaches_the_peer_on_v1() {
    let (directory, registry) = spawn_directory();
    let (caller, callee) = established_call(&registry, &directory, "V0#V1");

    assert!(callee.control.last_congested_recv().is_none());
    caller.control.send_congested();

    assert!(wait_until(TIMEOUT, || callee
        .control
        .last_congested_recv()
        .is_some()));
    assert!(wait_until(TIMEOUT, || callee.extreme.load(Ordering::SeqCst)));
}

#[test]
fn congested_is_suppressed_under_v0() {
    let (directory, registry) = spawn_directory();
    let (caller, callee) = established_call(&registry, &directory, "V0");

    assert_eq!(caller.control.negotiated_protocol(), Some("V0".to_string()));
    caller.control.send_congested();

    std::thread::sleep(Duration::from_millis(300));
    assert!(callee.control.last_congested_recv().is_none());
    assert!(!callee.extreme.load(Ordering::SeqCst));
}

#[test]
fn teardown_clears_the_compression_override() {
    let (directory, registry) = spawn_directory();
    let (caller, callee) = established_call(&registry, &directory, "V0#V1");

    caller.control.send_congested();
    assert!(wait_until(TIMEOUT, || callee.extreme.load(Ordering::SeqCst)));

    caller.control.clone().call_end();
    assert!(wait_until(TIMEOUT, || {
        callee.control.state() == CallState::Idle && !callee.extreme.load(Ordering::SeqCst)
    }));
}
