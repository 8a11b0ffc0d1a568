//! Full-stack media flow between two clients over loopback

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use common::{spawn_directory, wait_until, DirEntry, Registry};
use videolink::call::CallState;
use videolink::directory::DirectoryClient;
use videolink::media::capture::{FrameSource, VideoFrame};
use videolink::media::codec::PassthroughCodec;
use videolink::media::Resolution;
use videolink::peer::{LocalPeer, ProtocolSet};
use videolink::ui::HeadlessGui;
use videolink::{Collaborators, VideoClient};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Tiny synthetic camera so pass-through "compression" stays far below the
/// datagram limit
struct TestPattern {
    tick: u8,
}

impl FrameSource for TestPattern {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.tick = self.tick.wrapping_add(1);
        Some(VideoFrame::new(
            Resolution::new(16, 12),
            Bytes::from(vec![self.tick; 16 * 12 * 3]),
        ))
    }

    fn fps(&self) -> f64 {
        30.0
    }
}

fn spawn_client(
    nick: &str,
    directory: &DirectoryClient,
    registry: &Registry,
) -> (VideoClient, Arc<HeadlessGui>) {
    let gui = Arc::new(HeadlessGui::new(true));
    let local = LocalPeer::new(
        nick.to_string(),
        "127.0.0.1".parse().unwrap(),
        0,
        0,
        "secret".to_string(),
        ProtocolSet::parse("V0#V1"),
    );
    let mut client = VideoClient::new(
        local,
        directory.clone(),
        Collaborators {
            gui: gui.clone(),
            encoder: Arc::new(PassthroughCodec),
            decoder: Arc::new(PassthroughCodec),
            camera: Some(Box::new(TestPattern { tick: 0 })),
        },
    )
    .expect("client");
    client.start().expect("start");

    registry.lock().insert(
        nick.to_string(),
        DirEntry {
            addr: client.listener_addr().expect("listener"),
            protocols: "V0#V1".to_string(),
        },
    );
    (client, gui)
}

#[test]
fn frames_flow_both_ways_without_loss() {
    let (directory, registry) = spawn_directory();
    let (alice, alice_gui) = spawn_client("alice", &directory, &registry);
    let (bob, bob_gui) = spawn_client("bob", &directory, &registry);

    bob.call_start("alice");
    assert!(
        wait_until(TIMEOUT, || {
            alice.call_control().state() == CallState::Active
                && bob.call_control().state() == CallState::Active
        }),
        "call never became active"
    );

    // Local previews tick on both sides even before remote media lands
    assert!(wait_until(TIMEOUT, || alice_gui.frames_shown() > 0));
    assert!(wait_until(TIMEOUT, || bob_gui.frames_shown() > 0));

    // Remote frames decode and reach both screens
    assert!(
        wait_until(TIMEOUT, || alice_gui.remote_frames() > 5),
        "no remote frames on alice's side"
    );
    assert!(
        wait_until(TIMEOUT, || bob_gui.remote_frames() > 5),
        "no remote frames on bob's side"
    );

    // Loopback delivery is in-order and complete
    assert_eq!(alice.media_stats().packages_lost, 0);
    assert_eq!(bob.media_stats().packages_lost, 0);

    bob.call_end();
    assert!(wait_until(TIMEOUT, || {
        alice.call_control().state() == CallState::Idle
            && bob.call_control().state() == CallState::Idle
    }));

    // After teardown the buffer is flushed and statistics start over
    assert_eq!(alice.media_stats().packages_lost, 0);
}

#[test]
fn hold_pauses_media_and_resume_restores_it() {
    let (directory, registry) = spawn_directory();
    let (alice, alice_gui) = spawn_client("alice", &directory, &registry);
    let (bob, _bob_gui) = spawn_client("bob", &directory, &registry);

    bob.call_start("alice");
    assert!(wait_until(TIMEOUT, || {
        alice.call_control().state() == CallState::Active
            && bob.call_control().state() == CallState::Active
    }));
    assert!(wait_until(TIMEOUT, || alice_gui.remote_frames() > 0));

    bob.call_hold();
    assert!(wait_until(TIMEOUT, || {
        bob.call_control().state() == CallState::LocalHeld
            && alice.call_control().state() == CallState::RemoteHeld
    }));
    assert!(!bob.call_control().should_media_flow());
    assert!(!alice.call_control().should_media_flow());

    bob.call_resume();
    assert!(wait_until(TIMEOUT, || {
        bob.call_control().should_media_flow() && alice.call_control().should_media_flow()
    }));

    // Media keeps flowing after the resume
    let seen = alice_gui.remote_frames();
    assert!(wait_until(TIMEOUT, || alice_gui.remote_frames() > seen));

    bob.call_end();
}
