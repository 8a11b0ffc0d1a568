//! GUI capability interface
//!
//! The core never owns a GUI; it talks to one through this capability.
//! Notifications are posted from worker threads, so implementations must
//! be thread-safe and must not call back into the core.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::media::buffer::{BufferQuality, BufferStats};
use crate::media::capture::VideoFrame;

/// Formatted media statistics for the status line
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStatus {
    pub quality: BufferQuality,
    pub packages_lost: u64,
    pub avg_delay_ms: f64,
    pub jitter_ms: f64,
}

impl From<&BufferStats> for MediaStatus {
    fn from(stats: &BufferStats) -> Self {
        Self {
            quality: stats.quality,
            packages_lost: stats.packages_lost,
            avg_delay_ms: stats.avg_delay * 1000.0,
            jitter_ms: stats.jitter * 1000.0,
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Call Quality: {} | Packages lost: {} | Delay avg: {:.2} ms | Jitter: {:.2} ms",
            self.quality.label(),
            self.packages_lost,
            self.avg_delay_ms,
            self.jitter_ms
        )
    }
}

/// What the status surface should currently show
#[derive(Debug, Clone, PartialEq)]
pub enum CallDisplay {
    /// Defaults restored (no call)
    Idle,
    Calling { nick: String },
    InCall { nick: String },
    /// Per-tick media statistics; `None` renders as N/A
    Media(Option<MediaStatus>),
}

pub trait Gui: Send + Sync {
    /// Present the freshest local frame and, when available, the last
    /// decoded remote frame (implementations composite the preview)
    fn show_frame(&self, local: &VideoFrame, remote: Option<&VideoFrame>);

    /// Ask whether to take an incoming call; may block on the user
    fn ask_incoming(&self, nick: &str, ip: IpAddr) -> bool;

    /// Pop a user-visible notification
    fn notify(&self, title: &str, message: &str);

    /// Update the status surface
    fn set_status(&self, status: CallDisplay);
}

/// GUI stand-in for the headless binary and the test suite: logs
/// notifications, answers incoming calls by a switchable policy, and
/// records what it was shown.
pub struct HeadlessGui {
    accept_incoming: AtomicBool,
    notifications: Mutex<Vec<(String, String)>>,
    statuses: Mutex<Vec<CallDisplay>>,
    frames_shown: Mutex<u64>,
    remote_frames: Mutex<u64>,
}

impl HeadlessGui {
    pub fn new(accept_incoming: bool) -> Self {
        Self {
            accept_incoming: AtomicBool::new(accept_incoming),
            notifications: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            frames_shown: Mutex::new(0),
            remote_frames: Mutex::new(0),
        }
    }

    pub fn set_accept_incoming(&self, accept: bool) {
        self.accept_incoming.store(accept, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().clone()
    }

    pub fn last_status(&self) -> Option<CallDisplay> {
        self.statuses.lock().last().cloned()
    }

    pub fn frames_shown(&self) -> u64 {
        *self.frames_shown.lock()
    }

    /// Ticks on which a decoded remote frame was on screen
    pub fn remote_frames(&self) -> u64 {
        *self.remote_frames.lock()
    }
}

impl Gui for HeadlessGui {
    fn show_frame(&self, _local: &VideoFrame, remote: Option<&VideoFrame>) {
        *self.frames_shown.lock() += 1;
        if remote.is_some() {
            *self.remote_frames.lock() += 1;
        }
    }

    fn ask_incoming(&self, nick: &str, ip: IpAddr) -> bool {
        let accept = self.accept_incoming.load(Ordering::SeqCst);
        tracing::info!("incoming call from {nick} at {ip}: {}", if accept { "accepting" } else { "denying" });
        accept
    }

    fn notify(&self, title: &str, message: &str) {
        tracing::info!("{title}: {message}");
        self.notifications
            .lock()
            .push((title.to_string(), message.to_string()));
    }

    fn set_status(&self, status: CallDisplay) {
        self.statuses.lock().push(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_status_formats_milliseconds() {
        let status = MediaStatus {
            quality: BufferQuality::High,
            packages_lost: 3,
            avg_delay_ms: 12.5,
            jitter_ms: 1.25,
        };
        assert_eq!(
            status.to_string(),
            "Call Quality: HIGH | Packages lost: 3 | Delay avg: 12.50 ms | Jitter: 1.25 ms"
        );
    }

    #[test]
    fn headless_gui_records_interactions() {
        let gui = HeadlessGui::new(true);
        assert!(gui.ask_incoming("alice", "127.0.0.1".parse().unwrap()));
        gui.set_accept_incoming(false);
        assert!(!gui.ask_incoming("alice", "127.0.0.1".parse().unwrap()));

        gui.notify("Title", "Message");
        assert_eq!(gui.notifications(), vec![("Title".into(), "Message".into())]);

        gui.set_status(CallDisplay::Idle);
        assert_eq!(gui.last_status(), Some(CallDisplay::Idle));
    }
}
