//! Global tuning constants

use std::time::Duration;

/// Largest payload an unreliable datagram can carry (UDP over IPv4)
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// EWMA weight for the delay, jitter and frame-interval estimators
pub const EWMA_WEIGHT: f64 = 0.01;

/// Frames that must arrive before playback starts
pub const MIN_INITIAL_FRAMES: u64 = 5;

/// Buffer length above which consumption is sped up to drain the backlog
pub const BUFFER_MAX: usize = 5;

/// Divisor applied to the frame interval when the buffer backs up
pub const CONSUME_SPEEDUP: f64 = 1.5;

/// Minimum spacing between CALL_CONGESTED notices, and how long a received
/// notice keeps extreme compression enabled (V1+)
pub const CONGESTED_INTERVAL: Duration = Duration::from_secs(30);

/// Call setup deadline: reliable-channel connect and first response
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the listener waits for CALLING after accepting a connection
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(3);

/// Deadline for each short-lived directory exchange
pub const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Read buffer for signaling messages
pub const SIGNAL_BUFFER_SIZE: usize = 1024;

/// JPEG quality requested from the frame encoder
pub const JPEG_QUALITY: u8 = 50;

/// Capture resolution frames are normalized to before encoding
pub const VIDEO_WIDTH: u32 = 640;
pub const VIDEO_HEIGHT: u32 = 480;

/// Frame rate of the synthesized feed when no camera is present
pub const NO_CAMERA_FPS: f64 = 30.0;

/// Renderer frame queue capacity (local preview frames)
pub const FRAME_QUEUE_CAPACITY: usize = 64;

/// Kernel buffer sizing for the media socket, large enough for bursts
pub const UDP_SOCKET_BUFFER: usize = 4 * 1024 * 1024;

/// Poll interval the media receive loop uses to notice shutdown
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Protocol tags this client advertises to the directory
pub const SUPPORTED_PROTOCOLS: &str = "V0#V1";

/// The universally supported baseline protocol tag
pub const BASE_PROTOCOL: &str = "V0";
