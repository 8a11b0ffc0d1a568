//! Frame sources and capture-mode switching
//!
//! The actual camera and media-file readers live outside the core; they
//! plug in through [`FrameSource`]. The core only owns the mode switching
//! (camera / file / static no-camera image) and the fallback frame shown
//! when nothing can be captured. Sources are expected to hand out frames in
//! their natural display orientation (camera feeds mirrored) and to loop
//! file playback back to the first frame at EOF.

use bytes::Bytes;

use crate::constants::{NO_CAMERA_FPS, VIDEO_HEIGHT, VIDEO_WIDTH};
use crate::media::datagram::Resolution;

/// One uncompressed frame, pixel layout owned by the collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub resolution: Resolution,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(resolution: Resolution, data: Bytes) -> Self {
        Self { resolution, data }
    }
}

/// Contract for webcam and media-file capture collaborators
pub trait FrameSource: Send {
    /// Next frame, or `None` when the device failed to deliver one
    fn next_frame(&mut self) -> Option<VideoFrame>;

    /// Nominal frame rate of this source
    fn fps(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Camera,
    File,
    NoCamera,
}

/// Synthesized placeholder feed used when no capture device is available
pub struct StaticImageSource {
    frame: VideoFrame,
}

impl StaticImageSource {
    pub fn new() -> Self {
        // Quarter size keeps the raw placeholder under the datagram limit
        // even when a pass-through codec does no real compression
        let resolution = Resolution::new(VIDEO_WIDTH / 4, VIDEO_HEIGHT / 4);
        // Flat mid-gray RGB image
        let data = Bytes::from(vec![
            0x80;
            (resolution.width * resolution.height * 3) as usize
        ]);
        Self {
            frame: VideoFrame::new(resolution, data),
        }
    }
}

impl Default for StaticImageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for StaticImageSource {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        Some(self.frame.clone())
    }

    fn fps(&self) -> f64 {
        NO_CAMERA_FPS
    }
}

/// The active capture source. Mode switches happen under the client's
/// capture lock; the capture/send pipeline never sees a half-switched
/// source.
pub struct CaptureSource {
    mode: CaptureMode,
    source: Box<dyn FrameSource>,
    /// Last frame handed out, shown again when the source skips a beat
    fallback: VideoFrame,
}

impl CaptureSource {
    /// Build from an optional camera; absent camera enables no-camera mode
    pub fn new(camera: Option<Box<dyn FrameSource>>) -> Self {
        match camera {
            Some(source) => {
                tracing::info!("camera mode enabled");
                Self {
                    mode: CaptureMode::Camera,
                    fallback: StaticImageSource::new().frame,
                    source,
                }
            }
            None => {
                tracing::info!("no camera mode enabled");
                Self {
                    mode: CaptureMode::NoCamera,
                    fallback: StaticImageSource::new().frame,
                    source: Box::new(StaticImageSource::new()),
                }
            }
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn fps(&self) -> f64 {
        self.source.fps()
    }

    /// Capture the next frame, falling back to the last good one
    pub fn grab(&mut self) -> VideoFrame {
        match self.source.next_frame() {
            Some(frame) => {
                self.fallback = frame.clone();
                frame
            }
            None => self.fallback.clone(),
        }
    }

    /// Stream a media file instead of the camera
    pub fn switch_to_file(&mut self, source: Box<dyn FrameSource>) {
        tracing::info!("file capture enabled");
        self.mode = CaptureMode::File;
        self.source = source;
    }

    /// Back to the camera, or the static image when none is present
    pub fn switch_to_camera(&mut self, camera: Option<Box<dyn FrameSource>>) {
        *self = Self::new(camera);
    }
}
