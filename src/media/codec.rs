//! Frame codec collaborator contracts
//!
//! JPEG compression itself is external; the pipelines only depend on these
//! traits. The encoder scales to the requested target resolution before
//! compressing, which is how extreme compression halves the dimensions.

use bytes::Bytes;
use thiserror::Error;

use crate::media::capture::VideoFrame;
use crate::media::datagram::Resolution;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

pub trait FrameEncoder: Send + Sync {
    /// Compress `frame` scaled to `target` at the given quality (1..=100)
    fn encode(
        &self,
        frame: &VideoFrame,
        target: Resolution,
        quality: u8,
    ) -> Result<Bytes, CodecError>;
}

pub trait FrameDecoder: Send + Sync {
    /// Decompress a received payload back into a displayable frame
    fn decode(&self, payload: &[u8]) -> Result<VideoFrame, CodecError>;
}

/// Pass-through codec for loopback tests and headless runs. Encoding tags
/// the payload with the target resolution so decode can restore it.
pub struct PassthroughCodec;

impl FrameEncoder for PassthroughCodec {
    fn encode(
        &self,
        frame: &VideoFrame,
        target: Resolution,
        _quality: u8,
    ) -> Result<Bytes, CodecError> {
        let mut out = format!("{target}|").into_bytes();
        out.extend_from_slice(&frame.data);
        Ok(Bytes::from(out))
    }
}

impl FrameDecoder for PassthroughCodec {
    fn decode(&self, payload: &[u8]) -> Result<VideoFrame, CodecError> {
        let split = payload
            .iter()
            .position(|b| *b == b'|')
            .ok_or_else(|| CodecError::Decode("missing resolution tag".into()))?;
        let resolution: Resolution = std::str::from_utf8(&payload[..split])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CodecError::Decode("bad resolution tag".into()))?;
        Ok(VideoFrame::new(
            resolution,
            Bytes::copy_from_slice(&payload[split + 1..]),
        ))
    }
}
