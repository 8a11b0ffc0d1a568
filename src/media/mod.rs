//! Media transport: datagram codec, jitter buffer, pacing and the
//! capture/send, receive and render pipelines

pub mod buffer;
pub mod capture;
pub mod codec;
pub mod congestion;
pub mod datagram;
pub mod pacer;
pub mod recv;
pub mod render;
pub mod send;

pub use buffer::{BufferQuality, BufferStats, JitterBuffer};
pub use datagram::{MediaDatagram, Resolution};
