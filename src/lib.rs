//! Peer-to-peer video calling client core
//!
//! Peers discover one another through a central directory, negotiate a
//! protocol version, exchange signaling over a reliable channel and stream
//! compressed frames over unreliable datagrams. The GUI, capture devices
//! and the frame codec are collaborators injected through traits; the core
//! owns the call state machine, the media transport and the congestion
//! feedback loop.

pub mod call;
pub mod client;
pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod media;
pub mod net;
pub mod peer;
pub mod ui;

pub use client::{Collaborators, VideoClient};
pub use error::{Error, Result};
