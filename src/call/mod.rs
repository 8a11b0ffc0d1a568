//! Call control: signaling codec, session state machine, listener and
//! per-call reader

pub mod control;
pub mod session;
pub mod signal;

pub use control::CallControl;
pub use session::{CallState, Session};
pub use signal::SignalMessage;
