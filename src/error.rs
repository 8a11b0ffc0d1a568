//! Error taxonomy
//!
//! Each networking domain gets its own error enum; workers trap transport
//! and protocol errors locally, directory and configuration errors surface
//! to the user at the operation that triggered them.

use thiserror::Error;

/// Socket-level failures on either transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed: {0}")]
    Bind(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Recv(String),

    /// Setup-phase deadline expired (connect or first response)
    #[error("operation timed out")]
    Timeout,
}

/// Malformed or unexpected signaling input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),

    #[error("{verb} expects {expected} argument(s), got {got}")]
    BadArity {
        verb: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid field {0:?}")]
    BadField(String),

    #[error("empty message")]
    Empty,
}

/// Failures talking to the user directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user {0} was not found")]
    UserUnknown(String),

    #[error("directory returned a malformed user entry: {0:?}")]
    BadUser(String),

    #[error("register failed")]
    RegisterFailed,

    #[error("malformed directory response: {0:?}")]
    BadResponse(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Outcomes of reading the persisted configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found")]
    NoFile,

    #[error("configuration file could not be read: {0}")]
    WrongFile(String),

    #[error("the stored password was rejected by the directory")]
    WrongPassword,
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
