//! Engine-level error kinds.
//!
//! `ProtocolError`/`IoError` are fatal at session scope (the session
//! transitions to `Draining`); the rest are local to a single URB and
//! leave the session untouched.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] usbip_wire::ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("URB function not supported")]
    NotSupported,

    #[error("request canceled")]
    Canceled,

    #[error("no free sequence number")]
    Exhausted,
}

pub type Result<T> = std::result::Result<T, ClientError>;
