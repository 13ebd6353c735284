//! Wire-level error types.

use thiserror::Error;

/// Errors raised while framing or parsing USB/IP wire traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An inbound command code is not one the receiver accepts.
    #[error("unexpected command code: {0:#06x}")]
    UnexpectedCommand(u32),

    /// A RET_SUBMIT claimed more data than the receiving buffer declared.
    #[error("actual_length {actual} exceeds transfer_buffer_length {declared}")]
    PayloadOverflow { actual: u32, declared: u32 },

    /// A reply arrived twice for the same seqnum.
    #[error("duplicate reply for seqnum {0}")]
    DuplicateReply(u32),

    /// An isochronous packet table failed the monotonicity/sum checks.
    #[error("invalid iso packet table: {0}")]
    InvalidIsoTable(&'static str),

    /// I/O failure on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
