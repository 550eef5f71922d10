//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too small for operation
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Reasons a connect-state response did not produce a verdict
///
/// These are diagnostics, not failures: the frame was read fine but does not
/// say whether the keyboard is attached.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolAnomaly {
    /// Byte 4 is not the connect-state response tag
    #[error("receive connect state error: unexpected response tag {0:#04x}")]
    UnexpectedTag(u8),

    #[error("keyboard is over charged")]
    OverCharged,

    #[error("TRX check failed")]
    TrxCheckFailed,

    #[error("pin connect failed")]
    PinConnectFailed,

    /// Status byte matched none of the known patterns
    #[error("unhandled connect state: {0:#04x}")]
    Unrecognized(u8),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
