//! Error types for rkflash-core

use thiserror::Error;

use crate::session::BootMode;

/// Why a response frame was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The response did not start with the `USBS` signature
    BadSignature {
        /// Signature found in the response (big-endian)
        found: u32,
    },
    /// The response tag does not echo the request tag
    TagMismatch {
        /// Tag sent with the request
        expected: u32,
        /// Tag found in the response
        found: u32,
    },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadSignature { found } => {
                write!(f, "bad response signature 0x{:08X}", found)
            }
            Self::TagMismatch { expected, found } => write!(
                f,
                "response tag 0x{:08X} does not match request tag 0x{:08X}",
                found, expected
            ),
        }
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying USB channel reported an error
    #[error("transport failure: {0}")]
    Transport(String),

    /// A transfer completed with fewer bytes than requested
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Bytes the caller asked to move
        expected: usize,
        /// Bytes actually moved
        actual: usize,
    },

    /// The device answered with a malformed or uncorrelated response
    #[error("protocol mismatch: {0}")]
    Protocol(ProtocolError),

    /// A scratch buffer could not be allocated
    #[error("unable to allocate {0} bytes")]
    ResourceExhausted(usize),

    /// File I/O failed during a streamed operation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller passed an argument the protocol cannot express
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The serial number sector holds no valid record
    #[error("serial number not present")]
    SerialNotPresent,

    /// The operation is not available in the current boot mode
    #[error("operation requires {required} mode")]
    WrongMode {
        /// Mode the operation needs
        required: BootMode,
    },
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Allocate a zeroed scratch buffer, reporting exhaustion as an error
pub fn scratch(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::ResourceExhausted(len))?;
    buf.resize(len, 0);
    Ok(buf)
}
