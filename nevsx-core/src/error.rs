//! Error types shared by the continuous and event readers.

use std::collections::TryReserveError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors that can occur while decoding NEURALCD or NEURALEV data.
///
/// Variants fall into three families:
///
/// - data-format faults (`InvalidMagic`, `BadMarker`, `InvalidFormat`,
///   `Truncated`): the file is damaged or is not of the expected type;
/// - `UseAfterEnd`: the caller asked for data after the stream was exhausted,
///   which is a bug in the calling code rather than in the file;
/// - environment faults (`Io`, `Resource`).
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        expected: &'static str,
        found: String,
    },

    #[error("Bad {what} marker: expected {expected:?}, found {found:?}")]
    BadMarker {
        what: &'static str,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Truncated {what}: needed {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Read attempted after the end of the stream")]
    UseAfterEnd,

    #[error("Unable to allocate read buffer: {0}")]
    Resource(#[from] TryReserveError),
}

impl DecodeError {
    /// Returns true for errors that mean the input is not a valid recording.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. }
                | Self::BadMarker { .. }
                | Self::InvalidFormat(_)
                | Self::Truncated { .. }
        )
    }

    /// Returns true when the error was caused by misuse of the reader API.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::UseAfterEnd)
    }

    pub(crate) fn invalid_format<S: Into<String>>(s: S) -> Self {
        Self::InvalidFormat(s.into())
    }
}
