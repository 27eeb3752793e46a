//! Errors produced while parsing primitive types.

use thiserror::Error;

/// Errors that can occur when parsing a primitive from its textual or binary representation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The input is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The input has the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Number of bytes required.
        expected: usize,

        /// Number of bytes received.
        actual: usize,
    },

    /// The input is not a valid uuid.
    #[error("invalid appointment id: {0}")]
    InvalidId(String),
}
