//! Errors for the cryptographic primitives.

use thiserror::Error;

/// Errors that can occur while encrypting or decrypting appointment blobs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authenticated decryption failed: either the key material is wrong or the blob is corrupt.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Encryption of the plaintext failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// The blob is too short to contain an authentication tag.
    #[error("blob of {0} bytes is too short to contain a tag")]
    TruncatedBlob(usize),
}
