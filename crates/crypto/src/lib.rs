//! Cryptographic capabilities used by the watchtower.
//!
//! The watcher only ever talks to the [`Signer`] and [`Decrypter`] traits; the concrete
//! implementations here are what the daemon wires in, and what clients use to build blobs.

pub mod cipher;
pub mod errors;
pub mod signer;

pub use cipher::{BlobCipher, Decrypter};
pub use errors::CryptoError;
pub use signer::{verify_signature, Signer, TowerSigner};
