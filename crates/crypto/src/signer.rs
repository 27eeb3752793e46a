//! Signing of acceptance receipts with the tower's long-term key.

use std::fmt;

use secp256k1::{ecdsa::Signature, Message, PublicKey, SecretKey, SECP256K1};
use sha2::{Digest, Sha256};

/// Capability to sign arbitrary bytes with the tower's long-term key.
pub trait Signer: Send + Sync {
    /// Signs the SHA256 digest of `msg`.
    fn sign(&self, msg: &[u8]) -> Signature;

    /// Returns the public key clients use to verify receipts.
    fn public_key(&self) -> PublicKey;
}

/// ECDSA signer backed by an in-process [`SecretKey`].
#[derive(Clone)]
pub struct TowerSigner {
    secret_key: SecretKey,
}

impl TowerSigner {
    /// Creates a signer from the tower's secret key.
    pub const fn new(secret_key: SecretKey) -> Self {
        Self { secret_key }
    }
}

// The secret key must never end up in logs.
impl fmt::Debug for TowerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TowerSigner")
            .field("public_key", &self.public_key())
            .finish()
    }
}

fn digest(msg: &[u8]) -> Message {
    Message::from_digest(Sha256::digest(msg).into())
}

impl Signer for TowerSigner {
    fn sign(&self, msg: &[u8]) -> Signature {
        SECP256K1.sign_ecdsa(&digest(msg), &self.secret_key)
    }

    fn public_key(&self) -> PublicKey {
        self.secret_key.public_key(SECP256K1)
    }
}

/// Verifies a receipt produced by a [`Signer`].
pub fn verify_signature(msg: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    SECP256K1
        .verify_ecdsa(&digest(msg), signature, public_key)
        .is_ok()
}
