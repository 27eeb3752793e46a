//! Symmetric encryption of penalty transactions.
//!
//! Blobs are AES-256-GCM ciphertexts (with the 16-byte tag appended) under the key
//! `SHA256(dispute_txid)`, where the txid is taken in display byte order. The nonce is all zeros:
//! every key encrypts exactly one penalty, so a nonce is never reused under the same key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use bitcoin::Txid;
use sha2::{Digest, Sha256};
use watchtower_primitives::{appointment::EncryptedBlob, types::txid_display_bytes};

use crate::errors::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Capability to decrypt appointment blobs given candidate key material.
pub trait Decrypter: Send + Sync {
    /// Decrypts the `blob` using the `key_material` txid.
    fn decrypt(&self, blob: &EncryptedBlob, key_material: &Txid) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM implementation of the blob encryption scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobCipher;

impl BlobCipher {
    fn cipher_for(key_material: &Txid) -> Aes256Gcm {
        let key = Sha256::digest(txid_display_bytes(key_material));

        Aes256Gcm::new(&key)
    }

    /// Encrypts a serialized penalty transaction under the dispute `key_material`.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        key_material: &Txid,
    ) -> Result<EncryptedBlob, CryptoError> {
        let nonce = [0u8; NONCE_LEN];

        Self::cipher_for(key_material)
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map(EncryptedBlob::new)
            .map_err(|_| CryptoError::EncryptionFailed)
    }
}

impl Decrypter for BlobCipher {
    fn decrypt(&self, blob: &EncryptedBlob, key_material: &Txid) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < TAG_LEN {
            return Err(CryptoError::TruncatedBlob(blob.len()));
        }

        let nonce = [0u8; NONCE_LEN];

        Self::cipher_for(key_material)
            .decrypt(Nonce::from_slice(&nonce), &blob[..])
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;
    use proptest::prelude::*;

    use super::*;

    fn txid(byte: u8) -> Txid {
        Txid::from_byte_array([byte; 32])
    }

    #[test]
    fn decrypts_with_the_right_txid_only() {
        let plaintext = b"signed penalty transaction";
        let blob = BlobCipher.encrypt(plaintext, &txid(1)).expect("must encrypt");

        assert_eq!(blob.len(), plaintext.len() + TAG_LEN);
        assert_eq!(
            BlobCipher.decrypt(&blob, &txid(1)).expect("must decrypt"),
            plaintext
        );
        assert_eq!(
            BlobCipher.decrypt(&blob, &txid(2)),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn rejects_truncated_blobs() {
        let blob = EncryptedBlob::new(vec![0u8; TAG_LEN - 1]);

        assert_eq!(
            BlobCipher.decrypt(&blob, &txid(1)),
            Err(CryptoError::TruncatedBlob(TAG_LEN - 1))
        );
    }

    proptest! {
        #[test]
        fn tampered_blobs_never_decrypt(
            plaintext in proptest::collection::vec(any::<u8>(), 1..256),
            flip in any::<usize>(),
        ) {
            let mut blob = BlobCipher
                .encrypt(&plaintext, &txid(9))
                .expect("must encrypt")
                .into_inner();
            let idx = flip % blob.len();
            blob[idx] ^= 0x01;

            prop_assert_eq!(
                BlobCipher.decrypt(&EncryptedBlob::new(blob), &txid(9)),
                Err(CryptoError::DecryptionFailed)
            );
        }
    }
}
