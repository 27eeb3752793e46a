//! Generators for bitcoin values and appointments.

use bitcoin::{
    absolute::LockTime,
    consensus,
    hashes::Hash,
    key::rand::{rngs::OsRng, Rng},
    transaction::Version,
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use secp256k1::SecretKey;
use watchtower_crypto::BlobCipher;
use watchtower_primitives::{
    appointment::{Appointment, EncryptedBlob},
    locator::{Locator, LOCATOR_LEN},
    types::BitcoinBlockHeight,
};

/// Generates a random transaction ID.
pub fn generate_txid() -> Txid {
    let mut txid = [0u8; 32];
    OsRng.fill(&mut txid);

    Txid::from_byte_array(txid)
}

/// Generates a random locator, unrelated to any txid.
pub fn generate_locator() -> Locator {
    let mut locator = [0u8; LOCATOR_LEN];
    OsRng.fill(&mut locator);

    Locator::from_bytes(locator)
}

/// Generates a random secret key.
pub fn generate_secret_key() -> SecretKey {
    SecretKey::new(&mut OsRng)
}

/// Generates a structurally valid penalty transaction spending a random outpoint.
pub fn generate_penalty_tx() -> Transaction {
    let mut marker = [0u8; 32];
    OsRng.fill(&mut marker);

    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: generate_txid(),
                vout: OsRng.gen_range(0..4),
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(OsRng.gen_range(1_000..100_000)),
            script_pubkey: ScriptBuf::from_bytes(marker.to_vec()),
        }],
    }
}

/// Generates an appointment with a random locator and a random (undecryptable) blob.
pub fn generate_appointment() -> Appointment {
    let mut blob = vec![0u8; OsRng.gen_range(32..256)];
    OsRng.fill(&mut blob[..]);

    let start_time = OsRng.gen_range(0..1_000);
    let end_time = start_time + OsRng.gen_range(1..1_000);

    Appointment::new(
        generate_locator(),
        EncryptedBlob::new(blob),
        start_time,
        end_time,
    )
}

/// Generates the appointment a client would send to have `penalty_tx` broadcast once
/// `dispute_txid` confirms.
pub fn generate_appointment_for(
    dispute_txid: &Txid,
    penalty_tx: &Transaction,
    start_time: BitcoinBlockHeight,
    end_time: BitcoinBlockHeight,
) -> Appointment {
    let encrypted_blob = BlobCipher
        .encrypt(&consensus::serialize(penalty_tx), dispute_txid)
        .expect("must be able to encrypt penalty");

    Appointment::new(
        Locator::from_txid(dispute_txid),
        encrypted_blob,
        start_time,
        end_time,
    )
}

/// Generates an appointment for `dispute_txid` whose blob decrypts fine but does not hold a
/// transaction.
pub fn generate_undecodable_appointment_for(
    dispute_txid: &Txid,
    start_time: BitcoinBlockHeight,
    end_time: BitcoinBlockHeight,
) -> Appointment {
    let encrypted_blob = BlobCipher
        .encrypt(b"definitely not a transaction", dispute_txid)
        .expect("must be able to encrypt garbage");

    Appointment::new(
        Locator::from_txid(dispute_txid),
        encrypted_blob,
        start_time,
        end_time,
    )
}
