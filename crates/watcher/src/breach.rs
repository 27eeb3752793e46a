//! Turning a dispute seen on chain into an actionable penalty.

use bitcoin::{consensus, Transaction, Txid};
use thiserror::Error;
use watchtower_crypto::{CryptoError, Decrypter};
use watchtower_primitives::{
    appointment::{Appointment, AppointmentId},
    locator::Locator,
};

/// Why a breach could not be acted upon.
#[derive(Debug, Error)]
pub enum InvalidBreach {
    /// The dispute txid is not the key the blob was encrypted under. This is expected when two
    /// txids share a locator.
    #[error("blob does not decrypt under the dispute txid: {0}")]
    Decryption(#[from] CryptoError),

    /// The blob decrypted but does not hold a transaction.
    #[error("decrypted blob is not a transaction: {0}")]
    MalformedPenalty(#[from] consensus::encode::Error),
}

/// Result of validating one appointment against the txids that matched its locator.
#[derive(Debug)]
pub enum BreachOutcome {
    Valid {
        dispute_txid: Txid,
        penalty_tx: Transaction,
    },

    Invalid {
        dispute_txid: Txid,
        reason: InvalidBreach,
    },
}

/// A breach ready to be handed to the [`Responder`](crate::Responder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBreach {
    pub appointment_id: AppointmentId,
    pub locator: Locator,
    pub dispute_txid: Txid,
    pub penalty_tx: Transaction,
}

/// Decrypts the appointment's blob with `dispute_txid` and decodes the penalty it holds.
pub fn validate_breach(
    decrypter: &dyn Decrypter,
    appointment: &Appointment,
    dispute_txid: &Txid,
) -> Result<Transaction, InvalidBreach> {
    let plaintext = decrypter.decrypt(&appointment.encrypted_blob, dispute_txid)?;

    Ok(consensus::deserialize(&plaintext)?)
}

/// Validates `appointment` against every candidate txid.
///
/// The first candidate yielding a penalty wins. When none does, the failure of the last candidate
/// is reported.
pub fn evaluate_candidates(
    decrypter: &dyn Decrypter,
    appointment: &Appointment,
    candidates: &[Txid],
) -> Option<BreachOutcome> {
    let mut outcome = None;

    for dispute_txid in candidates {
        match validate_breach(decrypter, appointment, dispute_txid) {
            Ok(penalty_tx) => {
                return Some(BreachOutcome::Valid {
                    dispute_txid: *dispute_txid,
                    penalty_tx,
                })
            }
            Err(reason) => {
                outcome = Some(BreachOutcome::Invalid {
                    dispute_txid: *dispute_txid,
                    reason,
                })
            }
        }
    }

    outcome
}
