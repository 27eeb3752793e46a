//! Appointments delegated to the tower by its clients.

use std::{fmt, ops::Deref, str::FromStr};

use arbitrary::Arbitrary;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{errors::ParseError, locator::Locator, types::BitcoinBlockHeight};

/// Opaque ciphertext of a penalty transaction.
///
/// It can only be decrypted with key material derived from the txid of the dispute transaction
/// the appointment is watching for.
#[derive(Clone, Default, PartialEq, Eq, Hash, Arbitrary)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    /// Wraps the given ciphertext.
    pub const fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Consumes the blob and returns the ciphertext.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for EncryptedBlob {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for EncryptedBlob {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

impl Serialize for EncryptedBlob {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for EncryptedBlob {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        hex::decode(s).map(Self).map_err(de::Error::custom)
    }
}

/// A client's request to watch for a dispute transaction and respond to it.
///
/// Appointments are immutable once accepted. Structural validation (such as
/// `end_time > start_time`) happens before an appointment reaches the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Arbitrary)]
pub struct Appointment {
    /// Lookup key derived from the dispute txid.
    pub locator: Locator,

    /// Encrypted penalty transaction.
    pub encrypted_blob: EncryptedBlob,

    /// Block height at or after which the appointment starts being watched.
    pub start_time: BitcoinBlockHeight,

    /// Block height after which the appointment is no longer actionable.
    pub end_time: BitcoinBlockHeight,
}

impl Appointment {
    /// Creates a new appointment.
    pub const fn new(
        locator: Locator,
        encrypted_blob: EncryptedBlob,
        start_time: BitcoinBlockHeight,
        end_time: BitcoinBlockHeight,
    ) -> Self {
        Self {
            locator,
            encrypted_blob,
            start_time,
            end_time,
        }
    }

    /// Returns the canonical byte serialization of the appointment.
    ///
    /// This is what the tower signs as an acceptance receipt, so its layout must never change:
    /// `locator || start_time (u64 BE) || end_time (u64 BE) || encrypted_blob`.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(self.locator.as_bytes().len() + 16 + self.encrypted_blob.len());

        bytes.extend_from_slice(self.locator.as_bytes());
        bytes.extend_from_slice(&self.start_time.to_be_bytes());
        bytes.extend_from_slice(&self.end_time.to_be_bytes());
        bytes.extend_from_slice(&self.encrypted_blob);

        bytes
    }
}

/// Unique identifier assigned to an appointment when the tower accepts it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppointmentId(Uuid);

impl AppointmentId {
    /// Generates a fresh random id.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AppointmentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl fmt::Debug for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppointmentId({self})")
    }
}

impl FromStr for AppointmentId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ParseError::InvalidId(e.to_string()))
    }
}

impl Serialize for AppointmentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AppointmentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        s.parse().map_err(de::Error::custom)
    }
}

/// Where an appointment currently is in its lifecycle, as seen from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// The watcher is looking for the dispute transaction.
    BeingWatched,

    /// The dispute was seen on chain and the penalty was handed to the responder.
    DisputeResponded,

    /// The tower knows nothing about the locator.
    NotFound,
}
