//! Locators are the lookup keys under which appointments are indexed.
//!
//! A locator is derived from the txid of the transaction that an appointment is watching for (the
//! dispute transaction). Only the first half of the txid is used so that the index never reveals
//! the full txid, which doubles as the key material for the encrypted penalty.

use std::{fmt, str::FromStr};

use arbitrary::Arbitrary;
use bitcoin::Txid;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{errors::ParseError, types::txid_display_bytes};

/// Number of bytes in a [`Locator`].
pub const LOCATOR_LEN: usize = 16;

/// A fixed-length key derived from a dispute [`Txid`].
///
/// Locators are not unique across appointments: several clients may watch the same dispute
/// transaction, and unrelated transactions may in principle collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Arbitrary)]
pub struct Locator([u8; LOCATOR_LEN]);

impl Locator {
    /// Derives the locator for the given dispute transaction id.
    pub fn from_txid(txid: &Txid) -> Self {
        let bytes = txid_display_bytes(txid);

        let mut locator = [0u8; LOCATOR_LEN];
        locator.copy_from_slice(&bytes[..LOCATOR_LEN]);

        Self(locator)
    }

    /// Wraps raw locator bytes.
    pub const fn from_bytes(bytes: [u8; LOCATOR_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the locator.
    pub const fn as_bytes(&self) -> &[u8; LOCATOR_LEN] {
        &self.0
    }
}

impl From<&Txid> for Locator {
    fn from(txid: &Txid) -> Self {
        Self::from_txid(txid)
    }
}

impl TryFrom<&[u8]> for Locator {
    type Error = ParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; LOCATOR_LEN] =
            value.try_into().map_err(|_| ParseError::InvalidLength {
                expected: LOCATOR_LEN,
                actual: value.len(),
            })?;

        Ok(Self(bytes))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({self})")
    }
}

impl FromStr for Locator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;

        Self::try_from(bytes.as_slice())
    }
}

impl Serialize for Locator {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        s.parse().map_err(de::Error::custom)
    }
}
