//! Module to generate arbitrary values for testing.

use arbitrary::{Arbitrary, Unstructured};
use bitcoin::{hashes::Hash, Txid};
use proptest::prelude::*;
use rand_core::{OsRng, TryCryptoRng};
use watchtower_primitives::locator::{Locator, LOCATOR_LEN};

/// Size of the entropy buffer backing an [`ArbitraryGenerator`].
const ARB_GEN_LEN: usize = 1024;

/// Produces [`Arbitrary`] values from a buffer refilled with fresh OS randomness on every call.
#[derive(Debug)]
pub struct ArbitraryGenerator {
    buf: Vec<u8>,
}

impl Default for ArbitraryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArbitraryGenerator {
    pub fn new() -> Self {
        Self::new_with_size(ARB_GEN_LEN)
    }

    /// Creates a generator whose buffer holds `s` bytes. Types with large arbitrary
    /// representations need a bigger buffer to avoid running out of entropy.
    pub fn new_with_size(s: usize) -> Self {
        Self { buf: vec![0u8; s] }
    }

    /// Generates a `T` using [`OsRng`].
    pub fn generate<'a, T>(&'a mut self) -> T
    where
        T: Arbitrary<'a> + Clone,
    {
        self.generate_with_rng::<T, OsRng>(&mut OsRng)
    }

    /// Generates a `T` using the given `rng` as the entropy source.
    pub fn generate_with_rng<'a, T, R>(&'a mut self, rng: &mut R) -> T
    where
        T: Arbitrary<'a> + Clone,
        R: TryCryptoRng,
    {
        rng.try_fill_bytes(&mut self.buf)
            .expect("must be able to generate random bytes");
        let mut u = Unstructured::new(&self.buf);

        T::arbitrary(&mut u).expect("must be able to generate arbitrary instance")
    }
}

/// Generates an arbitrary Txid.
pub fn arb_txid() -> impl Strategy<Value = Txid> {
    any::<[u8; 32]>().prop_map(Txid::from_byte_array)
}

/// Generates an arbitrary locator.
pub fn arb_locator() -> impl Strategy<Value = Locator> {
    any::<[u8; LOCATOR_LEN]>().prop_map(Locator::from_bytes)
}

#[cfg(test)]
mod tests {
    use watchtower_primitives::appointment::Appointment;

    use super::*;

    #[test]
    fn generates_distinct_appointments() {
        let mut generator = ArbitraryGenerator::new();

        let first: Appointment = generator.generate();
        let second: Appointment = generator.generate();

        assert_ne!(first, second);
    }
}
