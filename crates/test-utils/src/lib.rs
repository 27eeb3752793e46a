//! This crate provides test-utilities shared by the watchtower crates.
//!
//! These utilities are mostly used to generate random values (txids, locators, appointments with
//! genuine ciphertexts) for testing purposes.

pub mod arbitrary_generator;
pub mod bitcoin;
pub mod prelude;
