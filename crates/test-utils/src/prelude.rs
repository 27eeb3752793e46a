//! Everything a test usually needs, in one import.

pub use crate::{
    arbitrary_generator::{arb_locator, arb_txid, ArbitraryGenerator},
    bitcoin::{
        generate_appointment, generate_appointment_for, generate_locator, generate_penalty_tx,
        generate_secret_key, generate_txid, generate_undecodable_appointment_for,
    },
};
