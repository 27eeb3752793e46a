//! Small type aliases and helpers shared across the workspace.

use bitcoin::{hashes::Hash, Txid};

/// Height of a bitcoin block.
pub type BitcoinBlockHeight = u64;

/// Returns the bytes of the [`Txid`] in the order in which it is usually displayed (big-endian).
///
/// [`Txid::to_byte_array`] returns the internal little-endian representation. Clients derive
/// locators and encryption keys from the txid they see in explorers and RPC responses, so
/// everything in this workspace works off the display order.
pub fn txid_display_bytes(txid: &Txid) -> [u8; 32] {
    let mut bytes = txid.to_byte_array();
    bytes.reverse();

    bytes
}
