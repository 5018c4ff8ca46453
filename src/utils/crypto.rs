// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! Uses Keccak-256 (Ethereum's standard hash function) for all operations.

use ethers::utils::{hex, keccak256};

/// Appends `value` as an unsigned LEB128 varint.
fn append_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Method-specific id of a fresh memo DID: `hex(keccak256(address || uvarint(nonce)))`.
///
/// # Arguments
/// * `address` - 20-byte account address of the registering key
/// * `nonce` - pending transaction nonce of that account
pub fn derive_identifier_hex(address: &[u8], nonce: u64) -> String {
    let mut preimage = address.to_vec();
    append_uvarint(&mut preimage, nonce);
    hex::encode(keccak256(&preimage))
}
