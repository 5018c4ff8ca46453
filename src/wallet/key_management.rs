// src/wallet/key_management.rs
//! Signing key management for the identity controller.
//!
//! Keys are secp256k1 (via the `k256` crate). The same key signs ledger
//! transactions and, in compressed SEC1 form, serves as the master
//! verification key registered for a new identity.

use crate::error::ConfigError;
use crate::models::document::SECP256K1_METHOD_TYPE;
use crate::utils::serialization::decode_hex;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::secret_key_to_address;
use k256::ecdsa::SigningKey;
use std::fmt;

/// Holder of one secp256k1 signing key.
///
/// # Security Notes
/// - The secret scalar is never exposed through `Debug`
/// - Only the derived address and public key leave this type
#[derive(Clone)]
pub struct KeyManager {
    signing_key: SigningKey,
}

impl KeyManager {
    /// Loads a key from its hex encoding.
    ///
    /// # Arguments
    /// * `private_key` - 32-byte secret, hex encoded, with or without `0x`
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if the text is not hex or is not a valid
    /// secp256k1 scalar.
    pub fn from_hex(private_key: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid { field: "private_key", reason };
        let bytes = decode_hex(private_key.trim()).map_err(|e| invalid(e.to_string()))?;
        let signing_key = SigningKey::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { signing_key })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Ethereum address controlled by this key.
    pub fn address(&self) -> Address {
        secret_key_to_address(&self.signing_key)
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Verification method type matching [`KeyManager::public_key`].
    pub fn method_type(&self) -> &'static str {
        SECP256K1_METHOD_TYPE
    }

    /// Transaction signer bound to `chain_id`.
    pub fn wallet(&self, chain_id: u64) -> LocalWallet {
        LocalWallet::from(self.signing_key.clone()).with_chain_id(chain_id)
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager").field("address", &self.address()).finish()
    }
}
