// src/utils/serialization.rs
//! Serialization utilities for the DID system.
//!
//! Provides:
//! - JSON helpers for the document exchange format
//! - `0x`-prefixed hex encoding of key material

use ethers::utils::hex;
use serde::{Deserialize, Deserializer, Serializer};

/// Deserializes a value from a JSON string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Encodes bytes as a `0x`-prefixed lowercase hex string.
pub fn encode_hex_prefixed(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decodes hex with or without a `0x` prefix.
pub fn decode_hex(data: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let stripped = data
        .strip_prefix("0x")
        .or_else(|| data.strip_prefix("0X"))
        .unwrap_or(data);
    hex::decode(stripped)
}

/// `#[serde(with = "hex_bytes")]` for key material fields.
pub mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_hex_prefixed(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_prefix_handling() {
        assert_eq!(encode_hex_prefixed(&[0x02, 0xab]), "0x02ab");
        assert_eq!(decode_hex("0x02ab").unwrap(), vec![0x02, 0xab]);
        assert_eq!(decode_hex("02AB").unwrap(), vec![0x02, 0xab]);
        assert!(decode_hex("0xzz").is_err());
    }

    #[test]
    fn test_json_deserialize() {
        let value: Vec<u32> = deserialize("[1,2,3]").unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert!(deserialize::<Vec<u32>>("[1,").is_err());
    }
}
