//! SHA-256 transaction identifiers.

use crate::error::ParseError;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of a [`SecureHash`] in bytes.
pub const HASH_LEN: usize = 32;

/// A 32-byte SHA-256 digest identifying a transaction.
///
/// Ordering is bytewise, which matches the order of the store's keys.
/// Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecureHash([u8; HASH_LEN]);

impl SecureHash {
    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary data.
    pub fn sha256(data: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(data.as_ref());
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// A uniformly random hash, for tests and load generation.
    pub fn random() -> Self {
        let mut bytes = [0u8; HASH_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureHash({})", self.to_hex())
    }
}

impl FromStr for SecureHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s.trim())?;
        let bytes: [u8; HASH_LEN] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| ParseError::InvalidLength {
                    expected: HASH_LEN,
                    actual: decoded.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl Serialize for SecureHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SecureHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(SecureHash::sha256("tx-1"), SecureHash::sha256("tx-1"));
        assert_ne!(SecureHash::sha256("tx-1"), SecureHash::sha256("tx-2"));
    }

    #[test]
    fn hex_parse() {
        let hash = SecureHash::random();
        let parsed: SecureHash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);
        assert_eq!(hash.short().len(), 8);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            "zz".parse::<SecureHash>(),
            Err(ParseError::InvalidHex(_))
        ));
        assert_eq!(
            "abcd".parse::<SecureHash>(),
            Err(ParseError::InvalidLength {
                expected: HASH_LEN,
                actual: 2
            })
        );
    }

    #[test]
    fn serializes_as_hex_string() {
        let hash = SecureHash::from_bytes([0xab; HASH_LEN]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(HASH_LEN)));
        let back: SecureHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
