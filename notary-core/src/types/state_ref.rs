//! References to ledger states and the transactions that consume them.

use crate::error::ParseError;
use crate::types::hash::{HASH_LEN, SecureHash};
use crate::types::party::Party;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of the store key encoding of a [`StateRef`].
pub const KEY_LEN: usize = HASH_LEN + 4;

/// An output of a transaction: the producing transaction's hash and the
/// output's position.
///
/// The derived ordering (hash bytes, then index) is the same as the
/// bytewise ordering of [`StateRef::to_key_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateRef {
    /// Hash of the transaction that produced the state.
    pub txhash: SecureHash,
    /// Output index within that transaction.
    pub index: u32,
}

impl StateRef {
    /// Create a state reference.
    pub const fn new(txhash: SecureHash, index: u32) -> Self {
        Self { txhash, index }
    }

    /// Fixed-width store key: the hash followed by the big-endian index.
    pub fn to_key_bytes(&self) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        key[..HASH_LEN].copy_from_slice(self.txhash.as_bytes());
        key[HASH_LEN..].copy_from_slice(&self.index.to_be_bytes());
        key
    }

    /// Decode a store key. Returns `None` if the length is wrong.
    pub fn from_key_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != KEY_LEN {
            return None;
        }
        let hash: [u8; HASH_LEN] = bytes[..HASH_LEN].try_into().ok()?;
        let index: [u8; 4] = bytes[HASH_LEN..].try_into().ok()?;
        Some(Self {
            txhash: SecureHash::from_bytes(hash),
            index: u32::from_be_bytes(index),
        })
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txhash, self.index)
    }
}

impl FromStr for StateRef {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidStateRef(s.to_string()))?;
        let index = index
            .parse()
            .map_err(|_| ParseError::InvalidStateRef(s.to_string()))?;
        Ok(Self::new(hash.parse()?, index))
    }
}

/// The record stored against a consumed state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumingTransaction {
    /// The transaction that consumed the state.
    pub id: SecureHash,
    /// Position of the state in that transaction's input list.
    pub input_index: u32,
    /// Who asked for the commit.
    pub requesting_party: Party,
}

impl ConsumingTransaction {
    /// Create a consumption record.
    pub fn new(id: SecureHash, input_index: u32, requesting_party: Party) -> Self {
        Self {
            id,
            input_index,
            requesting_party,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bytes_layout() {
        let state = StateRef::new(SecureHash::from_bytes([7; HASH_LEN]), 0x0102_0304);
        let key = state.to_key_bytes();
        assert_eq!(&key[..HASH_LEN], &[7; HASH_LEN]);
        assert_eq!(&key[HASH_LEN..], &[1, 2, 3, 4]);
        assert_eq!(StateRef::from_key_bytes(&key), Some(state));
        assert_eq!(StateRef::from_key_bytes(&key[1..]), None);
    }

    #[test]
    fn ordering_matches_key_bytes() {
        let hash = SecureHash::from_bytes([1; HASH_LEN]);
        let other = SecureHash::from_bytes([2; HASH_LEN]);
        let mut states = vec![
            StateRef::new(other, 0),
            StateRef::new(hash, 256),
            StateRef::new(hash, 1),
        ];
        states.sort();
        let mut keys: Vec<_> = states.iter().map(StateRef::to_key_bytes).collect();
        let sorted = keys.clone();
        keys.sort();
        assert_eq!(keys, sorted);
        assert_eq!(states[0], StateRef::new(hash, 1));
    }

    #[test]
    fn display_and_parse() {
        let state = StateRef::new(SecureHash::sha256("a"), 3);
        let text = state.to_string();
        assert!(text.ends_with(":3"));
        assert_eq!(text.parse::<StateRef>().unwrap(), state);
        assert!(matches!(
            "nocolon".parse::<StateRef>(),
            Err(ParseError::InvalidStateRef(_))
        ));
        assert!("abcd:x".parse::<StateRef>().is_err());
    }
}
