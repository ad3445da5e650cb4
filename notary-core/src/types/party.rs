//! Ledger participants.

use crate::types::SecureHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A participant identity: a name and the key it signs with.
///
/// The notary treats both fields as opaque; it records the party that
/// requested a commit so a conflict can report who consumed a state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    /// Human readable name.
    pub name: String,
    /// Public key, encoded as hex.
    pub owning_key: String,
}

impl Party {
    /// Create a party.
    pub fn new(name: impl Into<String>, owning_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owning_key: owning_key.into(),
        }
    }

    /// A party whose key is derived from its name. Used for test and
    /// demo identities.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let owning_key = SecureHash::sha256(name.as_bytes()).to_hex();
        Self { name, owning_key }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
