//! Commit outcomes.

use crate::types::{ConsumingTransaction, SecureHash, StateRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Why a commit was refused: the inputs that were already consumed, each
/// mapped to the transaction that consumed it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{} input state(s) already consumed", .state_history.len())]
pub struct UniquenessConflict {
    /// Previously consumed inputs and their first consumer.
    #[serde(with = "state_history_serde")]
    pub state_history: BTreeMap<StateRef, ConsumingTransaction>,
}

impl UniquenessConflict {
    /// Create a conflict report.
    pub fn new(state_history: BTreeMap<StateRef, ConsumingTransaction>) -> Self {
        Self { state_history }
    }

    /// Whether every conflicting input was consumed by `tx_id` itself.
    ///
    /// This is what a retried, already applied commit looks like.
    pub fn conflicts_only_with(&self, tx_id: &SecureHash) -> bool {
        !self.state_history.is_empty() && self.state_history.values().all(|tx| &tx.id == tx_id)
    }

    /// Distinct ids of the transactions that already consumed the inputs.
    pub fn conflicting_transactions(&self) -> BTreeSet<SecureHash> {
        self.state_history.values().map(|tx| tx.id).collect()
    }
}

/// Outcome of a commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitResult {
    /// Every input was recorded against the transaction.
    Success,
    /// At least one input was already consumed; nothing was recorded.
    Conflict(UniquenessConflict),
}

impl CommitResult {
    /// Whether the commit succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The conflict, if the commit was refused.
    pub fn conflict(&self) -> Option<&UniquenessConflict> {
        match self {
            Self::Success => None,
            Self::Conflict(conflict) => Some(conflict),
        }
    }

    /// Convert into a `Result`, treating a conflict as the error.
    pub fn into_result(self) -> Result<(), UniquenessConflict> {
        match self {
            Self::Success => Ok(()),
            Self::Conflict(conflict) => Err(conflict),
        }
    }
}

/// JSON objects need string keys, so the history travels as a list of
/// pairs.
mod state_history_serde {
    use crate::types::{ConsumingTransaction, StateRef};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(
        map: &BTreeMap<StateRef, ConsumingTransaction>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let pairs: Vec<(&StateRef, &ConsumingTransaction)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<StateRef, ConsumingTransaction>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs: Vec<(StateRef, ConsumingTransaction)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
