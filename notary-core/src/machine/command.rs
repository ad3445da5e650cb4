//! Commands and responses of the uniqueness state machine.

use crate::error::{NotaryError, NotaryResult};
use crate::types::{CommitResult, ConsumingTransaction, Party, SecureHash, StateRef, UniquenessConflict};
use serde::{Deserialize, Serialize};

/// A command applied to the uniqueness state machine.
///
/// Commands are replicated through the log and applied in log order on
/// every replica, so their effect must depend only on the command and the
/// current store contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotaryCommand {
    /// Record every input as consumed by `tx_id`, unless any input is
    /// already consumed.
    Claim {
        /// States the transaction consumes, in input order.
        inputs: Vec<StateRef>,
        /// The consuming transaction.
        tx_id: SecureHash,
        /// Who asked for the commit.
        requesting_party: Party,
    },

    /// Look up who consumed a state.
    Get {
        /// The state to look up.
        key: StateRef,
    },

    /// Count consumed states.
    Size,
}

impl NotaryCommand {
    /// Build a claim.
    pub fn claim(inputs: Vec<StateRef>, tx_id: SecureHash, requesting_party: Party) -> Self {
        Self::Claim {
            inputs,
            tx_id,
            requesting_party,
        }
    }

    /// Whether the command leaves the store unchanged.
    pub fn is_read_only(&self) -> bool {
        !matches!(self, Self::Claim { .. })
    }

    /// Short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Claim { .. } => "claim",
            Self::Get { .. } => "get",
            Self::Size => "size",
        }
    }
}

/// Result of applying a [`NotaryCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotaryResponse {
    /// Claim succeeded.
    Committed,
    /// Claim refused; nothing was written.
    Conflict(UniquenessConflict),
    /// Result of a `Get`.
    Value(Option<ConsumingTransaction>),
    /// Result of a `Size`.
    Size(u64),
    /// Log entries that carry no command (leader blanks, membership
    /// changes).
    Noop,
}

impl NotaryResponse {
    /// Interpret the response to a `Claim`.
    pub fn into_commit_result(self) -> NotaryResult<CommitResult> {
        match self {
            Self::Committed => Ok(CommitResult::Success),
            Self::Conflict(conflict) => Ok(CommitResult::Conflict(conflict)),
            other => Err(NotaryError::rejected(format!(
                "expected a claim response, got {other:?}"
            ))),
        }
    }

    /// Interpret the response to a `Get`.
    pub fn into_value(self) -> NotaryResult<Option<ConsumingTransaction>> {
        match self {
            Self::Value(value) => Ok(value),
            other => Err(NotaryError::rejected(format!(
                "expected a get response, got {other:?}"
            ))),
        }
    }

    /// Interpret the response to a `Size`.
    pub fn into_size(self) -> NotaryResult<u64> {
        match self {
            Self::Size(size) => Ok(size),
            other => Err(NotaryError::rejected(format!(
                "expected a size response, got {other:?}"
            ))),
        }
    }
}

impl From<CommitResult> for NotaryResponse {
    fn from(result: CommitResult) -> Self {
        match result {
            CommitResult::Success => Self::Committed,
            CommitResult::Conflict(conflict) => Self::Conflict(conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_commands() {
        let claim = NotaryCommand::claim(vec![], SecureHash::sha256("tx"), Party::from_name("a"));
        assert!(!claim.is_read_only());
        assert_eq!(claim.name(), "claim");
        assert!(NotaryCommand::Size.is_read_only());
        assert!(
            NotaryCommand::Get {
                key: StateRef::new(SecureHash::sha256("s"), 0)
            }
            .is_read_only()
        );
    }

    #[test]
    fn response_conversions() {
        assert_eq!(
            NotaryResponse::Committed.into_commit_result().unwrap(),
            CommitResult::Success
        );
        assert_eq!(NotaryResponse::Size(3).into_size().unwrap(), 3);
        assert_eq!(NotaryResponse::Value(None).into_value().unwrap(), None);
        assert!(NotaryResponse::Size(3).into_commit_result().is_err());
        assert!(NotaryResponse::Noop.into_value().is_err());
    }

    #[test]
    fn command_json_roundtrip() {
        let cmd = NotaryCommand::claim(
            vec![StateRef::new(SecureHash::sha256("s"), 2)],
            SecureHash::sha256("tx"),
            Party::from_name("alice"),
        );
        let json = serde_json::to_vec(&cmd).unwrap();
        assert_eq!(serde_json::from_slice::<NotaryCommand>(&json).unwrap(), cmd);
    }
}
