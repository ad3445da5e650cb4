//! Single-node provider backed directly by the durable store.

use super::{UniquenessFuture, UniquenessProvider};
use crate::machine::{NotaryCommand, UniquenessStateMachine};
use crate::store::StoreError;
use crate::types::{CommitResult, ConsumingTransaction, Party, SecureHash, StateRef};
use std::path::Path;
use std::sync::Arc;

/// Uniqueness provider for a single notary node.
///
/// Commits go straight to the state machine, whose lock serializes them.
/// A commit has been written durably by the time its future resolves.
#[derive(Debug, Clone)]
pub struct PersistentUniquenessProvider {
    machine: Arc<UniquenessStateMachine>,
}

impl PersistentUniquenessProvider {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(UniquenessStateMachine::open(path)?)))
    }

    /// Serve commits from an existing state machine.
    pub fn new(machine: Arc<UniquenessStateMachine>) -> Self {
        Self { machine }
    }

    /// The state machine behind this provider.
    pub fn machine(&self) -> &Arc<UniquenessStateMachine> {
        &self.machine
    }
}

impl UniquenessProvider for PersistentUniquenessProvider {
    fn commit(
        &self,
        inputs: Vec<StateRef>,
        tx_id: SecureHash,
        requesting_party: Party,
    ) -> UniquenessFuture<'_, CommitResult> {
        Box::pin(async move {
            let command = NotaryCommand::claim(inputs, tx_id, requesting_party);
            self.machine.apply_command(&command)?.into_commit_result()
        })
    }

    fn get(&self, state_ref: StateRef) -> UniquenessFuture<'_, Option<ConsumingTransaction>> {
        Box::pin(async move {
            self.machine
                .apply_query(&NotaryCommand::Get { key: state_ref })?
                .into_value()
        })
    }

    fn size(&self) -> UniquenessFuture<'_, u64> {
        Box::pin(async move { self.machine.apply_query(&NotaryCommand::Size)?.into_size() })
    }
}
