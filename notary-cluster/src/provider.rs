//! Uniqueness provider backed by a replicated cluster.

use crate::raft::ClusterNode;
use notary_core::{
    CommitResult, ConsumingTransaction, NotaryCommand, NotaryError, Party, SecureHash, StateRef,
    UniquenessFuture, UniquenessProvider,
};
use std::sync::Arc;

/// How [`RaftUniquenessProvider`] answers `get` and `size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Append the query to the log so it observes every earlier commit.
    #[default]
    Linearizable,
    /// Answer from this replica's applied state. May trail the leader.
    Local,
}

/// Commits claims through Raft consensus.
///
/// A commit resolves once the claim is replicated to a majority and
/// applied on the leader. Works on any replica; followers forward to the
/// leader.
#[derive(Clone)]
pub struct RaftUniquenessProvider {
    node: Arc<ClusterNode>,
    read_mode: ReadMode,
}

impl RaftUniquenessProvider {
    /// Provider over `node` with linearizable reads.
    pub fn new(node: Arc<ClusterNode>) -> Self {
        Self::with_read_mode(node, ReadMode::default())
    }

    /// Provider over `node` with the given read mode.
    pub fn with_read_mode(node: Arc<ClusterNode>, read_mode: ReadMode) -> Self {
        Self { node, read_mode }
    }

    /// The node behind this provider.
    pub fn node(&self) -> &Arc<ClusterNode> {
        &self.node
    }

    async fn read(&self, command: NotaryCommand) -> Result<notary_core::NotaryResponse, NotaryError> {
        let response = match self.read_mode {
            ReadMode::Linearizable => self.node.execute(command).await?,
            ReadMode::Local => self.node.query(&command)?,
        };
        Ok(response)
    }
}

impl UniquenessProvider for RaftUniquenessProvider {
    fn commit(
        &self,
        inputs: Vec<StateRef>,
        tx_id: SecureHash,
        requesting_party: Party,
    ) -> UniquenessFuture<'_, CommitResult> {
        Box::pin(async move {
            let input_count = inputs.len();
            let command = NotaryCommand::claim(inputs, tx_id, requesting_party);
            let result = self.node.execute(command).await?.into_commit_result()?;

            match &result {
                CommitResult::Success => {
                    tracing::debug!(tx_id = %tx_id.short(), inputs = input_count, "claim committed");
                }
                CommitResult::Conflict(conflict) => {
                    tracing::info!(
                        tx_id = %tx_id.short(),
                        conflicts = conflict.state_history.len(),
                        "claim refused"
                    );
                }
            }
            Ok(result)
        })
    }

    fn get(&self, state_ref: StateRef) -> UniquenessFuture<'_, Option<ConsumingTransaction>> {
        Box::pin(async move {
            self.read(NotaryCommand::Get { key: state_ref })
                .await?
                .into_value()
        })
    }

    fn size(&self) -> UniquenessFuture<'_, u64> {
        Box::pin(async move { self.read(NotaryCommand::Size).await?.into_size() })
    }
}
