//! The commit facade used by notary front ends.
//!
//! [`UniquenessProvider`] is object safe so a front end can hold a
//! `Arc<dyn UniquenessProvider>` and not care whether commits land in a
//! local store or go through a replicated cluster.

mod persistent;

pub use persistent::PersistentUniquenessProvider;

use crate::error::NotaryError;
use crate::types::{CommitResult, ConsumingTransaction, Party, SecureHash, StateRef};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by provider operations.
pub type UniquenessFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NotaryError>> + Send + 'a>>;

/// Records which transaction consumed each ledger state.
///
/// A successful commit is durable on the backing store (and, for a
/// replicated provider, on a quorum) before the future resolves.
pub trait UniquenessProvider: Send + Sync {
    /// Atomically record `inputs` as consumed by `tx_id`.
    ///
    /// Resolves to [`CommitResult::Conflict`] naming every input that was
    /// already consumed, in which case nothing is recorded.
    fn commit(
        &self,
        inputs: Vec<StateRef>,
        tx_id: SecureHash,
        requesting_party: Party,
    ) -> UniquenessFuture<'_, CommitResult>;

    /// Look up who consumed `state_ref`.
    fn get(&self, state_ref: StateRef) -> UniquenessFuture<'_, Option<ConsumingTransaction>>;

    /// Number of consumed states.
    fn size(&self) -> UniquenessFuture<'_, u64>;
}
