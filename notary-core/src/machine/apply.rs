//! Deterministic claim logic.

use crate::store::{StoreResult, UniquenessStore};
use crate::types::{CommitResult, ConsumingTransaction, Party, SecureHash, StateRef, UniquenessConflict};
use std::collections::BTreeMap;

/// Record `inputs` as consumed by `tx_id`, all or nothing.
///
/// A state listed more than once keeps the position of its first
/// occurrence. An empty input list succeeds without touching the store.
pub(crate) fn claim(
    store: &UniquenessStore,
    inputs: &[StateRef],
    tx_id: &SecureHash,
    requesting_party: &Party,
) -> StoreResult<CommitResult> {
    let candidates = consumption_records(inputs, tx_id, requesting_party);
    if candidates.is_empty() {
        return Ok(CommitResult::Success);
    }

    let existing = store.put_all_if_absent(&candidates)?;
    if existing.is_empty() {
        tracing::debug!(tx = %tx_id.short(), inputs = candidates.len(), "Claimed inputs");
        Ok(CommitResult::Success)
    } else {
        tracing::warn!(
            tx = %tx_id.short(),
            conflicts = existing.len(),
            "Claim refused, inputs already consumed"
        );
        Ok(CommitResult::Conflict(UniquenessConflict::new(existing)))
    }
}

fn consumption_records(
    inputs: &[StateRef],
    tx_id: &SecureHash,
    requesting_party: &Party,
) -> BTreeMap<StateRef, ConsumingTransaction> {
    let mut records = BTreeMap::new();
    for (position, input) in inputs.iter().enumerate() {
        records.entry(*input).or_insert_with(|| {
            ConsumingTransaction::new(*tx_id, position as u32, requesting_party.clone())
        });
    }
    records
}
