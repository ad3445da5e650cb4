//! Lazy, ordered iteration over the uniqueness table.

use super::{StoreError, StoreResult, UNIQUENESS_TABLE, decode_entry};
use crate::types::{ConsumingTransaction, StateRef};
use redb::{Database, Range};

/// Iterator over every `(StateRef, ConsumingTransaction)` pair in key
/// order.
///
/// The iterator owns one read transaction, opened when it is created, so
/// it yields a point-in-time view: writes committed while it is being
/// consumed are not observed. Entries are decoded one at a time straight
/// from the B-tree.
pub struct StoreIter {
    state: IterState,
}

enum IterState {
    Reading(Range<'static, &'static [u8], &'static [u8]>),
    Failed(StoreError),
    Done,
}

impl StoreIter {
    pub(super) fn open(db: &Database) -> Self {
        let state = match Self::begin(db) {
            Ok(range) => IterState::Reading(range),
            Err(e) => IterState::Failed(e),
        };
        Self { state }
    }

    fn begin(db: &Database) -> StoreResult<Range<'static, &'static [u8], &'static [u8]>> {
        let txn = db.begin_read()?;
        let table = txn.open_table(UNIQUENESS_TABLE)?;
        Ok(table.range::<&[u8]>(..)?)
    }
}

impl Iterator for StoreIter {
    type Item = StoreResult<(StateRef, ConsumingTransaction)>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, IterState::Done) {
            IterState::Reading(mut range) => {
                let item = match range.next()? {
                    Ok((key, value)) => decode_entry(key.value(), value.value()),
                    Err(e) => Err(e.into()),
                };
                if item.is_ok() {
                    self.state = IterState::Reading(range);
                }
                Some(item)
            }
            IterState::Failed(e) => Some(Err(e)),
            IterState::Done => None,
        }
    }
}
