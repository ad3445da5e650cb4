//! Durable key-value store for consumed states.
//!
//! Backed by a single redb database file with two tables:
//!
//! | Table        | Key                               | Value                        |
//! |--------------|-----------------------------------|------------------------------|
//! | `uniqueness` | `StateRef` key bytes (36 bytes)   | JSON `ConsumingTransaction`  |
//! | `meta`       | UTF-8 name                        | opaque bytes                 |
//!
//! Every mutating call runs in one write transaction, so it is either fully
//! durable or has no effect. The `meta` table lets a replicated state
//! machine keep its bookkeeping next to the data it describes.

mod error;
mod iter;

pub use error::{StoreError, StoreResult};
pub use iter::StoreIter;

use crate::types::{ConsumingTransaction, StateRef};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub(crate) const UNIQUENESS_TABLE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("uniqueness");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Durable map from consumed [`StateRef`] to the transaction that consumed
/// it.
///
/// Cloning is cheap and clones share the same database.
#[derive(Clone)]
pub struct UniquenessStore {
    db: Arc<Database>,
}

impl UniquenessStore {
    /// Open the store at `path`, creating the file and its tables if needed.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(UNIQUENESS_TABLE)?;
            txn.open_table(META_TABLE)?;
        }
        txn.commit()?;

        let store = Self { db: Arc::new(db) };
        tracing::debug!(path = %path.display(), entries = store.size()?, "Opened uniqueness store");
        Ok(store)
    }

    /// Look up who consumed `key`.
    pub fn get(&self, key: &StateRef) -> StoreResult<Option<ConsumingTransaction>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(UNIQUENESS_TABLE)?;
        match table.get(key.to_key_bytes().as_slice())? {
            Some(value) => Ok(Some(decode_value(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert every entry, or none of them.
    ///
    /// If any key is already present nothing is written and the existing
    /// values of all present keys are returned. An empty result means every
    /// entry was inserted and made durable.
    pub fn put_all_if_absent(
        &self,
        entries: &BTreeMap<StateRef, ConsumingTransaction>,
    ) -> StoreResult<BTreeMap<StateRef, ConsumingTransaction>> {
        let txn = self.db.begin_write()?;
        let mut existing = BTreeMap::new();
        {
            let mut table = txn.open_table(UNIQUENESS_TABLE)?;
            for key in entries.keys() {
                if let Some(value) = table.get(key.to_key_bytes().as_slice())? {
                    existing.insert(*key, decode_value(value.value())?);
                }
            }

            if existing.is_empty() {
                for (key, value) in entries {
                    let encoded = encode_value(value)?;
                    table.insert(key.to_key_bytes().as_slice(), encoded.as_slice())?;
                }
            }
        }

        if existing.is_empty() {
            txn.commit()?;
        } else {
            txn.abort()?;
        }
        Ok(existing)
    }

    /// Insert or overwrite every entry in one transaction.
    pub fn put_all<'a, I>(&self, entries: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = (&'a StateRef, &'a ConsumingTransaction)>,
    {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(UNIQUENESS_TABLE)?;
            for (key, value) in entries {
                let encoded = encode_value(value)?;
                table.insert(key.to_key_bytes().as_slice(), encoded.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Number of consumed states.
    pub fn size(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(UNIQUENESS_TABLE)?;
        Ok(table.len()?)
    }

    /// Iterate every entry in key order, as of this call.
    pub fn iter_all(&self) -> StoreIter {
        StoreIter::open(&self.db)
    }

    /// Remove every consumed state. Metadata is kept.
    pub fn clear(&self) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(UNIQUENESS_TABLE)?;
        {
            txn.open_table(UNIQUENESS_TABLE)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Replace the whole uniqueness table with `entries` in a single
    /// transaction.
    ///
    /// The first `Err` yielded by `entries` aborts the transaction and is
    /// returned; the previous contents stay in place. Returns the number of
    /// entries loaded.
    pub fn replace_all<I, E>(&self, entries: I) -> Result<u64, E>
    where
        I: IntoIterator<Item = Result<(StateRef, ConsumingTransaction), E>>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let mut loaded = 0u64;
        {
            txn.delete_table(UNIQUENESS_TABLE)
                .map_err(StoreError::from)?;
            let mut table = txn
                .open_table(UNIQUENESS_TABLE)
                .map_err(StoreError::from)?;
            for entry in entries {
                let (key, value) = entry?;
                let encoded = encode_value(&value)?;
                table
                    .insert(key.to_key_bytes().as_slice(), encoded.as_slice())
                    .map_err(StoreError::from)?;
                loaded += 1;
            }
        }
        txn.commit().map_err(StoreError::from)?;
        Ok(loaded)
    }

    /// Read a metadata value.
    pub fn read_meta(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META_TABLE)?;
        Ok(table.get(name)?.map(|value| value.value().to_vec()))
    }

    /// Write a metadata value durably.
    pub fn write_meta(&self, name: &str, value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META_TABLE)?;
            table.insert(name, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for UniquenessStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniquenessStore").finish_non_exhaustive()
    }
}

fn encode_value(value: &ConsumingTransaction) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode_value(bytes: &[u8]) -> StoreResult<ConsumingTransaction> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(crate) fn decode_entry(key: &[u8], value: &[u8]) -> StoreResult<(StateRef, ConsumingTransaction)> {
    let state_ref = StateRef::from_key_bytes(key).ok_or(StoreError::CorruptKey { len: key.len() })?;
    Ok((state_ref, decode_value(value)?))
}
