//! Raft log storage on redb.
//!
//! Log entries, the vote and the log bookkeeping live in one redb file
//! separate from the uniqueness store:
//!
//! ```text
//! raft/log.redb
//! ├── raft_log    u64 index -> JSON entry
//! └── raft_meta   "vote" | "committed" | "last_purged_log_id" -> JSON
//! ```
//!
//! Every mutation is a single write transaction, committed before the call
//! returns, so an appended entry is durable before OpenRaft is told the IO
//! completed.

use crate::types::{
    ClusterEntry, ClusterLogId, ClusterLogState, ClusterStorageError, ClusterVote, TypeConfig,
};
use notary_core::StoreResult;
use openraft::storage::{LogFlushed, RaftLogStorage};
use openraft::{OptionalSend, RaftLogReader, StorageIOError};
use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::ops::RangeBounds;
use std::path::Path;
use std::sync::Arc;

const LOG_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("raft_log");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("raft_meta");

const VOTE_KEY: &str = "vote";
const COMMITTED_KEY: &str = "committed";
const LAST_PURGED_KEY: &str = "last_purged_log_id";

/// Durable Raft log.
#[derive(Clone)]
pub struct LogStore {
    db: Arc<Database>,
}

impl LogStore {
    /// Create or open the log database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(LOG_TABLE)?;
            txn.open_table(META_TABLE)?;
        }
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn read_meta<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META_TABLE)?;
        match table.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn write_meta<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META_TABLE)?;
            table.insert(key, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn last_entry_id(&self) -> StoreResult<Option<ClusterLogId>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LOG_TABLE)?;
        match table.last()? {
            Some((_, value)) => {
                let entry: ClusterEntry = serde_json::from_slice(value.value())?;
                Ok(Some(entry.log_id))
            }
            None => Ok(None),
        }
    }

    fn read_entries<RB: RangeBounds<u64>>(&self, range: RB) -> StoreResult<Vec<ClusterEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LOG_TABLE)?;
        let mut entries = Vec::new();
        for item in table.range(range)? {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    fn append_entries(&self, entries: impl IntoIterator<Item = ClusterEntry>) -> StoreResult<u64> {
        let txn = self.db.begin_write()?;
        let mut appended = 0;
        {
            let mut table = txn.open_table(LOG_TABLE)?;
            for entry in entries {
                let bytes = serde_json::to_vec(&entry)?;
                table.insert(entry.log_id.index, bytes.as_slice())?;
                appended += 1;
            }
        }
        txn.commit()?;
        Ok(appended)
    }

    /// Remove every entry with index >= `from`.
    fn truncate_from(&self, from: u64) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(LOG_TABLE)?;
            let doomed: Vec<u64> = table
                .range(from..)?
                .map(|item| item.map(|(key, _)| key.value()))
                .collect::<Result<_, _>>()?;
            for index in doomed {
                table.remove(index)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove every entry up to and including `log_id`, recording it as the
    /// last purged id in the same transaction.
    fn purge_through(&self, log_id: &ClusterLogId) -> StoreResult<()> {
        let bytes = serde_json::to_vec(log_id)?;
        let txn = self.db.begin_write()?;
        {
            let mut meta = txn.open_table(META_TABLE)?;
            meta.insert(LAST_PURGED_KEY, bytes.as_slice())?;

            let mut table = txn.open_table(LOG_TABLE)?;
            let doomed: Vec<u64> = table
                .range(..=log_id.index)?
                .map(|item| item.map(|(key, _)| key.value()))
                .collect::<Result<_, _>>()?;
            for index in doomed {
                table.remove(index)?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<ClusterEntry>, ClusterStorageError> {
        let entries = self
            .read_entries(range)
            .map_err(|e| StorageIOError::read_logs(&e))?;
        Ok(entries)
    }
}

/// Implementation of OpenRaft's log storage interface.
impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<ClusterLogState, ClusterStorageError> {
        let last_purged_log_id: Option<ClusterLogId> = self
            .read_meta(LAST_PURGED_KEY)
            .map_err(|e| StorageIOError::read_logs(&e))?;
        let last_log_id = self
            .last_entry_id()
            .map_err(|e| StorageIOError::read_logs(&e))?;

        // If no logs but we have a purged log id, use that
        let last_log_id = last_log_id.or(last_purged_log_id);

        Ok(ClusterLogState {
            last_purged_log_id,
            last_log_id,
        })
    }

    async fn save_committed(
        &mut self,
        committed: Option<ClusterLogId>,
    ) -> Result<(), ClusterStorageError> {
        self.write_meta(COMMITTED_KEY, &committed)
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<ClusterLogId>, ClusterStorageError> {
        let committed: Option<Option<ClusterLogId>> = self
            .read_meta(COMMITTED_KEY)
            .map_err(|e| StorageIOError::read_logs(&e))?;
        Ok(committed.flatten())
    }

    async fn save_vote(&mut self, vote: &ClusterVote) -> Result<(), ClusterStorageError> {
        self.write_meta(VOTE_KEY, vote)
            .map_err(|e| StorageIOError::write_vote(&e))?;
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<ClusterVote>, ClusterStorageError> {
        let vote = self
            .read_meta(VOTE_KEY)
            .map_err(|e| StorageIOError::read_vote(&e))?;
        Ok(vote)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), ClusterStorageError>
    where
        I: IntoIterator<Item = ClusterEntry> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        match self.append_entries(entries) {
            Ok(_) => {
                callback.log_io_completed(Ok(()));
                Ok(())
            }
            Err(e) => {
                let io_error = std::io::Error::other(e.to_string());
                callback.log_io_completed(Err(io_error));
                Err(StorageIOError::write_logs(&e).into())
            }
        }
    }

    async fn truncate(&mut self, log_id: ClusterLogId) -> Result<(), ClusterStorageError> {
        tracing::debug!(%log_id, "truncating raft log");
        self.truncate_from(log_id.index)
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn purge(&mut self, log_id: ClusterLogId) -> Result<(), ClusterStorageError> {
        tracing::debug!(%log_id, "purging raft log");
        self.purge_through(&log_id)
            .map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }
}
