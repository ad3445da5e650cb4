//! OpenRaft state machine over the uniqueness store.

use super::snapshot::SnapshotStore;
use crate::error::ClusterResult;
use crate::types::{
    ClusterEntry, ClusterLogId, ClusterSnapshot, ClusterSnapshotMeta, ClusterStorageError,
    ClusterStoredMembership, TypeConfig,
};
use notary_core::{NotaryResponse, UniquenessStateMachine, UniquenessStore};
use openraft::storage::RaftStateMachine;
use openraft::{
    EntryPayload, OptionalSend, RaftSnapshotBuilder, RaftTypeConfig, StorageIOError,
    StoredMembership,
};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store metadata key holding [`AppliedState`].
const APPLIED_STATE_KEY: &str = "raft_applied_state";

/// Raft bookkeeping persisted next to the data it describes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppliedState {
    /// Last log entry applied to the store.
    pub last_applied_log: Option<ClusterLogId>,
    /// Last membership configuration seen in the log.
    pub last_membership: ClusterStoredMembership,
}

/// Replicated uniqueness state machine.
///
/// Committed entries are applied through [`UniquenessStateMachine`] and the
/// applied position is persisted in the store's metadata table after each
/// batch. After a crash, entries between the persisted position and the
/// real one are applied again; claims are insert-if-absent so a replayed
/// claim leaves the store unchanged.
pub struct NotaryStateMachine {
    machine: Arc<UniquenessStateMachine>,
    applied: RwLock<AppliedState>,
    snapshots: SnapshotStore,
}

impl NotaryStateMachine {
    /// Open the uniqueness store at `store_path` and the snapshot directory
    /// at `snapshot_dir`, restoring the applied position.
    pub fn open(store_path: impl AsRef<Path>, snapshot_dir: impl AsRef<Path>) -> ClusterResult<Self> {
        let store = UniquenessStore::open(store_path)?;
        let applied = match store.read_meta(APPLIED_STATE_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => AppliedState::default(),
        };
        let snapshots = SnapshotStore::open(snapshot_dir.as_ref())?;

        tracing::info!(
            last_applied = ?applied.last_applied_log,
            entries = store.size()?,
            "Opened notary state machine"
        );

        Ok(Self {
            machine: Arc::new(UniquenessStateMachine::new(store)),
            applied: RwLock::new(applied),
            snapshots,
        })
    }

    /// The local uniqueness state machine, for read-only queries.
    pub fn machine(&self) -> &Arc<UniquenessStateMachine> {
        &self.machine
    }

    /// The applied position and membership.
    pub async fn applied(&self) -> AppliedState {
        self.applied.read().await.clone()
    }

    /// Metadata of the newest snapshot on disk.
    pub fn current_snapshot_meta(&self) -> Option<ClusterSnapshotMeta> {
        self.snapshots.current().map(|s| s.meta)
    }

    fn persist_applied(&self, applied: &AppliedState) -> Result<(), ClusterStorageError> {
        let bytes =
            serde_json::to_vec(applied).map_err(|e| StorageIOError::write_state_machine(&e))?;
        self.machine
            .store()
            .write_meta(APPLIED_STATE_KEY, &bytes)
            .map_err(|e| StorageIOError::write_state_machine(&e))?;
        Ok(())
    }
}

/// Implementation of OpenRaft's snapshot builder interface.
///
/// Holds the applied-state read lock while streaming the store to disk, so
/// the snapshot matches its metadata exactly and no entry is applied
/// halfway through.
impl RaftSnapshotBuilder<TypeConfig> for Arc<NotaryStateMachine> {
    async fn build_snapshot(&mut self) -> Result<ClusterSnapshot, ClusterStorageError> {
        let applied = self.applied.read().await;

        let seq = self.snapshots.next_seq();
        let snapshot_id = match applied.last_applied_log {
            Some(last) => format!("{}-{}-{}", last.leader_id, last.index, seq),
            None => format!("--{seq}"),
        };
        let meta = ClusterSnapshotMeta {
            last_log_id: applied.last_applied_log,
            last_membership: applied.last_membership.clone(),
            snapshot_id,
        };

        let (temp_path, mut writer) = self
            .snapshots
            .create_data_file(seq)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        let entries = self
            .machine
            .take_snapshot(&mut writer)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        drop(applied);

        writer
            .flush()
            .and_then(|_| writer.get_ref().sync_all())
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        drop(writer);

        self.snapshots
            .commit(seq, &meta, &temp_path)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;

        let snapshot = super::snapshot::StoredSnapshot {
            seq,
            meta: meta.clone(),
        };
        let data = self
            .snapshots
            .open_data(&snapshot)
            .await
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;

        tracing::info!(snapshot_id = %meta.snapshot_id, entries, "Built snapshot");

        Ok(ClusterSnapshot {
            meta,
            snapshot: Box::new(data),
        })
    }
}

/// Implementation of OpenRaft's state machine interface.
///
/// Applies committed log entries deterministically. All replicas apply the
/// same sequence of commands and so hold the same consumed states.
impl RaftStateMachine<TypeConfig> for Arc<NotaryStateMachine> {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<ClusterLogId>, ClusterStoredMembership), ClusterStorageError> {
        let applied = self.applied.read().await;
        Ok((applied.last_applied_log, applied.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<NotaryResponse>, ClusterStorageError>
    where
        I: IntoIterator<Item = ClusterEntry> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let mut responses = Vec::new();
        let mut applied = self.applied.write().await;

        for entry in entries {
            tracing::debug!(%entry.log_id, "applying to state machine");

            let response = match entry.payload {
                EntryPayload::Blank => NotaryResponse::Noop,
                EntryPayload::Normal(command) => self
                    .machine
                    .apply_command(&command)
                    .map_err(|e| StorageIOError::write_state_machine(&e))?,
                EntryPayload::Membership(membership) => {
                    applied.last_membership = StoredMembership::new(Some(entry.log_id), membership);
                    NotaryResponse::Noop
                }
            };
            applied.last_applied_log = Some(entry.log_id);
            responses.push(response);
        }

        if !responses.is_empty() {
            self.persist_applied(&applied)?;
        }
        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        Arc::clone(self)
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<<TypeConfig as RaftTypeConfig>::SnapshotData>, ClusterStorageError> {
        let file = self
            .snapshots
            .create_receiving_file()
            .map_err(|e| StorageIOError::write_snapshot(None, &e))?;
        Ok(Box::new(tokio::fs::File::from_std(file)))
    }

    async fn install_snapshot(
        &mut self,
        meta: &ClusterSnapshotMeta,
        snapshot: Box<<TypeConfig as RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), ClusterStorageError> {
        let signature = meta.signature();
        let mut file = snapshot.into_std().await;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageIOError::read_snapshot(Some(signature.clone()), &e))?;

        let mut applied = self.applied.write().await;

        let entries = self
            .machine
            .install_snapshot(BufReader::new(&file))
            .map_err(|e| StorageIOError::read_snapshot(Some(signature.clone()), &e))?;
        drop(file);

        applied.last_applied_log = meta.last_log_id;
        applied.last_membership = meta.last_membership.clone();
        self.persist_applied(&applied)?;

        let seq = self.snapshots.next_seq();
        self.snapshots
            .commit(seq, meta, &self.snapshots.receiving_path())
            .map_err(|e| StorageIOError::write_snapshot(Some(signature), &e))?;

        tracing::info!(
            snapshot_id = %meta.snapshot_id,
            last_log_id = ?meta.last_log_id,
            entries,
            "Installed snapshot"
        );
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<ClusterSnapshot>, ClusterStorageError> {
        let Some(stored) = self.snapshots.current() else {
            return Ok(None);
        };
        let data = self
            .snapshots
            .open_data(&stored)
            .await
            .map_err(|e| StorageIOError::read_snapshot(Some(stored.meta.signature()), &e))?;
        Ok(Some(ClusterSnapshot {
            meta: stored.meta,
            snapshot: Box::new(data),
        }))
    }
}
