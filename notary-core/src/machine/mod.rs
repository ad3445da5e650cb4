//! The uniqueness state machine.
//!
//! Wraps a [`UniquenessStore`] and applies [`NotaryCommand`]s to it. The
//! same type serves both the standalone provider and each replica of the
//! replicated cluster; replication only decides the order in which
//! commands arrive.
//!
//! A single reader-writer lock orders everything that touches the store:
//! commands and snapshot installs take it exclusively, queries and
//! snapshot builds share it. A snapshot therefore always reflects a point
//! between two commands.

mod apply;
mod command;

pub use command::{NotaryCommand, NotaryResponse};

use crate::snapshot::{SnapshotError, SnapshotReader, SnapshotWriter};
use crate::store::{StoreError, UniquenessStore};
use parking_lot::RwLock;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Result type for state machine operations.
pub type MachineResult<T> = std::result::Result<T, MachineError>;

/// Errors from applying commands or queries.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The store failed; the command had no effect.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A mutating command was submitted as a query.
    #[error("Command '{0}' is not read-only")]
    NotAQuery(&'static str),

    /// The last snapshot install failed and local reads would be stale.
    #[error("Replica requires a snapshot resync")]
    ResyncRequired,
}

/// Deterministic state machine over the consumed-state store.
pub struct UniquenessStateMachine {
    store: UniquenessStore,
    lock: RwLock<()>,
    resync_required: AtomicBool,
}

impl UniquenessStateMachine {
    /// Wrap an open store.
    pub fn new(store: UniquenessStore) -> Self {
        Self {
            store,
            lock: RwLock::new(()),
            resync_required: AtomicBool::new(false),
        }
    }

    /// Open (or create) the store at `path` and wrap it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(UniquenessStore::open(path)?))
    }

    /// The underlying store.
    pub fn store(&self) -> &UniquenessStore {
        &self.store
    }

    /// Whether queries are refused until a snapshot installs cleanly.
    pub fn resync_required(&self) -> bool {
        self.resync_required.load(Ordering::Acquire)
    }

    /// Apply a command from the log.
    ///
    /// Must be called in log order. A store failure is returned as an
    /// error and the command has no effect.
    pub fn apply_command(&self, command: &NotaryCommand) -> MachineResult<NotaryResponse> {
        let _guard = self.lock.write();
        self.dispatch(command)
    }

    /// Serve a read-only command from local state without going through
    /// the log.
    ///
    /// Results may trail the leader on a follower.
    pub fn apply_query(&self, command: &NotaryCommand) -> MachineResult<NotaryResponse> {
        if !command.is_read_only() {
            return Err(MachineError::NotAQuery(command.name()));
        }
        if self.resync_required() {
            return Err(MachineError::ResyncRequired);
        }
        let _guard = self.lock.read();
        self.dispatch(command)
    }

    fn dispatch(&self, command: &NotaryCommand) -> MachineResult<NotaryResponse> {
        let response: NotaryResponse = match command {
            NotaryCommand::Claim {
                inputs,
                tx_id,
                requesting_party,
            } => apply::claim(&self.store, inputs, tx_id, requesting_party)?.into(),
            NotaryCommand::Get { key } => NotaryResponse::Value(self.store.get(key)?),
            NotaryCommand::Size => NotaryResponse::Size(self.store.size()?),
        };
        Ok(response)
    }

    /// Write the full store contents to `writer` in snapshot format.
    ///
    /// Commands wait until the snapshot is written. Returns the number of
    /// entries written; the caller flushes and syncs `writer`.
    pub fn take_snapshot<W: Write>(&self, writer: W) -> Result<u64, SnapshotError> {
        let _guard = self.lock.read();
        let count = self.store.size()?;
        let mut snapshot = SnapshotWriter::new(writer, count)?;
        for entry in self.store.iter_all() {
            let (state_ref, consuming_tx) = entry?;
            snapshot.write_entry(&state_ref, &consuming_tx)?;
        }
        let (written, _) = snapshot.finish()?;
        tracing::debug!(entries = written, "Took uniqueness snapshot");
        Ok(written)
    }

    /// Replace the store contents with the snapshot read from `reader`.
    ///
    /// The replacement is a single store transaction: on any error the
    /// previous contents stay in place, queries are refused with
    /// [`MachineError::ResyncRequired`] until a later install succeeds,
    /// and the error is returned.
    pub fn install_snapshot<R: Read>(&self, reader: R) -> Result<u64, SnapshotError> {
        let _guard = self.lock.write();
        let result =
            SnapshotReader::new(reader).and_then(|entries| self.store.replace_all(entries));

        match &result {
            Ok(entries) => {
                self.resync_required.store(false, Ordering::Release);
                tracing::info!(entries, "Installed uniqueness snapshot");
            }
            Err(e) => {
                self.resync_required.store(true, Ordering::Release);
                tracing::error!(error = %e, "Snapshot install failed, replica needs resync");
            }
        }
        result
    }
}

impl std::fmt::Debug for UniquenessStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniquenessStateMachine")
            .field("resync_required", &self.resync_required())
            .finish_non_exhaustive()
    }
}
