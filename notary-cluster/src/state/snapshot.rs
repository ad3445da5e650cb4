//! On-disk snapshot files.
//!
//! ```text
//! snapshots/
//! ├── 00000000000000000007.snap        # snapshot stream
//! ├── 00000000000000000007.meta.json   # OpenRaft snapshot metadata
//! └── receiving.tmp                    # snapshot arriving from the leader
//! ```
//!
//! A snapshot is complete once its `.meta.json` exists. Data is written
//! and synced first, then the metadata is renamed into place, so a crash
//! never leaves a metadata file pointing at a partial stream. On open the
//! newest complete snapshot is kept and everything else is removed.

use crate::types::ClusterSnapshotMeta;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const DATA_EXT: &str = "snap";
const META_SUFFIX: &str = ".meta.json";
const RECEIVING_FILE: &str = "receiving.tmp";

/// A complete snapshot on disk.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    /// Sequence number used in the file names.
    pub seq: u64,
    /// OpenRaft metadata.
    pub meta: ClusterSnapshotMeta,
}

/// Owns the snapshot directory.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    next_seq: AtomicU64,
    current: Mutex<Option<StoredSnapshot>>,
}

impl SnapshotStore {
    /// Open the snapshot directory, keeping only the newest complete
    /// snapshot.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut newest: Option<StoredSnapshot> = None;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(seq) = meta_seq(&path) else {
                continue;
            };
            if newest.as_ref().is_some_and(|s| s.seq >= seq) {
                continue;
            }
            if !data_path(&dir, seq).exists() {
                continue;
            }
            match read_meta(&path) {
                Ok(meta) => newest = Some(StoredSnapshot { seq, meta }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable snapshot metadata");
                }
            }
        }

        let store = Self {
            next_seq: AtomicU64::new(newest.as_ref().map_or(1, |s| s.seq + 1)),
            current: Mutex::new(newest.clone()),
            dir,
        };
        store.prune(newest.as_ref().map(|s| s.seq), true)?;

        if let Some(snapshot) = &newest {
            tracing::info!(
                snapshot_id = %snapshot.meta.snapshot_id,
                last_log_id = ?snapshot.meta.last_log_id,
                "Loaded snapshot from disk"
            );
        }
        Ok(store)
    }

    /// The newest complete snapshot.
    pub fn current(&self) -> Option<StoredSnapshot> {
        self.current.lock().clone()
    }

    /// Reserve a sequence number for a new snapshot.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Create the temporary data file for snapshot `seq`.
    pub fn create_data_file(&self, seq: u64) -> io::Result<(PathBuf, BufWriter<File>)> {
        let path = self.dir.join(format!("{seq:020}.{DATA_EXT}.tmp"));
        let file = File::create(&path)?;
        Ok((path, BufWriter::new(file)))
    }

    /// Create (or reset) the file a snapshot from the leader is written into.
    pub fn create_receiving_file(&self) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.dir.join(RECEIVING_FILE))
    }

    /// Path of the file created by [`create_receiving_file`](Self::create_receiving_file).
    pub fn receiving_path(&self) -> PathBuf {
        self.dir.join(RECEIVING_FILE)
    }

    /// Publish a fully written and synced data file as snapshot `seq`.
    ///
    /// Moves `data_file` into place, writes the metadata, makes the result
    /// current and removes older snapshots.
    pub fn commit(&self, seq: u64, meta: &ClusterSnapshotMeta, data_file: &Path) -> io::Result<()> {
        fs::rename(data_file, data_path(&self.dir, seq))?;

        let meta_path = self.dir.join(format!("{seq:020}{META_SUFFIX}"));
        let temp_path = self.dir.join(format!("{seq:020}{META_SUFFIX}.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            serde_json::to_writer(&mut writer, meta).map_err(io::Error::other)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp_path, &meta_path)?;
        sync_dir(&self.dir)?;

        let snapshot = StoredSnapshot {
            seq,
            meta: meta.clone(),
        };
        {
            let mut current = self.current.lock();
            // A slower build must not replace a newer snapshot.
            if current.as_ref().is_some_and(|c| c.seq > seq) {
                return Ok(());
            }
            *current = Some(snapshot);
        }
        self.prune(Some(seq), false)?;

        tracing::debug!(seq, snapshot_id = %meta.snapshot_id, "Snapshot committed");
        Ok(())
    }

    /// Open the data file of a stored snapshot for reading.
    pub async fn open_data(&self, snapshot: &StoredSnapshot) -> io::Result<tokio::fs::File> {
        tokio::fs::File::open(data_path(&self.dir, snapshot.seq)).await
    }

    /// Open the data file of a stored snapshot for synchronous reading.
    pub fn read_data(&self, snapshot: &StoredSnapshot) -> io::Result<BufReader<File>> {
        Ok(BufReader::new(File::open(data_path(&self.dir, snapshot.seq))?))
    }

    /// Remove snapshot files other than those of `keep`. Files of newer
    /// sequence numbers belong to builds in progress and are only removed
    /// when `include_newer` is set.
    fn prune(&self, keep: Option<u64>, include_newer: bool) -> io::Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == RECEIVING_FILE {
                continue;
            }
            let seq = name.split('.').next().and_then(|s| s.parse::<u64>().ok());
            let stale = match (seq, keep) {
                (Some(seq), Some(keep)) if seq == keep => name.ends_with(".tmp"),
                (Some(seq), Some(keep)) => seq < keep || include_newer,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if stale {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn data_path(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("{seq:020}.{DATA_EXT}"))
}

fn meta_seq(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(META_SUFFIX)?.parse().ok()
}

fn read_meta(path: &Path) -> io::Result<ClusterSnapshotMeta> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClusterLogId;
    use openraft::{CommittedLeaderId, StoredMembership};
    use std::io::Read;
    use tempfile::TempDir;

    fn meta(index: u64, id: &str) -> ClusterSnapshotMeta {
        ClusterSnapshotMeta {
            last_log_id: Some(ClusterLogId::new(CommittedLeaderId::new(1, 0), index)),
            last_membership: StoredMembership::default(),
            snapshot_id: id.to_string(),
        }
    }

    fn write_snapshot(store: &SnapshotStore, index: u64, body: &[u8]) -> u64 {
        let seq = store.next_seq();
        let (path, mut writer) = store.create_data_file(seq).unwrap();
        writer.write_all(body).unwrap();
        writer.flush().unwrap();
        drop(writer);
        store.commit(seq, &meta(index, &format!("snap-{seq}")), &path).unwrap();
        seq
    }

    #[test]
    fn test_commit_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = SnapshotStore::open(temp_dir.path()).unwrap();
            assert!(store.current().is_none());
            write_snapshot(&store, 10, b"first");
            write_snapshot(&store, 20, b"second");
        }

        let store = SnapshotStore::open(temp_dir.path()).unwrap();
        let current = store.current().unwrap();
        assert_eq!(current.meta.last_log_id.unwrap().index, 20);

        let mut body = Vec::new();
        store.read_data(&current).unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, b"second");
        assert!(store.next_seq() > current.seq);
    }

    #[test]
    fn test_older_snapshots_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path()).unwrap();
        write_snapshot(&store, 1, b"a");
        write_snapshot(&store, 2, b"b");
        write_snapshot(&store, 3, b"c");

        let files = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 2, "only the newest data and meta files remain");
    }

    #[test]
    fn test_incomplete_snapshot_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = SnapshotStore::open(temp_dir.path()).unwrap();
            write_snapshot(&store, 5, b"complete");
            let seq = store.next_seq();
            let (_path, mut writer) = store.create_data_file(seq).unwrap();
            writer.write_all(b"partial").unwrap();
        }

        let store = SnapshotStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.current().unwrap().meta.last_log_id.unwrap().index, 5);
        let files = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 2);
    }
}
