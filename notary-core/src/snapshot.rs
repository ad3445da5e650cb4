//! Snapshot stream codec.
//!
//! A snapshot is the full contents of the uniqueness table as a flat byte
//! stream:
//!
//! ```text
//! ┌────────────┬──────────────┬────────────┬──────────────┬─────
//! │ count: i32 │ len_0: u32   │ record_0   │ len_1: u32   │ ...
//! │ big-endian │ big-endian   │ JSON       │ big-endian   │
//! └────────────┴──────────────┴────────────┴──────────────┴─────
//! ```
//!
//! Each record is the JSON object `{"state_ref": .., "consuming_tx": ..}`.
//! Records are written in key order, so two stores with the same contents
//! produce byte-identical snapshots.

use crate::store::StoreError;
use crate::types::{ConsumingTransaction, StateRef};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Largest record accepted when reading. Real records are a few hundred
/// bytes; anything near this is a corrupt length prefix.
pub const MAX_RECORD_LEN: u32 = 1024 * 1024;

/// Errors from producing or consuming a snapshot stream.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The stream is malformed. Installing it must not change the store.
    #[error("Corrupted snapshot: {reason}")]
    Corrupted {
        /// What was wrong with the stream.
        reason: String,
    },

    /// More entries than the header can describe.
    #[error("Snapshot of {0} entries exceeds the format limit")]
    TooLarge(u64),

    /// The writer was finished with a different number of records than
    /// its header declared.
    #[error("Snapshot declared {declared} entries but {written} were written")]
    CountMismatch {
        /// Count in the header.
        declared: u64,
        /// Records actually written.
        written: u64,
    },

    /// A record could not be encoded.
    #[error("Record encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The underlying reader or writer failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Reading the source store or writing the target store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SnapshotError {
    fn corrupted(reason: impl Into<String>) -> Self {
        Self::Corrupted {
            reason: reason.into(),
        }
    }

    /// Whether the stream itself was bad, as opposed to local IO.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

#[derive(Serialize)]
struct RecordRef<'a> {
    state_ref: &'a StateRef,
    consuming_tx: &'a ConsumingTransaction,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Record {
    state_ref: StateRef,
    consuming_tx: ConsumingTransaction,
}

/// Writes a snapshot stream whose entry count is known up front.
pub struct SnapshotWriter<W: Write> {
    inner: W,
    declared: u64,
    written: u64,
}

impl<W: Write> SnapshotWriter<W> {
    /// Write the header for `count` entries.
    pub fn new(mut inner: W, count: u64) -> Result<Self, SnapshotError> {
        let header = i32::try_from(count).map_err(|_| SnapshotError::TooLarge(count))?;
        inner.write_i32::<BigEndian>(header)?;
        Ok(Self {
            inner,
            declared: count,
            written: 0,
        })
    }

    /// Append one entry.
    pub fn write_entry(
        &mut self,
        state_ref: &StateRef,
        consuming_tx: &ConsumingTransaction,
    ) -> Result<(), SnapshotError> {
        let record = serde_json::to_vec(&RecordRef {
            state_ref,
            consuming_tx,
        })
        .map_err(SnapshotError::Encode)?;
        self.inner.write_u32::<BigEndian>(record.len() as u32)?;
        self.inner.write_all(&record)?;
        self.written += 1;
        Ok(())
    }

    /// Flush and check that exactly the declared number of entries went
    /// out. Returns the entry count and the inner writer.
    pub fn finish(mut self) -> Result<(u64, W), SnapshotError> {
        if self.written != self.declared {
            return Err(SnapshotError::CountMismatch {
                declared: self.declared,
                written: self.written,
            });
        }
        self.inner.flush()?;
        Ok((self.written, self.inner))
    }
}

/// Reads a snapshot stream as an iterator of entries.
///
/// Every malformation is reported as [`SnapshotError::Corrupted`]: a
/// negative count, a stream that ends early, a record that is not valid
/// JSON, or bytes after the last record. The iterator yields at most one
/// error and then stops.
pub struct SnapshotReader<R: Read> {
    inner: R,
    remaining: u64,
    declared: u64,
    done: bool,
}

impl<R: Read> SnapshotReader<R> {
    /// Read and validate the header.
    pub fn new(mut inner: R) -> Result<Self, SnapshotError> {
        let count = inner
            .read_i32::<BigEndian>()
            .map_err(|e| eof_as_corruption(e, "stream ends before the header"))?;
        if count < 0 {
            return Err(SnapshotError::corrupted(format!(
                "negative entry count {count}"
            )));
        }
        Ok(Self {
            inner,
            remaining: count as u64,
            declared: count as u64,
            done: false,
        })
    }

    /// Entry count from the header.
    pub fn declared_count(&self) -> u64 {
        self.declared
    }

    fn read_record(&mut self) -> Result<(StateRef, ConsumingTransaction), SnapshotError> {
        let index = self.declared - self.remaining;
        let len = self
            .inner
            .read_u32::<BigEndian>()
            .map_err(|e| eof_as_corruption(e, format!("stream ends before record {index}")))?;
        if len > MAX_RECORD_LEN {
            return Err(SnapshotError::corrupted(format!(
                "record {index} claims {len} bytes"
            )));
        }

        let mut buf = vec![0u8; len as usize];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| eof_as_corruption(e, format!("record {index} is truncated")))?;

        let record: Record = serde_json::from_slice(&buf)
            .map_err(|e| SnapshotError::corrupted(format!("record {index} is invalid: {e}")))?;
        Ok((record.state_ref, record.consuming_tx))
    }

    fn check_trailing(&mut self) -> Result<(), SnapshotError> {
        let mut extra = [0u8; 1];
        loop {
            match self.inner.read(&mut extra) {
                Ok(0) => return Ok(()),
                Ok(_) => {
                    return Err(SnapshotError::corrupted(format!(
                        "trailing bytes after {} records",
                        self.declared
                    )));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: Read> Iterator for SnapshotReader<R> {
    type Item = Result<(StateRef, ConsumingTransaction), SnapshotError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = if self.remaining == 0 {
            self.done = true;
            match self.check_trailing() {
                Ok(()) => return None,
                Err(e) => Err(e),
            }
        } else {
            self.remaining -= 1;
            self.read_record()
        };

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

fn eof_as_corruption(e: io::Error, reason: impl Into<String>) -> SnapshotError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        SnapshotError::corrupted(reason)
    } else {
        SnapshotError::Io(e)
    }
}
