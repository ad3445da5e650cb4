//! Core of the notary uniqueness service.
//!
//! A notary is a trusted party that guarantees no ledger state is consumed
//! twice. Every input a transaction consumes is recorded against the
//! transaction that consumed it, and a second attempt to consume the same
//! input is rejected with a conflict naming the earlier consumer.
//!
//! # Layers
//!
//! ```text
//!  ┌────────────────────────────┐
//!  │   UniquenessProvider       │  commit / get / size (async facade)
//!  └─────────────┬──────────────┘
//!                │
//!  ┌─────────────▼──────────────┐
//!  │  UniquenessStateMachine    │  Claim / Get / Size, snapshots
//!  └──────┬──────────────┬──────┘
//!         │              │
//!  ┌──────▼──────┐ ┌─────▼──────┐
//!  │ Uniqueness  │ │  Snapshot  │  length-prefixed record stream
//!  │ Store (redb)│ │  codec     │
//!  └─────────────┘ └────────────┘
//! ```
//!
//! The state machine is deterministic: replicas that apply the same command
//! sequence from the same starting snapshot end with identical stores and
//! byte-identical snapshots. Replication itself lives in `notary-cluster`.
//!
//! # Usage
//!
//! ```ignore
//! use notary_core::{Party, PersistentUniquenessProvider, SecureHash, StateRef, UniquenessProvider};
//!
//! let provider = PersistentUniquenessProvider::open("data/notary.redb")?;
//! let input = StateRef::new(SecureHash::random(), 0);
//! let result = provider
//!     .commit(vec![input], SecureHash::random(), Party::from_name("alice"))
//!     .await?;
//! assert!(result.is_success());
//! ```

pub mod error;
pub mod machine;
pub mod provider;
pub mod snapshot;
pub mod store;
pub mod types;

pub use error::{NotaryError, NotaryResult, ParseError};
pub use machine::{MachineError, MachineResult, NotaryCommand, NotaryResponse, UniquenessStateMachine};
pub use provider::{PersistentUniquenessProvider, UniquenessFuture, UniquenessProvider};
pub use snapshot::{SnapshotError, SnapshotReader, SnapshotWriter};
pub use store::{StoreError, StoreIter, StoreResult, UniquenessStore};
pub use types::{
    CommitResult, ConsumingTransaction, Party, SecureHash, StateRef, UniquenessConflict,
};
