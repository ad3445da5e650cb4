//! Replicated state: the OpenRaft state machine and its snapshot files.

mod machine;
mod snapshot;

pub use machine::{AppliedState, NotaryStateMachine};
pub use snapshot::{SnapshotStore, StoredSnapshot};
