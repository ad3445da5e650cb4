//! Domain types: transaction hashes, parties, state references and
//! commit outcomes.

mod commit;
mod hash;
mod party;
mod state_ref;

pub use commit::{CommitResult, UniquenessConflict};
pub use hash::{HASH_LEN, SecureHash};
pub use party::Party;
pub use state_ref::{ConsumingTransaction, KEY_LEN, StateRef};
