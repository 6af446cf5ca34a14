//! # Yara Storage
//!
//! Account persistence with single-commit atomicity.
//!
//! ## Storage Layout
//!
//! - `store` - The `AccountStore` contract, `ChangeSet` and the retry helper
//! - `memory_db` - In-memory store with secondary indexes
//! - `snapshot` - bincode persistence of a whole `MemoryStore`
//!
//! Every write reaches the store as one `ChangeSet`. Accounts carry a version
//! and a commit is rejected with `Conflict` when any written account changed
//! underneath it; `transact` re-runs the operation in that case.

pub mod memory_db;
pub mod snapshot;
pub mod store;

// Re-export for convenience
pub use memory_db::MemoryStore;
pub use store::{transact, AccountStore, ChangeSet};
