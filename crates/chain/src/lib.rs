//! The rollup state collaborator: applies transactions to in-memory state,
//! recomputes Merkle commitments and assembles the block-state hand-off the
//! committer persists.

mod cache;
mod chain;
mod errors;
mod statedb;
mod tree;

pub use cache::{MemSnapshotCache, SnapshotCache};
pub use chain::Blockchain;
pub use errors::{ChainError, ChainResult};
pub use statedb::StateDb;
pub use tree::{CommitmentTree, SequentialHashTree};
