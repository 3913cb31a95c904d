//! In-memory rollup state records and the hand-off payloads that flow
//! between committer pipeline stages.

mod account;
mod block;
mod cache;
mod nft;
mod tx;

pub use account::{Account, AccountAsset, AccountHistory};
pub use block::{Block, BlockStates, CompressedBlock};
pub use cache::{StateCache, StateDataCopy};
pub use nft::{L2Nft, L2NftHistory};
pub use tx::{PoolTx, PriorityRequest, TxContent, TxDetail};
