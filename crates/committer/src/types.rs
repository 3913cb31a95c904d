use std::collections::HashMap;

use vela_primitives::{AccountIndex, BlockHeight, NftIndex};
use vela_state::{Account, L2Nft, PoolTx};

/// Pool-row status changes accumulated by the executor and applied in bulk
/// by the pool-tx updater stage.
#[derive(Debug)]
pub(crate) struct PoolTxBatch {
    /// Executed txs: rows move to `Executed` at their block height.
    pub update: Vec<PoolTx>,
    /// Rejected non-priority txs: rows leave the pool as `Failed`.
    pub delete: Vec<PoolTx>,
}

/// Cloned account/NFT snapshots of one drain round, bound for the external
/// snapshot cache.
#[derive(Debug)]
pub(crate) struct PendingSnapshot {
    pub accounts: HashMap<AccountIndex, Account>,
    pub nfts: HashMap<NftIndex, L2Nft>,
    pub block_height: BlockHeight,
}
