use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use vela_primitives::{BlockHeight, BlockStatus};

use crate::{Account, AccountHistory, L2Nft, L2NftHistory, PoolTx};

/// An L2 block row.
///
/// While a block is open its `txs` grow and `block_size` is zero; the tree
/// updater assigns the final slot size (smallest configured slot that fits
/// the tx count) when it seals the commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: u64,
    pub block_height: BlockHeight,
    pub block_size: usize,
    pub block_status: BlockStatus,
    /// Unix millis at proposal; drives the commit-by-age criterion.
    pub created_at: u64,
    pub state_root: B256,
    pub txs: Vec<PoolTx>,
    /// JSON array of touched account indexes, set by the pre-save stage.
    pub account_indexes: String,
    /// JSON array of touched NFT indexes, set by the pre-save stage.
    pub nft_indexes: String,
}

impl Block {
    pub fn proposing(id: u64, block_height: BlockHeight, created_at: u64) -> Self {
        Self {
            id,
            block_height,
            block_size: 0,
            block_status: BlockStatus::Proposing,
            created_at,
            state_root: B256::ZERO,
            txs: Vec::new(),
            account_indexes: String::new(),
            nft_indexes: String::new(),
        }
    }
}

/// Compressed public payload of a sealed block, assembled by the rollup
/// state collaborator and stored for L1 submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedBlock {
    pub block_height: BlockHeight,
    pub block_size: usize,
    pub state_root: B256,
    pub tx_count: usize,
    pub public_data: Vec<u8>,
}

/// Immutable hand-off produced by the account+NFT tree updater and consumed
/// by the persistence stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStates {
    pub block: Block,
    pub compressed_block: Option<CompressedBlock>,
    pub pending_accounts: Vec<Account>,
    pub pending_account_histories: Vec<AccountHistory>,
    pub pending_nfts: Vec<L2Nft>,
    pub pending_nft_histories: Vec<L2NftHistory>,
}
