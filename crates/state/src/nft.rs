use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use vela_primitives::{AccountIndex, BlockHeight, NftIndex};

/// Mutable NFT aggregate, keyed by its index in the NFT tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Nft {
    pub nft_index: NftIndex,
    pub creator_account_index: AccountIndex,
    pub owner_account_index: AccountIndex,
    pub content_hash: B256,
    pub collection_id: i64,
}

/// Per-block snapshot of an NFT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2NftHistory {
    pub nft_index: NftIndex,
    pub creator_account_index: AccountIndex,
    pub owner_account_index: AccountIndex,
    pub content_hash: B256,
    pub collection_id: i64,
    pub l2_block_height: BlockHeight,
}

impl L2NftHistory {
    pub fn of(nft: &L2Nft, l2_block_height: BlockHeight) -> Self {
        Self {
            nft_index: nft.nft_index,
            creator_account_index: nft.creator_account_index,
            owner_account_index: nft.owner_account_index,
            content_hash: nft.content_hash,
            collection_id: nft.collection_id,
            l2_block_height,
        }
    }
}
