use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use vela_primitives::{AccountIndex, AssetId, BlockHeight, NftIndex, TxKind, TxStatus};

/// Parsed body of a pool transaction.
///
/// Priority kinds carry no fee: they are L1 events and the L1 contract
/// already charged for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxContent {
    Register {
        account_index: AccountIndex,
        l1_address: String,
    },
    Deposit {
        account_index: AccountIndex,
        asset_id: AssetId,
        amount: U256,
    },
    DepositNft {
        account_index: AccountIndex,
        nft_index: NftIndex,
        content_hash: B256,
    },
    Transfer {
        from_account_index: AccountIndex,
        to_account_index: AccountIndex,
        asset_id: AssetId,
        amount: U256,
        gas_fee_asset_id: AssetId,
        gas_fee_amount: U256,
    },
    Withdraw {
        from_account_index: AccountIndex,
        asset_id: AssetId,
        amount: U256,
        gas_fee_asset_id: AssetId,
        gas_fee_amount: U256,
    },
    MintNft {
        creator_account_index: AccountIndex,
        to_account_index: AccountIndex,
        nft_index: NftIndex,
        content_hash: B256,
        gas_fee_asset_id: AssetId,
        gas_fee_amount: U256,
    },
    TransferNft {
        from_account_index: AccountIndex,
        to_account_index: AccountIndex,
        nft_index: NftIndex,
        gas_fee_asset_id: AssetId,
        gas_fee_amount: U256,
    },
    WithdrawNft {
        from_account_index: AccountIndex,
        nft_index: NftIndex,
        gas_fee_asset_id: AssetId,
        gas_fee_amount: U256,
    },
    CancelOffer {
        account_index: AccountIndex,
        offer_id: u64,
        gas_fee_asset_id: AssetId,
        gas_fee_amount: U256,
    },
    FullExit {
        account_index: AccountIndex,
        asset_id: AssetId,
    },
    FullExitNft {
        account_index: AccountIndex,
        nft_index: NftIndex,
    },
}

/// A transaction as stored in the pool and carried through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTx {
    /// Monotonic pool id; the ordering key for priority-request continuity.
    pub id: u64,
    pub kind: TxKind,
    pub hash: String,
    pub content: TxContent,
    pub status: TxStatus,
    /// Height of the block the tx executed in; [`vela_primitives::NIL_BLOCK_HEIGHT`]
    /// until then (and forever, for rejected txs).
    pub block_height: BlockHeight,
    /// Unix millis at pool insertion.
    pub created_at: u64,
    /// Balance-level effects, filled in at execution time.
    pub details: Vec<TxDetail>,
}

impl PoolTx {
    pub fn new(id: u64, kind: TxKind, hash: impl Into<String>, content: TxContent) -> Self {
        Self {
            id,
            kind,
            hash: hash.into(),
            content,
            status: TxStatus::Pending,
            block_height: vela_primitives::NIL_BLOCK_HEIGHT,
            created_at: 0,
            details: Vec::new(),
        }
    }

    pub fn is_priority_operation(&self) -> bool {
        self.kind.is_priority_operation()
    }
}

/// One balance mutation performed by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDetail {
    pub tx_id: u64,
    pub order: i64,
    pub account_index: AccountIndex,
    pub asset_id: AssetId,
    pub balance_before: U256,
    pub balance_after: U256,
}

/// L1-originated request record; executed priority txs must consume these
/// in strictly increasing `request_id` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRequest {
    pub request_id: i64,
    pub l1_block_height: i64,
    pub l2_tx_hash: String,
}
