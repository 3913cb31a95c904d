//! Trait definitions for the low level persistence interfaces.  Naming
//! follows the table layout: one trait per table, plus an umbrella trait
//! worker tasks are parameterized over.

use std::sync::Arc;

use vela_primitives::{BlockHeight, TxKind, TxStatus};
use vela_state::{
    Account, AccountHistory, Block, CompressedBlock, L2Nft, L2NftHistory, PoolTx, PriorityRequest,
    TxDetail,
};

use crate::DbResult;

/// Umbrella database interface the committer is parameterized over.
pub trait Database: Send + Sync + 'static {
    type TxPool: TxPoolDatabase + Send + Sync;
    type Blocks: BlockDatabase + Send + Sync;
    type Accounts: AccountDatabase + Send + Sync;
    type AccountHistories: AccountHistoryDatabase + Send + Sync;
    type Nfts: NftDatabase + Send + Sync;
    type NftHistories: NftHistoryDatabase + Send + Sync;
    type Txs: TxDatabase + Send + Sync;
    type TxDetails: TxDetailDatabase + Send + Sync;
    type PriorityRequests: PriorityRequestDatabase + Send + Sync;

    fn tx_pool(&self) -> &Arc<Self::TxPool>;
    fn blocks(&self) -> &Arc<Self::Blocks>;
    fn accounts(&self) -> &Arc<Self::Accounts>;
    fn account_histories(&self) -> &Arc<Self::AccountHistories>;
    fn nfts(&self) -> &Arc<Self::Nfts>;
    fn nft_histories(&self) -> &Arc<Self::NftHistories>;
    fn txs(&self) -> &Arc<Self::Txs>;
    fn tx_details(&self) -> &Arc<Self::TxDetails>;
    fn priority_requests(&self) -> &Arc<Self::PriorityRequests>;
}

/// The persistent transaction pool.
pub trait TxPoolDatabase {
    /// Pending rows with `id > max_id`, ascending, up to `limit`.
    fn get_txs_by_status_and_max_id(
        &self,
        status: TxStatus,
        max_id: u64,
        limit: usize,
    ) -> DbResult<Vec<PoolTx>>;

    /// Highest-id row that has been executed or progressed further.  Rows
    /// already deleted from the pool still count; the returned id must never
    /// regress across restarts.
    fn get_latest_executed_tx(&self) -> DbResult<Option<PoolTx>>;

    /// Highest-id row matching any of the given kinds and statuses.
    fn get_latest_tx(&self, kinds: &[TxKind], statuses: &[TxStatus]) -> DbResult<Option<PoolTx>>;

    fn get_txs_by_status(&self, status: TxStatus) -> DbResult<Vec<PoolTx>>;

    fn get_tx_count_by_status(&self, status: TxStatus) -> DbResult<u64>;

    fn update_txs_status_and_height(
        &self,
        ids: &[u64],
        status: TxStatus,
        block_height: BlockHeight,
    ) -> DbResult<()>;

    /// Removes rows from the pool, recording the terminal status and height
    /// they left with.
    fn delete_txs_batch(
        &self,
        ids: &[u64],
        status: TxStatus,
        block_height: BlockHeight,
    ) -> DbResult<()>;

    /// Producer-side insertion; used by the tx senders and by tests.
    fn create_txs(&self, txs: &[PoolTx]) -> DbResult<()>;
}

/// Block rows.
pub trait BlockDatabase {
    fn get_current_block_height(&self) -> DbResult<BlockHeight>;

    fn get_block_by_height(&self, height: BlockHeight) -> DbResult<Option<Block>>;

    /// Writes the freshly proposed block row (status `Proposing`).
    fn create_block(&self, block: &Block) -> DbResult<()>;

    /// Writes the assembled block in `ProposedNotReady` status.
    fn pre_save_block_data(&self, block: &Block) -> DbResult<()>;

    /// Final-save step: inserts the compressed block (if any) and promotes
    /// the block row to `Pending`.  Implementations must apply both effects
    /// in one transaction.
    fn update_block_to_pending(
        &self,
        block_id: u64,
        compressed: Option<&CompressedBlock>,
    ) -> DbResult<()>;

    fn get_compressed_block(&self, height: BlockHeight) -> DbResult<Option<CompressedBlock>>;
}

/// Account rows, upserted per block.
pub trait AccountDatabase {
    /// Pages accounts ordered by index; used to warm the account cache.
    fn get_accounts_page(&self, limit: usize, offset: usize) -> DbResult<Vec<Account>>;

    /// Point lookup backing cache misses.
    fn get_account_by_index(&self, index: i64) -> DbResult<Option<Account>>;

    /// Insert-or-update keyed by `account_index`; idempotent.
    fn batch_insert_or_update(&self, accounts: &[Account]) -> DbResult<()>;
}

/// Append-only per-block account snapshots.
pub trait AccountHistoryDatabase {
    /// Keyed by `(account_index, l2_block_height)`; a duplicate is reported
    /// as an error, never silently applied twice.
    fn create_account_histories(&self, histories: &[AccountHistory]) -> DbResult<()>;
}

/// NFT rows, upserted per block.
pub trait NftDatabase {
    fn get_nft_by_index(&self, index: i64) -> DbResult<Option<L2Nft>>;

    fn batch_insert_or_update(&self, nfts: &[L2Nft]) -> DbResult<()>;
}

/// Append-only per-block NFT snapshots.
pub trait NftHistoryDatabase {
    /// Keyed by `(nft_index, l2_block_height)`; duplicates are errors.
    fn create_nft_histories(&self, histories: &[L2NftHistory]) -> DbResult<()>;
}

/// Executed transactions, as archived at save time.
pub trait TxDatabase {
    /// Keyed by pool tx id; duplicates are errors.
    fn create_txs(&self, txs: &[PoolTx]) -> DbResult<()>;
}

/// Balance-level effects of executed transactions.
pub trait TxDetailDatabase {
    /// Keyed by `(tx_id, order)`; duplicates are errors.
    fn create_tx_details(&self, details: &[TxDetail]) -> DbResult<()>;
}

/// L1 priority request records.
pub trait PriorityRequestDatabase {
    fn get_by_l2_tx_hash(&self, l2_tx_hash: &str) -> DbResult<Option<PriorityRequest>>;

    /// Written by the L1 watcher; exposed here for tests and tooling.
    fn create_priority_requests(&self, requests: &[PriorityRequest]) -> DbResult<()>;
}
