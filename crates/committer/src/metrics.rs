//! Metric names published by the committer, described once at startup.
//!
//! Queue depths, heights and ids are gauges; per-stage latencies are
//! histograms in milliseconds; tx throughput is counted.

use std::time::Instant;

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub const PRIORITY_REQUEST_ID: &str = "vela_priority_request_id";
pub const PRIORITY_REQUEST_L1_HEIGHT: &str = "vela_priority_request_l1_height";

pub const BLOCK_MEMORY_HEIGHT: &str = "vela_block_memory_height";
pub const BLOCK_CACHE_HEIGHT: &str = "vela_block_cache_height";
pub const BLOCK_DB_HEIGHT: &str = "vela_block_db_height";
pub const PRUNED_BLOCK_HEIGHT: &str = "vela_pruned_block_height";

pub const ACCOUNT_TREE_LATEST_VERSION: &str = "vela_account_tree_latest_version";
pub const ACCOUNT_TREE_RECENT_VERSION: &str = "vela_account_tree_recent_version";
pub const NFT_TREE_LATEST_VERSION: &str = "vela_nft_tree_latest_version";
pub const NFT_TREE_RECENT_VERSION: &str = "vela_nft_tree_recent_version";

pub const POOL_TX_PENDING_COUNT: &str = "vela_pool_tx_pending_count";
pub const PULLED_TX_COUNT: &str = "vela_pulled_tx_count";
pub const EXECUTOR_QUEUE_DEPTH: &str = "vela_executor_queue_depth";
pub const ASSET_TREE_QUEUE_DEPTH: &str = "vela_asset_tree_queue_depth";
pub const ACCOUNT_NFT_TREE_QUEUE_DEPTH: &str = "vela_account_nft_tree_queue_depth";

pub const EXECUTED_TX_COUNT: &str = "vela_executed_tx_count";
pub const ASSET_TREE_TX_COUNT: &str = "vela_asset_tree_tx_count";
pub const ACCOUNT_NFT_TREE_TX_COUNT: &str = "vela_account_nft_tree_tx_count";

pub const GET_PENDING_POOL_TX_MS: &str = "vela_get_pending_pool_tx_ms";
pub const EXECUTE_TX_ROUND_MS: &str = "vela_execute_tx_round_ms";
pub const EXECUTE_TX_APPLY_ONE_MS: &str = "vela_execute_tx_apply_one_ms";
pub const COMMIT_BLOCK_MS: &str = "vela_commit_block_ms";
pub const UPDATE_POOL_TXS_MS: &str = "vela_update_pool_txs_ms";
pub const SYNC_CACHE_MS: &str = "vela_sync_cache_ms";
pub const UPDATE_ASSET_TREE_MS: &str = "vela_update_asset_tree_ms";
pub const UPDATE_ACCOUNT_NFT_TREE_MS: &str = "vela_update_account_nft_tree_ms";
pub const PRE_SAVE_BLOCK_MS: &str = "vela_pre_save_block_ms";
pub const SAVE_BLOCK_MS: &str = "vela_save_block_ms";
pub const FINAL_SAVE_BLOCK_MS: &str = "vela_final_save_block_ms";
pub const DELETE_POOL_TX_MS: &str = "vela_delete_pool_tx_ms";
pub const SAVE_ACCOUNTS_MS: &str = "vela_save_accounts_ms";
pub const SAVE_ACCOUNT_HISTORY_MS: &str = "vela_save_account_history_ms";
pub const SAVE_TXS_MS: &str = "vela_save_txs_ms";
pub const SAVE_TX_DETAILS_MS: &str = "vela_save_tx_details_ms";

pub const SAVE_POOL_SIZE: &str = "vela_save_pool_size";
pub const SAVE_POOL_QUEUED: &str = "vela_save_pool_queued";

/// Registers help text for everything above.
pub fn describe() {
    describe_gauge!(PRIORITY_REQUEST_ID, "Last executed priority request id");
    describe_gauge!(
        PRIORITY_REQUEST_L1_HEIGHT,
        "L1 height of the last executed priority request"
    );
    describe_gauge!(BLOCK_MEMORY_HEIGHT, "Newest block height committed in memory");
    describe_gauge!(BLOCK_CACHE_HEIGHT, "Newest block height synced to the cache");
    describe_gauge!(BLOCK_DB_HEIGHT, "Newest block height finalized in the store");
    describe_gauge!(PRUNED_BLOCK_HEIGHT, "Pruned-height watermark");
    describe_gauge!(ACCOUNT_TREE_LATEST_VERSION, "Account tree latest version");
    describe_gauge!(ACCOUNT_TREE_RECENT_VERSION, "Account tree recent version");
    describe_gauge!(NFT_TREE_LATEST_VERSION, "NFT tree latest version");
    describe_gauge!(NFT_TREE_RECENT_VERSION, "NFT tree recent version");
    describe_gauge!(POOL_TX_PENDING_COUNT, "Pending rows in the tx pool");
    describe_gauge!(PULLED_TX_COUNT, "Rows fetched by the last pull");
    describe_gauge!(EXECUTOR_QUEUE_DEPTH, "Executor queue depth");
    describe_gauge!(ASSET_TREE_QUEUE_DEPTH, "Asset tree updater queue depth");
    describe_gauge!(
        ACCOUNT_NFT_TREE_QUEUE_DEPTH,
        "Account+NFT tree updater queue depth"
    );
    describe_gauge!(SAVE_POOL_SIZE, "Save fan-out pool size");
    describe_gauge!(SAVE_POOL_QUEUED, "Save fan-out tasks queued");
    describe_counter!(EXECUTED_TX_COUNT, "Transactions executed");
    describe_counter!(ASSET_TREE_TX_COUNT, "Transactions through the asset tree updater");
    describe_counter!(
        ACCOUNT_NFT_TREE_TX_COUNT,
        "Transactions through the account+NFT tree updater"
    );
    describe_histogram!(GET_PENDING_POOL_TX_MS, "Pool fetch latency");
    describe_histogram!(EXECUTE_TX_ROUND_MS, "Executor drain-round latency");
    describe_histogram!(EXECUTE_TX_APPLY_ONE_MS, "Single tx apply latency");
    describe_histogram!(COMMIT_BLOCK_MS, "Block commit hand-off latency");
    describe_histogram!(UPDATE_POOL_TXS_MS, "Pool status update latency");
    describe_histogram!(SYNC_CACHE_MS, "Cache snapshot sync latency");
    describe_histogram!(UPDATE_ASSET_TREE_MS, "Asset tree update latency");
    describe_histogram!(UPDATE_ACCOUNT_NFT_TREE_MS, "Account+NFT tree update latency");
    describe_histogram!(PRE_SAVE_BLOCK_MS, "Pre-save latency");
    describe_histogram!(SAVE_BLOCK_MS, "Save fan-out latency");
    describe_histogram!(FINAL_SAVE_BLOCK_MS, "Final-save latency");
    describe_histogram!(DELETE_POOL_TX_MS, "Pool tx deletion latency");
    describe_histogram!(SAVE_ACCOUNTS_MS, "Account batch insert latency");
    describe_histogram!(SAVE_ACCOUNT_HISTORY_MS, "Account history insert latency");
    describe_histogram!(SAVE_TXS_MS, "Tx batch insert latency");
    describe_histogram!(SAVE_TX_DETAILS_MS, "Tx detail batch insert latency");
}

/// Milliseconds elapsed since `start`, for histogram recording.
pub fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e3
}
