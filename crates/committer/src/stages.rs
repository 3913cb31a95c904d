//! Stages 2-8: pool-row updates, cache sync, tree updates and the
//! three-step block persistence.
//!
//! Every stage is a single consumer on a bounded queue.  None of them poll
//! the shutdown flag: they drain until their upstream drops the sender, so
//! a block that left the executor is fully persisted or the process dies.

use std::{mem, sync::Arc, time::Instant};

use metrics::{counter, gauge, histogram};
use threadpool::ThreadPool;
use tokio::sync::mpsc;
use tracing::*;
use vela_chain::Blockchain;
use vela_db::{
    traits::{
        AccountDatabase, AccountHistoryDatabase, BlockDatabase, Database, NftDatabase,
        NftHistoryDatabase, TxDatabase, TxDetailDatabase, TxPoolDatabase,
    },
    DbResult,
};
use vela_primitives::TxStatus;
use vela_state::{BlockStates, StateDataCopy, TxDetail};
use vela_tasks::ShutdownGuard;

use crate::{
    compute_block_size,
    metrics::{
        ms_since, ACCOUNT_NFT_TREE_QUEUE_DEPTH, ACCOUNT_NFT_TREE_TX_COUNT,
        ACCOUNT_TREE_LATEST_VERSION, ACCOUNT_TREE_RECENT_VERSION, ASSET_TREE_TX_COUNT,
        BLOCK_CACHE_HEIGHT, BLOCK_DB_HEIGHT, DELETE_POOL_TX_MS, FINAL_SAVE_BLOCK_MS,
        NFT_TREE_LATEST_VERSION, NFT_TREE_RECENT_VERSION, PRE_SAVE_BLOCK_MS, PRUNED_BLOCK_HEIGHT,
        SAVE_ACCOUNTS_MS, SAVE_ACCOUNT_HISTORY_MS, SAVE_BLOCK_MS, SAVE_POOL_QUEUED,
        SAVE_POOL_SIZE, SAVE_TXS_MS, SAVE_TX_DETAILS_MS, SYNC_CACHE_MS, UPDATE_ACCOUNT_NFT_TREE_MS,
        UPDATE_ASSET_TREE_MS, UPDATE_POOL_TXS_MS,
    },
    types::{PendingSnapshot, PoolTxBatch},
};

/// Rows per batch-insert chunk in the save fan-out.
const SAVE_CHUNK: usize = 100;

/// Stage 2: bulk pool-row status updates.  Failures are logged, never
/// fatal; the pool is eventually consistent with the executor.
pub(crate) fn update_pool_txs_stage<D: Database>(
    _guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    mut rx: mpsc::Receiver<PoolTxBatch>,
) {
    while let Some(batch) = rx.blocking_recv() {
        let start = Instant::now();
        if !batch.update.is_empty() {
            let ids: Vec<u64> = batch.update.iter().map(|tx| tx.id).collect();
            let height = batch.update[0].block_height;
            if let Err(e) =
                bc.db()
                    .tx_pool()
                    .update_txs_status_and_height(&ids, TxStatus::Executed, height)
            {
                error!(err = %e, "updating pool txs to executed failed");
            }
        }
        if !batch.delete.is_empty() {
            let ids: Vec<u64> = batch.delete.iter().map(|tx| tx.id).collect();
            if let Err(e) = bc.db().tx_pool().delete_txs_batch(
                &ids,
                TxStatus::Failed,
                vela_primitives::NIL_BLOCK_HEIGHT,
            ) {
                error!(err = %e, "deleting failed pool txs failed");
            }
        }
        histogram!(UPDATE_POOL_TXS_MS).record(ms_since(start));
    }
    info!("pool tx updater exiting");
}

/// Stage 3: best-effort account/NFT snapshot writes to the external cache.
pub(crate) fn cache_sync_stage<D: Database>(
    _guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    mut rx: mpsc::Receiver<PendingSnapshot>,
) {
    while let Some(snapshot) = rx.blocking_recv() {
        let start = Instant::now();
        let cache = bc.state().snapshot_cache();
        for account in snapshot.accounts.values() {
            if let Err(e) = cache.put_account(account) {
                error!(account_index = account.account_index, err = %e, "cache account write failed");
            }
        }
        for nft in snapshot.nfts.values() {
            if let Err(e) = cache.put_nft(nft) {
                error!(nft_index = nft.nft_index, err = %e, "cache nft write failed");
            }
        }
        if let Err(e) = cache.put_block_height(snapshot.block_height) {
            error!(err = %e, "cache height write failed");
        }
        gauge!(BLOCK_CACHE_HEIGHT).set(snapshot.block_height as f64);
        histogram!(SYNC_CACHE_MS).record(ms_since(start));
    }
    info!("cache sync exiting");
}

/// Stage 4: recomputes per-account asset sub-tree roots and forwards the
/// snapshot.  A tx count no slot can hold is fatal.
pub(crate) fn asset_tree_stage<D: Database>(
    _guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    optional_block_sizes: Vec<usize>,
    mut rx: mpsc::Receiver<StateDataCopy>,
    top_tree_queue: mpsc::Sender<StateDataCopy>,
) {
    while let Some(mut copy) = rx.blocking_recv() {
        let start = Instant::now();
        let tx_count = copy.state_cache.txs.len();
        counter!(ASSET_TREE_TX_COUNT).increment(tx_count as u64);
        info!(height = copy.block.block_height, tx_count, "updating asset trees");

        let block_size = compute_block_size(&optional_block_sizes, tx_count).unwrap_or(0);
        if block_size < tx_count {
            panic!("block size slot too small for {tx_count} txs");
        }
        if let Err(e) = bc.update_account_asset_tree(&mut copy) {
            error!(height = copy.block.block_height, err = %e, "asset tree update failed");
            panic!("asset tree update failed: {e}");
        }

        top_tree_queue
            .blocking_send(copy)
            .expect("account+nft tree queue closed");
        gauge!(ACCOUNT_NFT_TREE_QUEUE_DEPTH)
            .set((top_tree_queue.max_capacity() - top_tree_queue.capacity()) as f64);
        histogram!(UPDATE_ASSET_TREE_MS).record(ms_since(start));
    }
    info!("asset tree updater exiting");
}

/// Stage 5: top-level account + NFT tree updates, producing the
/// [`BlockStates`] hand-off.
pub(crate) fn account_nft_tree_stage<D: Database>(
    _guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    optional_block_sizes: Vec<usize>,
    mut rx: mpsc::Receiver<StateDataCopy>,
    next: mpsc::Sender<BlockStates>,
) {
    while let Some(copy) = rx.blocking_recv() {
        let start = Instant::now();
        let tx_count = copy.state_cache.txs.len();
        counter!(ACCOUNT_NFT_TREE_TX_COUNT).increment(tx_count as u64);
        let height = copy.block.block_height;
        info!(height, tx_count, "updating account and nft trees");

        let block_size = compute_block_size(&optional_block_sizes, tx_count)
            .unwrap_or_else(|| panic!("no block size slot fits {tx_count} txs"));
        let states = match bc.update_account_tree_and_nft_tree(block_size, copy) {
            Ok(states) => states,
            Err(e) => {
                error!(height, err = %e, "account+nft tree update failed");
                panic!("account+nft tree update failed: {e}");
            }
        };

        let (latest, recent) = bc.state().account_tree_versions();
        gauge!(ACCOUNT_TREE_LATEST_VERSION).set(latest as f64);
        gauge!(ACCOUNT_TREE_RECENT_VERSION).set(recent as f64);
        let (latest, recent) = bc.state().nft_tree_versions();
        gauge!(NFT_TREE_LATEST_VERSION).set(latest as f64);
        gauge!(NFT_TREE_RECENT_VERSION).set(recent as f64);

        next.blocking_send(states).expect("pre-save queue closed");
        histogram!(UPDATE_ACCOUNT_NFT_TREE_MS).record(ms_since(start));
    }
    info!("account+nft tree updater exiting");
}

/// Stage 6: writes the block row in `ProposedNotReady` status.  With block
/// saving disabled, only the pruned-height watermark advances.
pub(crate) fn pre_save_stage<D: Database>(
    _guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    block_save_disabled: bool,
    mut rx: mpsc::Receiver<BlockStates>,
    next: mpsc::Sender<BlockStates>,
) {
    while let Some(mut states) = rx.blocking_recv() {
        let start = Instant::now();
        let height = states.block.block_height;
        info!(height, "pre-saving block");

        if block_save_disabled {
            bc.state().update_pruned_block_height(height);
            gauge!(PRUNED_BLOCK_HEIGHT).set(bc.state().pruned_block_height() as f64);
            continue;
        }

        let account_indexes: Vec<i64> = states
            .pending_accounts
            .iter()
            .map(|a| a.account_index)
            .collect();
        let nft_indexes: Vec<i64> = states.pending_nfts.iter().map(|n| n.nft_index).collect();
        states.block.account_indexes = serde_json::to_string(&account_indexes)
            .unwrap_or_else(|e| panic!("marshal account indexes failed: {e}"));
        states.block.nft_indexes = serde_json::to_string(&nft_indexes)
            .unwrap_or_else(|e| panic!("marshal nft indexes failed: {e}"));

        if let Err(e) = bc.db().blocks().pre_save_block_data(&states.block) {
            error!(height, err = %e, "pre-save block failed");
            panic!("pre-save block failed: {e}");
        }
        histogram!(PRE_SAVE_BLOCK_MS).record(ms_since(start));
        next.blocking_send(states).expect("save queue closed");
    }
    info!("pre-save exiting");
}

/// Stage 7: parallel fan-out of the bulk inserts.  Any sub-task error is
/// fatal; a block may never be left half-persisted.
pub(crate) fn save_stage<D: Database>(
    _guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    pool_size: usize,
    mut rx: mpsc::Receiver<BlockStates>,
    next: mpsc::Sender<BlockStates>,
) {
    let pool = ThreadPool::new(pool_size);
    gauge!(SAVE_POOL_SIZE).set(pool_size as f64);
    while let Some(mut states) = rx.blocking_recv() {
        save_block_data(&bc, &pool, &mut states);
        next.blocking_send(states).expect("final save queue closed");
    }
    pool.join();
    info!("save stage exiting");
}

/// One block's save fan-out.  Factored out so retry behavior (a duplicate
/// submission must be detected, not applied twice) can be exercised
/// directly.
pub(crate) fn save_block_data<D: Database>(
    bc: &Arc<Blockchain<D>>,
    pool: &ThreadPool,
    states: &mut BlockStates,
) {
    let start = Instant::now();
    let height = states.block.block_height;
    info!(height, "saving block data");

    let (result_tx, result_rx) = std::sync::mpsc::channel::<DbResult<()>>();
    let mut tasks = 0usize;
    let mut submit = |job: Box<dyn FnOnce() -> DbResult<()> + Send>| {
        let result_tx = result_tx.clone();
        tasks += 1;
        pool.execute(move || {
            let _ = result_tx.send(job());
        });
    };

    let pool_tx_ids: Vec<u64> = states.block.txs.iter().map(|tx| tx.id).collect();
    let txs = mem::take(&mut states.block.txs);

    {
        let db = bc.db().clone();
        submit(Box::new(move || {
            let start = Instant::now();
            let res = db
                .tx_pool()
                .delete_txs_batch(&pool_tx_ids, TxStatus::Executed, height);
            histogram!(DELETE_POOL_TX_MS).record(ms_since(start));
            res
        }));
    }

    let mut accounts = states.pending_accounts.clone();
    accounts.sort_by_key(|a| a.account_index);
    for chunk in accounts.chunks(SAVE_CHUNK) {
        let chunk = chunk.to_vec();
        let db = bc.db().clone();
        submit(Box::new(move || {
            let start = Instant::now();
            let res = db.accounts().batch_insert_or_update(&chunk);
            histogram!(SAVE_ACCOUNTS_MS).record(ms_since(start));
            res
        }));
    }

    for chunk in states.pending_account_histories.chunks(SAVE_CHUNK) {
        let chunk = chunk.to_vec();
        let db = bc.db().clone();
        submit(Box::new(move || {
            let start = Instant::now();
            let res = db.account_histories().create_account_histories(&chunk);
            histogram!(SAVE_ACCOUNT_HISTORY_MS).record(ms_since(start));
            res
        }));
    }

    for chunk in states.pending_nfts.chunks(SAVE_CHUNK) {
        let chunk = chunk.to_vec();
        let db = bc.db().clone();
        submit(Box::new(move || db.nfts().batch_insert_or_update(&chunk)));
    }

    for chunk in states.pending_nft_histories.chunks(SAVE_CHUNK) {
        let chunk = chunk.to_vec();
        let db = bc.db().clone();
        submit(Box::new(move || db.nft_histories().create_nft_histories(&chunk)));
    }

    let tx_details: Vec<TxDetail> = txs.iter().flat_map(|tx| tx.details.clone()).collect();
    for chunk in txs.chunks(SAVE_CHUNK) {
        let chunk = chunk.to_vec();
        let db = bc.db().clone();
        submit(Box::new(move || {
            let start = Instant::now();
            let res = db.txs().create_txs(&chunk);
            histogram!(SAVE_TXS_MS).record(ms_since(start));
            res
        }));
    }
    for chunk in tx_details.chunks(SAVE_CHUNK) {
        let chunk = chunk.to_vec();
        let db = bc.db().clone();
        submit(Box::new(move || {
            let start = Instant::now();
            let res = db.tx_details().create_tx_details(&chunk);
            histogram!(SAVE_TX_DETAILS_MS).record(ms_since(start));
            res
        }));
    }

    drop(submit);
    gauge!(SAVE_POOL_QUEUED).set(pool.queued_count() as f64);

    // barrier: all sub-tasks must succeed before the final save may run
    for _ in 0..tasks {
        match result_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(height, err = %e, "save block data sub-task failed");
                panic!("save block data failed: {e}");
            }
            Err(_) => panic!("save worker dropped without reporting"),
        }
    }
    histogram!(SAVE_BLOCK_MS).record(ms_since(start));
}

/// Stage 8: final save.  Compressed-block insert and the block's promotion
/// to `Pending` land in one store transaction, then the pruned-height
/// watermark advances.
pub(crate) fn final_save_stage<D: Database>(
    _guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    mut rx: mpsc::Receiver<BlockStates>,
) {
    while let Some(states) = rx.blocking_recv() {
        let start = Instant::now();
        let height = states.block.block_height;
        info!(height, "final-saving block");

        if let Err(e) = bc
            .db()
            .blocks()
            .update_block_to_pending(states.block.id, states.compressed_block.as_ref())
        {
            error!(height, err = %e, "final save failed");
            panic!("final save failed: {e}");
        }

        bc.state().update_pruned_block_height(height);
        gauge!(PRUNED_BLOCK_HEIGHT).set(bc.state().pruned_block_height() as f64);
        gauge!(BLOCK_DB_HEIGHT).set(height as f64);
        histogram!(FINAL_SAVE_BLOCK_MS).record(ms_since(start));
    }
    info!("final save exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use vela_chain::{MemSnapshotCache, SequentialHashTree, StateDb};
    use vela_db::mem::MemDatabase;
    use vela_primitives::TxKind;
    use vela_state::{Account, AccountHistory, Block, PoolTx, TxContent};

    fn test_chain() -> Arc<Blockchain<MemDatabase>> {
        let db = Arc::new(MemDatabase::new());
        let state = StateDb::new(
            Arc::new(MemSnapshotCache::new()),
            Box::new(SequentialHashTree::new()),
            Box::new(SequentialHashTree::new()),
        );
        Arc::new(Blockchain::new(db, state).unwrap())
    }

    fn sample_states() -> BlockStates {
        let mut block = Block::proposing(1, 1, 0);
        block.block_size = 2;

        let mut tx = PoolTx::new(
            1,
            TxKind::Transfer,
            "xfer-1",
            TxContent::Transfer {
                from_account_index: 2,
                to_account_index: 3,
                asset_id: 1,
                amount: U256::from(5),
                gas_fee_asset_id: 1,
                gas_fee_amount: U256::from(1),
            },
        );
        tx.status = TxStatus::Executed;
        tx.block_height = 1;
        tx.details = vec![TxDetail {
            tx_id: 1,
            order: 0,
            account_index: 2,
            asset_id: 1,
            balance_before: U256::from(10),
            balance_after: U256::from(5),
        }];
        block.txs = vec![tx];

        let account = Account::new(2, "0x02");
        let history = AccountHistory::of(&account, 1);
        BlockStates {
            block,
            compressed_block: None,
            pending_accounts: vec![account],
            pending_account_histories: vec![history],
            pending_nfts: Vec::new(),
            pending_nft_histories: Vec::new(),
        }
    }

    #[test]
    fn duplicate_save_submission_is_detected() {
        let bc = test_chain();
        let pool = ThreadPool::new(4);

        let mut first = sample_states();
        save_block_data(&bc, &pool, &mut first);
        assert!(first.block.txs.is_empty());

        // a retried submission of the same block must be reported, never
        // silently applied twice
        let mut second = sample_states();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            save_block_data(&bc, &pool, &mut second);
        }));
        assert!(res.is_err());
    }
}
