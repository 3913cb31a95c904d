//! Stage 1: the executor.  The only stage that mutates the authoritative
//! in-memory state.  Applies txs in arrival order, enforces priority-request
//! continuity, folds gas fees, and hands sealed blocks downstream.

use std::{
    mem,
    sync::Arc,
    thread,
    time::{self, Duration, Instant},
};

use alloy_primitives::U256;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::*;
use vela_chain::Blockchain;
use vela_db::traits::{BlockDatabase, Database, PriorityRequestDatabase};
use vela_primitives::{TxStatus, GAS_ACCOUNT_INDEX};
use vela_state::{Block, PoolTx, StateCache, StateDataCopy};
use vela_tasks::ShutdownGuard;

use crate::{
    metrics::{
        ms_since, ASSET_TREE_QUEUE_DEPTH, BLOCK_MEMORY_HEIGHT, COMMIT_BLOCK_MS,
        EXECUTED_TX_COUNT, EXECUTE_TX_APPLY_ONE_MS, EXECUTE_TX_ROUND_MS, PRIORITY_REQUEST_ID,
        PRIORITY_REQUEST_L1_HEIGHT,
    },
    types::{PendingSnapshot, PoolTxBatch},
};

/// Txs drained from the queue per round.
const DRAIN_BATCH: usize = 300;

fn now_millis() -> u64 {
    time::UNIX_EPOCH.elapsed().unwrap().as_millis() as u64
}

pub(crate) struct Executor<D: Database> {
    pub bc: Arc<Blockchain<D>>,
    pub cache: StateCache,
    pub cur_block: Block,
    /// Request id of the last executed priority tx; -1 until one executes.
    pub latest_request_id: i64,
    pub max_txs_per_block: usize,
    pub commit_interval_ms: u64,
    pub rx: mpsc::Receiver<PoolTx>,
    pub pool_update_queue: mpsc::Sender<PoolTxBatch>,
    pub cache_sync_queue: mpsc::Sender<PendingSnapshot>,
    pub asset_tree_queue: mpsc::Sender<StateDataCopy>,
    pub sub_pending: Vec<PoolTx>,
    pub pending_update: Vec<PoolTx>,
    pub pending_delete: Vec<PoolTx>,
}

impl<D: Database> Executor<D> {
    pub fn run(mut self, guard: ShutdownGuard) {
        loop {
            if guard.should_shutdown() {
                info!("executor exiting");
                break;
            }

            if self.cur_block.block_status.is_sealed() {
                let previous = self.cur_block.block_height;
                self.cur_block = self.bc.init_new_block(&self.cur_block);
                info!(
                    height = self.cur_block.block_height,
                    previous, "opened new block"
                );
            }

            let mut pending = if self.sub_pending.is_empty() {
                self.drain()
            } else {
                mem::take(&mut self.sub_pending)
            };
            while pending.is_empty() && !self.should_commit() {
                if guard.should_shutdown() {
                    info!("executor exiting");
                    return;
                }
                self.flush_pool_updates();
                thread::sleep(Duration::from_millis(100));
                pending = self.drain();
            }

            let round_start = Instant::now();
            for tx in pending {
                if self.should_commit() {
                    // block is full; park for the next round
                    self.sub_pending.push(tx);
                    continue;
                }
                self.execute_one(tx);
            }
            histogram!(EXECUTE_TX_ROUND_MS).record(ms_since(round_start));

            self.fold_pending_gas();
            self.bc
                .state()
                .sync_pending_accounts_to_cache(&self.cache.pending_account_map);
            self.bc
                .state()
                .sync_pending_nfts_to_cache(&self.cache.pending_nft_map);
            self.enqueue_cache_snapshot();
            self.flush_pool_updates();

            if self.should_commit() {
                self.commit_block();
            }
        }
    }

    fn drain(&mut self) -> Vec<PoolTx> {
        let mut txs = Vec::new();
        while txs.len() < DRAIN_BATCH {
            match self.rx.try_recv() {
                Ok(tx) => txs.push(tx),
                Err(_) => break,
            }
        }
        txs
    }

    fn execute_one(&mut self, tx: PoolTx) {
        counter!(EXECUTED_TX_COUNT).increment(1);

        let apply_start = Instant::now();
        let applied = self
            .bc
            .apply_transaction(&mut self.cache, self.cur_block.block_height, &tx);
        histogram!(EXECUTE_TX_APPLY_ONE_MS).record(ms_since(apply_start));

        let executed = match applied {
            Ok(executed) => executed,
            Err(e) => {
                error!(id = tx.id, err = %e, "apply pool tx failed");
                if tx.is_priority_operation() {
                    // priority txs are authoritative L1 events; they cannot
                    // be dropped
                    panic!("apply priority pool tx failed, id={}, err={e}", tx.id);
                }
                let mut failed = tx;
                failed.status = TxStatus::Failed;
                self.pending_delete.push(failed);
                return;
            }
        };

        if executed.is_priority_operation() {
            self.check_priority_request(&executed);
        }

        // Persist the proposed block row when its first tx executes, so a
        // restart can replay executed txs onto the right block.
        if self.cache.txs.len() == 1 {
            if let Err(e) = self.bc.db().blocks().create_block(&self.cur_block) {
                error!(err = %e, "create new block failed");
                panic!("create new block failed: {e}");
            }
            info!(
                height = self.cur_block.block_height,
                "created block on first tx"
            );
        }

        self.pending_update.push(executed);
    }

    fn check_priority_request(&mut self, tx: &PoolTx) {
        let request = match self.bc.db().priority_requests().get_by_l2_tx_hash(&tx.hash) {
            Ok(Some(request)) => request,
            Ok(None) => panic!("priority request missing for tx hash {}", tx.hash),
            Err(e) => panic!("priority request lookup failed for {}: {e}", tx.hash),
        };

        gauge!(PRIORITY_REQUEST_ID).set(request.request_id as f64);
        gauge!(PRIORITY_REQUEST_L1_HEIGHT).set(request.l1_block_height as f64);

        if self.latest_request_id != -1 && request.request_id != self.latest_request_id + 1 {
            error!(
                request_id = request.request_id,
                latest = self.latest_request_id,
                hash = %tx.hash,
                "priority request id gap"
            );
            panic!(
                "priority request id gap: got {}, latest {}",
                request.request_id, self.latest_request_id
            );
        }
        self.latest_request_id = request.request_id;
    }

    /// Folds accumulated gas fees into the gas account and zeroes the map
    /// entries.  The gas account is skipped by the per-tx state-diff path,
    /// so this runs once per drain round.
    fn fold_pending_gas(&mut self) {
        let Some(gas) = self.cache.pending_account_map.get_mut(&GAS_ACCOUNT_INDEX) else {
            return;
        };
        for (asset_id, delta) in self.cache.pending_gas_map.iter_mut() {
            if delta.is_zero() {
                continue;
            }
            let entry = gas.asset_mut(*asset_id);
            entry.balance = entry
                .balance
                .checked_add(*delta)
                .expect("gas account balance overflow");
            *delta = U256::ZERO;
        }
    }

    fn enqueue_cache_snapshot(&mut self) {
        let snapshot = PendingSnapshot {
            accounts: self.cache.pending_account_map.clone(),
            nfts: self.cache.pending_nft_map.clone(),
            block_height: self.cur_block.block_height,
        };
        self.cache_sync_queue
            .blocking_send(snapshot)
            .expect("cache sync queue closed");
    }

    fn flush_pool_updates(&mut self) {
        if self.pending_update.is_empty() && self.pending_delete.is_empty() {
            return;
        }
        let batch = PoolTxBatch {
            update: mem::take(&mut self.pending_update),
            delete: mem::take(&mut self.pending_delete),
        };
        self.pool_update_queue
            .blocking_send(batch)
            .expect("pool update queue closed");
    }

    fn should_commit(&self) -> bool {
        if self.cache.txs.len() >= self.max_txs_per_block {
            return true;
        }
        !self.cache.txs.is_empty()
            && now_millis().saturating_sub(self.cur_block.created_at) >= self.commit_interval_ms
    }

    fn commit_block(&mut self) {
        let start = Instant::now();
        info!(
            height = self.cur_block.block_height,
            txs = self.cache.txs.len(),
            "committing block"
        );

        let state_cache = self.cache.take();
        let copy = StateDataCopy {
            state_cache,
            block: self.cur_block.clone(),
        };
        gauge!(BLOCK_MEMORY_HEIGHT).set(copy.block.block_height as f64);
        self.asset_tree_queue
            .blocking_send(copy)
            .expect("asset tree queue closed");
        gauge!(ASSET_TREE_QUEUE_DEPTH).set(
            (self.asset_tree_queue.max_capacity() - self.asset_tree_queue.capacity()) as f64,
        );

        let previous = self.cur_block.block_height;
        self.cur_block = self.bc.init_new_block(&self.cur_block);
        info!(
            height = self.cur_block.block_height,
            previous, "opened new block after commit"
        );
        histogram!(COMMIT_BLOCK_MS).record(ms_since(start));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_chain::{MemSnapshotCache, SequentialHashTree, StateDb};
    use vela_db::mem::MemDatabase;
    use vela_db::traits::AccountDatabase;
    use vela_primitives::TxKind;
    use vela_state::{Account, TxContent};

    fn test_executor(max_txs: usize) -> Executor<MemDatabase> {
        let db = Arc::new(MemDatabase::new());
        let mut funded = Account::new(2, "0x02");
        funded.asset_mut(1).balance = U256::from(1_000);
        db.accounts()
            .batch_insert_or_update(&[funded, Account::new(3, "0x03")])
            .unwrap();
        let state = StateDb::new(
            Arc::new(MemSnapshotCache::new()),
            Box::new(SequentialHashTree::new()),
            Box::new(SequentialHashTree::new()),
        );
        let bc = Arc::new(Blockchain::new(db, state).unwrap());

        let (_exec_tx, exec_rx) = mpsc::channel(16);
        let (pool_update_tx, _pool_update_rx) = mpsc::channel(16);
        let (cache_sync_tx, _cache_sync_rx) = mpsc::channel(16);
        let (asset_tree_tx, _asset_tree_rx) = mpsc::channel(16);

        let genesis = bc.load_current_block().unwrap();
        let cur_block = bc.init_new_block(&genesis);
        Executor {
            bc,
            cache: StateCache::new(),
            cur_block,
            latest_request_id: -1,
            max_txs_per_block: max_txs,
            commit_interval_ms: 60_000,
            rx: exec_rx,
            pool_update_queue: pool_update_tx,
            cache_sync_queue: cache_sync_tx,
            asset_tree_queue: asset_tree_tx,
            sub_pending: Vec::new(),
            pending_update: Vec::new(),
            pending_delete: Vec::new(),
        }
    }

    fn transfer_with_amount(id: u64, amount: u64, fee: u64) -> PoolTx {
        PoolTx::new(
            id,
            TxKind::Transfer,
            format!("xfer-{id}"),
            TxContent::Transfer {
                from_account_index: 2,
                to_account_index: 3,
                asset_id: 1,
                amount: U256::from(amount),
                gas_fee_asset_id: 1,
                gas_fee_amount: U256::from(fee),
            },
        )
    }

    fn transfer(id: u64, fee: u64) -> PoolTx {
        transfer_with_amount(id, 10, fee)
    }

    fn deposit(id: u64, amount: u64) -> PoolTx {
        PoolTx::new(
            id,
            TxKind::Deposit,
            format!("dep-{id}"),
            TxContent::Deposit {
                account_index: 2,
                asset_id: 1,
                amount: U256::from(amount),
            },
        )
    }

    #[test]
    fn commit_on_full_block_regardless_of_age() {
        let mut executor = test_executor(2);
        executor.execute_one(transfer(1, 5));
        assert!(!executor.should_commit());
        executor.execute_one(transfer(2, 5));
        assert!(executor.should_commit());
    }

    #[test]
    fn commit_on_age_only_with_txs() {
        let mut executor = test_executor(100);
        // empty + stale: no commit
        executor.cur_block.created_at = now_millis() - 61_000;
        assert!(!executor.should_commit());
        executor.execute_one(transfer(1, 5));
        assert!(executor.should_commit());
        // fresh block with one tx: no commit
        executor.cur_block.created_at = now_millis();
        assert!(!executor.should_commit());
    }

    #[test]
    fn gas_folding_credits_gas_account_and_zeroes_map() {
        let mut executor = test_executor(100);
        for id in 1..4 {
            executor.execute_one(transfer(id, 5));
        }

        executor.fold_pending_gas();
        let gas = &executor.cache.pending_account_map[&GAS_ACCOUNT_INDEX];
        assert_eq!(gas.balance(1), U256::from(15));
        assert_eq!(executor.cache.pending_gas_map[&1], U256::ZERO);

        // folding again is a no-op
        executor.fold_pending_gas();
        let gas = &executor.cache.pending_account_map[&GAS_ACCOUNT_INDEX];
        assert_eq!(gas.balance(1), U256::from(15));
    }

    #[test]
    fn priority_request_gap_is_fatal() {
        let mut executor = test_executor(100);
        executor.latest_request_id = 7;
        let request = vela_state::PriorityRequest {
            request_id: 9,
            l1_block_height: 1,
            l2_tx_hash: "dep-1".into(),
        };
        executor
            .bc
            .db()
            .priority_requests()
            .create_priority_requests(std::slice::from_ref(&request))
            .unwrap();

        let tx = deposit(1, 10);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            executor.execute_one(tx);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn failed_non_priority_tx_is_scheduled_for_deletion() {
        let mut executor = test_executor(100);
        // transfer beyond the funded balance fails but must not kill the
        // executor
        executor.execute_one(transfer_with_amount(1, 10_000, 5));
        assert_eq!(executor.pending_delete.len(), 1);
        assert_eq!(executor.pending_delete[0].status, TxStatus::Failed);
        assert!(executor.cache.txs.is_empty());

        executor.execute_one(transfer(2, 5));
        assert_eq!(executor.cache.txs.len(), 1);
    }
}
