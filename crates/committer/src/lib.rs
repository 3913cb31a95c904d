//! The block-production committer: an eight-stage pipeline that drains the
//! persistent tx pool in strict id order, applies txs to rollup state,
//! seals fixed-slot-size blocks, recomputes commitments and persists the
//! results, while tracking L1 priority-request continuity.

use std::{sync::Arc, thread, time::Duration};

use ::metrics::gauge;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::*;
use vela_chain::{Blockchain, ChainError};
use vela_db::{
    traits::{AccountDatabase, Database, PriorityRequestDatabase, TxPoolDatabase},
    DbError,
};
use vela_primitives::{TxKind, TxStatus};
use vela_state::{Block, StateCache};
use vela_tasks::{ShutdownGuard, TaskExecutor};

pub mod config;
pub mod metrics;

mod executor;
mod puller;
mod stages;
mod types;

pub use config::CommitterConfig;

use crate::metrics::POOL_TX_PENDING_COUNT;

const EXECUTOR_QUEUE_CAP: usize = 10_000;
const POOL_UPDATE_QUEUE_CAP: usize = 100_000;
const CACHE_SYNC_QUEUE_CAP: usize = 200_000;
const STAGE_QUEUE_CAP: usize = 10;

/// Accounts per page while warming the account cache at startup.
const ACCOUNT_LOAD_PAGE: usize = 1_000;

#[derive(Debug, Error)]
pub enum CommitterError {
    #[error("optional block sizes must be non-empty and strictly ascending")]
    InvalidBlockSizes,

    #[error("no proposing block but executed txs exist in the pool")]
    InconsistentRestore,

    #[error("priority request missing for executed tx hash {0}")]
    MissingPriorityRequest(String),

    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("db: {0}")]
    Db(#[from] DbError),
}

/// Smallest configured slot that fits `tx_count` txs, if any.
pub fn compute_block_size(optional_block_sizes: &[usize], tx_count: usize) -> Option<usize> {
    optional_block_sizes
        .iter()
        .copied()
        .find(|size| tx_count <= *size)
}

pub struct Committer<D: Database> {
    config: CommitterConfig,
    bc: Arc<Blockchain<D>>,
}

impl<D: Database> Committer<D> {
    pub fn new(config: CommitterConfig, bc: Arc<Blockchain<D>>) -> Result<Self, CommitterError> {
        let sizes = &config.optional_block_sizes;
        if sizes.is_empty() || sizes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CommitterError::InvalidBlockSizes);
        }
        crate::metrics::describe();
        Ok(Self { config, bc })
    }

    pub fn blockchain(&self) -> &Arc<Blockchain<D>> {
        &self.bc
    }

    /// Restores executed state, warms the account cache and spawns the
    /// pipeline.  The puller starts last, once replay has finished.
    pub fn start(&self, exec: &TaskExecutor) -> Result<(), CommitterError> {
        let mut cache = StateCache::new();
        let cur_block = self.restore_executed_txs(&mut cache)?;
        let latest_request_id = self.latest_executed_request_id()?;
        self.load_all_accounts()?;
        info!(
            height = cur_block.block_height,
            replayed = cache.txs.len(),
            latest_request_id,
            "committer restored"
        );

        let (executor_tx, executor_rx) = mpsc::channel(EXECUTOR_QUEUE_CAP);
        let (pool_update_tx, pool_update_rx) = mpsc::channel(POOL_UPDATE_QUEUE_CAP);
        let (cache_sync_tx, cache_sync_rx) = mpsc::channel(CACHE_SYNC_QUEUE_CAP);
        let (asset_tree_tx, asset_tree_rx) = mpsc::channel(STAGE_QUEUE_CAP);
        let (top_tree_tx, top_tree_rx) = mpsc::channel(STAGE_QUEUE_CAP);
        let (pre_save_tx, pre_save_rx) = mpsc::channel(STAGE_QUEUE_CAP);
        let (save_tx, save_rx) = mpsc::channel(STAGE_QUEUE_CAP);
        let (final_save_tx, final_save_rx) = mpsc::channel(STAGE_QUEUE_CAP);

        let stage = executor::Executor {
            bc: self.bc.clone(),
            cache,
            cur_block,
            latest_request_id,
            max_txs_per_block: self.config.max_txs_per_block(),
            commit_interval_ms: self.config.max_committer_interval_ms,
            rx: executor_rx,
            pool_update_queue: pool_update_tx,
            cache_sync_queue: cache_sync_tx,
            asset_tree_queue: asset_tree_tx,
            sub_pending: Vec::new(),
            pending_update: Vec::new(),
            pending_delete: Vec::new(),
        };
        exec.spawn_critical("executor", move |guard| stage.run(guard));

        let bc = self.bc.clone();
        exec.spawn_critical("pool-tx-updater", move |guard| {
            stages::update_pool_txs_stage(guard, bc, pool_update_rx)
        });

        let bc = self.bc.clone();
        exec.spawn_critical("cache-sync", move |guard| {
            stages::cache_sync_stage(guard, bc, cache_sync_rx)
        });

        let bc = self.bc.clone();
        let sizes = self.config.optional_block_sizes.clone();
        exec.spawn_critical("asset-tree-updater", move |guard| {
            stages::asset_tree_stage(guard, bc, sizes, asset_tree_rx, top_tree_tx)
        });

        let bc = self.bc.clone();
        let sizes = self.config.optional_block_sizes.clone();
        exec.spawn_critical("account-nft-tree-updater", move |guard| {
            stages::account_nft_tree_stage(guard, bc, sizes, top_tree_rx, pre_save_tx)
        });

        let bc = self.bc.clone();
        let block_save_disabled = self.config.block_save_disabled;
        exec.spawn_critical("pre-save", move |guard| {
            stages::pre_save_stage(guard, bc, block_save_disabled, pre_save_rx, save_tx)
        });

        let bc = self.bc.clone();
        let pool_size = self.config.save_block_data_pool_size;
        exec.spawn_critical("save", move |guard| {
            stages::save_stage(guard, bc, pool_size, save_rx, final_save_tx)
        });

        let bc = self.bc.clone();
        exec.spawn_critical("final-save", move |guard| {
            stages::final_save_stage(guard, bc, final_save_rx)
        });

        let bc = self.bc.clone();
        exec.spawn_critical("pool-metrics", move |guard| {
            report_pool_metrics(guard, bc)
        });

        let bc = self.bc.clone();
        exec.spawn_critical("puller", move |guard| puller::run(guard, bc, executor_tx));

        Ok(())
    }

    /// Rebuilds the open block's in-memory state from `Executed` pool rows.
    ///
    /// If the current block is already sealed there must be nothing to
    /// replay; `Executed` rows at that point mean the store is inconsistent.
    fn restore_executed_txs(&self, cache: &mut StateCache) -> Result<Block, CommitterError> {
        let cur_block = self.bc.load_current_block()?;
        let executed = self.bc.db().tx_pool().get_txs_by_status(TxStatus::Executed)?;

        if cur_block.block_status.is_sealed() {
            if !executed.is_empty() {
                return Err(CommitterError::InconsistentRestore);
            }
            return Ok(cur_block);
        }

        self.bc.mark_gas_account_as_pending(cache)?;
        for tx in &executed {
            self.bc
                .apply_transaction(cache, cur_block.block_height, tx)?;
        }
        Ok(cur_block)
    }

    /// Request id of the most recent executed-or-later priority tx, or -1
    /// when none has executed yet.
    fn latest_executed_request_id(&self) -> Result<i64, CommitterError> {
        let statuses = [
            TxStatus::Executed,
            TxStatus::Packed,
            TxStatus::Committed,
            TxStatus::Verified,
        ];
        let Some(latest) = self
            .bc
            .db()
            .tx_pool()
            .get_latest_tx(TxKind::priority_kinds(), &statuses)?
        else {
            return Ok(-1);
        };

        let request = self
            .bc
            .db()
            .priority_requests()
            .get_by_l2_tx_hash(&latest.hash)?
            .ok_or_else(|| CommitterError::MissingPriorityRequest(latest.hash.clone()))?;
        Ok(request.request_id)
    }

    /// Pages every account row into the in-memory account cache.
    fn load_all_accounts(&self) -> Result<(), CommitterError> {
        let mut offset = 0;
        loop {
            let accounts = self
                .bc
                .db()
                .accounts()
                .get_accounts_page(ACCOUNT_LOAD_PAGE, offset)?;
            if accounts.is_empty() {
                break;
            }
            offset += accounts.len();
            for account in accounts {
                self.bc.state().put_cached_account(account);
            }
        }
        info!(count = offset, "loaded accounts into cache");
        Ok(())
    }
}

/// Periodic pool telemetry: pending-row count.
fn report_pool_metrics<D: Database>(guard: ShutdownGuard, bc: Arc<Blockchain<D>>) {
    while !guard.should_shutdown() {
        match bc.db().tx_pool().get_tx_count_by_status(TxStatus::Pending) {
            Ok(count) => gauge!(POOL_TX_PENDING_COUNT).set(count as f64),
            Err(e) => error!(err = %e, "counting pending pool txs failed"),
        }
        for _ in 0..20 {
            if guard.should_shutdown() {
                return;
            }
            thread::sleep(Duration::from_millis(500));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_smallest_fitting_slot() {
        let sizes = [2, 4, 8];
        assert_eq!(compute_block_size(&sizes, 0), Some(2));
        assert_eq!(compute_block_size(&sizes, 2), Some(2));
        assert_eq!(compute_block_size(&sizes, 3), Some(4));
        assert_eq!(compute_block_size(&sizes, 8), Some(8));
        assert_eq!(compute_block_size(&sizes, 9), None);
    }
}
