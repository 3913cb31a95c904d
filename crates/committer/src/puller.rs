//! Stage 0: drains the tx pool into the executor queue in strict id order.

use std::{
    sync::Arc,
    thread,
    time::{self, Duration, Instant},
};

use metrics::{gauge, histogram};
use tokio::sync::mpsc;
use tracing::*;
use vela_chain::Blockchain;
use vela_db::traits::{Database, TxPoolDatabase};
use vela_primitives::TxStatus;
use vela_state::PoolTx;
use vela_tasks::ShutdownGuard;

use crate::metrics::{
    ms_since, EXECUTOR_QUEUE_DEPTH, GET_PENDING_POOL_TX_MS, PULLED_TX_COUNT,
};

const FETCH_LIMIT: usize = 1000;
/// Shrunk fetch window while waiting out a fresh id gap.
const GAP_FETCH_LIMIT: usize = 10;
/// A gap older than this is treated as permanent.
const GAP_GRACE_MS: u64 = 5_000;
/// Executor queue depth past which the puller yields.
const SOFT_QUEUE_CAP: usize = 1_000;

fn now_millis() -> u64 {
    time::UNIX_EPOCH.elapsed().unwrap().as_millis() as u64
}

/// Pull loop.  Dispatch is strictly id-ordered: a gap is waited out for up
/// to [`GAP_GRACE_MS`] (the producer may not have written the row yet) and
/// crossed only once it has aged past that.
pub(crate) fn run<D: Database>(
    guard: ShutdownGuard,
    bc: Arc<Blockchain<D>>,
    executor_queue: mpsc::Sender<PoolTx>,
) {
    let latest_executed = bc
        .db()
        .tx_pool()
        .get_latest_executed_tx()
        .unwrap_or_else(|e| panic!("puller: read latest executed tx: {e}"));
    let mut executed_tx_max_id = latest_executed.map(|tx| tx.id).unwrap_or(0);
    let mut limit = FETCH_LIMIT;

    info!(%executed_tx_max_id, "puller starting");
    loop {
        if guard.should_shutdown() {
            break;
        }

        let start = Instant::now();
        let pending = match bc
            .db()
            .tx_pool()
            .get_txs_by_status_and_max_id(TxStatus::Pending, executed_tx_max_id, limit)
        {
            Ok(txs) => txs,
            Err(e) => {
                error!(err = %e, "fetching pending pool txs failed");
                thread::sleep(Duration::from_millis(100));
                continue;
            }
        };
        histogram!(GET_PENDING_POOL_TX_MS).record(ms_since(start));
        gauge!(PULLED_TX_COUNT).set(pending.len() as f64);
        gauge!(EXECUTOR_QUEUE_DEPTH).set(queue_depth(&executor_queue) as f64);

        if pending.is_empty() {
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        limit = FETCH_LIMIT;
        for tx in pending {
            if tx.id != executed_tx_max_id + 1 {
                if now_millis().saturating_sub(tx.created_at) < GAP_GRACE_MS {
                    debug!(id = tx.id, "id gap younger than grace period, retrying");
                    limit = GAP_FETCH_LIMIT;
                    thread::sleep(Duration::from_millis(50));
                    break;
                }
                info!(id = tx.id, "id gap aged past grace period, crossing it");
            }
            executed_tx_max_id = tx.id;
            if executor_queue.blocking_send(tx).is_err() {
                // executor gone; nothing left to feed
                return;
            }
        }

        while queue_depth(&executor_queue) > SOFT_QUEUE_CAP {
            if guard.should_shutdown() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

fn queue_depth(sender: &mpsc::Sender<PoolTx>) -> usize {
    sender.max_capacity() - sender.capacity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use alloy_primitives::U256;
    use vela_chain::{MemSnapshotCache, SequentialHashTree, StateDb};
    use vela_db::mem::MemDatabase;
    use vela_primitives::TxKind;
    use vela_state::TxContent;
    use vela_tasks::TaskSupervisor;

    fn pending_tx(id: u64, created_at: u64) -> PoolTx {
        let mut tx = PoolTx::new(
            id,
            TxKind::Transfer,
            format!("xfer-{id}"),
            TxContent::Transfer {
                from_account_index: 2,
                to_account_index: 3,
                asset_id: 1,
                amount: U256::from(1),
                gas_fee_asset_id: 1,
                gas_fee_amount: U256::from(1),
            },
        );
        tx.created_at = created_at;
        tx
    }

    fn test_chain() -> Arc<Blockchain<MemDatabase>> {
        let db = Arc::new(MemDatabase::new());
        let state = StateDb::new(
            Arc::new(MemSnapshotCache::new()),
            Box::new(SequentialHashTree::new()),
            Box::new(SequentialHashTree::new()),
        );
        Arc::new(Blockchain::new(db, state).unwrap())
    }

    fn recv_with_timeout(rx: &mut mpsc::Receiver<PoolTx>, timeout: Duration) -> Option<PoolTx> {
        let deadline = Instant::now() + timeout;
        loop {
            match rx.try_recv() {
                Ok(tx) => return Some(tx),
                Err(_) => {
                    if Instant::now() > deadline {
                        return None;
                    }
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }

    #[test]
    fn fresh_gap_is_waited_out_then_dispatched_in_order() {
        let bc = test_chain();
        let now = now_millis();
        bc.db()
            .tx_pool()
            .create_txs(&[
                pending_tx(1, now),
                pending_tx(2, now),
                pending_tx(4, now),
            ])
            .unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let supervisor = TaskSupervisor::new(rt.handle().clone());
        let exec = supervisor.executor();
        let (queue_tx, mut queue_rx) = mpsc::channel(100);
        let bc2 = bc.clone();
        exec.spawn_critical("puller", move |guard| run(guard, bc2, queue_tx));

        let first = recv_with_timeout(&mut queue_rx, Duration::from_secs(2)).unwrap();
        let second = recv_with_timeout(&mut queue_rx, Duration::from_secs(2)).unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        // row 4 is held back while the gap at 3 is fresh
        assert!(recv_with_timeout(&mut queue_rx, Duration::from_millis(300)).is_none());

        bc.db()
            .tx_pool()
            .create_txs(&[pending_tx(3, now_millis())])
            .unwrap();
        let third = recv_with_timeout(&mut queue_rx, Duration::from_secs(2)).unwrap();
        let fourth = recv_with_timeout(&mut queue_rx, Duration::from_secs(2)).unwrap();
        assert_eq!((third.id, fourth.id), (3, 4));

        supervisor.shutdown_signal().send();
        assert!(supervisor.monitor(Some(Duration::from_secs(5))).is_ok());
    }

    #[test]
    fn aged_gap_is_crossed() {
        let bc = test_chain();
        let now = now_millis();
        bc.db()
            .tx_pool()
            .create_txs(&[
                pending_tx(1, now),
                pending_tx(2, now),
                pending_tx(4, now - 6_000),
            ])
            .unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let supervisor = TaskSupervisor::new(rt.handle().clone());
        let exec = supervisor.executor();
        let (queue_tx, mut queue_rx) = mpsc::channel(100);
        let bc2 = bc.clone();
        exec.spawn_critical("puller", move |guard| run(guard, bc2, queue_tx));

        let ids: Vec<u64> = (0..3)
            .map(|_| {
                recv_with_timeout(&mut queue_rx, Duration::from_secs(2))
                    .unwrap()
                    .id
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 4]);

        supervisor.shutdown_signal().send();
        assert!(supervisor.monitor(Some(Duration::from_secs(5))).is_ok());
    }
}

