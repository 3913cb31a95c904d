//! End-to-end pipeline scenarios over the in-memory store.

use std::{
    sync::Arc,
    thread,
    time::{self, Duration, Instant},
};

use alloy_primitives::U256;
use vela_chain::{Blockchain, MemSnapshotCache, SequentialHashTree, SnapshotCache, StateDb};
use vela_committer::{Committer, CommitterConfig};
use vela_db::mem::MemDatabase;
use vela_db::traits::{
    AccountDatabase, BlockDatabase, Database, PriorityRequestDatabase, TxPoolDatabase,
};
use vela_primitives::{AccountIndex, BlockStatus, TxKind, TxStatus, GAS_ACCOUNT_INDEX};
use vela_state::{Account, Block, PoolTx, PriorityRequest, TxContent};
use vela_tasks::TaskSupervisor;

fn now_millis() -> u64 {
    time::UNIX_EPOCH.elapsed().unwrap().as_millis() as u64
}

struct Harness {
    db: Arc<MemDatabase>,
    cache: Arc<MemSnapshotCache>,
    bc: Arc<Blockchain<MemDatabase>>,
    supervisor: TaskSupervisor,
    _rt: tokio::runtime::Runtime,
}

fn harness(seed: impl FnOnce(&MemDatabase)) -> Harness {
    let db = Arc::new(MemDatabase::new());
    seed(&db);
    let cache = Arc::new(MemSnapshotCache::new());
    let state = StateDb::new(
        cache.clone(),
        Box::new(SequentialHashTree::new()),
        Box::new(SequentialHashTree::new()),
    );
    let bc = Arc::new(Blockchain::new(db.clone(), state).unwrap());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let supervisor = TaskSupervisor::new(rt.handle().clone());
    Harness {
        db,
        cache,
        bc,
        supervisor,
        _rt: rt,
    }
}

fn seed_accounts(db: &MemDatabase) {
    let mut payer = Account::new(2, "0x02");
    payer.asset_mut(1).balance = U256::from(1_000);
    db.accounts()
        .batch_insert_or_update(&[payer, Account::new(3, "0x03")])
        .unwrap();
}

fn transfer(id: u64, amount: u64, fee: u64) -> PoolTx {
    let mut tx = PoolTx::new(
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
    );
    tx.created_at = now_millis();
    tx
}

fn deposit(id: u64, hash: &str, amount: u64) -> PoolTx {
    let mut tx = PoolTx::new(
        id,
        TxKind::Deposit,
        hash,
        TxContent::Deposit {
            account_index: 2,
            asset_id: 1,
            amount: U256::from(amount),
        },
    );
    tx.created_at = now_millis();
    tx
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !check() {
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(25));
    }
    true
}

fn block_is_pending(db: &MemDatabase, height: i64) -> bool {
    db.blocks()
        .get_block_by_height(height)
        .unwrap()
        .is_some_and(|b| b.block_status == BlockStatus::Pending)
}

fn shutdown_clean(h: Harness) {
    h.supervisor.shutdown_signal().send();
    assert!(h.supervisor.monitor(Some(Duration::from_secs(10))).is_ok());
}

#[test]
fn full_block_commits_on_size_trigger() {
    let h = harness(|db| {
        seed_accounts(db);
        let txs: Vec<PoolTx> = (1..=8).map(|id| transfer(id, 10, 5)).collect();
        db.tx_pool().create_txs(&txs).unwrap();
    });

    let committer = Committer::new(
        CommitterConfig::new(vec![2, 4, 8]),
        h.bc.clone(),
    )
    .unwrap();
    committer.start(&h.supervisor.executor()).unwrap();

    assert!(wait_until(Duration::from_secs(10), || block_is_pending(
        &h.db, 1
    )));

    let block = h.db.blocks().get_block_by_height(1).unwrap().unwrap();
    assert_eq!(block.block_size, 8);
    let compressed = h.db.blocks().get_compressed_block(1).unwrap().unwrap();
    assert_eq!(compressed.tx_count, 8);

    // pool rows left as executed at height 1
    let latest = h.db.tx_pool().get_latest_executed_tx().unwrap().unwrap();
    assert_eq!(latest.id, 8);
    assert_eq!(latest.block_height, 1);
    assert_eq!(
        h.db.tx_pool()
            .get_tx_count_by_status(TxStatus::Pending)
            .unwrap(),
        0
    );
    // the watermark advances right after the block row flips to pending
    assert!(wait_until(Duration::from_secs(5), || {
        h.bc.state().pruned_block_height() == 1
    }));

    // stage 3 pushed per-account snapshots to the external cache
    assert!(wait_until(Duration::from_secs(5), || {
        h.cache.get_account(3).is_some_and(|a| a.balance(1) == U256::from(80))
    }));
    assert_eq!(h.cache.block_height(), 1);

    shutdown_clean(h);
}

#[test]
fn partial_block_commits_on_age_trigger() {
    let h = harness(|db| {
        seed_accounts(db);
        db.tx_pool().create_txs(&[transfer(1, 10, 5)]).unwrap();
    });

    let mut config = CommitterConfig::new(vec![2, 4]);
    config.max_committer_interval_ms = 300;
    let committer = Committer::new(config, h.bc.clone()).unwrap();
    committer.start(&h.supervisor.executor()).unwrap();

    assert!(wait_until(Duration::from_secs(10), || block_is_pending(
        &h.db, 1
    )));

    let block = h.db.blocks().get_block_by_height(1).unwrap().unwrap();
    assert_eq!(block.block_size, 2);
    let compressed = h.db.blocks().get_compressed_block(1).unwrap().unwrap();
    assert_eq!(compressed.tx_count, 1);

    shutdown_clean(h);
}

#[test]
fn priority_request_gap_kills_the_executor() {
    let h = harness(|db| {
        seed_accounts(db);
        db.priority_requests()
            .create_priority_requests(&[
                PriorityRequest {
                    request_id: 7,
                    l1_block_height: 100,
                    l2_tx_hash: "dep-1".into(),
                },
                PriorityRequest {
                    request_id: 9,
                    l1_block_height: 101,
                    l2_tx_hash: "dep-2".into(),
                },
            ])
            .unwrap();
        db.tx_pool()
            .create_txs(&[deposit(1, "dep-1", 10), deposit(2, "dep-2", 10)])
            .unwrap();
    });

    let committer = Committer::new(CommitterConfig::new(vec![2, 4]), h.bc.clone()).unwrap();
    committer.start(&h.supervisor.executor()).unwrap();

    let err = h
        .supervisor
        .monitor(Some(Duration::from_secs(10)))
        .expect_err("id gap must be fatal");
    assert_eq!(err.task(), "executor");
}

#[test]
fn failed_non_priority_tx_is_rejected_and_skipped() {
    let h = harness(|db| {
        seed_accounts(db);
        // tx 1 overdraws and must fail; tx 2 proceeds
        db.tx_pool()
            .create_txs(&[transfer(1, 100_000, 5), transfer(2, 10, 5)])
            .unwrap();
    });

    let mut config = CommitterConfig::new(vec![2, 4]);
    config.max_committer_interval_ms = 300;
    let committer = Committer::new(config, h.bc.clone()).unwrap();
    committer.start(&h.supervisor.executor()).unwrap();

    assert!(wait_until(Duration::from_secs(10), || block_is_pending(
        &h.db, 1
    )));

    let compressed = h.db.blocks().get_compressed_block(1).unwrap().unwrap();
    assert_eq!(compressed.tx_count, 1);

    // stage 2 removes the rejected row from the pool
    assert!(wait_until(Duration::from_secs(5), || {
        h.db.tx_pool().get_row(1).is_some_and(|(_, deleted)| deleted)
    }));
    let (row, _) = h.db.tx_pool().get_row(1).unwrap();
    assert_eq!(row.status, TxStatus::Failed);
    assert_eq!(row.block_height, vela_primitives::NIL_BLOCK_HEIGHT);

    // the failed tx moved no balances
    let receiver = h.db.accounts().get_account_by_index(3).unwrap().unwrap();
    assert_eq!(receiver.balance(1), U256::from(10));

    shutdown_clean(h);
}

#[test]
fn gas_fees_accumulate_into_the_gas_account() {
    let h = harness(|db| {
        seed_accounts(db);
        db.tx_pool()
            .create_txs(&[
                transfer(1, 10, 5),
                transfer(2, 10, 5),
                transfer(3, 10, 5),
            ])
            .unwrap();
    });

    let mut config = CommitterConfig::new(vec![2, 4]);
    config.max_committer_interval_ms = 300;
    let committer = Committer::new(config, h.bc.clone()).unwrap();
    committer.start(&h.supervisor.executor()).unwrap();

    assert!(wait_until(Duration::from_secs(10), || block_is_pending(
        &h.db, 1
    )));

    let gas = h
        .db
        .accounts()
        .get_account_by_index(GAS_ACCOUNT_INDEX)
        .unwrap()
        .unwrap();
    assert_eq!(gas.balance(1), U256::from(15));

    // the gas account is part of the block's touched-account set
    let block = h.db.blocks().get_block_by_height(1).unwrap().unwrap();
    let touched: Vec<AccountIndex> = serde_json::from_str(&block.account_indexes).unwrap();
    assert!(touched.contains(&GAS_ACCOUNT_INDEX));
    assert!(touched.contains(&2));
    assert!(touched.contains(&3));

    shutdown_clean(h);
}

#[test]
fn no_block_is_emitted_without_txs() {
    let h = harness(seed_accounts);

    let committer = Committer::new(CommitterConfig::new(vec![2]), h.bc.clone()).unwrap();
    committer.start(&h.supervisor.executor()).unwrap();

    thread::sleep(Duration::from_millis(400));
    assert!(h.db.blocks().get_block_by_height(1).unwrap().is_none());

    shutdown_clean(h);
}

#[test]
fn restart_replays_executed_txs_onto_the_open_block() {
    let h = harness(|db| {
        seed_accounts(db);
        // the previous run proposed block 1 and executed two txs before
        // dying; a third is still pending
        let block = Block::proposing(1, 1, now_millis());
        db.blocks().create_block(&block).unwrap();
        let mut executed1 = transfer(1, 10, 5);
        executed1.status = TxStatus::Executed;
        executed1.block_height = 1;
        let mut executed2 = transfer(2, 10, 5);
        executed2.status = TxStatus::Executed;
        executed2.block_height = 1;
        db.tx_pool()
            .create_txs(&[executed1, executed2, transfer(3, 10, 5)])
            .unwrap();
    });

    let mut config = CommitterConfig::new(vec![2, 4]);
    config.max_committer_interval_ms = 300;
    let committer = Committer::new(config, h.bc.clone()).unwrap();
    committer.start(&h.supervisor.executor()).unwrap();

    assert!(wait_until(Duration::from_secs(10), || block_is_pending(
        &h.db, 1
    )));

    // all three txs ended up in block 1
    let compressed = h.db.blocks().get_compressed_block(1).unwrap().unwrap();
    assert_eq!(compressed.tx_count, 3);
    let receiver = h.db.accounts().get_account_by_index(3).unwrap().unwrap();
    assert_eq!(receiver.balance(1), U256::from(30));

    shutdown_clean(h);
}

#[test]
fn sealed_block_with_executed_txs_is_inconsistent() {
    let h = harness(|db| {
        seed_accounts(db);
        let mut block = Block::proposing(1, 1, now_millis());
        block.block_status = BlockStatus::Pending;
        db.blocks().create_block(&block).unwrap();
        let mut executed = transfer(1, 10, 5);
        executed.status = TxStatus::Executed;
        executed.block_height = 1;
        db.tx_pool().create_txs(&[executed]).unwrap();
    });

    let committer = Committer::new(CommitterConfig::new(vec![2]), h.bc.clone()).unwrap();
    assert!(committer.start(&h.supervisor.executor()).is_err());

    shutdown_clean(h);
}
