use std::collections::BTreeMap;

use parking_lot::Mutex;
use vela_primitives::{BlockHeight, TxKind, TxStatus};
use vela_state::PoolTx;

use crate::{traits::TxPoolDatabase, DbError, DbResult};

/// A pool row; deletion is soft so that executed ids survive restarts.
struct PoolRow {
    tx: PoolTx,
    deleted: bool,
}

#[derive(Default)]
pub struct MemTxPoolDb {
    rows: Mutex<BTreeMap<u64, PoolRow>>,
}

impl MemTxPoolDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a row regardless of soft deletion; `(tx, deleted)`.
    pub fn get_row(&self, id: u64) -> Option<(PoolTx, bool)> {
        let rows = self.rows.lock();
        rows.get(&id).map(|r| (r.tx.clone(), r.deleted))
    }
}

fn executed_or_later(status: TxStatus) -> bool {
    matches!(
        status,
        TxStatus::Executed | TxStatus::Packed | TxStatus::Committed | TxStatus::Verified
    )
}

impl TxPoolDatabase for MemTxPoolDb {
    fn get_txs_by_status_and_max_id(
        &self,
        status: TxStatus,
        max_id: u64,
        limit: usize,
    ) -> DbResult<Vec<PoolTx>> {
        let rows = self.rows.lock();
        Ok(rows
            .range(max_id + 1..)
            .filter(|(_, r)| !r.deleted && r.tx.status == status)
            .take(limit)
            .map(|(_, r)| r.tx.clone())
            .collect())
    }

    fn get_latest_executed_tx(&self) -> DbResult<Option<PoolTx>> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .rev()
            .find(|r| executed_or_later(r.tx.status))
            .map(|r| r.tx.clone()))
    }

    fn get_latest_tx(&self, kinds: &[TxKind], statuses: &[TxStatus]) -> DbResult<Option<PoolTx>> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .rev()
            .find(|r| kinds.contains(&r.tx.kind) && statuses.contains(&r.tx.status))
            .map(|r| r.tx.clone()))
    }

    fn get_txs_by_status(&self, status: TxStatus) -> DbResult<Vec<PoolTx>> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|r| !r.deleted && r.tx.status == status)
            .map(|r| r.tx.clone())
            .collect())
    }

    fn get_tx_count_by_status(&self, status: TxStatus) -> DbResult<u64> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|r| !r.deleted && r.tx.status == status)
            .count() as u64)
    }

    fn update_txs_status_and_height(
        &self,
        ids: &[u64],
        status: TxStatus,
        block_height: BlockHeight,
    ) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.tx.status = status;
                row.tx.block_height = block_height;
            }
        }
        Ok(())
    }

    fn delete_txs_batch(
        &self,
        ids: &[u64],
        status: TxStatus,
        block_height: BlockHeight,
    ) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.tx.status = status;
                row.tx.block_height = block_height;
                row.deleted = true;
            }
        }
        Ok(())
    }

    fn create_txs(&self, txs: &[PoolTx]) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for tx in txs {
            if rows.contains_key(&tx.id) {
                return Err(DbError::DuplicateInsert("tx_pool", tx.id.to_string()));
            }
            rows.insert(
                tx.id,
                PoolRow {
                    tx: tx.clone(),
                    deleted: false,
                },
            );
        }
        Ok(())
    }
}
