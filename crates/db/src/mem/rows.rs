//! The simpler append/upsert tables.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use vela_primitives::{AccountIndex, BlockHeight, NftIndex};
use vela_state::{Account, AccountHistory, L2Nft, L2NftHistory, PoolTx, PriorityRequest, TxDetail};

use crate::{
    traits::{
        AccountDatabase, AccountHistoryDatabase, NftDatabase, NftHistoryDatabase,
        PriorityRequestDatabase, TxDatabase, TxDetailDatabase,
    },
    DbError, DbResult,
};

#[derive(Default)]
pub struct MemAccountDb {
    rows: Mutex<BTreeMap<AccountIndex, Account>>,
}

impl AccountDatabase for MemAccountDb {
    fn get_accounts_page(&self, limit: usize, offset: usize) -> DbResult<Vec<Account>> {
        let rows = self.rows.lock();
        Ok(rows.values().skip(offset).take(limit).cloned().collect())
    }

    fn get_account_by_index(&self, index: AccountIndex) -> DbResult<Option<Account>> {
        let rows = self.rows.lock();
        Ok(rows.get(&index).cloned())
    }

    fn batch_insert_or_update(&self, accounts: &[Account]) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for account in accounts {
            rows.insert(account.account_index, account.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemAccountHistoryDb {
    rows: Mutex<BTreeMap<(AccountIndex, BlockHeight), AccountHistory>>,
}

impl AccountHistoryDatabase for MemAccountHistoryDb {
    fn create_account_histories(&self, histories: &[AccountHistory]) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for history in histories {
            let key = (history.account_index, history.l2_block_height);
            if rows.contains_key(&key) {
                return Err(DbError::DuplicateInsert(
                    "account_history",
                    format!("({}, {})", key.0, key.1),
                ));
            }
            rows.insert(key, history.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemNftDb {
    rows: Mutex<BTreeMap<NftIndex, L2Nft>>,
}

impl NftDatabase for MemNftDb {
    fn get_nft_by_index(&self, index: NftIndex) -> DbResult<Option<L2Nft>> {
        let rows = self.rows.lock();
        Ok(rows.get(&index).cloned())
    }

    fn batch_insert_or_update(&self, nfts: &[L2Nft]) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for nft in nfts {
            rows.insert(nft.nft_index, nft.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemNftHistoryDb {
    rows: Mutex<BTreeMap<(NftIndex, BlockHeight), L2NftHistory>>,
}

impl NftHistoryDatabase for MemNftHistoryDb {
    fn create_nft_histories(&self, histories: &[L2NftHistory]) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for history in histories {
            let key = (history.nft_index, history.l2_block_height);
            if rows.contains_key(&key) {
                return Err(DbError::DuplicateInsert(
                    "l2_nft_history",
                    format!("({}, {})", key.0, key.1),
                ));
            }
            rows.insert(key, history.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemTxDb {
    rows: Mutex<BTreeMap<u64, PoolTx>>,
}

impl TxDatabase for MemTxDb {
    fn create_txs(&self, txs: &[PoolTx]) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for tx in txs {
            if rows.contains_key(&tx.id) {
                return Err(DbError::DuplicateInsert("tx", tx.id.to_string()));
            }
            rows.insert(tx.id, tx.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemTxDetailDb {
    rows: Mutex<BTreeMap<(u64, i64), TxDetail>>,
}

impl TxDetailDatabase for MemTxDetailDb {
    fn create_tx_details(&self, details: &[TxDetail]) -> DbResult<()> {
        let mut rows = self.rows.lock();
        for detail in details {
            let key = (detail.tx_id, detail.order);
            if rows.contains_key(&key) {
                return Err(DbError::DuplicateInsert(
                    "tx_detail",
                    format!("({}, {})", key.0, key.1),
                ));
            }
            rows.insert(key, detail.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemPriorityRequestDb {
    by_hash: Mutex<HashMap<String, PriorityRequest>>,
}

impl PriorityRequestDatabase for MemPriorityRequestDb {
    fn get_by_l2_tx_hash(&self, l2_tx_hash: &str) -> DbResult<Option<PriorityRequest>> {
        let rows = self.by_hash.lock();
        Ok(rows.get(l2_tx_hash).cloned())
    }

    fn create_priority_requests(&self, requests: &[PriorityRequest]) -> DbResult<()> {
        let mut rows = self.by_hash.lock();
        for request in requests {
            rows.insert(request.l2_tx_hash.clone(), request.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn account_upsert_is_idempotent() {
        let db = MemAccountDb::default();
        let mut account = Account::new(4, "0xabc");
        db.batch_insert_or_update(std::slice::from_ref(&account))
            .unwrap();
        account.nonce = 9;
        db.batch_insert_or_update(std::slice::from_ref(&account))
            .unwrap();

        let page = db.get_accounts_page(10, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].nonce, 9);
    }

    #[test]
    fn duplicate_history_is_reported() {
        let db = MemAccountHistoryDb::default();
        let history = AccountHistory::of(&Account::new(4, "0xabc"), 11);
        db.create_account_histories(std::slice::from_ref(&history))
            .unwrap();
        let err = db
            .create_account_histories(std::slice::from_ref(&history))
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateInsert("account_history", _)));
    }

    #[test]
    fn nft_history_duplicate_is_reported() {
        let db = MemNftHistoryDb::default();
        let nft = L2Nft {
            nft_index: 2,
            creator_account_index: 1,
            owner_account_index: 3,
            content_hash: B256::ZERO,
            collection_id: 0,
        };
        let history = L2NftHistory::of(&nft, 5);
        db.create_nft_histories(std::slice::from_ref(&history))
            .unwrap();
        assert!(db
            .create_nft_histories(std::slice::from_ref(&history))
            .is_err());
    }
}
