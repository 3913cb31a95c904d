//! In-memory implementation of the database traits.
//!
//! Backs the test suite and the default binary.  Every table keeps its rows
//! in a [`parking_lot::Mutex`]-guarded map keyed by the table's primary key,
//! so the batch operations get the same duplicate-key behavior a relational
//! backend would report.

mod blocks;
mod pool;
mod rows;

use std::sync::Arc;

pub use blocks::MemBlockDb;
pub use pool::MemTxPoolDb;
pub use rows::{
    MemAccountDb, MemAccountHistoryDb, MemNftDb, MemNftHistoryDb, MemPriorityRequestDb, MemTxDb,
    MemTxDetailDb,
};

use crate::traits::Database;

/// All tables bundled behind the umbrella [`Database`] trait.
#[derive(Default)]
pub struct MemDatabase {
    tx_pool: Arc<MemTxPoolDb>,
    blocks: Arc<MemBlockDb>,
    accounts: Arc<MemAccountDb>,
    account_histories: Arc<MemAccountHistoryDb>,
    nfts: Arc<MemNftDb>,
    nft_histories: Arc<MemNftHistoryDb>,
    txs: Arc<MemTxDb>,
    tx_details: Arc<MemTxDetailDb>,
    priority_requests: Arc<MemPriorityRequestDb>,
}

impl MemDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemDatabase {
    type TxPool = MemTxPoolDb;
    type Blocks = MemBlockDb;
    type Accounts = MemAccountDb;
    type AccountHistories = MemAccountHistoryDb;
    type Nfts = MemNftDb;
    type NftHistories = MemNftHistoryDb;
    type Txs = MemTxDb;
    type TxDetails = MemTxDetailDb;
    type PriorityRequests = MemPriorityRequestDb;

    fn tx_pool(&self) -> &Arc<Self::TxPool> {
        &self.tx_pool
    }

    fn blocks(&self) -> &Arc<Self::Blocks> {
        &self.blocks
    }

    fn accounts(&self) -> &Arc<Self::Accounts> {
        &self.accounts
    }

    fn account_histories(&self) -> &Arc<Self::AccountHistories> {
        &self.account_histories
    }

    fn nfts(&self) -> &Arc<Self::Nfts> {
        &self.nfts
    }

    fn nft_histories(&self) -> &Arc<Self::NftHistories> {
        &self.nft_histories
    }

    fn txs(&self) -> &Arc<Self::Txs> {
        &self.txs
    }

    fn tx_details(&self) -> &Arc<Self::TxDetails> {
        &self.tx_details
    }

    fn priority_requests(&self) -> &Arc<Self::PriorityRequests> {
        &self.priority_requests
    }
}
