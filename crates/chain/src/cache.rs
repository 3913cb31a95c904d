use std::collections::HashMap;

use parking_lot::Mutex;
use vela_primitives::{AccountIndex, NftIndex};
use vela_state::{Account, L2Nft};

/// Key-value snapshot cache (Redis in production).  Writes are best-effort;
/// the committer logs failures and moves on.
pub trait SnapshotCache: Send + Sync + 'static {
    fn put_account(&self, account: &Account) -> Result<(), String>;

    fn put_nft(&self, nft: &L2Nft) -> Result<(), String>;

    /// Height of the newest block whose snapshots were written.
    fn put_block_height(&self, height: i64) -> Result<(), String>;

    fn get_account(&self, index: AccountIndex) -> Option<Account>;

    fn get_nft(&self, index: NftIndex) -> Option<L2Nft>;
}

/// Process-local stand-in for the external cache.
#[derive(Default)]
pub struct MemSnapshotCache {
    accounts: Mutex<HashMap<AccountIndex, Account>>,
    nfts: Mutex<HashMap<NftIndex, L2Nft>>,
    block_height: Mutex<i64>,
}

impl MemSnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_height(&self) -> i64 {
        *self.block_height.lock()
    }
}

impl SnapshotCache for MemSnapshotCache {
    fn put_account(&self, account: &Account) -> Result<(), String> {
        self.accounts
            .lock()
            .insert(account.account_index, account.clone());
        Ok(())
    }

    fn put_nft(&self, nft: &L2Nft) -> Result<(), String> {
        self.nfts.lock().insert(nft.nft_index, nft.clone());
        Ok(())
    }

    fn put_block_height(&self, height: i64) -> Result<(), String> {
        *self.block_height.lock() = height;
        Ok(())
    }

    fn get_account(&self, index: AccountIndex) -> Option<Account> {
        self.accounts.lock().get(&index).cloned()
    }

    fn get_nft(&self, index: NftIndex) -> Option<L2Nft> {
        self.nfts.lock().get(&index).cloned()
    }
}
