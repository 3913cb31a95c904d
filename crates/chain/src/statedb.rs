use std::{
    collections::HashMap,
    sync::atomic::{AtomicI64, Ordering},
    sync::Arc,
};

use parking_lot::Mutex;
use vela_primitives::{AccountIndex, NftIndex};
use vela_state::{Account, L2Nft};

use crate::{cache::SnapshotCache, tree::CommitmentTree};

/// Shared state handles: the in-memory account/NFT caches, the two top-level
/// commitment trees and the pruned-height watermark.
///
/// The executor is the only writer of the caches; the tree updater stage is
/// the only user of the trees.  The locks exist because those owners live on
/// different pipeline threads, not because access contends.
pub struct StateDb {
    account_cache: Mutex<HashMap<AccountIndex, Account>>,
    nft_cache: Mutex<HashMap<NftIndex, L2Nft>>,
    snapshot_cache: Arc<dyn SnapshotCache>,
    account_tree: Mutex<Box<dyn CommitmentTree>>,
    nft_tree: Mutex<Box<dyn CommitmentTree>>,
    pruned_block_height: AtomicI64,
}

impl StateDb {
    pub fn new(
        snapshot_cache: Arc<dyn SnapshotCache>,
        account_tree: Box<dyn CommitmentTree>,
        nft_tree: Box<dyn CommitmentTree>,
    ) -> Self {
        Self {
            account_cache: Mutex::new(HashMap::new()),
            nft_cache: Mutex::new(HashMap::new()),
            snapshot_cache,
            account_tree: Mutex::new(account_tree),
            nft_tree: Mutex::new(nft_tree),
            pruned_block_height: AtomicI64::new(0),
        }
    }

    pub fn cached_account(&self, index: AccountIndex) -> Option<Account> {
        self.account_cache.lock().get(&index).cloned()
    }

    pub fn cached_nft(&self, index: NftIndex) -> Option<L2Nft> {
        self.nft_cache.lock().get(&index).cloned()
    }

    pub fn put_cached_account(&self, account: Account) {
        self.account_cache
            .lock()
            .insert(account.account_index, account);
    }

    /// Publishes the pending accounts of a drain round to the in-memory
    /// cache.  Entries are cloned; the pending map stays with its owner.
    pub fn sync_pending_accounts_to_cache(&self, pending: &HashMap<AccountIndex, Account>) {
        let mut cache = self.account_cache.lock();
        for (index, account) in pending {
            cache.insert(*index, account.clone());
        }
    }

    pub fn sync_pending_nfts_to_cache(&self, pending: &HashMap<NftIndex, L2Nft>) {
        let mut cache = self.nft_cache.lock();
        for (index, nft) in pending {
            cache.insert(*index, nft.clone());
        }
    }

    pub fn snapshot_cache(&self) -> &Arc<dyn SnapshotCache> {
        &self.snapshot_cache
    }

    pub fn with_account_tree<R>(&self, f: impl FnOnce(&mut dyn CommitmentTree) -> R) -> R {
        f(self.account_tree.lock().as_mut())
    }

    pub fn with_nft_tree<R>(&self, f: impl FnOnce(&mut dyn CommitmentTree) -> R) -> R {
        f(self.nft_tree.lock().as_mut())
    }

    pub fn account_tree_versions(&self) -> (u64, u64) {
        let tree = self.account_tree.lock();
        (tree.latest_version(), tree.recent_version())
    }

    pub fn nft_tree_versions(&self) -> (u64, u64) {
        let tree = self.nft_tree.lock();
        (tree.latest_version(), tree.recent_version())
    }

    /// Advances the pruned-height watermark; never regresses.
    pub fn update_pruned_block_height(&self, height: i64) {
        self.pruned_block_height
            .fetch_max(height, Ordering::SeqCst);
    }

    pub fn pruned_block_height(&self) -> i64 {
        self.pruned_block_height.load(Ordering::SeqCst)
    }
}
