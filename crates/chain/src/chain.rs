use std::{sync::Arc, time};

use alloy_primitives::{B256, U256};
use sha2::{Digest, Sha256};
use tracing::*;
use vela_db::traits::{AccountDatabase, BlockDatabase, Database, NftDatabase};
use vela_primitives::{AccountIndex, AssetId, BlockHeight, NftIndex, TxStatus, GAS_ACCOUNT_INDEX};
use vela_state::{
    Account, AccountHistory, Block, BlockStates, CompressedBlock, L2Nft, L2NftHistory, PoolTx,
    StateCache, StateDataCopy, TxContent, TxDetail,
};

use crate::{
    errors::{ChainError, ChainResult},
    statedb::StateDb,
};

fn now_millis() -> u64 {
    time::UNIX_EPOCH.elapsed().unwrap().as_millis() as u64
}

/// Rollup state.  Applies transactions to the state cache, recomputes the
/// commitment trees and assembles the [`BlockStates`] hand-off.
///
/// The state cache itself is owned by the caller (the executor stage); every
/// method that mutates it takes it explicitly, which keeps the single-writer
/// rule visible in the signatures.
pub struct Blockchain<D: Database> {
    db: Arc<D>,
    state: StateDb,
}

impl<D: Database> Blockchain<D> {
    /// Opens the chain over the given store, writing the genesis block row
    /// and the gas account if the store is empty.
    pub fn new(db: Arc<D>, state: StateDb) -> ChainResult<Self> {
        if db.blocks().get_block_by_height(0)?.is_none() {
            let mut genesis = Block::proposing(0, 0, now_millis());
            genesis.block_status = vela_primitives::BlockStatus::Verified;
            db.blocks().create_block(&genesis)?;
            info!("wrote genesis block");
        }
        if db.accounts().get_account_by_index(GAS_ACCOUNT_INDEX)?.is_none() {
            let gas = Account::new(GAS_ACCOUNT_INDEX, "0x00");
            db.accounts().batch_insert_or_update(std::slice::from_ref(&gas))?;
        }
        Ok(Self { db, state })
    }

    pub fn db(&self) -> &Arc<D> {
        &self.db
    }

    pub fn state(&self) -> &StateDb {
        &self.state
    }

    /// The block row at the store's current height.
    pub fn load_current_block(&self) -> ChainResult<Block> {
        let height = self.db.blocks().get_current_block_height()?;
        self.db
            .blocks()
            .get_block_by_height(height)?
            .ok_or(ChainError::Db(vela_db::DbError::MissingBlock(height)))
    }

    /// Opens a fresh `Proposing` block following `previous`.  Purely an
    /// in-memory construction; the row is persisted once the block receives
    /// its first transaction.
    pub fn init_new_block(&self, previous: &Block) -> Block {
        let height = previous.block_height + 1;
        Block::proposing(height as u64, height, now_millis())
    }

    /// Applies one pool transaction against the state cache.
    ///
    /// On success the executed copy (height, details, `Executed` status) is
    /// appended to `cache.txs` and returned; on failure the cache is left
    /// untouched.  Deterministic given the same cache and tx.
    pub fn apply_transaction(
        &self,
        cache: &mut StateCache,
        block_height: BlockHeight,
        tx: &PoolTx,
    ) -> ChainResult<PoolTx> {
        let mut recorder = DetailRecorder::new(tx.id);
        match tx.content.clone() {
            TxContent::Register {
                account_index,
                l1_address,
            } => {
                match self.lookup_account(cache, account_index) {
                    Ok(_) => return Err(ChainError::AccountAlreadyRegistered(account_index)),
                    Err(ChainError::AccountNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                cache
                    .pending_account_map
                    .insert(account_index, Account::new(account_index, l1_address));
            }
            TxContent::Deposit {
                account_index,
                asset_id,
                amount,
            } => {
                let mut account = self.lookup_account(cache, account_index)?;
                credit(&mut account, asset_id, amount, &mut recorder)?;
                cache.pending_account_map.insert(account_index, account);
            }
            TxContent::DepositNft {
                account_index,
                nft_index,
                content_hash,
            } => {
                self.lookup_account(cache, account_index)?;
                cache.pending_nft_map.insert(
                    nft_index,
                    L2Nft {
                        nft_index,
                        creator_account_index: 0,
                        owner_account_index: account_index,
                        content_hash,
                        collection_id: 0,
                    },
                );
            }
            TxContent::Transfer {
                from_account_index,
                to_account_index,
                asset_id,
                amount,
                gas_fee_asset_id,
                gas_fee_amount,
            } => {
                if from_account_index == to_account_index {
                    return Err(ChainError::SelfTransfer(from_account_index));
                }
                let mut from = self.lookup_account(cache, from_account_index)?;
                let mut to = self.lookup_account(cache, to_account_index)?;
                debit(&mut from, asset_id, amount, &mut recorder)?;
                credit(&mut to, asset_id, amount, &mut recorder)?;
                charge_fee(cache, &mut from, gas_fee_asset_id, gas_fee_amount, &mut recorder)?;
                from.nonce += 1;
                self.mark_gas_account_as_pending(cache)?;
                cache.pending_account_map.insert(from_account_index, from);
                cache.pending_account_map.insert(to_account_index, to);
            }
            TxContent::Withdraw {
                from_account_index,
                asset_id,
                amount,
                gas_fee_asset_id,
                gas_fee_amount,
            } => {
                let mut from = self.lookup_account(cache, from_account_index)?;
                debit(&mut from, asset_id, amount, &mut recorder)?;
                charge_fee(cache, &mut from, gas_fee_asset_id, gas_fee_amount, &mut recorder)?;
                from.nonce += 1;
                self.mark_gas_account_as_pending(cache)?;
                cache.pending_account_map.insert(from_account_index, from);
            }
            TxContent::MintNft {
                creator_account_index,
                to_account_index,
                nft_index,
                content_hash,
                gas_fee_asset_id,
                gas_fee_amount,
            } => {
                let mut creator = self.lookup_account(cache, creator_account_index)?;
                self.lookup_account(cache, to_account_index)?;
                charge_fee(cache, &mut creator, gas_fee_asset_id, gas_fee_amount, &mut recorder)?;
                creator.nonce += 1;
                self.mark_gas_account_as_pending(cache)?;
                cache.pending_account_map.insert(creator_account_index, creator);
                cache.pending_nft_map.insert(
                    nft_index,
                    L2Nft {
                        nft_index,
                        creator_account_index,
                        owner_account_index: to_account_index,
                        content_hash,
                        collection_id: 0,
                    },
                );
            }
            TxContent::TransferNft {
                from_account_index,
                to_account_index,
                nft_index,
                gas_fee_asset_id,
                gas_fee_amount,
            } => {
                if from_account_index == to_account_index {
                    return Err(ChainError::SelfTransfer(from_account_index));
                }
                let mut from = self.lookup_account(cache, from_account_index)?;
                self.lookup_account(cache, to_account_index)?;
                let mut nft = self.lookup_nft(cache, nft_index)?;
                if nft.owner_account_index != from_account_index {
                    return Err(ChainError::NftNotOwned {
                        nft_index,
                        account_index: from_account_index,
                    });
                }
                charge_fee(cache, &mut from, gas_fee_asset_id, gas_fee_amount, &mut recorder)?;
                from.nonce += 1;
                nft.owner_account_index = to_account_index;
                self.mark_gas_account_as_pending(cache)?;
                cache.pending_account_map.insert(from_account_index, from);
                cache.pending_nft_map.insert(nft_index, nft);
            }
            TxContent::WithdrawNft {
                from_account_index,
                nft_index,
                gas_fee_asset_id,
                gas_fee_amount,
            } => {
                let mut from = self.lookup_account(cache, from_account_index)?;
                let mut nft = self.lookup_nft(cache, nft_index)?;
                if nft.owner_account_index != from_account_index {
                    return Err(ChainError::NftNotOwned {
                        nft_index,
                        account_index: from_account_index,
                    });
                }
                charge_fee(cache, &mut from, gas_fee_asset_id, gas_fee_amount, &mut recorder)?;
                from.nonce += 1;
                nft.owner_account_index = 0;
                self.mark_gas_account_as_pending(cache)?;
                cache.pending_account_map.insert(from_account_index, from);
                cache.pending_nft_map.insert(nft_index, nft);
            }
            TxContent::CancelOffer {
                account_index,
                offer_id,
                gas_fee_asset_id,
                gas_fee_amount,
            } => {
                let mut account = self.lookup_account(cache, account_index)?;
                charge_fee(cache, &mut account, gas_fee_asset_id, gas_fee_amount, &mut recorder)?;
                account.nonce += 1;
                let entry = account.asset_mut(gas_fee_asset_id);
                entry.offer_canceled_or_finalized |= U256::from(1u8) << ((offer_id % 256) as usize);
                self.mark_gas_account_as_pending(cache)?;
                cache.pending_account_map.insert(account_index, account);
            }
            TxContent::FullExit {
                account_index,
                asset_id,
            } => {
                let mut account = self.lookup_account(cache, account_index)?;
                let balance = account.balance(asset_id);
                debit(&mut account, asset_id, balance, &mut recorder)?;
                cache.pending_account_map.insert(account_index, account);
            }
            TxContent::FullExitNft {
                account_index,
                nft_index,
            } => {
                self.lookup_account(cache, account_index)?;
                // A request for an NFT the account does not own exits empty;
                // the L1 event itself is still consumed.
                if let Ok(mut nft) = self.lookup_nft(cache, nft_index) {
                    if nft.owner_account_index == account_index {
                        nft.owner_account_index = 0;
                        cache.pending_nft_map.insert(nft_index, nft);
                    }
                }
            }
        }

        let mut executed = tx.clone();
        executed.status = TxStatus::Executed;
        executed.block_height = block_height;
        executed.details = recorder.finish();
        cache.txs.push(executed.clone());
        Ok(executed)
    }

    /// Ensures the gas account is present in the pending map so the drain
    /// round's gas folding has a target.
    pub fn mark_gas_account_as_pending(&self, cache: &mut StateCache) -> ChainResult<()> {
        if cache.pending_account_map.contains_key(&GAS_ACCOUNT_INDEX) {
            return Ok(());
        }
        let gas = self.lookup_account(cache, GAS_ACCOUNT_INDEX)?;
        cache.pending_account_map.insert(GAS_ACCOUNT_INDEX, gas);
        Ok(())
    }

    /// Recomputes the per-account asset sub-tree roots for every account
    /// touched by the snapshot.
    pub fn update_account_asset_tree(&self, copy: &mut StateDataCopy) -> ChainResult<()> {
        for account in copy.state_cache.pending_account_map.values_mut() {
            account.asset_root = hash_assets(account);
        }
        Ok(())
    }

    /// Runs the top-level account-tree and NFT-tree updates and assembles
    /// the block-state hand-off for the persistence stages.
    pub fn update_account_tree_and_nft_tree(
        &self,
        block_size: usize,
        copy: StateDataCopy,
    ) -> ChainResult<BlockStates> {
        let StateDataCopy {
            state_cache,
            mut block,
        } = copy;
        let height = block.block_height;

        let mut accounts: Vec<Account> =
            state_cache.pending_account_map.into_values().collect();
        accounts.sort_by_key(|a| a.account_index);
        let mut nfts: Vec<L2Nft> = state_cache.pending_nft_map.into_values().collect();
        nfts.sort_by_key(|n| n.nft_index);

        let account_root = self.state.with_account_tree(|tree| {
            for account in &accounts {
                tree.set_leaf(account.account_index as u64, hash_account(account));
            }
            tree.commit(height as u64);
            tree.root()
        });
        let nft_root = self.state.with_nft_tree(|tree| {
            for nft in &nfts {
                tree.set_leaf(nft.nft_index as u64, hash_nft(nft));
            }
            tree.commit(height as u64);
            tree.root()
        });

        block.block_size = block_size;
        block.state_root = state_root(account_root, nft_root);
        block.txs = state_cache.txs;

        let pending_account_histories = accounts
            .iter()
            .map(|a| AccountHistory::of(a, height))
            .collect();
        let pending_nft_histories = nfts.iter().map(|n| L2NftHistory::of(n, height)).collect();

        let compressed_block = Some(assemble_compressed_block(&block));

        Ok(BlockStates {
            block,
            compressed_block,
            pending_accounts: accounts,
            pending_account_histories,
            pending_nfts: nfts,
            pending_nft_histories,
        })
    }

    /// Reads an account through the pending map, the in-memory cache, the
    /// snapshot cache and finally the store.  Hits on the slower layers
    /// warm the in-memory cache.
    fn lookup_account(&self, cache: &StateCache, index: AccountIndex) -> ChainResult<Account> {
        if let Some(account) = cache.pending_account_map.get(&index) {
            return Ok(account.clone());
        }
        if let Some(account) = self.state.cached_account(index) {
            return Ok(account);
        }
        if let Some(account) = self.state.snapshot_cache().get_account(index) {
            self.state.put_cached_account(account.clone());
            return Ok(account);
        }
        if let Some(account) = self.db.accounts().get_account_by_index(index)? {
            self.state.put_cached_account(account.clone());
            return Ok(account);
        }
        Err(ChainError::AccountNotFound(index))
    }

    fn lookup_nft(&self, cache: &StateCache, index: NftIndex) -> ChainResult<L2Nft> {
        if let Some(nft) = cache.pending_nft_map.get(&index) {
            return Ok(nft.clone());
        }
        if let Some(nft) = self.state.cached_nft(index) {
            return Ok(nft);
        }
        if let Some(nft) = self.state.snapshot_cache().get_nft(index) {
            return Ok(nft);
        }
        self.db
            .nfts()
            .get_nft_by_index(index)?
            .ok_or(ChainError::NftNotFound(index))
    }
}

/// Collects the balance-level effects of one transaction.  The gas account
/// is deliberately absent: its mutations accumulate in the gas map and fold
/// in once per drain round.
struct DetailRecorder {
    tx_id: u64,
    order: i64,
    details: Vec<TxDetail>,
}

impl DetailRecorder {
    fn new(tx_id: u64) -> Self {
        Self {
            tx_id,
            order: 0,
            details: Vec::new(),
        }
    }

    fn record(&mut self, account_index: AccountIndex, asset_id: AssetId, before: U256, after: U256) {
        self.details.push(TxDetail {
            tx_id: self.tx_id,
            order: self.order,
            account_index,
            asset_id,
            balance_before: before,
            balance_after: after,
        });
        self.order += 1;
    }

    fn finish(self) -> Vec<TxDetail> {
        self.details
    }
}

fn credit(
    account: &mut Account,
    asset_id: AssetId,
    amount: U256,
    recorder: &mut DetailRecorder,
) -> ChainResult<()> {
    let before = account.balance(asset_id);
    let after = before.checked_add(amount).ok_or(ChainError::AmountOverflow)?;
    account.asset_mut(asset_id).balance = after;
    recorder.record(account.account_index, asset_id, before, after);
    Ok(())
}

fn debit(
    account: &mut Account,
    asset_id: AssetId,
    amount: U256,
    recorder: &mut DetailRecorder,
) -> ChainResult<()> {
    let before = account.balance(asset_id);
    let after = before
        .checked_sub(amount)
        .ok_or(ChainError::InsufficientBalance {
            account_index: account.account_index,
            asset_id,
        })?;
    account.asset_mut(asset_id).balance = after;
    recorder.record(account.account_index, asset_id, before, after);
    Ok(())
}

/// Debits the fee from the payer and accumulates it in the gas map.
fn charge_fee(
    cache: &mut StateCache,
    payer: &mut Account,
    asset_id: AssetId,
    amount: U256,
    recorder: &mut DetailRecorder,
) -> ChainResult<()> {
    debit(payer, asset_id, amount, recorder)?;
    let entry = cache.pending_gas_map.entry(asset_id).or_insert(U256::ZERO);
    *entry = entry.checked_add(amount).ok_or(ChainError::AmountOverflow)?;
    Ok(())
}

fn hash_assets(account: &Account) -> B256 {
    let mut hasher = Sha256::new();
    for (asset_id, asset) in &account.asset_info {
        hasher.update(asset_id.to_be_bytes());
        hasher.update(asset.balance.to_be_bytes::<32>());
        hasher.update(asset.offer_canceled_or_finalized.to_be_bytes::<32>());
    }
    B256::from_slice(&hasher.finalize())
}

fn hash_account(account: &Account) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(account.account_index.to_be_bytes());
    hasher.update(account.nonce.to_be_bytes());
    hasher.update(account.asset_root);
    B256::from_slice(&hasher.finalize())
}

fn hash_nft(nft: &L2Nft) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(nft.nft_index.to_be_bytes());
    hasher.update(nft.creator_account_index.to_be_bytes());
    hasher.update(nft.owner_account_index.to_be_bytes());
    hasher.update(nft.content_hash);
    B256::from_slice(&hasher.finalize())
}

fn state_root(account_root: B256, nft_root: B256) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(account_root);
    hasher.update(nft_root);
    B256::from_slice(&hasher.finalize())
}

fn assemble_compressed_block(block: &Block) -> CompressedBlock {
    let mut public_data = Vec::with_capacity(block.txs.len() * 40);
    for tx in &block.txs {
        public_data.extend_from_slice(&tx.id.to_be_bytes());
        public_data.extend_from_slice(tx.hash.as_bytes());
        public_data.push(0);
    }
    CompressedBlock {
        block_height: block.block_height,
        block_size: block.block_size,
        state_root: block.state_root,
        tx_count: block.txs.len(),
        public_data,
    }
}
