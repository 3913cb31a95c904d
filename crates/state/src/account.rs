use std::collections::BTreeMap;

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use vela_primitives::{AccountIndex, AssetId, BlockHeight};

/// Per-asset balance entry of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAsset {
    pub balance: U256,
    pub offer_canceled_or_finalized: U256,
}

/// Mutable account aggregate.
///
/// The canonical copy of an account lives either in the state db's account
/// cache or, while the account is touched by the open block, in the state
/// cache's pending map.  Cloning is a deep copy; entries are cloned whenever
/// they cross a pipeline stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_index: AccountIndex,
    pub l1_address: String,
    pub nonce: i64,
    pub asset_info: BTreeMap<AssetId, AccountAsset>,
    pub asset_root: B256,
}

impl Account {
    pub fn new(account_index: AccountIndex, l1_address: impl Into<String>) -> Self {
        Self {
            account_index,
            l1_address: l1_address.into(),
            nonce: 0,
            asset_info: BTreeMap::new(),
            asset_root: B256::ZERO,
        }
    }

    pub fn asset(&self, asset_id: AssetId) -> Option<&AccountAsset> {
        self.asset_info.get(&asset_id)
    }

    /// Returns the asset entry, creating a zeroed one if absent.
    pub fn asset_mut(&mut self, asset_id: AssetId) -> &mut AccountAsset {
        self.asset_info.entry(asset_id).or_default()
    }

    pub fn balance(&self, asset_id: AssetId) -> U256 {
        self.asset(asset_id).map(|a| a.balance).unwrap_or(U256::ZERO)
    }
}

/// Immutable snapshot of an account as of one block, persisted per block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHistory {
    pub account_index: AccountIndex,
    pub nonce: i64,
    pub asset_info: BTreeMap<AssetId, AccountAsset>,
    pub asset_root: B256,
    pub l2_block_height: BlockHeight,
}

impl AccountHistory {
    pub fn of(account: &Account, l2_block_height: BlockHeight) -> Self {
        Self {
            account_index: account.account_index,
            nonce: account.nonce,
            asset_info: account.asset_info.clone(),
            asset_root: account.asset_root,
            l2_block_height,
        }
    }
}
