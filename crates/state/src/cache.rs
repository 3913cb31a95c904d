use std::collections::HashMap;

use alloy_primitives::U256;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use vela_primitives::{AccountIndex, AssetId, NftIndex};

use crate::{Account, Block, L2Nft, PoolTx};

/// The executor's working set for the currently open block.
///
/// The executor is the unique writer.  At commit time the whole cache is
/// moved out and handed downstream; the replacement starts with empty
/// pending maps, so caches never alias across stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCache {
    /// Applied txs, in execution order.
    pub txs: Vec<PoolTx>,
    pub pending_account_map: HashMap<AccountIndex, Account>,
    pub pending_nft_map: HashMap<NftIndex, L2Nft>,
    /// Fees owed to the gas account, accumulated per asset in insertion
    /// order and folded into the gas account once per drain round.
    pub pending_gas_map: IndexMap<AssetId, U256>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the cache out wholesale, leaving a fresh empty one behind.
    pub fn take(&mut self) -> StateCache {
        std::mem::take(self)
    }
}

/// Owned snapshot decoupling the executor from the tree-update stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDataCopy {
    pub state_cache: StateCache,
    pub block: Block,
}
