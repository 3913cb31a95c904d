use serde::{Deserialize, Serialize};

pub const DEFAULT_SAVE_POOL_SIZE: usize = 100;

/// Age at which a non-empty open block is committed regardless of fill.
pub const DEFAULT_COMMIT_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitterConfig {
    /// Block-size slots, ascending.  A sealed block takes the smallest slot
    /// that fits its tx count; the largest slot is the hard cap.
    pub optional_block_sizes: Vec<usize>,

    /// Skip all block persistence (stages 6-8) while still advancing the
    /// pruned-height watermark.  Dry-runs and benchmarks only.
    #[serde(default)]
    pub block_save_disabled: bool,

    /// Fan-out pool size for the save stage.
    #[serde(default = "default_save_pool_size")]
    pub save_block_data_pool_size: usize,

    /// Commit-by-age threshold for a non-empty open block.
    #[serde(default = "default_commit_interval_ms")]
    pub max_committer_interval_ms: u64,
}

fn default_save_pool_size() -> usize {
    DEFAULT_SAVE_POOL_SIZE
}

fn default_commit_interval_ms() -> u64 {
    DEFAULT_COMMIT_INTERVAL_MS
}

impl CommitterConfig {
    pub fn new(optional_block_sizes: Vec<usize>) -> Self {
        Self {
            optional_block_sizes,
            block_save_disabled: false,
            save_block_data_pool_size: DEFAULT_SAVE_POOL_SIZE,
            max_committer_interval_ms: DEFAULT_COMMIT_INTERVAL_MS,
        }
    }

    /// Hard cap on txs per block.
    pub fn max_txs_per_block(&self) -> usize {
        self.optional_block_sizes.last().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in() {
        let config: CommitterConfig = toml::from_str("optional_block_sizes = [2, 4, 8]").unwrap();
        assert_eq!(config.optional_block_sizes, vec![2, 4, 8]);
        assert!(!config.block_save_disabled);
        assert_eq!(config.save_block_data_pool_size, DEFAULT_SAVE_POOL_SIZE);
        assert_eq!(config.max_committer_interval_ms, DEFAULT_COMMIT_INTERVAL_MS);
    }
}
