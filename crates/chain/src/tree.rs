use alloy_primitives::B256;
use sha2::{Digest, Sha256};

/// Versioned commitment over indexed leaves.
///
/// The production engine is the sparse Merkle forest; the committer only
/// needs leaf updates, version sealing and the latest/recent version pair it
/// publishes as gauges, so the interface stays this narrow.
pub trait CommitmentTree: Send + 'static {
    fn set_leaf(&mut self, index: u64, leaf: B256);

    fn root(&self) -> B256;

    /// Seals all leaf updates since the previous commit as `version`.
    /// Versions must be committed in increasing order.
    fn commit(&mut self, version: u64);

    /// Most recently committed version.
    fn latest_version(&self) -> u64;

    /// Oldest version still retained (advanced by pruning).
    fn recent_version(&self) -> u64;
}

/// Sequential-hashing tree used by tests and the default binary: the root is
/// a running hash over committed leaf writes.  Not a real Merkle tree, but
/// deterministic and cheap, which is all the pipeline needs.
pub struct SequentialHashTree {
    root: B256,
    latest_version: u64,
    recent_version: u64,
    pending: Vec<(u64, B256)>,
}

impl SequentialHashTree {
    pub fn new() -> Self {
        Self {
            root: B256::ZERO,
            latest_version: 0,
            recent_version: 0,
            pending: Vec::new(),
        }
    }
}

impl Default for SequentialHashTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitmentTree for SequentialHashTree {
    fn set_leaf(&mut self, index: u64, leaf: B256) {
        self.pending.push((index, leaf));
    }

    fn root(&self) -> B256 {
        self.root
    }

    fn commit(&mut self, version: u64) {
        let mut hasher = Sha256::new();
        hasher.update(self.root);
        for (index, leaf) in self.pending.drain(..) {
            hasher.update(index.to_be_bytes());
            hasher.update(leaf);
        }
        self.root = B256::from_slice(&hasher.finalize());
        self.latest_version = version;
    }

    fn latest_version(&self) -> u64 {
        self.latest_version
    }

    fn recent_version(&self) -> u64 {
        self.recent_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_folds_pending_leaves() {
        let mut tree = SequentialHashTree::new();
        tree.set_leaf(1, B256::repeat_byte(1));
        assert_eq!(tree.root(), B256::ZERO);

        tree.commit(1);
        let first = tree.root();
        assert_ne!(first, B256::ZERO);
        assert_eq!(tree.latest_version(), 1);

        // same write again produces a different running root
        tree.set_leaf(1, B256::repeat_byte(1));
        tree.commit(2);
        assert_ne!(tree.root(), first);
    }
}
