use serde::{Deserialize, Serialize};

/// Lifecycle of a pool transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Processing,
    Executed,
    Packed,
    Committed,
    Verified,
    Failed,
}

/// Lifecycle of an L2 block row.
///
/// The ordering is meaningful: a block whose status is past [`Proposing`]
/// has been sealed and may no longer accept transactions.
///
/// [`Proposing`]: BlockStatus::Proposing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Proposing,
    ProposedNotReady,
    Pending,
    Committed,
    Verified,
}

impl BlockStatus {
    /// Whether the block has been sealed (left the proposing phase).
    pub fn is_sealed(&self) -> bool {
        *self > BlockStatus::Proposing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_follows_ordering() {
        assert!(!BlockStatus::Proposing.is_sealed());
        assert!(BlockStatus::ProposedNotReady.is_sealed());
        assert!(BlockStatus::Verified.is_sealed());
    }
}
