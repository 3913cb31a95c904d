use serde::{Deserialize, Serialize};

/// Kind of an L2 transaction.
///
/// Priority kinds originate on L1 (deposits, exits); they are authoritative
/// events the committer may never drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Register,
    Deposit,
    DepositNft,
    Transfer,
    Withdraw,
    MintNft,
    TransferNft,
    WithdrawNft,
    CancelOffer,
    FullExit,
    FullExitNft,
}

impl TxKind {
    /// Whether this kind is an L1-originated priority operation.
    pub fn is_priority_operation(&self) -> bool {
        matches!(
            self,
            TxKind::Register
                | TxKind::Deposit
                | TxKind::DepositNft
                | TxKind::FullExit
                | TxKind::FullExitNft
        )
    }

    /// All priority kinds, in no particular order.
    pub fn priority_kinds() -> &'static [TxKind] {
        &[
            TxKind::Register,
            TxKind::Deposit,
            TxKind::DepositNft,
            TxKind::FullExit,
            TxKind::FullExitNft,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_kinds_match_predicate() {
        for kind in TxKind::priority_kinds() {
            assert!(kind.is_priority_operation());
        }
        assert!(!TxKind::Transfer.is_priority_operation());
        assert!(!TxKind::WithdrawNft.is_priority_operation());
    }
}
