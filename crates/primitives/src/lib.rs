//! Core type vocabulary shared by every Vela crate.

mod status;
mod tx;

pub use status::{BlockStatus, TxStatus};
pub use tx::TxKind;

/// Index of an L2 account in the account tree.
pub type AccountIndex = i64;

/// Index of an NFT in the NFT tree.
pub type NftIndex = i64;

/// Identifier of a fungible asset.
pub type AssetId = i64;

/// Height of an L2 block.
pub type BlockHeight = i64;

/// The distinguished account accumulating fees from every transaction.
pub const GAS_ACCOUNT_INDEX: AccountIndex = 1;

/// Sentinel height recorded on pool txs rejected before entering any block.
pub const NIL_BLOCK_HEIGHT: BlockHeight = -1;
