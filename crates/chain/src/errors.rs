use thiserror::Error;
use vela_primitives::{AccountIndex, AssetId, NftIndex};

pub type ChainResult<T> = Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("account {0} not found")]
    AccountNotFound(AccountIndex),

    #[error("account {0} already registered")]
    AccountAlreadyRegistered(AccountIndex),

    #[error("nft {0} not found")]
    NftNotFound(NftIndex),

    #[error("nft {nft_index} not owned by account {account_index}")]
    NftNotOwned {
        nft_index: NftIndex,
        account_index: AccountIndex,
    },

    #[error("account {account_index} has insufficient balance of asset {asset_id}")]
    InsufficientBalance {
        account_index: AccountIndex,
        asset_id: AssetId,
    },

    #[error("transfer from account {0} to itself")]
    SelfTransfer(AccountIndex),

    #[error("amount overflow")]
    AmountOverflow,

    #[error("db: {0}")]
    Db(#[from] vela_db::DbError),
}
