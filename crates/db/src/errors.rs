use thiserror::Error;

/// Simple result type used across the database interface.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// (table, key) — batch insert hit an existing primary key.
    #[error("duplicate {0} row for key {1}")]
    DuplicateInsert(&'static str, String),

    #[error("missing block at height {0}")]
    MissingBlock(i64),

    #[error("block id {0} not found")]
    UnknownBlockId(u64),

    #[error("{0}")]
    Other(String),
}
