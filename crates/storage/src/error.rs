use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The same `(election, ballot id)` identity was ingested again with a
    /// different payload. Never auto-resolved; the caller decides whether the
    /// import is corrupt.
    #[error("ballot id already exists with different data: {ballot_id}")]
    BallotIdConflict { ballot_id: String },

    #[error("core error: {0}")]
    Core(#[from] tallyvault_core::CoreError),
}
