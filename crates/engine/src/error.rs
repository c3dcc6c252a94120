use tallyvault_core::CoreError;
use tallyvault_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("election not found: {0}")]
    ElectionNotFound(String),

    /// Party-split tabulation was requested for a non-primary election.
    #[error("election is not a primary: {0}")]
    NotAPrimary(String),

    /// A contest-results bucket expected by the combination engine was
    /// missing. Contests are pre-filtered, so this is a bug, not bad input.
    #[error("missing contest results bucket: {0}")]
    MissingContestResults(String),

    /// The adjudication overlay tried to reclassify more write-in marks than
    /// the generic bucket holds. Marks in overvoted contests are excluded at
    /// ingest, so this is a bug, not bad input.
    #[error("write-in bucket underflow for contest: {0}")]
    WriteInBucketUnderflow(String),
}
