use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid election definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
