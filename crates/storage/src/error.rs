use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    RecordNotFound(String),
}
