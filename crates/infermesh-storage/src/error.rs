use infermesh_core::{ErrorClass, Retryable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl Retryable for StorageError {
    fn class(&self) -> ErrorClass {
        match self {
            StorageError::Transport(_) | StorageError::WriteFailed(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}
