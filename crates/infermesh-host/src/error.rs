use infermesh_core::{ErrorClass, Retryable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Inference binary not found (searched PATH and fallback locations)")]
    BinaryNotFound,

    #[error("Failed to spawn inference process: {0}")]
    Spawn(String),

    #[error("Inference server failed its startup health probes")]
    HealthTimeout,

    #[error("Event socket error: {0}")]
    EventSocket(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Chain(#[from] infermesh_chain::ChainError),

    #[error(transparent)]
    Checkpoint(#[from] infermesh_checkpoint::CheckpointError),

    #[error(transparent)]
    Crypto(#[from] infermesh_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, HostError>;

impl Retryable for HostError {
    fn class(&self) -> ErrorClass {
        match self {
            HostError::EventSocket(_) | HostError::HealthTimeout => ErrorClass::Transient,
            HostError::Chain(e) => e.class(),
            HostError::Checkpoint(e) => e.class(),
            _ => ErrorClass::Fatal,
        }
    }
}
