use infermesh_core::{ErrorClass, Retryable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint index signature does not verify against the host address")]
    InvalidIndexSignature,

    #[error("Proof hash mismatch at checkpoint {index}")]
    ProofHashMismatch { index: u64 },

    #[error("Delta fetch failed: {0}")]
    DeltaFetchFailed(String),

    #[error("Delta signature invalid at checkpoint {index}")]
    InvalidDeltaSignature { index: u64 },

    #[error("Delta structure invalid: {0}")]
    InvalidDeltaStructure(String),

    #[error("Checkpoint entries not contiguous at index {index}")]
    DiscontinuousIndex { index: u64 },

    #[error("Recovery timed out")]
    RecoveryTimeout,

    #[error(transparent)]
    Storage(#[from] infermesh_storage::StorageError),

    #[error(transparent)]
    Chain(#[from] infermesh_chain::ChainError),

    #[error(transparent)]
    Crypto(#[from] infermesh_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

impl CheckpointError {
    /// Stable machine-readable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            CheckpointError::InvalidIndexSignature => "INVALID_INDEX_SIGNATURE",
            CheckpointError::ProofHashMismatch { .. } => "PROOF_HASH_MISMATCH",
            CheckpointError::DeltaFetchFailed(_) => "DELTA_FETCH_FAILED",
            CheckpointError::InvalidDeltaSignature { .. } => "INVALID_DELTA_SIGNATURE",
            CheckpointError::InvalidDeltaStructure(_) => "INVALID_DELTA_STRUCTURE",
            CheckpointError::DiscontinuousIndex { .. } => "INVALID_DELTA_STRUCTURE",
            CheckpointError::RecoveryTimeout => "RECOVERY_TIMEOUT",
            CheckpointError::Storage(_) => "STORAGE_ERROR",
            CheckpointError::Chain(_) => "CHAIN_ERROR",
            CheckpointError::Crypto(_) => "ENCRYPTION_ERROR",
        }
    }
}

impl Retryable for CheckpointError {
    fn class(&self) -> ErrorClass {
        match self {
            // Recovery failures never corrupt local state but are fatal
            // to the attempt; only the transports underneath retry.
            CheckpointError::Storage(e) => e.class(),
            CheckpointError::Chain(e) => e.class(),
            _ => ErrorClass::Fatal,
        }
    }
}
