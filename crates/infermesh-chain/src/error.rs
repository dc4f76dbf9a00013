use infermesh_core::{ChainId, ErrorClass, Retryable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Config error: missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Config error: {0}")]
    InvalidConfig(String),

    #[error("Transient RPC failure: {0}")]
    RpcTransient(String),

    #[error("All RPC endpoints exhausted for chain {0}")]
    ChainUnreachable(ChainId),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Transaction dropped from the mempool")]
    TxDropped,

    #[error("Session {0} already completed")]
    AlreadyCompleted(u64),

    #[error("Unknown model {0}")]
    UnknownModel(String),

    #[error("Contract returned malformed data: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;

impl Retryable for ChainError {
    fn class(&self) -> ErrorClass {
        match self {
            ChainError::RpcTransient(_) | ChainError::Timeout(_) | ChainError::TxDropped => {
                ErrorClass::Transient
            }
            _ => ErrorClass::Fatal,
        }
    }
}

/// Sort a raw provider/contract error message into the taxonomy.
///
/// Reverts are fatal and carried verbatim; connection-level noise is
/// transient and eligible for retry/failover.
pub fn classify_rpc_error(message: &str) -> ChainError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("revert") || lower.contains("execution reverted") {
        if lower.contains("already completed") {
            // Session id is recovered by the caller where known
            return ChainError::Reverted("AlreadyCompleted".into());
        }
        return ChainError::Reverted(message.to_string());
    }
    if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
        return ChainError::InsufficientBalance(message.to_string());
    }
    if lower.contains("nonce too low")
        || lower.contains("nonce too high")
        || lower.contains("replacement transaction underpriced")
    {
        return ChainError::NonceConflict(message.to_string());
    }
    // Connection resets, rate limits, congestion: retryable
    ChainError::RpcTransient(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_is_fatal() {
        let err = classify_rpc_error("execution reverted: InsufficientDeposit");
        assert!(matches!(err, ChainError::Reverted(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_connection_reset_is_transient() {
        let err = classify_rpc_error("connection reset by peer");
        assert!(err.is_transient());
    }

    #[test]
    fn test_rate_limit_is_transient() {
        assert!(classify_rpc_error("429 too many requests").is_transient());
    }

    #[test]
    fn test_nonce_conflict_is_fatal() {
        let err = classify_rpc_error("nonce too low: next nonce 41");
        assert!(matches!(err, ChainError::NonceConflict(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_insufficient_funds_is_fatal() {
        let err = classify_rpc_error("insufficient funds for gas * price + value");
        assert!(matches!(err, ChainError::InsufficientBalance(_)));
    }
}
