use infermesh_core::{ErrorClass, Retryable, SessionStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Operation `{operation}` invalid in state {state}")]
    InvalidState { operation: &'static str, state: SessionStatus },

    #[error(transparent)]
    Encryption(#[from] infermesh_crypto::CryptoError),

    #[error(transparent)]
    Chain(#[from] infermesh_chain::ChainError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream stalled: no chunk within the idle window")]
    Stall,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Host error {code}: {message}")]
    Host { code: String, message: String, retryable: bool },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient deposit: need {needed}, have {available}")]
    InsufficientDeposit { needed: String, available: String },

    #[error("Price {price} exceeds cap {cap}")]
    PriceAboveCap { price: String, cap: String },

    #[error("Session task is gone")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl Retryable for SessionError {
    fn class(&self) -> ErrorClass {
        match self {
            SessionError::Network(_) | SessionError::Stall | SessionError::Timeout(_) => {
                ErrorClass::Transient
            }
            SessionError::Host { retryable, .. } if *retryable => ErrorClass::Transient,
            SessionError::Chain(e) => e.class(),
            _ => ErrorClass::Fatal,
        }
    }
}

impl SessionError {
    /// Stable machine-readable code for user-visible reporting.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Protocol(_) => "PROTOCOL_ERROR",
            SessionError::InvalidState { .. } => "STATE_ERROR",
            SessionError::Encryption(_) => "ENCRYPTION_ERROR",
            SessionError::Chain(_) => "CHAIN_ERROR",
            SessionError::Network(_) => "NETWORK_ERROR",
            SessionError::Stall => "STALL_ERROR",
            SessionError::Timeout(_) => "TIMEOUT",
            SessionError::Host { .. } => "HOST_ERROR",
            SessionError::Validation(_) => "VALIDATION_ERROR",
            SessionError::InsufficientDeposit { .. } => "INSUFFICIENT_DEPOSIT",
            SessionError::PriceAboveCap { .. } => "PRICE_ABOVE_CAP",
            SessionError::Closed => "SESSION_CLOSED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall_is_transient_validation_is_not() {
        assert!(SessionError::Stall.is_transient());
        assert!(!SessionError::Validation("k out of range".into()).is_transient());
    }

    #[test]
    fn test_host_error_retryable_hint() {
        let retryable =
            SessionError::Host { code: "busy".into(), message: "".into(), retryable: true };
        let fatal =
            SessionError::Host { code: "bad".into(), message: "".into(), retryable: false };
        assert!(retryable.is_transient());
        assert!(!fatal.is_transient());
    }
}
