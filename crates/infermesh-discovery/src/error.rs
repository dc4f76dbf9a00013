use infermesh_chain::ChainError;
use infermesh_core::{ErrorClass, Retryable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("No host matches the query (model {model}, {filtered} filtered out)")]
    NoHosts { model: String, filtered: usize },
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

impl Retryable for DiscoveryError {
    fn class(&self) -> ErrorClass {
        match self {
            DiscoveryError::Chain(e) => e.class(),
            DiscoveryError::NoHosts { .. } => ErrorClass::Fatal,
        }
    }
}
