//! # InferMesh Chain Client
//!
//! Typed, retry-aware access to the marketplace contracts across chains.
//!
//! Every call retries transient RPC failures with exponential backoff,
//! fails over across the configured endpoint list, and classifies
//! reverts as fatal. Amounts are `U256` end to end; nothing here does
//! float arithmetic on money.

pub mod client;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gas;
pub mod types;

pub use client::{ChainClient, MeshMiddleware};
pub use config::{ChainConfig, ChainsConfig, ValidatedChainConfig};
pub use error::{ChainError, Result};
pub use gas::GasProfile;
pub use types::{
    model_id_for, HostRecord, ModelRecord, ProofRecord, SessionDescriptor, SessionJobStatus,
};

// Re-export the ethers types that appear in this crate's public API so
// downstream crates don't need a direct ethers dependency.
pub use ethers::signers::LocalWallet;
pub use ethers::types::{Address as EthAddress, H256, U256};
