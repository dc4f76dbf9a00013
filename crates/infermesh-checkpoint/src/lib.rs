//! # InferMesh Checkpoints
//!
//! A checkpoint is a pair: an on-chain proof marking a paid token
//! boundary, and an off-chain encrypted delta holding the messages
//! since the previous boundary. The host publishes the delta *before*
//! submitting the proof so any recoverer can verify; the client
//! reconstructs a dead session's conversation up to the last proven
//! boundary by verifying the index signature, the on-chain proof
//! hashes, and every delta's signature and structure.

pub mod chain_adapter;
pub mod error;
pub mod hash;
pub mod publisher;
pub mod recovery;
pub mod types;

pub use chain_adapter::ProofChain;
pub use error::{CheckpointError, Result};
pub use hash::compute_checkpoint_hash;
pub use publisher::{CheckpointInput, CheckpointPublisher};
pub use recovery::{RecoveredConversation, RecoveryClient};
pub use types::{CheckpointDelta, CheckpointEntry, CheckpointIndexDoc, TokenRange};
