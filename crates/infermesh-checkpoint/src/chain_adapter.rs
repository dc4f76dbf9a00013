//! Capability surface the checkpoint protocol needs from the chain.
//!
//! A narrow trait instead of the whole client keeps the publisher and
//! recovery testable against an in-memory proof table.

use crate::error::Result;
use async_trait::async_trait;
use infermesh_chain::{ChainClient, ProofRecord};
use std::sync::Arc;

#[async_trait]
pub trait ProofChain: Send + Sync {
    /// The proof at `(sessionId, checkpointIndex)`, or `None` if the
    /// slot was never proven.
    async fn proof_record(&self, session_id: u64, checkpoint_index: u64)
        -> Result<Option<ProofRecord>>;

    /// Host-side submission. The contract verifies the blob and
    /// advances `lastProvenTokens`.
    async fn submit_proof(
        &self,
        session_id: u64,
        checkpoint_index: u64,
        token_count: u64,
        proof_blob: Vec<u8>,
    ) -> Result<()>;
}

#[async_trait]
impl ProofChain for Arc<ChainClient> {
    async fn proof_record(
        &self,
        session_id: u64,
        checkpoint_index: u64,
    ) -> Result<Option<ProofRecord>> {
        let record = ChainClient::get_proof_submission(self, session_id, checkpoint_index).await?;
        // An unset slot reads back as all zeroes
        if record.proof_hash.is_zero() {
            Ok(None)
        } else {
            Ok(Some(record))
        }
    }

    async fn submit_proof(
        &self,
        session_id: u64,
        checkpoint_index: u64,
        token_count: u64,
        proof_blob: Vec<u8>,
    ) -> Result<()> {
        ChainClient::submit_proof(self, session_id, checkpoint_index, token_count, proof_blob)
            .await?;
        Ok(())
    }
}
