//! Host-side checkpoint publication.
//!
//! Ordering requirement: the encrypted delta and the updated index are
//! stored *before* the proof is submitted on-chain. A storage failure
//! aborts the proof submission, so every on-chain proof always has a
//! recoverable delta behind it.

use crate::chain_adapter::ProofChain;
use crate::error::{CheckpointError, Result};
use crate::hash::{compute_checkpoint_hash, delta_signing_digest, index_signing_digest};
use crate::types::{CheckpointDelta, CheckpointEntry, CheckpointIndexDoc, TokenRange};
use infermesh_core::Message;
use infermesh_crypto::{EnvelopeAad, KeyPair, SessionCipher};
use infermesh_storage::{paths, StorageAdapter, StorageError};
use secp256k1::PublicKey;
use tracing::info;

/// One checkpoint boundary as reported by the inference subprocess.
#[derive(Debug, Clone)]
pub struct CheckpointInput {
    pub checkpoint_index: u64,
    pub start_token: u64,
    pub end_token: u64,
    /// Messages since the previous checkpoint.
    pub messages: Vec<Message>,
    /// Opaque proof from the prover; verified by the contract.
    pub proof_blob: Vec<u8>,
}

pub struct CheckpointPublisher<S, C> {
    store: S,
    chain: C,
    host_key: KeyPair,
    /// The client's static public key; deltas are sealed for it.
    client_public: PublicKey,
    session_id: u64,
}

impl<S: StorageAdapter, C: ProofChain> CheckpointPublisher<S, C> {
    pub fn new(
        store: S,
        chain: C,
        host_key: KeyPair,
        client_public: PublicKey,
        session_id: u64,
    ) -> Self {
        Self { store, chain, host_key, client_public, session_id }
    }

    /// Publish one checkpoint: delta first, index second, proof last.
    pub async fn publish(&self, input: CheckpointInput) -> Result<CheckpointEntry> {
        let token_count = input.end_token.saturating_sub(input.start_token);
        let proof_hash = compute_checkpoint_hash(&input.messages, token_count);

        let mut delta = CheckpointDelta {
            session_id: self.session_id,
            checkpoint_index: input.checkpoint_index,
            proof_hash,
            start_token: input.start_token,
            end_token: input.end_token,
            messages: input.messages,
            host_signature: String::new(),
        };
        let digest = delta_signing_digest(&delta);
        delta.host_signature = hex::encode(self.host_key.sign_recoverable(&digest)?);

        let host_address = self.host_key.address();
        let delta_ref =
            paths::checkpoint_delta(&host_address, self.session_id, input.checkpoint_index);

        // Seal the delta for the client's public key
        let cipher = SessionCipher::initiate(&self.client_public)?;
        let aad = EnvelopeAad {
            session_id: self.session_id,
            message_index: input.checkpoint_index,
            timestamp_ms: now_ms(),
        };
        let delta_json =
            serde_json::to_vec(&delta).expect("delta serialization is infallible");
        let envelope = cipher.seal(&self.host_key, &aad, &delta_json)?;
        let envelope_json =
            serde_json::to_vec(&envelope).expect("envelope serialization is infallible");
        self.store.put(&delta_ref, envelope_json).await?;

        // Update the index document
        let index_path = paths::checkpoint_index(&host_address, self.session_id);
        let mut doc = match self.store.get(&index_path).await {
            Ok(raw) => serde_json::from_slice::<CheckpointIndexDoc>(&raw)
                .map_err(|e| CheckpointError::InvalidDeltaStructure(format!("index: {e}")))?,
            Err(StorageError::NotFound(_)) => {
                CheckpointIndexDoc::new(self.session_id, host_address)
            }
            Err(e) => return Err(e.into()),
        };

        let entry = CheckpointEntry {
            index: input.checkpoint_index,
            proof_hash,
            delta_ref: delta_ref.clone(),
            token_range: TokenRange { start: input.start_token, end: input.end_token },
            timestamp: now_ms(),
        };
        doc.entries.push(entry.clone());
        if !doc.validate_continuity() {
            return Err(CheckpointError::DiscontinuousIndex { index: input.checkpoint_index });
        }

        doc.host_signature = String::new();
        let digest = index_signing_digest(&doc);
        doc.host_signature = hex::encode(self.host_key.sign_recoverable(&digest)?);
        let doc_json = serde_json::to_vec(&doc).expect("index serialization is infallible");
        self.store.put(&index_path, doc_json).await?;

        // Storage succeeded; the proof may go on-chain now
        self.chain
            .submit_proof(
                self.session_id,
                input.checkpoint_index,
                token_count,
                input.proof_blob,
            )
            .await?;

        info!(
            "checkpoint {} published for session {} ({} tokens)",
            input.checkpoint_index, self.session_id, token_count
        );
        Ok(entry)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
