//! Client-side conversation recovery.
//!
//! Reconstructs a session's conversation up to the last proven
//! boundary. Every failure mode is fatal to the attempt and none of
//! them corrupts local state; the caller may retry after fixing the
//! underlying transport.

use crate::chain_adapter::ProofChain;
use crate::error::{CheckpointError, Result};
use crate::hash::{compute_checkpoint_hash, delta_signing_digest, index_signing_digest};
use crate::types::{CheckpointDelta, CheckpointEntry, CheckpointIndexDoc};
use infermesh_core::{Message, Role, Timeouts};
use infermesh_crypto::{recover_address, Address, CryptoError, Envelope, KeyPair, SessionCipher};
use infermesh_storage::{paths, StorageAdapter, StorageError};
use tracing::{debug, info};

/// The result of a recovery pass.
#[derive(Debug, Clone, Default)]
pub struct RecoveredConversation {
    pub messages: Vec<Message>,
    /// Sum of the proven token ranges.
    pub token_count: u64,
    pub checkpoints: Vec<CheckpointEntry>,
}

pub struct RecoveryClient<S, C> {
    store: S,
    chain: C,
    client_key: KeyPair,
    host_address: Address,
    timeouts: Timeouts,
}

impl<S: StorageAdapter, C: ProofChain> RecoveryClient<S, C> {
    pub fn new(store: S, chain: C, client_key: KeyPair, host_address: Address) -> Self {
        Self { store, chain, client_key, host_address, timeouts: Timeouts::default() }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Recover everything proven for `session_id`.
    pub async fn recover(&self, session_id: u64) -> Result<RecoveredConversation> {
        tokio::time::timeout(self.timeouts.recovery_fetch(), self.recover_inner(session_id))
            .await
            .map_err(|_| CheckpointError::RecoveryTimeout)?
    }

    async fn recover_inner(&self, session_id: u64) -> Result<RecoveredConversation> {
        let index_path = paths::checkpoint_index(&self.host_address, session_id);
        let raw = match self.store.get(&index_path).await {
            Ok(raw) => raw,
            Err(StorageError::NotFound(_)) => {
                debug!("no checkpoint index for session {session_id}");
                return Ok(RecoveredConversation::default());
            }
            Err(e) => return Err(e.into()),
        };

        let doc: CheckpointIndexDoc = serde_json::from_slice(&raw)
            .map_err(|e| CheckpointError::InvalidDeltaStructure(format!("index: {e}")))?;
        self.verify_index(session_id, &doc)?;

        let mut result = RecoveredConversation::default();
        for entry in &doc.entries {
            self.verify_onchain_proof(session_id, entry).await?;
            let delta = self.fetch_delta(session_id, entry).await?;
            merge_delta(&mut result.messages, delta.messages);
            result.token_count += entry.token_range.count();
            result.checkpoints.push(entry.clone());
        }

        info!(
            "recovered session {}: {} messages across {} checkpoints ({} tokens)",
            session_id,
            result.messages.len(),
            result.checkpoints.len(),
            result.token_count
        );
        Ok(result)
    }

    fn verify_index(&self, session_id: u64, doc: &CheckpointIndexDoc) -> Result<()> {
        if doc.session_id != session_id || doc.host_address != self.host_address {
            return Err(CheckpointError::InvalidDeltaStructure(
                "index names a different session or host".into(),
            ));
        }
        let signature = hex::decode(&doc.host_signature)
            .map_err(|_| CheckpointError::InvalidIndexSignature)?;
        let digest = index_signing_digest(doc);
        let signer = recover_address(&digest, &signature)
            .map_err(|_| CheckpointError::InvalidIndexSignature)?;
        if signer != self.host_address {
            return Err(CheckpointError::InvalidIndexSignature);
        }
        if !doc.validate_continuity() {
            return Err(CheckpointError::InvalidDeltaStructure(
                "index entries not contiguous".into(),
            ));
        }
        Ok(())
    }

    async fn verify_onchain_proof(&self, session_id: u64, entry: &CheckpointEntry) -> Result<()> {
        let record = self
            .chain
            .proof_record(session_id, entry.index)
            .await?
            .ok_or(CheckpointError::ProofHashMismatch { index: entry.index })?;
        if record.proof_hash.0 != entry.proof_hash {
            return Err(CheckpointError::ProofHashMismatch { index: entry.index });
        }
        Ok(())
    }

    async fn fetch_delta(
        &self,
        session_id: u64,
        entry: &CheckpointEntry,
    ) -> Result<CheckpointDelta> {
        let raw = self
            .store
            .get(&entry.delta_ref)
            .await
            .map_err(|e| CheckpointError::DeltaFetchFailed(format!("{}: {e}", entry.delta_ref)))?;
        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|e| CheckpointError::DeltaFetchFailed(format!("{}: {e}", entry.delta_ref)))?;

        let ephemeral = hex::decode(&envelope.ephemeral_public_key_hex)
            .map_err(|e| CheckpointError::DeltaFetchFailed(format!("ephemeral key: {e}")))?;
        let cipher = SessionCipher::respond(&self.client_key, &ephemeral)?;
        let (_aad, plaintext) = cipher
            .open(&envelope, Some(self.host_address))
            .map_err(|e| match e {
                CryptoError::SenderMismatch { .. } => {
                    CheckpointError::InvalidDeltaSignature { index: entry.index }
                }
                other => CheckpointError::Crypto(other),
            })?;

        let delta: CheckpointDelta = serde_json::from_slice(&plaintext)
            .map_err(|e| CheckpointError::InvalidDeltaStructure(e.to_string()))?;
        self.verify_delta(session_id, entry, &delta)?;
        Ok(delta)
    }

    fn verify_delta(
        &self,
        session_id: u64,
        entry: &CheckpointEntry,
        delta: &CheckpointDelta,
    ) -> Result<()> {
        let signature = hex::decode(&delta.host_signature)
            .map_err(|_| CheckpointError::InvalidDeltaSignature { index: entry.index })?;
        let digest = delta_signing_digest(delta);
        let signer = recover_address(&digest, &signature)
            .map_err(|_| CheckpointError::InvalidDeltaSignature { index: entry.index })?;
        if signer != self.host_address {
            return Err(CheckpointError::InvalidDeltaSignature { index: entry.index });
        }

        if delta.session_id != session_id
            || delta.checkpoint_index != entry.index
            || delta.start_token != entry.token_range.start
            || delta.end_token != entry.token_range.end
        {
            return Err(CheckpointError::InvalidDeltaStructure(format!(
                "delta fields disagree with index entry {}",
                entry.index
            )));
        }
        if delta.proof_hash != entry.proof_hash {
            return Err(CheckpointError::ProofHashMismatch { index: entry.index });
        }
        // The proof hash commits to the message content
        let recomputed =
            compute_checkpoint_hash(&delta.messages, entry.token_range.count());
        if recomputed != delta.proof_hash {
            return Err(CheckpointError::InvalidDeltaStructure(format!(
                "delta {} messages do not match its proof hash",
                entry.index
            )));
        }
        Ok(())
    }
}

/// Append a delta's messages, concatenating an assistant message that
/// continues across the boundary (same index, both assistant).
fn merge_delta(merged: &mut Vec<Message>, incoming: Vec<Message>) {
    let mut iter = incoming.into_iter();
    if let Some(first) = iter.next() {
        match merged.last_mut() {
            Some(last)
                if last.role == Role::Assistant
                    && first.role == Role::Assistant
                    && last.index == first.index =>
            {
                last.content.push_str(&first.content);
            }
            _ => merged.push(first),
        }
        merged.extend(iter);
    }
}
