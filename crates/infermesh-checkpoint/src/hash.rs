//! Deterministic checkpoint commitments.

use crate::types::{CheckpointDelta, CheckpointIndexDoc};
use infermesh_core::Message;
use infermesh_crypto::{keccak256, Hash};

/// Commitment over a message sequence and its token count.
///
/// Keccak256 of the canonical JSON `[messages, tokenCount]`; message
/// order is part of the commitment.
pub fn compute_checkpoint_hash(messages: &[Message], token_count: u64) -> Hash {
    let canonical = serde_json::to_vec(&(messages, token_count))
        .expect("message serialization is infallible");
    keccak256(&canonical)
}

/// Digest a delta for signing: the canonical JSON with the signature
/// field emptied.
pub fn delta_signing_digest(delta: &CheckpointDelta) -> Hash {
    let mut unsigned = delta.clone();
    unsigned.host_signature = String::new();
    keccak256(&serde_json::to_vec(&unsigned).expect("delta serialization is infallible"))
}

/// Digest an index document for signing, same convention as deltas.
pub fn index_signing_digest(doc: &CheckpointIndexDoc) -> Hash {
    let mut unsigned = doc.clone();
    unsigned.host_signature = String::new();
    keccak256(&serde_json::to_vec(&unsigned).expect("index serialization is infallible"))
}
