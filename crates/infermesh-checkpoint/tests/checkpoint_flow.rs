//! End-to-end checkpoint publication and recovery over in-memory
//! storage and a stub proof chain.

use async_trait::async_trait;
use dashmap::DashMap;
use infermesh_chain::{ProofRecord, H256, U256};
use infermesh_checkpoint::{
    compute_checkpoint_hash, CheckpointError, CheckpointInput, CheckpointPublisher, ProofChain,
    RecoveryClient,
};
use infermesh_core::{Message, Role};
use infermesh_crypto::KeyPair;
use infermesh_storage::{paths, MemoryStore, StorageAdapter};
use std::sync::Arc;

/// Proof table keyed by `(sessionId, checkpointIndex)`; submission
/// hashes the blob's committed payload the way the contract does.
#[derive(Default)]
struct StubProofChainInner {
    proofs: DashMap<(u64, u64), ProofRecord>,
}

#[derive(Default, Clone)]
struct StubProofChain(Arc<StubProofChainInner>);

#[async_trait]
impl ProofChain for StubProofChain {
    async fn proof_record(
        &self,
        session_id: u64,
        checkpoint_index: u64,
    ) -> infermesh_checkpoint::Result<Option<ProofRecord>> {
        Ok(self.0.proofs.get(&(session_id, checkpoint_index)).map(|r| r.clone()))
    }

    async fn submit_proof(
        &self,
        session_id: u64,
        checkpoint_index: u64,
        token_count: u64,
        proof_blob: Vec<u8>,
    ) -> infermesh_checkpoint::Result<()> {
        // The stub contract's verified proof hash is carried in the blob
        let proof_hash = H256::from_slice(&proof_blob[..32]);
        self.0.proofs.insert(
            (session_id, checkpoint_index),
            ProofRecord {
                session_id,
                checkpoint_index,
                proof_hash,
                token_count: U256::from(token_count),
                start_token: 0,
                end_token: token_count,
                submitted_at: 0,
            },
        );
        Ok(())
    }
}

fn msg(index: u64, role: Role, content: &str) -> Message {
    Message::new(index, role, content, 1_700_000_000_000 + index)
}

struct Harness {
    store: Arc<MemoryStore>,
    chain: StubProofChain,
    host: KeyPair,
    client: KeyPair,
    session_id: u64,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            chain: StubProofChain::default(),
            host: KeyPair::generate(),
            client: KeyPair::generate(),
            session_id: 42,
        }
    }

    fn publisher(&self) -> CheckpointPublisher<Arc<MemoryStore>, StubProofChain> {
        CheckpointPublisher::new(
            self.store.clone(),
            self.chain.clone(),
            self.host.clone(),
            *self.client.public_key(),
            self.session_id,
        )
    }

    fn recovery(&self) -> RecoveryClient<Arc<MemoryStore>, StubProofChain> {
        RecoveryClient::new(
            self.store.clone(),
            self.chain.clone(),
            self.client.clone(),
            self.host.address(),
        )
    }

    fn input(&self, index: u64, start: u64, end: u64, messages: Vec<Message>) -> CheckpointInput {
        // Blob leads with the commitment, mimicking the prover output
        let hash = compute_checkpoint_hash(&messages, end - start);
        let mut blob = hash.to_vec();
        blob.extend_from_slice(b"opaque-proof-payload");
        CheckpointInput { checkpoint_index: index, start_token: start, end_token: end, messages, proof_blob: blob }
    }
}

#[tokio::test]
async fn test_publish_then_recover_two_checkpoints() {
    let h = Harness::new();
    let publisher = h.publisher();

    publisher
        .publish(h.input(
            0,
            0,
            1000,
            vec![msg(0, Role::User, "Hello"), msg(1, Role::Assistant, "Hi! How can ")],
        ))
        .await
        .unwrap();
    publisher
        .publish(h.input(
            1,
            1000,
            2000,
            vec![msg(1, Role::Assistant, "I help you?"), msg(2, Role::User, "Explain escrow")],
        ))
        .await
        .unwrap();

    let recovered = h.recovery().recover(h.session_id).await.unwrap();
    assert_eq!(recovered.token_count, 2000);
    assert_eq!(recovered.checkpoints.len(), 2);
    // The assistant message split across the boundary is stitched back
    assert_eq!(recovered.messages.len(), 3);
    assert_eq!(recovered.messages[1].content, "Hi! How can I help you?");
}

#[tokio::test]
async fn test_recover_without_index_is_empty() {
    let h = Harness::new();
    let recovered = h.recovery().recover(h.session_id).await.unwrap();
    assert!(recovered.messages.is_empty());
    assert_eq!(recovered.token_count, 0);
    assert!(recovered.checkpoints.is_empty());
}

#[tokio::test]
async fn test_proof_hash_tampering_detected() {
    let h = Harness::new();
    h.publisher()
        .publish(h.input(0, 0, 1000, vec![msg(0, Role::User, "Hello")]))
        .await
        .unwrap();

    // Corrupt the on-chain record
    let key = (h.session_id, 0);
    let mut record = h.chain.0.proofs.get(&key).unwrap().clone();
    record.proof_hash = H256::from([0xde; 32]);
    h.chain.0.proofs.insert(key, record);

    let err = h.recovery().recover(h.session_id).await.unwrap_err();
    assert_eq!(err.code(), "PROOF_HASH_MISMATCH");
    assert!(matches!(err, CheckpointError::ProofHashMismatch { index: 0 }));
}

#[tokio::test]
async fn test_missing_onchain_proof_is_a_mismatch() {
    let h = Harness::new();
    h.publisher()
        .publish(h.input(0, 0, 1000, vec![msg(0, Role::User, "Hello")]))
        .await
        .unwrap();
    h.chain.0.proofs.clear();

    let err = h.recovery().recover(h.session_id).await.unwrap_err();
    assert_eq!(err.code(), "PROOF_HASH_MISMATCH");
}

#[tokio::test]
async fn test_index_signed_by_wrong_key_rejected() {
    let h = Harness::new();
    h.publisher()
        .publish(h.input(0, 0, 1000, vec![msg(0, Role::User, "Hello")]))
        .await
        .unwrap();

    // A recoverer expecting a different host must reject the index
    let impostor = KeyPair::generate();
    let recovery = RecoveryClient::new(
        h.store.clone(),
        h.chain.clone(),
        h.client.clone(),
        impostor.address(),
    );
    // The index lives under the real host's path, so for the impostor
    // host the index is simply absent; recovery under the real path but
    // a tampered document must fail on the signature instead.
    let empty = recovery.recover(h.session_id).await.unwrap();
    assert!(empty.messages.is_empty());

    let index_path = paths::checkpoint_index(&h.host.address(), h.session_id);
    let raw = h.store.get(&index_path).await.unwrap();
    let mut doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    doc["entries"][0]["tokenRange"]["end"] = serde_json::json!(5000);
    h.store.put(&index_path, serde_json::to_vec(&doc).unwrap()).await.unwrap();

    let err = h.recovery().recover(h.session_id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INDEX_SIGNATURE");
}

#[tokio::test]
async fn test_missing_delta_is_fetch_failure() {
    let h = Harness::new();
    h.publisher()
        .publish(h.input(0, 0, 1000, vec![msg(0, Role::User, "Hello")]))
        .await
        .unwrap();

    let delta_path = paths::checkpoint_delta(&h.host.address(), h.session_id, 0);
    h.store.delete(&delta_path).await.unwrap();

    let err = h.recovery().recover(h.session_id).await.unwrap_err();
    assert_eq!(err.code(), "DELTA_FETCH_FAILED");
}

#[tokio::test]
async fn test_discontinuous_publication_rejected() {
    let h = Harness::new();
    let publisher = h.publisher();
    publisher
        .publish(h.input(0, 0, 1000, vec![msg(0, Role::User, "Hello")]))
        .await
        .unwrap();
    // Skips checkpoint index 1 and leaves a token gap
    let err = publisher
        .publish(h.input(2, 1500, 2500, vec![msg(1, Role::Assistant, "x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckpointError::DiscontinuousIndex { index: 2 }));
}
