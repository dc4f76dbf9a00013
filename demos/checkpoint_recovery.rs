//! Checkpoint publication and recovery, fully in-memory.
//!
//! Shows the host-side publish path (delta before proof) and the
//! client-side verification chain without any infrastructure:
//!
//! ```sh
//! cargo run --example checkpoint_recovery
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use infermesh_chain::{ProofRecord, H256, U256};
use infermesh_checkpoint::{
    compute_checkpoint_hash, CheckpointInput, CheckpointPublisher, ProofChain, RecoveryClient,
};
use infermesh_core::{Message, Role};
use infermesh_crypto::KeyPair;
use infermesh_storage::MemoryStore;
use std::sync::Arc;

/// Stands in for the proof-system contract: stores whatever hash the
/// proof blob commits to.
#[derive(Default)]
struct LocalProofChainInner {
    proofs: DashMap<(u64, u64), ProofRecord>,
}

#[derive(Default, Clone)]
struct LocalProofChain(Arc<LocalProofChainInner>);

#[async_trait]
impl ProofChain for LocalProofChain {
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
        println!("  proof {checkpoint_index} on-chain: {proof_hash:#x}");
        Ok(())
    }
}

fn msg(index: u64, role: Role, content: &str) -> Message {
    Message::new(index, role, content, 1_700_000_000_000 + index)
}

fn input(index: u64, start: u64, end: u64, messages: Vec<Message>) -> CheckpointInput {
    let hash = compute_checkpoint_hash(&messages, end - start);
    let mut blob = hash.to_vec();
    blob.extend_from_slice(b"prover-payload");
    CheckpointInput {
        checkpoint_index: index,
        start_token: start,
        end_token: end,
        messages,
        proof_blob: blob,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let chain = LocalProofChain::default();
    let host = KeyPair::generate();
    let client = KeyPair::generate();
    let session_id = 42;

    println!("host publishes two checkpoints:");
    let publisher = CheckpointPublisher::new(
        store.clone(),
        chain.clone(),
        host.clone(),
        *client.public_key(),
        session_id,
    );
    publisher
        .publish(input(
            0,
            0,
            1000,
            vec![
                msg(0, Role::User, "Summarize the escrow design."),
                msg(1, Role::Assistant, "Deposits are held by the marketplace "),
            ],
        ))
        .await?;
    publisher
        .publish(input(
            1,
            1000,
            2000,
            vec![
                msg(1, Role::Assistant, "until proofs of streamed tokens settle them."),
                msg(2, Role::User, "Who gets the fees?"),
            ],
        ))
        .await?;

    println!("client recovers after losing the socket:");
    let recovery = RecoveryClient::new(store, chain, client, host.address());
    let recovered = recovery.recover(session_id).await?;
    println!(
        "  {} messages, {} proven tokens, {} checkpoints",
        recovered.messages.len(),
        recovered.token_count,
        recovered.checkpoints.len()
    );
    for message in &recovered.messages {
        println!("  [{}] {:?}: {}", message.index, message.role, message.content);
    }
    Ok(())
}
