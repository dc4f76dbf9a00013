//! Proof scheduling.
//!
//! Tracks live sessions announced by the engine and turns every
//! `proof-boundary` event into a checkpoint publication: delta to
//! storage, index update, proof on-chain. Transient chain failures are
//! retried; a storage failure aborts the proof entirely.

use crate::error::{HostError, Result};
use crate::events::HostEvent;
use infermesh_chain::ChainClient;
use infermesh_checkpoint::{CheckpointInput, CheckpointPublisher};
use infermesh_core::{retry, RetryPolicy};
use infermesh_crypto::KeyPair;
use infermesh_storage::StorageAdapter;
use parking_lot::Mutex;
use secp256k1::PublicKey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

struct LiveSession {
    client_public: PublicKey,
    proof_interval: u64,
}

pub struct ProofScheduler<S> {
    store: S,
    chain: Arc<ChainClient>,
    host_key: KeyPair,
    sessions: Mutex<HashMap<u64, LiveSession>>,
    retry_policy: RetryPolicy,
}

impl<S: StorageAdapter + Clone> ProofScheduler<S> {
    pub fn new(store: S, chain: Arc<ChainClient>, host_key: KeyPair) -> Self {
        Self {
            store,
            chain,
            host_key,
            sessions: Mutex::new(HashMap::new()),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Feed one engine event through the scheduler.
    pub async fn handle_event(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::SessionRequest { session_id } => {
                info!("session {session_id} requested");
            }
            HostEvent::SessionStart { session_id, proof_interval, client_public_key_hex } => {
                let raw = hex::decode(&client_public_key_hex)
                    .map_err(|e| HostError::EventSocket(format!("client key: {e}")))?;
                let client_public = PublicKey::from_slice(&raw)
                    .map_err(|e| HostError::EventSocket(format!("client key: {e}")))?;
                self.sessions
                    .lock()
                    .insert(session_id, LiveSession { client_public, proof_interval });
                info!(
                    "session {session_id} started (proof interval {proof_interval} tokens)"
                );
            }
            HostEvent::ProofBoundary {
                session_id,
                checkpoint_index,
                start_token,
                end_token,
                messages,
                proof_blob_hex,
            } => {
                let (client_public, proof_interval) = {
                    let sessions = self.sessions.lock();
                    let Some(live) = sessions.get(&session_id) else {
                        warn!("proof boundary for unknown session {session_id}, dropping");
                        return Ok(());
                    };
                    (live.client_public, live.proof_interval)
                };
                if end_token.saturating_sub(start_token) > proof_interval {
                    warn!(
                        "session {session_id} boundary spans {} tokens, interval is {}",
                        end_token.saturating_sub(start_token),
                        proof_interval
                    );
                }
                let proof_blob = hex::decode(&proof_blob_hex)
                    .map_err(|e| HostError::EventSocket(format!("proof blob: {e}")))?;

                let publisher = CheckpointPublisher::new(
                    self.store.clone(),
                    self.chain.clone(),
                    self.host_key.clone(),
                    client_public,
                    session_id,
                );
                let input = CheckpointInput {
                    checkpoint_index,
                    start_token,
                    end_token,
                    messages,
                    proof_blob,
                };
                retry(&self.retry_policy, "publish checkpoint", || {
                    publisher.publish(input.clone())
                })
                .await?;
            }
            HostEvent::InferenceComplete { session_id, total_tokens } => {
                info!("session {session_id} turn complete ({total_tokens} tokens)");
            }
            HostEvent::SessionEnd { session_id } => {
                self.sessions.lock().remove(&session_id);
                // Whoever settles second sees AlreadyCompleted; both
                // outcomes pay proven work correctly.
                match self.chain.complete_session(session_id).await {
                    Ok(()) => info!("session {session_id} settled by host"),
                    Err(infermesh_chain::ChainError::AlreadyCompleted(_)) => {
                        info!("session {session_id} already settled by client")
                    }
                    Err(e) => warn!("settlement for session {session_id} failed: {e}"),
                }
            }
        }
        Ok(())
    }
}
