//! The collection of live sessions.
//!
//! One engine instance per session; the manager is the only shared
//! map. Safe to use concurrently across sessions, per-session
//! operations go through the owned handle.

use crate::engine::{Session, SessionConfig, SessionHandle};
use crate::error::{Result, SessionError};
use crate::payments::PaymentManager;
use dashmap::DashMap;
use infermesh_core::SessionKey;
use infermesh_crypto::KeyPair;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionKey, SessionHandle>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and register its handle. Fails if the key is
    /// already live.
    pub async fn open(
        &self,
        config: SessionConfig,
        signer: KeyPair,
        payments: Option<Arc<PaymentManager>>,
    ) -> Result<SessionHandle> {
        let key = config.key;
        if self.sessions.contains_key(&key) {
            return Err(SessionError::Validation(format!("session {key} already open")));
        }
        let handle = Session::start(config, signer, payments).await?;
        self.sessions.insert(key, handle.clone());
        info!("session {key} registered ({} live)", self.sessions.len());
        Ok(handle)
    }

    pub fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop the handle for a finished session.
    pub fn remove(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.remove(key).map(|(_, handle)| handle)
    }

    /// End every live session, best effort.
    pub async fn end_all(&self) {
        let keys: Vec<SessionKey> = self.sessions.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some(handle) = self.remove(&key) {
                let _ = handle.end().await;
            }
        }
    }
}
