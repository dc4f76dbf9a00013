use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard-coded default deadlines, overridable by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Waiting for `session_ready` after `session_init`.
    pub session_init_secs: u64,
    /// Sending a prompt frame.
    pub prompt_send_secs: u64,
    /// Waiting for `upload_vectors_ack`.
    pub vector_upload_secs: u64,
    /// Waiting for `search_vectors_result`.
    pub vector_search_secs: u64,
    /// No `stream_chunk` for this long mid-stream is a stall.
    pub stream_idle_secs: u64,
    /// Total budget for checkpoint recovery fetches.
    pub recovery_fetch_secs: u64,
    /// Single RPC call.
    pub rpc_call_secs: u64,
    /// Waiting for a transaction receipt.
    pub tx_confirmation_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            session_init_secs: 30,
            prompt_send_secs: 15,
            vector_upload_secs: 30,
            vector_search_secs: 10,
            stream_idle_secs: 60,
            recovery_fetch_secs: 120,
            rpc_call_secs: 15,
            tx_confirmation_secs: 90,
        }
    }
}

impl Timeouts {
    pub fn session_init(&self) -> Duration {
        Duration::from_secs(self.session_init_secs)
    }

    pub fn prompt_send(&self) -> Duration {
        Duration::from_secs(self.prompt_send_secs)
    }

    pub fn vector_upload(&self) -> Duration {
        Duration::from_secs(self.vector_upload_secs)
    }

    pub fn vector_search(&self) -> Duration {
        Duration::from_secs(self.vector_search_secs)
    }

    pub fn stream_idle(&self) -> Duration {
        Duration::from_secs(self.stream_idle_secs)
    }

    pub fn recovery_fetch(&self) -> Duration {
        Duration::from_secs(self.recovery_fetch_secs)
    }

    pub fn rpc_call(&self) -> Duration {
        Duration::from_secs(self.rpc_call_secs)
    }

    pub fn tx_confirmation(&self) -> Duration {
        Duration::from_secs(self.tx_confirmation_secs)
    }
}
