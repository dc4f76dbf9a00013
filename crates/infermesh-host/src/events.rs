//! Session lifecycle events from the inference subprocess.
//!
//! The engine exposes a local WebSocket; the supervisor is its only
//! consumer. Events are JSON objects discriminated by `event`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    /// A client asked for a session; informational.
    #[serde(rename_all = "camelCase")]
    SessionRequest { session_id: u64 },

    /// A session was claimed and is live. Carries what the supervisor
    /// needs for checkpointing.
    #[serde(rename_all = "camelCase")]
    SessionStart {
        session_id: u64,
        /// Tokens between proof boundaries.
        proof_interval: u64,
        /// Uncompressed SEC1 hex of the client's public key; deltas
        /// are sealed for it.
        client_public_key_hex: String,
    },

    /// A proof boundary was crossed: the engine hands over the proof
    /// blob and the messages it covers.
    #[serde(rename_all = "camelCase")]
    ProofBoundary {
        session_id: u64,
        checkpoint_index: u64,
        start_token: u64,
        end_token: u64,
        messages: Vec<infermesh_core::Message>,
        proof_blob_hex: String,
    },

    /// One inference turn finished.
    #[serde(rename_all = "camelCase")]
    InferenceComplete { session_id: u64, total_tokens: u64 },

    /// The session's WebSocket closed; vectors are discarded.
    #[serde(rename_all = "camelCase")]
    SessionEnd { session_id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let text = r#"{"event":"session-start","sessionId":7,"proofInterval":1000,"clientPublicKeyHex":"04ab"}"#;
        let event: HostEvent = serde_json::from_str(text).unwrap();
        assert_eq!(
            event,
            HostEvent::SessionStart {
                session_id: 7,
                proof_interval: 1000,
                client_public_key_hex: "04ab".into()
            }
        );
    }

    #[test]
    fn test_proof_boundary_roundtrip() {
        let event = HostEvent::ProofBoundary {
            session_id: 7,
            checkpoint_index: 0,
            start_token: 0,
            end_token: 1000,
            messages: vec![],
            proof_blob_hex: "deadbeef".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"proof-boundary\""));
        let back: HostEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
