use infermesh_core::Message;
use infermesh_crypto::Address;
use serde::{Deserialize, Serialize};

/// Hex serde for 32-byte hashes.
pub(crate) mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(de)?;
        let raw = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        raw.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

/// Half-open token interval `[start, end)` covered by one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRange {
    pub start: u64,
    pub end: u64,
}

impl TokenRange {
    pub fn count(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Messages added since the previous checkpoint. Immutable once
/// published; stored encrypted for the client's public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDelta {
    pub session_id: u64,
    pub checkpoint_index: u64,
    #[serde(with = "hex32")]
    pub proof_hash: [u8; 32],
    pub start_token: u64,
    pub end_token: u64,
    pub messages: Vec<Message>,
    /// Recoverable host signature over the canonical delta bytes.
    pub host_signature: String,
}

/// One row of the per-session checkpoint index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointEntry {
    pub index: u64,
    #[serde(with = "hex32")]
    pub proof_hash: [u8; 32],
    /// Storage path of the delta blob.
    pub delta_ref: String,
    pub token_range: TokenRange,
    pub timestamp: u64,
}

/// The per-session index document. Append-only in semantics;
/// last-writer-wins in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointIndexDoc {
    pub session_id: u64,
    pub host_address: Address,
    pub entries: Vec<CheckpointEntry>,
    pub host_signature: String,
}

impl CheckpointIndexDoc {
    pub fn new(session_id: u64, host_address: Address) -> Self {
        Self { session_id, host_address, entries: Vec::new(), host_signature: String::new() }
    }

    /// Entries must be contiguous: strictly increasing index, each
    /// range starting where the previous ended.
    pub fn validate_continuity(&self) -> bool {
        self.entries.windows(2).all(|pair| {
            pair[1].index == pair[0].index + 1
                && pair[1].token_range.start == pair[0].token_range.end
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u64, start: u64, end: u64) -> CheckpointEntry {
        CheckpointEntry {
            index,
            proof_hash: [0u8; 32],
            delta_ref: format!("delta-{index}"),
            token_range: TokenRange { start, end },
            timestamp: 0,
        }
    }

    #[test]
    fn test_continuity_holds() {
        let mut doc = CheckpointIndexDoc::new(1, Address::new([1; 20]));
        doc.entries = vec![entry(0, 0, 1000), entry(1, 1000, 2000)];
        assert!(doc.validate_continuity());
    }

    #[test]
    fn test_gap_in_tokens_rejected() {
        let mut doc = CheckpointIndexDoc::new(1, Address::new([1; 20]));
        doc.entries = vec![entry(0, 0, 1000), entry(1, 1100, 2000)];
        assert!(!doc.validate_continuity());
    }

    #[test]
    fn test_gap_in_index_rejected() {
        let mut doc = CheckpointIndexDoc::new(1, Address::new([1; 20]));
        doc.entries = vec![entry(0, 0, 1000), entry(2, 1000, 2000)];
        assert!(!doc.validate_continuity());
    }

    #[test]
    fn test_delta_serde_roundtrip() {
        let delta = CheckpointDelta {
            session_id: 9,
            checkpoint_index: 1,
            proof_hash: [0xaa; 32],
            start_token: 0,
            end_token: 1000,
            messages: vec![],
            host_signature: "00".into(),
        };
        let json = serde_json::to_string(&delta).unwrap();
        assert!(json.contains(&"aa".repeat(32)));
        let back: CheckpointDelta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.proof_hash, [0xaa; 32]);
    }
}
