//! Wire frames for the host WebSocket.
//!
//! One JSON object per WebSocket message, discriminated by `type`.
//! Every frame carries `chainId`. Encrypted traffic uses the same
//! schemas with an `encrypted_` type prefix and an envelope body; see
//! [`crate::codec`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Sampling parameters forwarded with a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptParameters {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for PromptParameters {
    fn default() -> Self {
        Self { max_tokens: 1024, temperature: 0.7 }
    }
}

/// A vector as shipped over the wire. Dimension checks live in the
/// attachment layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    #[serde(rename_all = "camelCase")]
    SessionInit {
        chain_id: u64,
        session_id: u64,
        job_id: u64,
        model_name: String,
        encryption: bool,
    },
    #[serde(rename_all = "camelCase")]
    SessionReady {
        chain_id: u64,
        session_id: u64,
        server_version: String,
        protocol_version: String,
    },
    #[serde(rename_all = "camelCase")]
    Prompt {
        chain_id: u64,
        session_id: u64,
        message_index: u64,
        content: String,
        parameters: PromptParameters,
    },
    #[serde(rename_all = "camelCase")]
    PromptWithContext {
        chain_id: u64,
        session_id: u64,
        message_index: u64,
        content: String,
        context: Vec<String>,
        parameters: PromptParameters,
    },
    #[serde(rename_all = "camelCase")]
    StreamChunk {
        chain_id: u64,
        session_id: u64,
        message_index: u64,
        token: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StreamEnd {
        chain_id: u64,
        session_id: u64,
        message_index: u64,
        total_tokens: u64,
    },
    #[serde(rename_all = "camelCase")]
    UploadVectors {
        chain_id: u64,
        session_id: u64,
        vectors: Vec<VectorRecord>,
        replace: bool,
    },
    #[serde(rename_all = "camelCase")]
    UploadVectorsAck {
        chain_id: u64,
        session_id: u64,
        uploaded: u32,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SearchVectors {
        chain_id: u64,
        session_id: u64,
        query_vector: Vec<f32>,
        k: u32,
        threshold: f32,
    },
    #[serde(rename_all = "camelCase")]
    SearchVectorsResult {
        chain_id: u64,
        session_id: u64,
        results: Vec<VectorSearchResult>,
    },
    #[serde(rename_all = "camelCase")]
    CheckpointNotice {
        chain_id: u64,
        session_id: u64,
        checkpoint_index: u64,
        proof_hash_hex: String,
        token_range_end: u64,
    },
    #[serde(rename_all = "camelCase")]
    SessionClose { chain_id: u64, session_id: u64 },
    #[serde(rename_all = "camelCase")]
    Error {
        chain_id: u64,
        code: String,
        message: String,
        retryable: bool,
    },
}

impl Frame {
    /// The wire `type` tag of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::SessionInit { .. } => "session_init",
            Frame::SessionReady { .. } => "session_ready",
            Frame::Prompt { .. } => "prompt",
            Frame::PromptWithContext { .. } => "prompt_with_context",
            Frame::StreamChunk { .. } => "stream_chunk",
            Frame::StreamEnd { .. } => "stream_end",
            Frame::UploadVectors { .. } => "upload_vectors",
            Frame::UploadVectorsAck { .. } => "upload_vectors_ack",
            Frame::SearchVectors { .. } => "search_vectors",
            Frame::SearchVectorsResult { .. } => "search_vectors_result",
            Frame::CheckpointNotice { .. } => "checkpoint_notice",
            Frame::SessionClose { .. } => "session_close",
            Frame::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_wire_shape() {
        let frame = Frame::Prompt {
            chain_id: 84532,
            session_id: 7,
            message_index: 2,
            content: "Hello".into(),
            parameters: PromptParameters::default(),
        };
        let json: Value = serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(json["type"], "prompt");
        assert_eq!(json["chainId"], 84532);
        assert_eq!(json["messageIndex"], 2);
        assert_eq!(json["parameters"]["maxTokens"], 1024);
    }

    #[test]
    fn test_stream_chunk_roundtrip() {
        let text = r#"{"type":"stream_chunk","chainId":1,"sessionId":7,"messageIndex":2,"token":"Hi"}"#;
        let frame: Frame = serde_json::from_str(text).unwrap();
        match &frame {
            Frame::StreamChunk { finish_reason, token, .. } => {
                assert!(finish_reason.is_none());
                assert_eq!(token, "Hi");
            }
            other => panic!("wrong frame: {other:?}"),
        }
        assert_eq!(frame.kind(), "stream_chunk");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let text = r#"{"type":"mystery","chainId":1}"#;
        assert!(serde_json::from_str::<Frame>(text).is_err());
    }

    #[test]
    fn test_kind_matches_serde_tag() {
        let frame = Frame::SessionClose { chain_id: 1, session_id: 2 };
        let json: Value = serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(json["type"], frame.kind());
    }
}
