use crate::error::{ChainError, Result};
use ethers::types::{Address as EthAddress, H256, U256};
use ethers::utils::keccak256;
use infermesh_core::ChainId;
use serde::{Deserialize, Serialize};

/// On-chain session job status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionJobStatus {
    Posted,
    Claimed,
    Active,
    Completed,
    Failed,
}

impl SessionJobStatus {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Posted),
            1 => Ok(Self::Claimed),
            2 => Ok(Self::Active),
            3 => Ok(Self::Completed),
            4 => Ok(Self::Failed),
            other => {
                Err(ChainError::MalformedResponse(format!("unknown session status {other}")))
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Cached projection of an on-chain session job. The chain is the
/// source of truth; this struct is what queries hand back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub chain_id: ChainId,
    pub session_id: u64,
    pub user: EthAddress,
    pub host: EthAddress,
    pub model_id: H256,
    pub token: EthAddress,
    pub deposit_remaining: U256,
    pub price_per_token: U256,
    pub started_at: u64,
    pub last_checkpoint_index: u64,
    pub status: SessionJobStatus,
}

/// A registered host as read from the node registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub address: EthAddress,
    pub api_url: String,
    pub stake: U256,
    pub price_per_token: U256,
    pub supported_models: Vec<H256>,
    pub active: bool,
    pub metadata_ref: String,
}

/// A model known to the registry. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: H256,
    pub repo: String,
    pub filename: String,
    pub content_hash: H256,
    pub active: bool,
}

/// An on-chain proof submission at `(sessionId, checkpointIndex)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRecord {
    pub session_id: u64,
    pub checkpoint_index: u64,
    pub proof_hash: H256,
    pub token_count: U256,
    pub start_token: u64,
    pub end_token: u64,
    pub submitted_at: u64,
}

/// `modelId = keccak256(repo ‖ "/" ‖ filename)`, computed locally so
/// lookups don't need a round trip.
pub fn model_id_for(repo: &str, filename: &str) -> H256 {
    let preimage = format!("{repo}/{filename}");
    H256::from(keccak256(preimage.as_bytes()))
}
