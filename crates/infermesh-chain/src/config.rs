use crate::error::{ChainError, Result};
use ethers::types::Address as EthAddress;
use infermesh_core::ChainId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-chain configuration.
///
/// All five contract addresses are required; a chain entry missing any
/// of them fails at load time, never at call time. There are no
/// environment-variable fallbacks for addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Ordered list; the client fails over in this order.
    pub rpc_endpoints: Vec<String>,
    pub job_marketplace_address: Option<String>,
    pub node_registry_address: Option<String>,
    pub proof_system_address: Option<String>,
    pub host_earnings_address: Option<String>,
    pub stablecoin_address: Option<String>,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u32,
    #[serde(default = "default_stablecoin_decimals")]
    pub stablecoin_decimals: u32,
}

fn default_native_decimals() -> u32 {
    18
}

fn default_stablecoin_decimals() -> u32 {
    6
}

/// The validated form handed to the client.
#[derive(Debug, Clone)]
pub struct ValidatedChainConfig {
    pub chain_id: ChainId,
    pub rpc_endpoints: Vec<String>,
    pub job_marketplace: EthAddress,
    pub node_registry: EthAddress,
    pub proof_system: EthAddress,
    pub host_earnings: EthAddress,
    pub stablecoin: EthAddress,
    pub native_decimals: u32,
    pub stablecoin_decimals: u32,
}

impl ChainConfig {
    pub fn validate(&self) -> Result<ValidatedChainConfig> {
        if self.chain_id == 0 {
            return Err(ChainError::InvalidConfig("chain_id must be non-zero".into()));
        }
        if self.rpc_endpoints.is_empty() {
            return Err(ChainError::MissingField("rpc_endpoints"));
        }
        for url in &self.rpc_endpoints {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ChainError::InvalidConfig(format!("malformed RPC url: {url}")));
            }
        }

        Ok(ValidatedChainConfig {
            chain_id: ChainId(self.chain_id),
            rpc_endpoints: self.rpc_endpoints.clone(),
            job_marketplace: require_address(
                &self.job_marketplace_address,
                "job_marketplace_address",
            )?,
            node_registry: require_address(&self.node_registry_address, "node_registry_address")?,
            proof_system: require_address(&self.proof_system_address, "proof_system_address")?,
            host_earnings: require_address(&self.host_earnings_address, "host_earnings_address")?,
            stablecoin: require_address(&self.stablecoin_address, "stablecoin_address")?,
            native_decimals: self.native_decimals,
            stablecoin_decimals: self.stablecoin_decimals,
        })
    }
}

fn require_address(value: &Option<String>, field: &'static str) -> Result<EthAddress> {
    let raw = value.as_deref().ok_or(ChainError::MissingField(field))?;
    raw.parse::<EthAddress>()
        .map_err(|e| ChainError::InvalidConfig(format!("{field}: {e}")))
}

/// Multi-chain configuration file.
///
/// ```toml
/// [chains.84532]
/// rpc_endpoints = ["https://sepolia.base.org"]
/// job_marketplace_address = "0x..."
/// ...
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainsConfig {
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
}

impl ChainsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChainError::InvalidConfig(format!("{}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| ChainError::InvalidConfig(e.to_string()))
    }

    pub fn chain(&self, chain_id: ChainId) -> Result<ValidatedChainConfig> {
        let entry = self
            .chains
            .get(&chain_id.to_string())
            .ok_or_else(|| ChainError::InvalidConfig(format!("unknown chain {chain_id}")))?;
        if entry.chain_id != chain_id.as_u64() {
            return Err(ChainError::InvalidConfig(format!(
                "chain table key {chain_id} does not match chain_id {}",
                entry.chain_id
            )));
        }
        entry.validate()
    }
}
