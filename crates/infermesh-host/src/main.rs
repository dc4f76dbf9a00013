use infermesh_chain::{ChainClient, ChainsConfig, LocalWallet};
use infermesh_core::ChainId;
use infermesh_crypto::KeyPair;
use infermesh_host::proofs::ProofScheduler;
use infermesh_host::{logging, SupervisorConfig, Supervisor};
use infermesh_storage::{HttpGatewayStore, StorageAdapter};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::args().nth(1).unwrap_or_else(|| "infermesh-host.toml".to_string());
    let config = SupervisorConfig::load(Path::new(&config_path))?;
    logging::init_logging(&config.logging)?;
    info!("supervisor starting with config {config_path}");

    // Operator key: signs checkpoints and proof transactions
    let key_hex = std::fs::read_to_string(&config.chain.key_file)?;
    let key_bytes = parse_key(key_hex.trim())?;
    let host_key = KeyPair::from_secret(&key_bytes)?;
    let wallet: LocalWallet = LocalWallet::from_bytes(&key_bytes)?;
    info!("operating as host {}", host_key.address());

    let chains = ChainsConfig::load(&config.chain.chains_config)?;
    let validated = chains.chain(ChainId(config.chain.chain_id))?;
    let chain = Arc::new(ChainClient::new(validated, wallet));

    let store: Arc<dyn StorageAdapter> =
        Arc::new(HttpGatewayStore::new(config.storage.portal_url.clone()));
    let scheduler = Arc::new(ProofScheduler::new(store, chain, host_key));

    Supervisor::new(config, scheduler).run().await?;
    Ok(())
}

fn parse_key(hex_str: &str) -> anyhow::Result<[u8; 32]> {
    let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(stripped)?;
    let key: [u8; 32] =
        bytes.try_into().map_err(|_| anyhow::anyhow!("key file must hold 32 hex bytes"))?;
    Ok(key)
}
