//! End-to-end client flow against live infrastructure.
//!
//! Expects `INFERMESH_PRIVATE_KEY`, a `chains.toml` in the working
//! directory, and a registered host serving the model.
//!
//! ```sh
//! INFERMESH_PRIVATE_KEY=0x... cargo run --example streaming_session
//! ```

use infermesh_chain::{ChainClient, ChainsConfig, U256};
use infermesh_core::{ChainId, SessionKey};
use infermesh_discovery::{Discovery, DiscoveryQuery};
use infermesh_session::{
    Identity, PaymentManager, Session, SessionConfig, SessionManager, StreamItem,
};
use std::path::Path;
use std::sync::Arc;

const CHAIN_ID: u64 = 84532;
const MODEL: (&str, &str) = ("TheBloke/Llama-2-7B-GGUF", "llama-2-7b.Q4_K_M.gguf");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let key_hex = std::env::var("INFERMESH_PRIVATE_KEY")?;
    let key: [u8; 32] = hex::decode(key_hex.trim_start_matches("0x"))?
        .try_into()
        .map_err(|_| anyhow::anyhow!("key must be 32 bytes"))?;
    let identity = Identity::from_private_key(&key, ChainId(CHAIN_ID), None)?;
    println!("client address: {}", identity.address());
    println!("storage seed:   {}", identity.seed_phrase());

    let chains = ChainsConfig::load(Path::new("chains.toml"))?;
    let validated = chains.chain(ChainId(CHAIN_ID))?;
    let stablecoin = validated.stablecoin;
    let chain = Arc::new(ChainClient::new(validated, identity.wallet()?));

    // Pick the best host for the model
    let model_id = infermesh_chain::model_id_for(MODEL.0, MODEL.1);
    let discovery = Discovery::new(chain.clone());
    let ranked = discovery.discover(&DiscoveryQuery::for_model(model_id, stablecoin)).await?;
    let host = ranked.first().ok_or_else(|| anyhow::anyhow!("no hosts"))?;
    println!("selected host {} at {} (score {:.3})", host.address, host.api_url, host.score);

    // Escrow: 2 USDC deposit at 100 units/token
    let payments = Arc::new(PaymentManager::new(chain.clone()));
    let session_id = payments
        .create_session_direct(
            host.address,
            stablecoin,
            U256::from(2_000_000u64),
            U256::from(100u64),
            3600,
            1000,
        )
        .await?;
    println!("session {session_id} posted");

    // Stream a prompt
    let host_crypto_address = infermesh_crypto::Address::new(host.address.0);
    let mut config = SessionConfig::new(
        SessionKey::new(ChainId(CHAIN_ID), session_id),
        host_crypto_address,
        format!("{}/v1/ws", host.api_url.replace("http", "ws")),
    );
    config.model_name = format!("{}:{}", MODEL.0, MODEL.1);
    // In production the host's static key comes from its API
    config.encryption = false;

    let manager = SessionManager::new();
    let handle = manager
        .open(config, identity.keypair().clone(), Some(payments.clone()))
        .await?;

    let (_, mut stream) = handle.prompt("Hello! What can you do?").await?;
    while let Some(item) = stream.recv().await {
        match item {
            StreamItem::Token(token) => print!("{token}"),
            StreamItem::Done { total_tokens } => {
                println!("\n[{total_tokens} tokens]");
                break;
            }
            StreamItem::Failed { code, message } => {
                println!("\n[failed: {code} {message}]");
                break;
            }
        }
    }

    // Clean close settles on-chain; proven value pays the host
    handle.end().await?;
    println!("session settled");
    Ok(())
}
