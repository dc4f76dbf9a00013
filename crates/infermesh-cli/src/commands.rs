//! Command handlers.

use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::helpers::{
    format_amount, parse_amount, parse_model_spec, parse_private_key,
    price_per_token_from_million, probe_host,
};
use crate::keystore;
use infermesh_chain::{
    ChainClient, ChainsConfig, EthAddress, GasProfile, LocalWallet, H256, U256,
};
use infermesh_core::ChainId;
use infermesh_crypto::KeyPair;
use infermesh_storage::{HttpGatewayStore, StorageAdapter};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

pub struct Context {
    pub config: CliConfig,
    /// `--key` override; insecure, warned about on use.
    pub key_override: Option<String>,
    pub gas_profile: GasProfile,
}

impl Context {
    /// Key resolution priority: CLI flag, INFERMESH_PRIVATE_KEY,
    /// keystore file with an interactive prompt.
    fn signer_key(&self) -> Result<Zeroizing<[u8; 32]>> {
        if let Some(key) = &self.key_override {
            eprintln!("warning: private keys on the command line leak via shell history");
            return Ok(Zeroizing::new(parse_private_key(key)?));
        }
        if let Ok(key) = std::env::var("INFERMESH_PRIVATE_KEY") {
            if !key.is_empty() {
                return Ok(Zeroizing::new(parse_private_key(&key)?));
            }
        }
        let store = keystore::load(&self.config.keystore_path)?;
        let password = rpassword::prompt_password("Keystore password: ")
            .map_err(|e| CliError::Other(format!("password prompt: {e}")))?;
        keystore::decrypt_key(&store, &password)
    }

    async fn chain(&self) -> Result<(Arc<ChainClient>, KeyPair)> {
        let key = self.signer_key()?;
        let keypair = KeyPair::from_secret(&key)?;
        let wallet = LocalWallet::from_bytes(&*key)
            .map_err(|e| CliError::Other(format!("wallet: {e}")))?;
        let chains = ChainsConfig::load(&self.config.chains_config)?;
        let validated = chains.chain(ChainId(self.config.chain_id))?;
        Ok((
            Arc::new(ChainClient::with_gas_profile(validated, wallet, self.gas_profile)),
            keypair,
        ))
    }

    fn stablecoin(&self) -> Result<EthAddress> {
        let chains = ChainsConfig::load(&self.config.chains_config)?;
        Ok(chains.chain(ChainId(self.config.chain_id))?.stablecoin)
    }

    fn portal(&self) -> Result<HttpGatewayStore> {
        let url = self
            .config
            .portal_url
            .as_deref()
            .ok_or_else(|| CliError::Config("portal_url is required for this command".into()))?;
        Ok(HttpGatewayStore::new(url))
    }
}

pub async fn register(
    ctx: &Context,
    url: &str,
    models: &[String],
    stake: &str,
    pricing: &str,
) -> Result<()> {
    // Outside-in reachability first; gas is spent only on live hosts
    probe_host(url).await?;

    let model_ids: Vec<H256> =
        models.iter().map(|m| parse_model_spec(m)).collect::<Result<_>>()?;
    let stake_units = parse_amount(stake, 18)?;
    let price = price_per_token_from_million(pricing)?;

    let (chain, _) = ctx.chain().await?;
    // Every model must exist on-chain before we advertise it
    for id in &model_ids {
        chain.get_model(*id).await?;
    }
    chain.ensure_stake_allowance(stake_units).await?;
    chain.register_node(url, stake_units, model_ids, price).await?;
    println!("registered {} with stake {} FAB", url, format_amount(stake_units, 18));
    Ok(())
}

pub async fn unregister(ctx: &Context) -> Result<()> {
    let (chain, _) = ctx.chain().await?;
    chain.unregister_node().await?;
    println!("unregistered");
    Ok(())
}

pub async fn update_url(ctx: &Context, url: &str) -> Result<()> {
    probe_host(url).await?;
    let (chain, _) = ctx.chain().await?;
    chain.update_api_url(url).await?;
    println!("api url updated to {url}");
    Ok(())
}

pub async fn update_models(ctx: &Context, models: &[String]) -> Result<()> {
    let model_ids: Vec<H256> =
        models.iter().map(|m| parse_model_spec(m)).collect::<Result<_>>()?;
    let (chain, _) = ctx.chain().await?;
    for id in &model_ids {
        chain.get_model(*id).await?;
    }
    chain.update_supported_models(model_ids).await?;
    println!("supported models updated");
    Ok(())
}

pub async fn add_stake(ctx: &Context, amount: &str) -> Result<()> {
    let units = parse_amount(amount, 18)?;
    let (chain, _) = ctx.chain().await?;
    chain.ensure_stake_allowance(units).await?;
    chain.add_stake(units).await?;
    println!("staked {} FAB", format_amount(units, 18));
    Ok(())
}

pub async fn update_metadata(
    ctx: &Context,
    file: Option<&PathBuf>,
    inline_json: Option<&str>,
    template: Option<&str>,
) -> Result<()> {
    let document: serde_json::Value = match (file, inline_json, template) {
        (Some(path), None, None) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)
                .map_err(|e| CliError::Other(format!("{}: {e}", path.display())))?
        }
        (None, Some(raw), None) => serde_json::from_str(raw)
            .map_err(|e| CliError::Other(format!("inline json: {e}")))?,
        (None, None, Some(name)) => metadata_template(name)?,
        (None, None, None) => metadata_template("default")?,
        _ => return Err(CliError::Other("pass at most one of -f, -j, -t".into())),
    };

    let (chain, keypair) = ctx.chain().await?;
    let portal = ctx.portal()?;
    let blob_ref = format!("metadata/{}.json", keypair.address().to_lowercase_hex());
    portal
        .put(&blob_ref, serde_json::to_vec_pretty(&document).expect("json serializes"))
        .await?;
    chain.update_metadata(&blob_ref).await?;
    println!("metadata published at {blob_ref}");
    Ok(())
}

fn metadata_template(name: &str) -> Result<serde_json::Value> {
    match name {
        "default" => Ok(json!({
            "description": "",
            "hardware": { "gpu": "", "vram_gb": 0 },
            "region": "",
            "contact": ""
        })),
        "datacenter" => Ok(json!({
            "description": "",
            "hardware": { "gpu": "", "vram_gb": 0, "count": 1 },
            "region": "",
            "uptime_sla": "99.9",
            "contact": ""
        })),
        other => Err(CliError::Other(format!("unknown metadata template `{other}`"))),
    }
}

pub async fn info(ctx: &Context, as_json: bool) -> Result<()> {
    let (chain, keypair) = ctx.chain().await?;
    let address = EthAddress::from(keypair.address().into_bytes());
    let registered = chain.is_node_registered(address).await?;
    if !registered {
        println!("host {address:#x} is not registered");
        return Ok(());
    }
    let hosts = chain.get_all_hosts().await?;
    let record = hosts
        .into_iter()
        .find(|h| h.address == address)
        .ok_or_else(|| CliError::Chain("registry returned no record for this host".into()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record).expect("record serializes"));
    } else {
        println!("address:    {:#x}", record.address);
        println!("api url:    {}", record.api_url);
        println!("active:     {}", record.active);
        println!("stake:      {} FAB", format_amount(record.stake, 18));
        println!("price:      {} units/token", record.price_per_token);
        println!("models:     {}", record.supported_models.len());
        for model in &record.supported_models {
            println!("  {model:#x}");
        }
        if !record.metadata_ref.is_empty() {
            println!("metadata:   {}", record.metadata_ref);
        }
    }
    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    let url = ctx
        .config
        .public_url
        .as_deref()
        .ok_or_else(|| CliError::Config("public_url is required for `status`".into()))?;
    let status_url = format!("{}/status", url.trim_end_matches('/'));
    let response: serde_json::Value = reqwest::Client::new()
        .get(&status_url)
        .send()
        .await
        .map_err(|e| CliError::Network(format!("{status_url}: {e}")))?
        .json()
        .await
        .map_err(|e| CliError::Network(format!("{status_url}: {e}")))?;
    println!("{}", serde_json::to_string_pretty(&response).expect("status serializes"));
    Ok(())
}

pub async fn balance(ctx: &Context) -> Result<()> {
    let (chain, keypair) = ctx.chain().await?;
    let address = EthAddress::from(keypair.address().into_bytes());
    let stablecoin = ctx.stablecoin()?;

    let native_earned = chain.get_host_earnings(address, EthAddress::zero()).await?;
    let stable_earned = chain.get_host_earnings(address, stablecoin).await?;
    println!("earnings (native):     {}", format_amount(native_earned, 18));
    println!("earnings (stablecoin): {}", format_amount(stable_earned, 6));
    Ok(())
}

pub async fn wallet_balance(ctx: &Context) -> Result<()> {
    let (chain, keypair) = ctx.chain().await?;
    let address = EthAddress::from(keypair.address().into_bytes());
    let stablecoin = ctx.stablecoin()?;
    let native = chain.get_native_balance(address).await?;
    let stable = chain.get_token_balance(address, stablecoin).await?;
    println!("address:    {address:#x}");
    println!("native:     {}", format_amount(native, 18));
    println!("stablecoin: {}", format_amount(stable, 6));
    Ok(())
}

pub async fn wallet_import(ctx: &Context, key: Option<&str>) -> Result<()> {
    let secret = match key {
        Some(k) => parse_private_key(k)?,
        None => {
            let entered = rpassword::prompt_password("Private key (hex): ")
                .map_err(|e| CliError::Other(format!("prompt: {e}")))?;
            parse_private_key(&entered)?
        }
    };
    let password = rpassword::prompt_password("New keystore password: ")
        .map_err(|e| CliError::Other(format!("prompt: {e}")))?;
    let confirm = rpassword::prompt_password("Confirm password: ")
        .map_err(|e| CliError::Other(format!("prompt: {e}")))?;
    if password != confirm {
        return Err(CliError::Other("passwords do not match".into()));
    }
    let store = keystore::encrypt_key(&secret, &password)?;
    keystore::save(&ctx.config.keystore_path, &store)?;
    println!("imported wallet {} to {}", store.address, ctx.config.keystore_path.display());
    Ok(())
}

pub async fn wallet_export(ctx: &Context) -> Result<()> {
    let key = ctx.signer_key()?;
    eprintln!("warning: the exported key grants full control of the wallet");
    println!("0x{}", hex::encode(&*key));
    Ok(())
}

pub async fn models_list(ctx: &Context) -> Result<()> {
    let (chain, _) = ctx.chain().await?;
    let ids = chain.get_all_models().await?;
    if ids.is_empty() {
        println!("no models recorded");
        return Ok(());
    }
    for id in ids {
        match chain.get_model(id).await {
            Ok(model) => println!(
                "{id:#x}  {}:{}  {}",
                model.repo,
                model.filename,
                if model.active { "active" } else { "inactive" }
            ),
            Err(_) => println!("{id:#x}  <unreadable>"),
        }
    }
    Ok(())
}

pub async fn models_info(ctx: &Context, spec: &str) -> Result<()> {
    let id = parse_model_spec(spec)?;
    let (chain, _) = ctx.chain().await?;
    let model = chain.get_model(id).await?;
    println!("model id: {:#x}", model.model_id);
    println!("repo:     {}", model.repo);
    println!("filename: {}", model.filename);
    println!("sha256:   {:#x}", model.content_hash);
    println!("active:   {}", model.active);
    Ok(())
}

pub async fn models_download(ctx: &Context, spec: &str, output: Option<&PathBuf>) -> Result<()> {
    use sha2::{Digest, Sha256};

    let id = parse_model_spec(spec)?;
    let (chain, _) = ctx.chain().await?;
    let model = chain.get_model(id).await?;
    let url =
        format!("https://huggingface.co/{}/resolve/main/{}", model.repo, model.filename);
    println!("downloading {url}");

    let bytes = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| CliError::Network(format!("{url}: {e}")))?
        .error_for_status()
        .map_err(|e| CliError::Network(e.to_string()))?
        .bytes()
        .await
        .map_err(|e| CliError::Network(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest: [u8; 32] = hasher.finalize().into();
    if H256::from(digest) != model.content_hash {
        return Err(CliError::InvalidModel(format!(
            "content hash mismatch for {}: expected {:#x}",
            model.filename, model.content_hash
        )));
    }

    let path = output.cloned().unwrap_or_else(|| PathBuf::from(&model.filename));
    std::fs::write(&path, &bytes)?;
    println!("verified and saved to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

pub async fn withdraw(ctx: &Context, tokens: &[String]) -> Result<()> {
    let (chain, _) = ctx.chain().await?;
    if tokens.is_empty() {
        chain.withdraw_all_earnings().await?;
        println!("withdrew all earnings");
    } else {
        let parsed: Vec<EthAddress> = tokens
            .iter()
            .map(|t| {
                t.parse::<EthAddress>()
                    .map_err(|e| CliError::Other(format!("token {t}: {e}")))
            })
            .collect::<Result<_>>()?;
        chain.withdraw_earnings(parsed).await?;
        println!("withdrew earnings for {} token(s)", tokens.len());
    }
    Ok(())
}

pub fn start(ctx: &Context) -> Result<()> {
    use std::process::{Command, Stdio};

    if let Ok(raw) = std::fs::read_to_string(&ctx.config.pid_file) {
        if let Ok(pid) = raw.trim().parse::<i32>() {
            if unsafe { libc::kill(pid, 0) } == 0 {
                return Err(CliError::Other(format!("supervisor already running (pid {pid})")));
            }
        }
    }

    let child = Command::new("infermesh-host")
        .arg(&ctx.config.host_config)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| CliError::Other(format!("spawn infermesh-host: {e}")))?;
    std::fs::write(&ctx.config.pid_file, child.id().to_string())?;
    println!("supervisor started (pid {})", child.id());
    Ok(())
}

pub fn stop(ctx: &Context) -> Result<()> {
    let raw = std::fs::read_to_string(&ctx.config.pid_file)
        .map_err(|_| CliError::Other("no pid file; is the supervisor running?".into()))?;
    let pid: i32 =
        raw.trim().parse().map_err(|_| CliError::Other("malformed pid file".into()))?;
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        let _ = std::fs::remove_file(&ctx.config.pid_file);
        return Err(CliError::Other(format!("process {pid} not running")));
    }
    let _ = std::fs::remove_file(&ctx.config.pid_file);
    println!("sent SIGTERM to supervisor (pid {pid})");
    Ok(())
}

pub async fn dashboard(url: &str) -> Result<()> {
    println!("dashboard: {url}");
    let status_url = format!("{}/status", url.trim_end_matches('/'));
    match reqwest::Client::new().get(&status_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                println!("{}", serde_json::to_string_pretty(&body).expect("json serializes"));
            }
        }
        _ => println!("(dashboard not reachable at {status_url})"),
    }
    Ok(())
}
