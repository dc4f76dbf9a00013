//! The retry-aware multi-chain contract client.
//!
//! One `ChainClient` serves one chain. Every call walks the configured
//! endpoint list starting at the last known-good endpoint: transient
//! failures are retried with backoff on the same endpoint, then the
//! client fails over; reverts surface immediately. A circuit breaker
//! per endpoint keeps known-bad RPCs out of the rotation.

use crate::config::ValidatedChainConfig;
use crate::contracts::job_marketplace;
use crate::contracts::{Erc20, HostEarnings, JobMarketplace, NodeRegistry, ProofSystem};
use crate::error::{classify_rpc_error, ChainError, Result};
use crate::gas::{buffered_gas_limit, GasProfile};
use crate::types::{
    HostRecord, ModelRecord, ProofRecord, SessionDescriptor, SessionJobStatus,
};
use ethers::abi::{Detokenize, RawLog};
use ethers::contract::{ContractCall, EthLogDecode};
use ethers::middleware::{NonceManagerMiddleware, SignerMiddleware};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address as EthAddress, Bytes, TransactionReceipt, H256, U256};
use infermesh_core::{
    retry, ChainId, CircuitBreaker, CircuitBreakerConfig, RetryPolicy, Retryable, Timeouts,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Provider stack: nonce serialization per signer over a signing
/// middleware over plain HTTP.
pub type MeshMiddleware = NonceManagerMiddleware<SignerMiddleware<Provider<Http>, LocalWallet>>;

struct Endpoint {
    url: String,
    breaker: CircuitBreaker,
    client: Mutex<Option<Arc<MeshMiddleware>>>,
}

pub struct ChainClient {
    config: ValidatedChainConfig,
    wallet: LocalWallet,
    gas_profile: GasProfile,
    retry_policy: RetryPolicy,
    timeouts: Timeouts,
    endpoints: Vec<Endpoint>,
    /// Index of the endpoint that last served a successful call.
    current: Mutex<usize>,
}

impl ChainClient {
    pub fn new(config: ValidatedChainConfig, wallet: LocalWallet) -> Self {
        Self::with_gas_profile(config, wallet, GasProfile::default())
    }

    pub fn with_gas_profile(
        config: ValidatedChainConfig,
        wallet: LocalWallet,
        gas_profile: GasProfile,
    ) -> Self {
        let wallet = wallet.with_chain_id(config.chain_id.as_u64());
        let endpoints = config
            .rpc_endpoints
            .iter()
            .map(|url| Endpoint {
                url: url.clone(),
                breaker: CircuitBreaker::new(url.clone(), CircuitBreakerConfig::default()),
                client: Mutex::new(None),
            })
            .collect();
        Self {
            config,
            wallet,
            gas_profile,
            retry_policy: RetryPolicy::default(),
            timeouts: Timeouts::default(),
            endpoints,
            current: Mutex::new(0),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    /// The signer's address.
    pub fn address(&self) -> EthAddress {
        self.wallet.address()
    }

    pub fn stablecoin(&self) -> EthAddress {
        self.config.stablecoin
    }

    pub fn marketplace_address(&self) -> EthAddress {
        self.config.job_marketplace
    }

    fn client_for(&self, index: usize) -> Result<Arc<MeshMiddleware>> {
        let endpoint = &self.endpoints[index];
        let mut slot = endpoint.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let provider = Provider::<Http>::try_from(endpoint.url.as_str())
            .map_err(|e| ChainError::InvalidConfig(format!("{}: {e}", endpoint.url)))?;
        let signer = SignerMiddleware::new(provider, self.wallet.clone());
        let client = Arc::new(NonceManagerMiddleware::new(signer, self.wallet.address()));
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Run `op` against the healthiest endpoint, retrying transients on
    /// the same endpoint and failing over in declared order.
    async fn with_client<T, F, Fut>(&self, what: &'static str, op: F) -> Result<T>
    where
        F: Fn(Arc<MeshMiddleware>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = *self.current.lock();
        let count = self.endpoints.len();
        for offset in 0..count {
            let index = (start + offset) % count;
            let endpoint = &self.endpoints[index];
            if !endpoint.breaker.allow() {
                debug!("{}: skipping {} (breaker open)", what, endpoint.url);
                continue;
            }
            let client = match self.client_for(index) {
                Ok(client) => client,
                Err(e) => {
                    warn!("{}: cannot build client for {}: {}", what, endpoint.url, e);
                    endpoint.breaker.record_failure();
                    continue;
                }
            };
            match retry(&self.retry_policy, what, || op(client.clone())).await {
                Ok(value) => {
                    endpoint.breaker.record_success();
                    *self.current.lock() = index;
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    warn!("{}: endpoint {} exhausted: {}, failing over", what, endpoint.url, e);
                    endpoint.breaker.record_failure();
                }
                Err(e) => return Err(e),
            }
        }
        Err(ChainError::ChainUnreachable(self.config.chain_id))
    }

    // ------------------------------------------------------------
    // Escrow / payments
    // ------------------------------------------------------------

    /// Approve the marketplace to move `amount` of `token` if the
    /// current allowance is short. Approval must precede any
    /// token-transferring call.
    pub async fn ensure_allowance(&self, token: EthAddress, amount: U256) -> Result<()> {
        let spender = self.config.job_marketplace;
        let owner = self.wallet.address();
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("ensureAllowance", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let erc20 = Erc20::new(token, client.clone());
                let allowance = erc20
                    .allowance(owner, spender)
                    .call()
                    .await
                    .map_err(|e| classify_rpc_error(&e.to_string()))?;
                if allowance >= amount {
                    return Ok(());
                }
                let call = erc20.approve(spender, amount);
                send_and_confirm(&client, call, gas_profile, &timeouts, "approve").await?;
                Ok(())
            }
        })
        .await
    }

    /// Post an escrowed session job, transferring `deposit` of `token`
    /// from the user. Returns the new session id from the
    /// `SessionCreated` event.
    pub async fn create_session_with_token(
        &self,
        host: EthAddress,
        token: EthAddress,
        deposit: U256,
        price_per_token: U256,
        max_duration_secs: u64,
        proof_interval_tokens: u64,
    ) -> Result<u64> {
        let marketplace = self.config.job_marketplace;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("createSessionJobWithToken", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let contract = JobMarketplace::new(marketplace, client.clone());
                let call = contract.create_session_job_with_token(
                    host,
                    token,
                    deposit,
                    price_per_token,
                    U256::from(max_duration_secs),
                    U256::from(proof_interval_tokens),
                );
                let receipt =
                    send_and_confirm(&client, call, gas_profile, &timeouts, "createSession")
                        .await?;
                session_id_from_receipt(&receipt)
            }
        })
        .await
    }

    /// Post a session job debited from the caller's pre-funded deposit.
    pub async fn create_session_from_deposit(
        &self,
        host: EthAddress,
        model_id: H256,
        token: EthAddress,
        deposit: U256,
        price_per_token: U256,
        max_duration_secs: u64,
        proof_interval_tokens: u64,
    ) -> Result<u64> {
        let marketplace = self.config.job_marketplace;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("createSessionFromDepositForModel", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let contract = JobMarketplace::new(marketplace, client.clone());
                let call = contract.create_session_from_deposit_for_model(
                    host,
                    model_id.0,
                    token,
                    deposit,
                    price_per_token,
                    U256::from(max_duration_secs),
                    U256::from(proof_interval_tokens),
                );
                let receipt =
                    send_and_confirm(&client, call, gas_profile, &timeouts, "createSession")
                        .await?;
                session_id_from_receipt(&receipt)
            }
        })
        .await
    }

    pub async fn deposit_token(&self, token: EthAddress, amount: U256) -> Result<()> {
        let marketplace = self.config.job_marketplace;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("depositToken", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let contract = JobMarketplace::new(marketplace, client.clone());
                let call = contract.deposit_token(token, amount);
                send_and_confirm(&client, call, gas_profile, &timeouts, "depositToken").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn withdraw_token(&self, token: EthAddress, amount: U256) -> Result<()> {
        let marketplace = self.config.job_marketplace;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("withdrawToken", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let contract = JobMarketplace::new(marketplace, client.clone());
                let call = contract.withdraw_token(token, amount);
                send_and_confirm(&client, call, gas_profile, &timeouts, "withdrawToken").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn get_deposit_balance(&self, user: EthAddress, token: EthAddress) -> Result<U256> {
        let marketplace = self.config.job_marketplace;
        self.with_client("getDepositBalance", move |client| async move {
            let contract = JobMarketplace::new(marketplace, client);
            contract
                .get_deposit_balance(user, token)
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    /// Settle a session: 90% of proven value to host earnings, 10% to
    /// treasury, unproven remainder refunded. Either party may call.
    /// A second settlement surfaces as [`ChainError::AlreadyCompleted`].
    pub async fn complete_session(&self, session_id: u64) -> Result<()> {
        let marketplace = self.config.job_marketplace;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        let result = self
            .with_client("completeSessionJob", move |client| {
                let timeouts = timeouts.clone();
                async move {
                    let contract = JobMarketplace::new(marketplace, client.clone());
                    let call = contract.complete_session_job(U256::from(session_id));
                    send_and_confirm(&client, call, gas_profile, &timeouts, "completeSession")
                        .await?;
                    Ok(())
                }
            })
            .await;
        match result {
            Err(ChainError::Reverted(msg)) if msg.contains("AlreadyCompleted") => {
                Err(ChainError::AlreadyCompleted(session_id))
            }
            other => other,
        }
    }

    pub async fn get_session(&self, session_id: u64) -> Result<SessionDescriptor> {
        let marketplace = self.config.job_marketplace;
        let chain_id = self.config.chain_id;
        self.with_client("getSession", move |client| async move {
            let contract = JobMarketplace::new(marketplace, client);
            let (
                user,
                host,
                model_id,
                token,
                deposit_remaining,
                price_per_token,
                started_at,
                last_checkpoint_index,
                status,
            ) = contract
                .get_session(U256::from(session_id))
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))?;
            Ok(SessionDescriptor {
                chain_id,
                session_id,
                user,
                host,
                model_id: H256::from(model_id),
                token,
                deposit_remaining,
                price_per_token,
                started_at: started_at.as_u64(),
                last_checkpoint_index: last_checkpoint_index.as_u64(),
                status: SessionJobStatus::from_u8(status)?,
            })
        })
        .await
    }

    // ------------------------------------------------------------
    // Proofs
    // ------------------------------------------------------------

    /// Host-side: submit a checkpoint proof. The contract verifies the
    /// blob and advances `lastProvenTokens`.
    pub async fn submit_proof(
        &self,
        session_id: u64,
        checkpoint_index: u64,
        token_count: u64,
        proof_blob: Vec<u8>,
    ) -> Result<()> {
        let proof_system = self.config.proof_system;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("submitProof", move |client| {
            let timeouts = timeouts.clone();
            let blob = Bytes::from(proof_blob.clone());
            async move {
                let contract = ProofSystem::new(proof_system, client.clone());
                let call = contract.submit_proof(
                    U256::from(session_id),
                    U256::from(checkpoint_index),
                    U256::from(token_count),
                    blob,
                );
                send_and_confirm(&client, call, gas_profile, &timeouts, "submitProof").await?;
                info!(
                    "proof submitted for session {} checkpoint {}",
                    session_id, checkpoint_index
                );
                Ok(())
            }
        })
        .await
    }

    pub async fn get_proof_submission(
        &self,
        session_id: u64,
        checkpoint_index: u64,
    ) -> Result<ProofRecord> {
        let proof_system = self.config.proof_system;
        self.with_client("getProofSubmission", move |client| async move {
            let contract = ProofSystem::new(proof_system, client);
            let (proof_hash, token_count, start_token, end_token, submitted_at) = contract
                .get_proof_submission(U256::from(session_id), U256::from(checkpoint_index))
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))?;
            Ok(ProofRecord {
                session_id,
                checkpoint_index,
                proof_hash: H256::from(proof_hash),
                token_count,
                start_token: start_token.as_u64(),
                end_token: end_token.as_u64(),
                submitted_at: submitted_at.as_u64(),
            })
        })
        .await
    }

    // ------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------

    pub async fn get_node_api_url(&self, host: EthAddress) -> Result<String> {
        let registry = self.config.node_registry;
        self.with_client("getNodeApiUrl", move |client| async move {
            let contract = NodeRegistry::new(registry, client);
            contract
                .get_node_api_url(host)
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    pub async fn is_node_registered(&self, host: EthAddress) -> Result<bool> {
        let registry = self.config.node_registry;
        self.with_client("isNodeRegistered", move |client| async move {
            let contract = NodeRegistry::new(registry, client);
            contract
                .is_node_registered(host)
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    /// Enumerate registered hosts and hydrate each record. Inactive
    /// hosts are included; discovery filters them.
    pub async fn get_all_hosts(&self) -> Result<Vec<HostRecord>> {
        let registry = self.config.node_registry;
        self.with_client("getAllNodes", move |client| async move {
            let contract = NodeRegistry::new(registry, client);
            let addresses = contract
                .get_all_nodes()
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))?;
            let mut hosts = Vec::with_capacity(addresses.len());
            for address in addresses {
                let (api_url, stake, price_per_token, active, metadata_ref) = contract
                    .get_node(address)
                    .call()
                    .await
                    .map_err(|e| classify_rpc_error(&e.to_string()))?;
                let supported = contract
                    .get_supported_models(address)
                    .call()
                    .await
                    .map_err(|e| classify_rpc_error(&e.to_string()))?;
                hosts.push(HostRecord {
                    address,
                    api_url,
                    stake,
                    price_per_token,
                    supported_models: supported.into_iter().map(H256::from).collect(),
                    active,
                    metadata_ref,
                });
            }
            Ok(hosts)
        })
        .await
    }

    /// Only hosts flagged active in the registry.
    pub async fn get_active_hosts(&self) -> Result<Vec<HostRecord>> {
        Ok(self.get_all_hosts().await?.into_iter().filter(|h| h.active).collect())
    }

    /// The ERC20 the registry pulls stake in.
    pub async fn stake_token(&self) -> Result<EthAddress> {
        let registry = self.config.node_registry;
        self.with_client("stakeToken", move |client| async move {
            let contract = NodeRegistry::new(registry, client);
            contract
                .stake_token()
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    /// Approve the registry to pull `amount` of the stake token.
    pub async fn ensure_stake_allowance(&self, amount: U256) -> Result<()> {
        let token = self.stake_token().await?;
        let spender = self.config.node_registry;
        let owner = self.wallet.address();
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("ensureStakeAllowance", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let erc20 = Erc20::new(token, client.clone());
                let allowance = erc20
                    .allowance(owner, spender)
                    .call()
                    .await
                    .map_err(|e| classify_rpc_error(&e.to_string()))?;
                if allowance >= amount {
                    return Ok(());
                }
                let call = erc20.approve(spender, amount);
                send_and_confirm(&client, call, gas_profile, &timeouts, "approveStake").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn register_node(
        &self,
        url: &str,
        stake: U256,
        model_ids: Vec<H256>,
        price_per_token: U256,
    ) -> Result<()> {
        let registry = self.config.node_registry;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        let url = url.to_string();
        self.with_client("registerNodeWithUrl", move |client| {
            let timeouts = timeouts.clone();
            let url = url.clone();
            let model_ids: Vec<[u8; 32]> = model_ids.iter().map(|id| id.0).collect();
            async move {
                let contract = NodeRegistry::new(registry, client.clone());
                let call =
                    contract.register_node_with_url(url, stake, model_ids, price_per_token);
                send_and_confirm(&client, call, gas_profile, &timeouts, "registerNode").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn update_api_url(&self, url: &str) -> Result<()> {
        let registry = self.config.node_registry;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        let url = url.to_string();
        self.with_client("updateApiUrl", move |client| {
            let timeouts = timeouts.clone();
            let url = url.clone();
            async move {
                let contract = NodeRegistry::new(registry, client.clone());
                let call = contract.update_api_url(url);
                send_and_confirm(&client, call, gas_profile, &timeouts, "updateApiUrl").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn update_supported_models(&self, model_ids: Vec<H256>) -> Result<()> {
        let registry = self.config.node_registry;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("updateSupportedModels", move |client| {
            let timeouts = timeouts.clone();
            let ids: Vec<[u8; 32]> = model_ids.iter().map(|id| id.0).collect();
            async move {
                let contract = NodeRegistry::new(registry, client.clone());
                let call = contract.update_supported_models(ids);
                send_and_confirm(&client, call, gas_profile, &timeouts, "updateModels").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn update_metadata(&self, blob_ref: &str) -> Result<()> {
        let registry = self.config.node_registry;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        let blob_ref = blob_ref.to_string();
        self.with_client("updateMetadata", move |client| {
            let timeouts = timeouts.clone();
            let blob_ref = blob_ref.clone();
            async move {
                let contract = NodeRegistry::new(registry, client.clone());
                let call = contract.update_metadata(blob_ref);
                send_and_confirm(&client, call, gas_profile, &timeouts, "updateMetadata").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn add_stake(&self, amount: U256) -> Result<()> {
        let registry = self.config.node_registry;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("addStake", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let contract = NodeRegistry::new(registry, client.clone());
                let call = contract.add_stake(amount);
                send_and_confirm(&client, call, gas_profile, &timeouts, "addStake").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn unregister_node(&self) -> Result<()> {
        let registry = self.config.node_registry;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("unregisterNode", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let contract = NodeRegistry::new(registry, client.clone());
                let call = contract.unregister_node();
                send_and_confirm(&client, call, gas_profile, &timeouts, "unregisterNode").await?;
                Ok(())
            }
        })
        .await
    }

    // ------------------------------------------------------------
    // Models
    // ------------------------------------------------------------

    pub async fn get_all_models(&self) -> Result<Vec<H256>> {
        let registry = self.config.node_registry;
        self.with_client("getAllModels", move |client| async move {
            let contract = NodeRegistry::new(registry, client);
            let ids = contract
                .get_all_models()
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))?;
            Ok(ids.into_iter().map(H256::from).collect())
        })
        .await
    }

    pub async fn get_model(&self, model_id: H256) -> Result<ModelRecord> {
        let registry = self.config.node_registry;
        self.with_client("getModel", move |client| async move {
            let contract = NodeRegistry::new(registry, client);
            let (repo, filename, content_hash, active) = contract
                .get_model(model_id.0)
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))?;
            if repo.is_empty() && filename.is_empty() {
                return Err(ChainError::UnknownModel(format!("{model_id:#x}")));
            }
            Ok(ModelRecord {
                model_id,
                repo,
                filename,
                content_hash: H256::from(content_hash),
                active,
            })
        })
        .await
    }

    // ------------------------------------------------------------
    // Wallet balances
    // ------------------------------------------------------------

    pub async fn get_native_balance(&self, owner: EthAddress) -> Result<U256> {
        self.with_client("getBalance(native)", move |client| async move {
            client
                .get_balance(owner, None)
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    pub async fn get_token_balance(&self, owner: EthAddress, token: EthAddress) -> Result<U256> {
        self.with_client("balanceOf", move |client| async move {
            let erc20 = Erc20::new(token, client);
            erc20
                .balance_of(owner)
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    // ------------------------------------------------------------
    // Earnings
    // ------------------------------------------------------------

    pub async fn get_host_earnings(&self, host: EthAddress, token: EthAddress) -> Result<U256> {
        let earnings = self.config.host_earnings;
        self.with_client("getBalance", move |client| async move {
            let contract = HostEarnings::new(earnings, client);
            contract
                .get_balance(host, token)
                .call()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    pub async fn get_host_earnings_multi(
        &self,
        host: EthAddress,
        tokens: Vec<EthAddress>,
    ) -> Result<Vec<U256>> {
        let earnings = self.config.host_earnings;
        self.with_client("getBalances", move |client| {
            let tokens = tokens.clone();
            async move {
                let contract = HostEarnings::new(earnings, client);
                contract
                    .get_balances(host, tokens)
                    .call()
                    .await
                    .map_err(|e| classify_rpc_error(&e.to_string()))
            }
        })
        .await
    }

    pub async fn withdraw_all_earnings(&self) -> Result<()> {
        let earnings = self.config.host_earnings;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("withdrawAll", move |client| {
            let timeouts = timeouts.clone();
            async move {
                let contract = HostEarnings::new(earnings, client.clone());
                let call = contract.withdraw_all();
                send_and_confirm(&client, call, gas_profile, &timeouts, "withdrawAll").await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn withdraw_earnings(&self, tokens: Vec<EthAddress>) -> Result<()> {
        let earnings = self.config.host_earnings;
        let gas_profile = self.gas_profile;
        let timeouts = self.timeouts.clone();
        self.with_client("withdrawMultiple", move |client| {
            let timeouts = timeouts.clone();
            let tokens = tokens.clone();
            async move {
                let contract = HostEarnings::new(earnings, client.clone());
                let call = contract.withdraw_multiple(tokens);
                send_and_confirm(&client, call, gas_profile, &timeouts, "withdrawMultiple")
                    .await?;
                Ok(())
            }
        })
        .await
    }
}

/// Estimate gas with the safety buffer, apply the fee profile, send,
/// and wait for the receipt within the confirmation deadline.
async fn send_and_confirm<D: Detokenize>(
    client: &Arc<MeshMiddleware>,
    mut call: ContractCall<MeshMiddleware, D>,
    gas_profile: GasProfile,
    timeouts: &Timeouts,
    what: &'static str,
) -> Result<TransactionReceipt> {
    let estimate = call
        .estimate_gas()
        .await
        .map_err(|e| classify_rpc_error(&e.to_string()))?;
    call = call.gas(buffered_gas_limit(estimate));

    let (max_fee, max_priority) = client
        .estimate_eip1559_fees(None)
        .await
        .map_err(|e| classify_rpc_error(&e.to_string()))?;
    if let TypedTransaction::Eip1559(inner) = &mut call.tx {
        inner.max_fee_per_gas = Some(gas_profile.scale_fee(max_fee));
        inner.max_priority_fee_per_gas = Some(gas_profile.scale_fee(max_priority));
    }

    let pending = call.send().await.map_err(|e| classify_rpc_error(&e.to_string()))?;
    let receipt = tokio::time::timeout(timeouts.tx_confirmation(), pending)
        .await
        .map_err(|_| ChainError::Timeout(what))?
        .map_err(|e| classify_rpc_error(&e.to_string()))?
        .ok_or(ChainError::TxDropped)?;

    if receipt.status != Some(1.into()) {
        return Err(ChainError::Reverted(format!(
            "{what} reverted in tx {:?}",
            receipt.transaction_hash
        )));
    }
    debug!("{} confirmed: {:?}", what, receipt.transaction_hash);
    Ok(receipt)
}

fn session_id_from_receipt(receipt: &TransactionReceipt) -> Result<u64> {
    for log in &receipt.logs {
        let raw = RawLog { topics: log.topics.clone(), data: log.data.to_vec() };
        if let Ok(event) = job_marketplace::SessionCreatedFilter::decode_log(&raw) {
            return Ok(event.session_id.as_u64());
        }
    }
    Err(ChainError::MalformedResponse("receipt missing SessionCreated event".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;

    fn test_config() -> ValidatedChainConfig {
        ChainConfig {
            chain_id: 84532,
            rpc_endpoints: vec![
                "http://127.0.0.1:18545".into(),
                "http://127.0.0.1:18546".into(),
            ],
            job_marketplace_address: Some("0x1111111111111111111111111111111111111111".into()),
            node_registry_address: Some("0x2222222222222222222222222222222222222222".into()),
            proof_system_address: Some("0x3333333333333333333333333333333333333333".into()),
            host_earnings_address: Some("0x4444444444444444444444444444444444444444".into()),
            stablecoin_address: Some("0x5555555555555555555555555555555555555555".into()),
            native_decimals: 18,
            stablecoin_decimals: 6,
        }
        .validate()
        .unwrap()
    }

    fn test_wallet() -> LocalWallet {
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_wallet_bound_to_chain() {
        let client = ChainClient::new(test_config(), test_wallet());
        assert_eq!(client.chain_id(), ChainId(84532));
        assert_eq!(client.endpoints.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_exhaust() {
        // Nothing listens on these ports; every endpoint should fail
        // transiently and the call must end in ChainUnreachable.
        let mut client = ChainClient::new(test_config(), test_wallet());
        client.retry_policy = RetryPolicy {
            initial_delay: std::time::Duration::from_millis(1),
            factor: 1,
            max_attempts: 1,
            jitter: 0.0,
        };
        let result = client.get_deposit_balance(EthAddress::zero(), EthAddress::zero()).await;
        assert!(matches!(result, Err(ChainError::ChainUnreachable(ChainId(84532)))));
    }
}
