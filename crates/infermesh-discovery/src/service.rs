use crate::cache::DiscoveryCache;
use crate::error::{DiscoveryError, Result};
use crate::probe::probe_health;
use crate::score::{rank, Candidate, RankedHost};
use infermesh_chain::{ChainClient, EthAddress, H256, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// Protocol-minimum stake (in FAB base units, 18 decimals) a host must
/// carry to be considered at all.
pub fn default_min_stake() -> U256 {
    U256::from(1_000u64) * U256::exp10(18)
}

#[derive(Debug, Clone)]
pub struct DiscoveryQuery {
    pub model_id: H256,
    /// Price cap in base units of `token`; no cap when absent.
    pub max_price_per_token: Option<U256>,
    /// Defaults to the protocol minimum.
    pub min_stake: Option<U256>,
    /// Session currency the price cap is denominated in.
    pub token: EthAddress,
}

impl DiscoveryQuery {
    pub fn for_model(model_id: H256, token: EthAddress) -> Self {
        Self { model_id, max_price_per_token: None, min_stake: None, token }
    }
}

/// Ranked host discovery over one chain's registry.
pub struct Discovery {
    chain: Arc<ChainClient>,
    cache: DiscoveryCache,
    http: reqwest::Client,
    /// Probing can be disabled for offline ranking.
    probe_enabled: bool,
}

impl Discovery {
    pub fn new(chain: Arc<ChainClient>) -> Self {
        Self {
            chain,
            cache: DiscoveryCache::new(),
            http: reqwest::Client::new(),
            probe_enabled: true,
        }
    }

    pub fn without_probing(mut self) -> Self {
        self.probe_enabled = false;
        self
    }

    /// Ranked candidates for the query, best host first. Serves from
    /// cache within the TTL.
    pub async fn discover(&self, query: &DiscoveryQuery) -> Result<Vec<RankedHost>> {
        let chain_id = self.chain.chain_id();
        if let Some(cached) = self.cache.get(chain_id, query.model_id) {
            debug!("discovery cache hit for {}/{:#x}", chain_id, query.model_id);
            return Ok(cached);
        }

        let all = self.chain.get_active_hosts().await?;
        let total = all.len();
        let min_stake = query.min_stake.unwrap_or_else(default_min_stake);

        let eligible: Vec<_> = all
            .into_iter()
            .filter(|h| h.stake >= min_stake)
            .filter(|h| h.supported_models.contains(&query.model_id))
            .filter(|h| {
                query.max_price_per_token.map(|cap| h.price_per_token <= cap).unwrap_or(true)
            })
            .collect();

        if eligible.is_empty() {
            return Err(DiscoveryError::NoHosts {
                model: format!("{:#x}", query.model_id),
                filtered: total,
            });
        }

        let mut candidates = Vec::with_capacity(eligible.len());
        for host in eligible {
            let (healthy, latency_ms) = if self.probe_enabled {
                let outcome = probe_health(&self.http, &host.api_url).await;
                (outcome.healthy, outcome.latency_ms)
            } else {
                (true, None)
            };
            candidates.push(Candidate {
                address: host.address,
                api_url: host.api_url,
                price_per_token: host.price_per_token,
                stake: host.stake,
                latency_ms,
                healthy,
            });
        }

        let ranked = rank(candidates);
        info!(
            "discovery for {}/{:#x}: {} candidates ranked",
            chain_id,
            query.model_id,
            ranked.len()
        );
        self.cache.insert(chain_id, query.model_id, ranked.clone());
        Ok(ranked)
    }

    /// Force the next `discover` for this model to rescan the registry.
    pub fn refresh(&self, model_id: H256) {
        self.cache.invalidate(self.chain.chain_id(), model_id);
    }

    /// Report a failed connection to a host previously handed out; all
    /// cached results naming it are dropped.
    pub fn report_unreachable(&self, host: EthAddress) {
        self.cache.invalidate_host(host);
    }
}
