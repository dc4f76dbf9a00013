use crate::score::RankedHost;
use dashmap::DashMap;
use infermesh_chain::{EthAddress, H256};
use infermesh_core::ChainId;
use std::time::{Duration, Instant};

/// Discovery results live this long before a fresh registry scan.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    stored_at: Instant,
    hosts: Vec<RankedHost>,
}

/// Per `(chainId, modelId)` result cache.
///
/// Invalidated by TTL, by explicit refresh, or when a caller reports a
/// failed connection to a cached host.
#[derive(Default)]
pub struct DiscoveryCache {
    entries: DashMap<(u64, H256), CacheEntry>,
    ttl: Duration,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), ttl: CACHE_TTL }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, chain_id: ChainId, model_id: H256) -> Option<Vec<RankedHost>> {
        let key = (chain_id.as_u64(), model_id);
        let entry = self.entries.get(&key)?;
        if entry.stored_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.hosts.clone())
    }

    pub fn insert(&self, chain_id: ChainId, model_id: H256, hosts: Vec<RankedHost>) {
        self.entries
            .insert((chain_id.as_u64(), model_id), CacheEntry { stored_at: Instant::now(), hosts });
    }

    /// Explicit refresh for one key.
    pub fn invalidate(&self, chain_id: ChainId, model_id: H256) {
        self.entries.remove(&(chain_id.as_u64(), model_id));
    }

    /// Drop every cached result that contains `host`. Called when a
    /// connection to a cached host fails.
    pub fn invalidate_host(&self, host: EthAddress) {
        self.entries.retain(|_, entry| !entry.hosts.iter().any(|h| h.address == host));
    }

    /// Full flush, e.g. on an observed chain reorganization.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infermesh_chain::U256;

    fn host(byte: u8) -> RankedHost {
        RankedHost {
            address: EthAddress::from([byte; 20]),
            api_url: String::new(),
            price_per_token: U256::zero(),
            stake: U256::zero(),
            latency_ms: None,
            score: 1.0,
        }
    }

    #[test]
    fn test_insert_get() {
        let cache = DiscoveryCache::new();
        let model = H256::from([1u8; 32]);
        cache.insert(ChainId(1), model, vec![host(1)]);
        assert_eq!(cache.get(ChainId(1), model).unwrap().len(), 1);
        assert!(cache.get(ChainId(2), model).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = DiscoveryCache::with_ttl(Duration::from_millis(10));
        let model = H256::from([1u8; 32]);
        cache.insert(ChainId(1), model, vec![host(1)]);
        std::thread::sleep(Duration::from_millis(15));
        assert!(cache.get(ChainId(1), model).is_none());
    }

    #[test]
    fn test_invalidate_host_sweeps_entries() {
        let cache = DiscoveryCache::new();
        let model_a = H256::from([1u8; 32]);
        let model_b = H256::from([2u8; 32]);
        cache.insert(ChainId(1), model_a, vec![host(1), host(2)]);
        cache.insert(ChainId(1), model_b, vec![host(3)]);
        cache.invalidate_host(EthAddress::from([2u8; 20]));
        assert!(cache.get(ChainId(1), model_a).is_none());
        assert!(cache.get(ChainId(1), model_b).is_some());
    }
}
