//! Candidate ranking.
//!
//! `score = 0.5·(1 − normPrice) + 0.3·(stake/maxStake) + 0.2·(1 − normLatency)`,
//! with a flat penalty for hosts that failed the health probe and a
//! lexicographic address tie-break.

use infermesh_chain::{EthAddress, U256};
use serde::Serialize;

/// Penalty subtracted from the weighted score when the probe failed.
const PROBE_PENALTY: f64 = 0.5;

const WEIGHT_PRICE: f64 = 0.5;
const WEIGHT_STAKE: f64 = 0.3;
const WEIGHT_LATENCY: f64 = 0.2;

/// A host that survived filtering, before ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: EthAddress,
    pub api_url: String,
    pub price_per_token: U256,
    pub stake: U256,
    pub latency_ms: Option<u64>,
    pub healthy: bool,
}

/// A ranked host as returned to callers, best first.
#[derive(Debug, Clone, Serialize)]
pub struct RankedHost {
    pub address: EthAddress,
    pub api_url: String,
    pub price_per_token: U256,
    pub stake: U256,
    pub latency_ms: Option<u64>,
    pub score: f64,
}

/// Order candidates by score, descending; ties break on address.
pub fn rank(candidates: Vec<Candidate>) -> Vec<RankedHost> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let max_price = candidates.iter().map(|c| c.price_per_token).max().unwrap_or_default();
    let max_stake = candidates.iter().map(|c| c.stake).max().unwrap_or_default();
    let max_latency = candidates.iter().filter_map(|c| c.latency_ms).max().unwrap_or(0);

    let mut ranked: Vec<RankedHost> = candidates
        .into_iter()
        .map(|c| {
            let norm_price = ratio(c.price_per_token, max_price);
            let norm_stake = ratio(c.stake, max_stake);
            let norm_latency = if max_latency == 0 {
                0.0
            } else {
                c.latency_ms.map(|l| l as f64 / max_latency as f64).unwrap_or(1.0)
            };
            let mut score = WEIGHT_PRICE * (1.0 - norm_price)
                + WEIGHT_STAKE * norm_stake
                + WEIGHT_LATENCY * (1.0 - norm_latency);
            if !c.healthy {
                score -= PROBE_PENALTY;
            }
            RankedHost {
                address: c.address,
                api_url: c.api_url,
                price_per_token: c.price_per_token,
                stake: c.stake,
                latency_ms: c.latency_ms,
                score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    });
    ranked
}

/// `value / max` as f64, for ranking only. Never used for money math.
fn ratio(value: U256, max: U256) -> f64 {
    if max.is_zero() {
        return 0.0;
    }
    // Scale into u128 range first to keep the division exact enough
    let scaled = value * U256::from(1_000_000u64) / max;
    scaled.as_u128() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(byte: u8, price: u64, stake: u64, latency: Option<u64>, healthy: bool) -> Candidate {
        Candidate {
            address: EthAddress::from([byte; 20]),
            api_url: format!("https://host-{byte}.example.org"),
            price_per_token: U256::from(price),
            stake: U256::from(stake),
            latency_ms: latency,
            healthy,
        }
    }

    #[test]
    fn test_cheaper_host_wins_all_else_equal() {
        let ranked = rank(vec![
            candidate(1, 200, 1000, Some(50), true),
            candidate(2, 100, 1000, Some(50), true),
        ]);
        assert_eq!(ranked[0].address, EthAddress::from([2u8; 20]));
    }

    #[test]
    fn test_higher_stake_wins_all_else_equal() {
        let ranked = rank(vec![
            candidate(1, 100, 500, Some(50), true),
            candidate(2, 100, 2000, Some(50), true),
        ]);
        assert_eq!(ranked[0].address, EthAddress::from([2u8; 20]));
    }

    #[test]
    fn test_failed_probe_penalized() {
        let ranked = rank(vec![
            candidate(1, 100, 1000, Some(50), true),
            candidate(2, 50, 2000, None, false),
        ]);
        // Host 2 is cheaper and better staked but failed its probe
        assert_eq!(ranked[0].address, EthAddress::from([1u8; 20]));
    }

    #[test]
    fn test_tie_breaks_on_address() {
        let ranked = rank(vec![
            candidate(9, 100, 1000, Some(50), true),
            candidate(3, 100, 1000, Some(50), true),
        ]);
        assert_eq!(ranked[0].address, EthAddress::from([3u8; 20]));
    }

    #[test]
    fn test_empty_input() {
        assert!(rank(Vec::new()).is_empty());
    }

    #[test]
    fn test_ratio_is_bounded() {
        assert_eq!(ratio(U256::zero(), U256::zero()), 0.0);
        assert!((ratio(U256::from(1u64), U256::from(2u64)) - 0.5).abs() < 1e-6);
        assert!((ratio(U256::from(5u64), U256::from(5u64)) - 1.0).abs() < 1e-6);
    }
}
