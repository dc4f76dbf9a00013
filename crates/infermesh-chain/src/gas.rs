//! EIP-1559 fee profiles.
//!
//! Three operator-selectable profiles scale the provider's fee
//! estimate; every gas limit gets a 20% safety buffer on top of the
//! node's estimate.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Buffer applied to gas-limit estimates, in percent.
const GAS_LIMIT_BUFFER_PCT: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasProfile {
    /// Cheapest inclusion; may wait several blocks.
    Low,
    #[default]
    Normal,
    /// Urgent inclusion (withdrawals, settlement races).
    High,
}

impl GasProfile {
    /// Multiplier applied to the estimated priority fee, in percent.
    fn priority_pct(self) -> u64 {
        match self {
            GasProfile::Low => 80,
            GasProfile::Normal => 100,
            GasProfile::High => 150,
        }
    }

    /// Scale a provider max-fee/priority-fee estimate for this profile.
    pub fn scale_fee(self, estimate: U256) -> U256 {
        estimate * U256::from(self.priority_pct()) / U256::from(100u64)
    }
}

impl std::str::FromStr for GasProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(GasProfile::Low),
            "normal" => Ok(GasProfile::Normal),
            "high" => Ok(GasProfile::High),
            other => Err(format!("unknown gas profile: {other}")),
        }
    }
}

/// Gas limit with the 20% safety buffer applied.
pub fn buffered_gas_limit(estimate: U256) -> U256 {
    estimate + estimate * U256::from(GAS_LIMIT_BUFFER_PCT) / U256::from(100u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_adds_twenty_percent() {
        assert_eq!(buffered_gas_limit(U256::from(100_000u64)), U256::from(120_000u64));
    }

    #[test]
    fn test_profiles_order_fees() {
        let estimate = U256::from(1_000_000_000u64);
        let low = GasProfile::Low.scale_fee(estimate);
        let normal = GasProfile::Normal.scale_fee(estimate);
        let high = GasProfile::High.scale_fee(estimate);
        assert!(low < normal && normal < high);
        assert_eq!(normal, estimate);
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!("high".parse::<GasProfile>().unwrap(), GasProfile::High);
        assert!("turbo".parse::<GasProfile>().is_err());
    }
}
