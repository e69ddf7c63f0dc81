//! Gas price and gas limit heuristics for badge transactions

use crate::config::GasConfig;

use ethers::types::U256;
use tracing::debug;

const WEI_IN_GWEI: u64 = 1_000_000_000;

/// Gas estimator for mint and replacement transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Multiplier applied to the network's current price
    price_multiplier: u64,
    /// Lowest price ever offered, in gwei
    price_floor_gwei: u64,
    /// Price assumed when the network reports none, in gwei
    fallback_price_gwei: u64,
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(config: &GasConfig) -> Self {
        Self {
            price_multiplier: config.price_multiplier,
            price_floor_gwei: config.price_floor_gwei,
            fallback_price_gwei: config.fallback_price_gwei,
            gas_limit_buffer_percent: config.gas_limit_buffer_percent,
        }
    }

    /// Price above the current network price, so a mint is not left pending
    pub fn bumped_gas_price(&self, current: Option<U256>) -> U256 {
        let base_gwei = current
            .map(|price| price / U256::from(WEI_IN_GWEI))
            .unwrap_or_else(|| U256::from(self.fallback_price_gwei));

        let gwei = std::cmp::max(
            base_gwei.saturating_mul(U256::from(self.price_multiplier)),
            U256::from(self.price_floor_gwei),
        );

        debug!("Bumped gas price: base {} gwei -> {} gwei", base_gwei, gwei);
        gwei.saturating_mul(U256::from(WEI_IN_GWEI))
    }

    /// Explicit price for a replacement transaction
    pub fn fixed_gas_price(gwei: u64) -> U256 {
        U256::from(gwei).saturating_mul(U256::from(WEI_IN_GWEI))
    }

    /// Gas limit with headroom over an estimate
    pub fn with_headroom(&self, estimate: U256) -> U256 {
        let buffer = estimate * self.gas_limit_buffer_percent / 100;
        estimate.saturating_add(buffer)
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(&GasConfig::default())
    }
}

/// Render a wei amount as whole gwei for log output
pub fn to_gwei(wei: U256) -> U256 {
    wei / U256::from(WEI_IN_GWEI)
}
