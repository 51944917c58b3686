use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use eth1_api::Eth1Api;
use log::warn;
use prometheus_metrics::Metrics;
use types::primitives::{Address, BlockNumber, U256};

/// The balance gauge is refreshed at most once per this many blocks.
pub const WALLET_BALANCE_UPDATE_BLOCK_RATE: u64 = 10;

/// Below this balance the guardian can no longer afford emergency
/// transactions and operators must top the wallet up.
const CRITICAL_BALANCE_WEI: u64 = 200_000_000_000_000_000;

const WEI_PER_ETHER: f64 = 1e18;

/// Tracks the guardian wallet balance and exposes it as a gauge.
pub struct BalanceMonitor {
    api: Arc<Eth1Api>,
    address: Address,
    metrics: Option<Arc<Metrics>>,
    last_checked_block: AtomicU64,
    critical: AtomicBool,
}

impl BalanceMonitor {
    #[must_use]
    pub fn new(api: Arc<Eth1Api>, address: Address, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            api,
            address,
            metrics,
            last_checked_block: AtomicU64::new(0),
            critical: AtomicBool::new(false),
        }
    }

    /// Refreshes the balance when enough blocks have passed since the last
    /// refresh. A failed refresh is logged and keeps the previous verdict.
    pub async fn on_new_block(&self, block_number: BlockNumber) {
        let last = self.last_checked_block.load(Ordering::Acquire);

        if last != 0 && block_number < last + WALLET_BALANCE_UPDATE_BLOCK_RATE {
            return;
        }

        match self.refresh().await {
            Ok(()) => self
                .last_checked_block
                .store(block_number, Ordering::Release),
            Err(error) => warn!("failed to refresh wallet balance: {error}"),
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        let balance = self.api.balance(self.address).await?;

        let critical = balance < U256::from(CRITICAL_BALANCE_WEI);
        self.critical.store(critical, Ordering::Release);

        if critical {
            warn!("guardian wallet balance is critically low: {balance} wei");
        }

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.account_balance.set(wei_to_ether(balance));
        }

        Ok(())
    }

    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.critical.load(Ordering::Acquire)
    }
}

fn wei_to_ether(wei: U256) -> f64 {
    let (whole, remainder) = wei.div_mod(U256::exp10(18));

    whole.as_u128() as f64 + remainder.as_u128() as f64 / WEI_PER_ETHER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_convert_to_fractional_ether() {
        assert_eq!(wei_to_ether(U256::exp10(18)), 1.0);
        assert_eq!(wei_to_ether(U256::exp10(17) * U256::from(2)), 0.2);
        assert_eq!(wei_to_ether(U256::zero()), 0.0);
    }
}
