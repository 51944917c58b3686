use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use prometheus::{
    histogram_opts, opts, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

pub static METRICS: OnceCell<Arc<Metrics>> = OnceCell::new();

#[derive(Debug)]
pub struct Metrics {
    // Wallet
    pub account_balance: Gauge,

    // EL RPC
    pub eth1_rpc_errors_total: IntCounter,
    pub eth1_rpc_resets_total: IntCounter,

    // Deposit event index
    pub cached_deposit_events: IntGauge,
    pub integrity_check_failures_total: IntCounter,

    // Per-module key classification of the last completed cycle
    pub unused_keys: IntGaugeVec,
    pub invalid_keys: IntGaugeVec,
    pub duplicated_keys: IntGaugeVec,
    pub front_run_keys: IntGaugeVec,

    // Decision pipeline
    pub cycle_duration_seconds: Histogram,
    pub cycles_skipped_total: IntCounter,
    pub messages_sent_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            account_balance: Gauge::new(
                "council_daemon_account_balance",
                "Guardian wallet balance in ether",
            )?,
            eth1_rpc_errors_total: IntCounter::new(
                "council_daemon_eth1_rpc_errors_total",
                "Failed EL RPC requests",
            )?,
            eth1_rpc_resets_total: IntCounter::new(
                "council_daemon_eth1_rpc_resets_total",
                "Times the EL RPC provider pool was exhausted and rewound",
            )?,
            cached_deposit_events: IntGauge::new(
                "council_daemon_cached_deposit_events",
                "Verified deposit events held in the persistent cache",
            )?,
            integrity_check_failures_total: IntCounter::new(
                "council_daemon_integrity_check_failures_total",
                "Deposit root mismatches between the local tree and the contract",
            )?,
            unused_keys: IntGaugeVec::new(
                opts!(
                    "council_daemon_unused_keys",
                    "Unused keys per staking module in the last cycle",
                ),
                &["module_id"],
            )?,
            invalid_keys: IntGaugeVec::new(
                opts!(
                    "council_daemon_invalid_keys",
                    "Keys with invalid deposit signatures per staking module",
                ),
                &["module_id"],
            )?,
            duplicated_keys: IntGaugeVec::new(
                opts!(
                    "council_daemon_duplicated_keys",
                    "Duplicated vetted keys per staking module",
                ),
                &["module_id"],
            )?,
            front_run_keys: IntGaugeVec::new(
                opts!(
                    "council_daemon_front_run_keys",
                    "Vetted keys with front-running deposits per staking module",
                ),
                &["module_id"],
            )?,
            cycle_duration_seconds: Histogram::with_opts(histogram_opts!(
                "council_daemon_cycle_duration_seconds",
                "Wall-clock duration of one full decision cycle",
            ))?,
            cycles_skipped_total: IntCounter::new(
                "council_daemon_cycles_skipped_total",
                "Cycles skipped because the previous one was still running",
            )?,
            messages_sent_total: IntCounterVec::new(
                opts!(
                    "council_daemon_messages_sent_total",
                    "Messages published to the broker by kind",
                ),
                &["kind"],
            )?,
        })
    }

    pub fn register_with_default_registry(&self) -> Result<()> {
        let registry = prometheus::default_registry();

        registry.register(Box::new(self.account_balance.clone()))?;
        registry.register(Box::new(self.eth1_rpc_errors_total.clone()))?;
        registry.register(Box::new(self.eth1_rpc_resets_total.clone()))?;
        registry.register(Box::new(self.cached_deposit_events.clone()))?;
        registry.register(Box::new(self.integrity_check_failures_total.clone()))?;
        registry.register(Box::new(self.unused_keys.clone()))?;
        registry.register(Box::new(self.invalid_keys.clone()))?;
        registry.register(Box::new(self.duplicated_keys.clone()))?;
        registry.register(Box::new(self.front_run_keys.clone()))?;
        registry.register(Box::new(self.cycle_duration_seconds.clone()))?;
        registry.register(Box::new(self.cycles_skipped_total.clone()))?;
        registry.register(Box::new(self.messages_sent_total.clone()))?;

        Ok(())
    }
}
