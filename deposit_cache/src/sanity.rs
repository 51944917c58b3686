use std::sync::Arc;

use anyhow::Result;
use deposit_tree::DepositTree;
use eth1_api::DepositContract;
use log::warn;
use prometheus_metrics::Metrics;
use types::{
    deposit::VerifiedDepositEvent,
    primitives::{BlockNumber, H256},
};

use crate::store::DepositEventsCache;

/// Reconciles the locally built deposit tree against the deposit contract.
///
/// The running tree covers exactly the cached block range. Events past the
/// cache are applied to a clone, so a root mismatch never corrupts the
/// accumulated state.
pub struct DepositIntegrityChecker {
    tree: DepositTree,
    contract: Arc<DepositContract>,
    metrics: Option<Arc<Metrics>>,
}

impl DepositIntegrityChecker {
    #[must_use]
    pub fn new(contract: Arc<DepositContract>, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            tree: DepositTree::default(),
            contract,
            metrics,
        }
    }

    /// Replays the persisted cache into a fresh tree at startup.
    pub fn rebuild_from(&mut self, events: &[VerifiedDepositEvent]) -> Result<()> {
        self.tree = DepositTree::default();
        self.add_event_group(events)
    }

    /// An RPC answering from an older state than the cache is a regression;
    /// the cycle must not act on it.
    #[must_use]
    pub fn verify_cache_block(cache: &DepositEventsCache, current_block: BlockNumber) -> bool {
        if cache.headers.end_block > current_block {
            warn!(
                "deposit cache covers block {} but the node reports block {current_block}",
                cache.headers.end_block,
            );

            return false;
        }

        true
    }

    /// Folds a fetched block window into the running tree, in chain order.
    pub fn add_event_group(&mut self, events: &[VerifiedDepositEvent]) -> Result<()> {
        let mut ordered = events.iter().collect::<Vec<_>>();
        ordered.sort_by_key(|event| event.chain_position());

        for event in ordered {
            self.tree.insert(event.deposit_data_root)?;
        }

        Ok(())
    }

    /// Compares the tree, extended with events up to the finalized block,
    /// against `get_deposit_root()` at the finalized block hash. A mismatch
    /// means the cache must not be treated as valid.
    pub async fn verify_updated_events(
        &self,
        finalized_block_hash: H256,
        events_past_cache: &[VerifiedDepositEvent],
    ) -> Result<bool> {
        let matches = self
            .verify_at(finalized_block_hash, events_past_cache)
            .await?;

        if !matches {
            warn!("integrity check failed at finalized block {finalized_block_hash:?}");
        }

        Ok(matches)
    }

    /// Same comparison against the latest block, covering events that are
    /// not yet deep enough to cache.
    pub async fn verify_fresh_events(
        &self,
        latest_block_hash: H256,
        fresh_events: &[VerifiedDepositEvent],
    ) -> Result<bool> {
        let matches = self.verify_at(latest_block_hash, fresh_events).await?;

        if !matches {
            warn!("integrity check failed at latest block {latest_block_hash:?}");
        }

        Ok(matches)
    }

    async fn verify_at(&self, block_hash: H256, extra: &[VerifiedDepositEvent]) -> Result<bool> {
        let expected = self.contract.get_deposit_root(block_hash.into()).await?;
        let actual = self.projected_root(extra)?;

        if actual != expected {
            if let Some(metrics) = self.metrics.as_ref() {
                metrics.integrity_check_failures_total.inc();
            }

            return Ok(false);
        }

        Ok(true)
    }

    /// Root of the running tree with `extra` applied to a clone.
    fn projected_root(&self, extra: &[VerifiedDepositEvent]) -> Result<H256> {
        let mut projected = self.tree.clone();

        let mut ordered = extra.iter().collect::<Vec<_>>();
        ordered.sort_by_key(|event| event.chain_position());

        for event in ordered {
            projected.insert(event.deposit_data_root)?;
        }

        Ok(projected.root())
    }
}

#[cfg(test)]
mod tests {
    use eth1_api::Eth1Api;
    use types::primitives::{PublicKeyBytes, SignatureBytes};

    use crate::store::CacheHeaders;

    use super::*;

    fn event(block_number: BlockNumber, log_index: u64, root_byte: u8) -> VerifiedDepositEvent {
        VerifiedDepositEvent {
            block_number,
            block_hash: H256::zero(),
            log_index,
            pubkey: PublicKeyBytes::zero(),
            wc: H256::zero(),
            amount: 32_000_000_000,
            signature: SignatureBytes::zero(),
            deposit_count: 0,
            deposit_data_root: H256::repeat_byte(root_byte),
            tx_hash: H256::zero(),
            valid: true,
        }
    }

    fn new_checker() -> DepositIntegrityChecker {
        let api = Arc::new(Eth1Api::new(reqwest::Client::new(), [], None));
        let contract = Arc::new(DepositContract::new(api, types::primitives::Address::zero()));

        DepositIntegrityChecker::new(contract, None)
    }

    #[test]
    fn cache_ahead_of_the_node_fails_the_block_check() {
        let cache = DepositEventsCache {
            headers: CacheHeaders {
                start_block: 0,
                end_block: 200,
            },
            ..DepositEventsCache::default()
        };

        assert!(DepositIntegrityChecker::verify_cache_block(&cache, 200));
        assert!(!DepositIntegrityChecker::verify_cache_block(&cache, 199));
    }

    #[test]
    fn events_fold_into_the_tree_in_chain_order() -> Result<()> {
        let mut ordered = new_checker();
        ordered.add_event_group(&[event(1, 0, 0xaa), event(1, 1, 0xbb)])?;

        let mut shuffled = new_checker();
        shuffled.add_event_group(&[event(1, 1, 0xbb), event(1, 0, 0xaa)])?;

        assert_eq!(ordered.projected_root(&[])?, shuffled.projected_root(&[])?);

        Ok(())
    }

    #[test]
    fn projected_root_does_not_mutate_the_running_tree() -> Result<()> {
        let mut checker = new_checker();
        checker.add_event_group(&[event(1, 0, 0xaa)])?;

        let base = checker.projected_root(&[])?;
        let extended = checker.projected_root(&[event(2, 0, 0xbb)])?;

        assert_ne!(base, extended);
        assert_eq!(checker.projected_root(&[])?, base);

        Ok(())
    }

    #[test]
    fn rebuild_replaces_previous_state() -> Result<()> {
        let mut checker = new_checker();
        checker.add_event_group(&[event(1, 0, 0xaa)])?;

        let mut fresh = new_checker();
        fresh.add_event_group(&[event(5, 0, 0xcc)])?;

        checker.rebuild_from(&[event(5, 0, 0xcc)])?;

        assert_eq!(checker.projected_root(&[])?, fresh.projected_root(&[])?);

        Ok(())
    }
}
