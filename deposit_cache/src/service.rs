use std::sync::Arc;

use anyhow::{ensure, Result};
use eth1_api::{Eth1Api, Eth1Block};
use log::info;
use prometheus_metrics::Metrics;
use thiserror::Error;
use types::{deposit::DepositEventGroup, primitives::BlockNumber};

use crate::{
    fetcher::DepositFetcher,
    sanity::DepositIntegrityChecker,
    store::{CacheHeaders, DepositEventStore},
};

/// Events this close to the chain head are not cached yet; they stay in the
/// fresh window that is re-fetched and re-verified every cycle.
pub const DEPOSIT_EVENTS_CACHE_LAG_BLOCKS: u64 = 100;

#[derive(Debug, Error)]
enum Error {
    #[error("deposit cache is ahead of the EL node")]
    CacheRegression,
    #[error("deposit root mismatch, refusing to use the event cache")]
    IntegrityCheckFailed,
    #[error("EL node has no block {0}")]
    MissingBlock(BlockNumber),
}

/// Keeps the persistent deposit-event index up to date and serves the full
/// event history of a cycle, verified against the deposit contract root.
pub struct DepositService {
    api: Arc<Eth1Api>,
    store: DepositEventStore,
    fetcher: DepositFetcher,
    checker: DepositIntegrityChecker,
    metrics: Option<Arc<Metrics>>,
}

impl DepositService {
    /// Loads the persisted cache and replays it into the integrity tree.
    pub fn initialize(
        api: Arc<Eth1Api>,
        store: DepositEventStore,
        fetcher: DepositFetcher,
        mut checker: DepositIntegrityChecker,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let cache = store.get_cache()?;

        info!(
            "loaded {} cached deposit events covering blocks {}..={}",
            cache.events.len(),
            cache.headers.start_block,
            cache.headers.end_block,
        );

        checker.rebuild_from(&cache.events)?;

        if let Some(metrics) = metrics.as_ref() {
            metrics
                .cached_deposit_events
                .set(i64::try_from(cache.events.len()).unwrap_or(i64::MAX));
        }

        Ok(Self {
            api,
            store,
            fetcher,
            checker,
            metrics,
        })
    }

    /// Extends the cache up to `current.number - DEPOSIT_EVENTS_CACHE_LAG_BLOCKS`
    /// and reconciles the extended tree against the contract root at the new
    /// cache boundary. Nothing is marked valid when the roots disagree.
    pub async fn update_events_cache(&mut self, current: &Eth1Block) -> Result<()> {
        let cache = self.store.get_cache()?;

        ensure!(
            DepositIntegrityChecker::verify_cache_block(&cache, current.number),
            Error::CacheRegression,
        );

        let to_block = current.number.saturating_sub(DEPOSIT_EVENTS_CACHE_LAG_BLOCKS);

        if to_block <= cache.headers.end_block {
            return Ok(());
        }

        let from_block = next_fetch_block(&cache.headers);
        let group = self.fetcher.fetch_events(from_block, to_block).await?;

        let boundary_block = self
            .api
            .get_block_by_number(to_block)
            .await?
            .ok_or(Error::MissingBlock(to_block))?;

        // The extension is applied to a clone first; the running tree and the
        // store only advance when the contract agrees at the new boundary.
        ensure!(
            self.checker
                .verify_updated_events(boundary_block.hash, &group.events)
                .await?,
            Error::IntegrityCheckFailed,
        );

        self.checker.add_event_group(&group.events)?;

        self.store.insert_events_batch(
            CacheHeaders {
                start_block: cache.headers.start_block,
                end_block: to_block,
            },
            &group.events,
        )?;

        if let Some(last) = group.events.last() {
            self.store.set_last_valid_event(last)?;
        }

        if !group.events.is_empty() {
            info!(
                "cached {} new deposit events up to block {to_block}",
                group.events.len(),
            );
        }

        if let Some(metrics) = self.metrics.as_ref() {
            let total = cache.events.len() + group.events.len();
            metrics
                .cached_deposit_events
                .set(i64::try_from(total).unwrap_or(i64::MAX));
        }

        Ok(())
    }

    /// Returns every deposit event from the deployment block up to the
    /// cycle's block: the cached range plus a freshly fetched window, the
    /// latter verified against the contract root at the cycle's block hash.
    pub async fn get_all_deposited_events(
        &self,
        current: &Eth1Block,
    ) -> Result<DepositEventGroup> {
        let cache = self.store.get_cache()?;

        ensure!(
            DepositIntegrityChecker::verify_cache_block(&cache, current.number),
            Error::CacheRegression,
        );

        let mut events = cache.events;

        if current.number > cache.headers.end_block {
            let from_block = next_fetch_block(&cache.headers);
            let fresh = self.fetcher.fetch_events(from_block, current.number).await?;

            ensure!(
                self.checker
                    .verify_fresh_events(current.hash, &fresh.events)
                    .await?,
                Error::IntegrityCheckFailed,
            );

            events.extend(fresh.events);
        }

        Ok(DepositEventGroup {
            events,
            start_block: cache.headers.start_block,
            end_block: current.number,
        })
    }
}

/// First block that is not covered by the cache yet.
fn next_fetch_block(headers: &CacheHeaders) -> BlockNumber {
    if headers.end_block == 0 {
        headers.start_block
    } else {
        headers.end_block + 1
    }
}
