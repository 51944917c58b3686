use std::{collections::BTreeSet, sync::Arc};

use anyhow::Result;
use eth1_api::{contracts, Eth1Api};
use itertools::Itertools as _;
use log::{debug, info};
use types::primitives::{Address, BlockNumber};

use crate::store::{SigningKeyEvent, SigningKeyEventStore, SigningKeyEventsCache, SigningKeyEventsHeaders};

const EVENTS_STEP: u64 = 10_000;

/// Maintains the `SigningKeyAdded` history of the tracked staking modules.
pub struct SigningKeyEventsService {
    api: Arc<Eth1Api>,
    store: SigningKeyEventStore,
    deployment_block: BlockNumber,
}

impl SigningKeyEventsService {
    #[must_use]
    pub const fn new(
        api: Arc<Eth1Api>,
        store: SigningKeyEventStore,
        deployment_block: BlockNumber,
    ) -> Self {
        Self {
            api,
            store,
            deployment_block,
        }
    }

    /// Brings the cache up to `current_block` for the given module set.
    /// A changed module set rebuilds the cache from the deployment block,
    /// since the new modules' history was never scanned.
    pub async fn update(
        &self,
        module_addresses: &BTreeSet<Address>,
        current_block: BlockNumber,
    ) -> Result<()> {
        let mut cache_headers = self.store.get_cache()?.headers;

        if cache_headers.staking_modules_addresses != *module_addresses {
            if !cache_headers.staking_modules_addresses.is_empty() {
                info!("staking module set changed, rebuilding the key-addition cache");
            }

            self.store.clear()?;

            cache_headers = SigningKeyEventsHeaders {
                start_block: self.deployment_block,
                end_block: 0,
                staking_modules_addresses: module_addresses.clone(),
            };
        }

        let from_block = if cache_headers.end_block == 0 {
            self.deployment_block
        } else {
            cache_headers.end_block + 1
        };

        if from_block > current_block {
            return Ok(());
        }

        let addresses = module_addresses.iter().copied().collect_vec();

        let mut chunk_start = from_block;

        while chunk_start <= current_block {
            let chunk_end = current_block.min(chunk_start + EVENTS_STEP - 1);

            debug!("fetching key-addition events from block {chunk_start} to block {chunk_end}");

            let events = contracts::signing_key_events(
                &self.api,
                addresses.clone(),
                chunk_start,
                chunk_end,
            )
            .await?
            .into_iter()
            .map(SigningKeyEvent::from)
            .collect_vec();

            let headers = SigningKeyEventsHeaders {
                start_block: cache_headers.start_block.max(self.deployment_block),
                end_block: chunk_end,
                staking_modules_addresses: module_addresses.clone(),
            };

            self.store.insert_events_batch(&headers, &events)?;

            chunk_start = chunk_end + 1;
        }

        Ok(())
    }

    pub fn cached_events(&self) -> Result<SigningKeyEventsCache> {
        self.store.get_cache()
    }
}
