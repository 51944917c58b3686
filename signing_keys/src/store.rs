use std::collections::BTreeSet;

use anyhow::{ensure, Result};
use database::Database;
use eth1_api::SigningKeyEventLog;
use serde::{Deserialize, Serialize};
use serde_json::{from_slice, to_vec};
use thiserror::Error;
use types::primitives::{Address, BlockNumber, LogIndex, OperatorIndex, PublicKeyBytes, H256};

const EVENT_KEY_PREFIX: &str = "ev";
const START_BLOCK_KEY: &str = "header_start";
const END_BLOCK_KEY: &str = "header_end";
const MODULES_KEY: &str = "header_modules";

/// A persisted `SigningKeyAdded` registry event.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningKeyEvent {
    pub module_address: Address,
    pub operator_index: OperatorIndex,
    pub pubkey: PublicKeyBytes,
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub log_index: LogIndex,
}

impl SigningKeyEvent {
    #[must_use]
    pub const fn chain_position(&self) -> (BlockNumber, LogIndex) {
        (self.block_number, self.log_index)
    }
}

impl From<SigningKeyEventLog> for SigningKeyEvent {
    fn from(log: SigningKeyEventLog) -> Self {
        Self {
            module_address: log.module_address,
            operator_index: log.operator_index,
            pubkey: log.pubkey,
            block_number: log.block_number,
            block_hash: log.block_hash,
            log_index: log.log_index,
        }
    }
}

/// Range and module set the cache was built for. A different module set
/// invalidates the whole cache since absent modules were never scanned.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningKeyEventsHeaders {
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
    pub staking_modules_addresses: BTreeSet<Address>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SigningKeyEventsCache {
    pub headers: SigningKeyEventsHeaders,
    pub events: Vec<SigningKeyEvent>,
}

impl SigningKeyEventsCache {
    /// The earliest recorded addition of `pubkey` by the given operator of
    /// the given module, if its history was scanned.
    #[must_use]
    pub fn earliest_addition(
        &self,
        module_address: Address,
        operator_index: OperatorIndex,
        pubkey: PublicKeyBytes,
    ) -> Option<(BlockNumber, LogIndex)> {
        self.events
            .iter()
            .filter(|event| {
                event.module_address == module_address
                    && event.operator_index == operator_index
                    && event.pubkey == pubkey
            })
            .map(SigningKeyEvent::chain_position)
            .min()
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("cache headers are inverted: {start_block} > {end_block}")]
    InvertedHeaders {
        start_block: BlockNumber,
        end_block: BlockNumber,
    },
}

/// Persistent cache of key-addition history, keyed so that iteration yields
/// module-grouped chain order.
pub struct SigningKeyEventStore {
    database: Database,
}

impl SigningKeyEventStore {
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn insert_events_batch(
        &self,
        headers: &SigningKeyEventsHeaders,
        events: &[SigningKeyEvent],
    ) -> Result<()> {
        ensure!(
            headers.start_block <= headers.end_block,
            Error::InvertedHeaders {
                start_block: headers.start_block,
                end_block: headers.end_block,
            },
        );

        let pairs = events
            .iter()
            .map(|event| {
                let key = event_key(event.module_address, event.block_number, event.log_index);
                Ok((key, to_vec(event)?))
            })
            .chain([
                Ok((START_BLOCK_KEY.to_owned(), to_vec(&headers.start_block)?)),
                Ok((END_BLOCK_KEY.to_owned(), to_vec(&headers.end_block)?)),
                Ok((
                    MODULES_KEY.to_owned(),
                    to_vec(&headers.staking_modules_addresses)?,
                )),
            ])
            .collect::<Result<Vec<_>>>()?;

        self.database.put_batch(pairs)
    }

    pub fn get_cache(&self) -> Result<SigningKeyEventsCache> {
        let events = self
            .database
            .iterator_ascending(EVENT_KEY_PREFIX..)?
            .take_while(|result| {
                result
                    .as_ref()
                    .map(|(key, _)| key.starts_with(EVENT_KEY_PREFIX.as_bytes()))
                    .unwrap_or(true)
            })
            .map(|result| {
                let (_, value) = result?;
                from_slice::<SigningKeyEvent>(&value).map_err(Into::into)
            })
            .collect::<Result<Vec<_>>>()?;

        let start_block = self.read_json(START_BLOCK_KEY)?.unwrap_or_default();
        let end_block = self.read_json(END_BLOCK_KEY)?.unwrap_or_default();
        let staking_modules_addresses = self.read_json(MODULES_KEY)?.unwrap_or_default();

        Ok(SigningKeyEventsCache {
            headers: SigningKeyEventsHeaders {
                start_block,
                end_block,
                staking_modules_addresses,
            },
            events,
        })
    }

    /// Drops everything. Used when the tracked module set changes.
    pub fn clear(&self) -> Result<()> {
        let keys = self
            .database
            .iterator_ascending(""..)?
            .map(|result| Ok(result?.0.into_owned()))
            .collect::<Result<Vec<_>>>()?;

        for key in keys {
            self.database.delete(key)?;
        }

        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.database
            .get(key)?
            .map(|value| from_slice(&value).map_err(Into::into))
            .transpose()
    }
}

fn event_key(module_address: Address, block_number: BlockNumber, log_index: LogIndex) -> String {
    format!("{EVENT_KEY_PREFIX}{module_address:x}{block_number:020}{log_index:010}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(
        module_address: Address,
        block_number: BlockNumber,
        log_index: LogIndex,
    ) -> SigningKeyEvent {
        SigningKeyEvent {
            module_address,
            operator_index: 1,
            pubkey: PublicKeyBytes::repeat_byte(7),
            block_number,
            block_hash: H256::repeat_byte(8),
            log_index,
        }
    }

    fn headers(modules: impl IntoIterator<Item = Address>) -> SigningKeyEventsHeaders {
        SigningKeyEventsHeaders {
            start_block: 0,
            end_block: 500,
            staking_modules_addresses: modules.into_iter().collect(),
        }
    }

    #[test]
    fn cache_round_trips_events_and_module_set() -> Result<()> {
        let store = SigningKeyEventStore::new(Database::in_memory());
        let module = Address::repeat_byte(0x11);

        store.insert_events_batch(&headers([module]), &[event(module, 10, 0), event(module, 10, 1)])?;

        let cache = store.get_cache()?;

        assert_eq!(cache.headers.end_block, 500);
        assert_eq!(
            cache.headers.staking_modules_addresses,
            BTreeSet::from([module]),
        );
        assert_eq!(cache.events.len(), 2);

        Ok(())
    }

    #[test]
    fn events_of_one_module_are_contiguous_and_ordered() -> Result<()> {
        let store = SigningKeyEventStore::new(Database::in_memory());
        let first = Address::repeat_byte(0x11);
        let second = Address::repeat_byte(0x22);

        store.insert_events_batch(
            &headers([first, second]),
            &[event(second, 5, 0), event(first, 9, 0), event(first, 5, 1)],
        )?;

        let cache = store.get_cache()?;

        let positions = cache
            .events
            .iter()
            .map(|event| (event.module_address, event.block_number, event.log_index))
            .collect::<Vec<_>>();

        assert_eq!(
            positions,
            [(first, 5, 1), (first, 9, 0), (second, 5, 0)],
        );

        Ok(())
    }

    #[test]
    fn clear_empties_the_cache() -> Result<()> {
        let store = SigningKeyEventStore::new(Database::in_memory());
        let module = Address::repeat_byte(0x11);

        store.insert_events_batch(&headers([module]), &[event(module, 10, 0)])?;
        store.clear()?;

        assert_eq!(store.get_cache()?, SigningKeyEventsCache::default());

        Ok(())
    }
}
