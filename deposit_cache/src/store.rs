use anyhow::{ensure, Result};
use database::Database;
use serde_json::{from_slice, to_vec};
use thiserror::Error;
use types::{
    deposit::VerifiedDepositEvent,
    primitives::{BlockNumber, LogIndex},
};

const EVENT_KEY_PREFIX: &str = "ev";
const START_BLOCK_KEY: &str = "header_start";
const END_BLOCK_KEY: &str = "header_end";
const LAST_VALID_KEY: &str = "last_valid";

/// Block range covered by the cache. Every deposit event inside the range
/// is present; the range only ever grows forward.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CacheHeaders {
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct DepositEventsCache {
    pub headers: CacheHeaders,
    pub events: Vec<VerifiedDepositEvent>,
    pub last_valid_event: Option<VerifiedDepositEvent>,
}

#[derive(Debug, Error)]
enum Error {
    #[error("cache headers are inverted: {start_block} > {end_block}")]
    InvertedHeaders {
        start_block: BlockNumber,
        end_block: BlockNumber,
    },
    #[error("cache end block would move backwards: {stored} > {new}")]
    EndBlockRegression { stored: BlockNumber, new: BlockNumber },
}

/// Persistent, append-only cache of verified deposit events.
///
/// Events are keyed by zero-padded `(block_number, log_index)`, so ordered
/// iteration over the key space yields chain order. A batch insert commits
/// the events and the new headers in one write transaction.
pub struct DepositEventStore {
    database: Database,
    deployment_block: BlockNumber,
}

impl DepositEventStore {
    #[must_use]
    pub const fn new(database: Database, deployment_block: BlockNumber) -> Self {
        Self {
            database,
            deployment_block,
        }
    }

    pub fn insert_events_batch(
        &self,
        headers: CacheHeaders,
        events: &[VerifiedDepositEvent],
    ) -> Result<()> {
        ensure!(
            headers.start_block <= headers.end_block,
            Error::InvertedHeaders {
                start_block: headers.start_block,
                end_block: headers.end_block,
            },
        );

        let stored_end = self.end_block()?;

        ensure!(
            stored_end <= headers.end_block,
            Error::EndBlockRegression {
                stored: stored_end,
                new: headers.end_block,
            },
        );

        let pairs = events
            .iter()
            .map(|event| Ok((event_key(event.block_number, event.log_index), to_vec(event)?)))
            .chain([
                Ok((START_BLOCK_KEY.to_owned(), to_vec(&headers.start_block)?)),
                Ok((END_BLOCK_KEY.to_owned(), to_vec(&headers.end_block)?)),
            ])
            .collect::<Result<Vec<_>>>()?;

        self.database.put_batch(pairs)
    }

    pub fn set_last_valid_event(&self, event: &VerifiedDepositEvent) -> Result<()> {
        self.database.put(LAST_VALID_KEY, to_vec(event)?)
    }

    /// Reads the whole cache in chain order. An empty store reads as the
    /// default cache starting at the deployment block.
    pub fn get_cache(&self) -> Result<DepositEventsCache> {
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
                from_slice::<VerifiedDepositEvent>(&value).map_err(Into::into)
            })
            .collect::<Result<Vec<_>>>()?;

        let start_block = self
            .read_block_number(START_BLOCK_KEY)?
            .unwrap_or_default()
            .max(self.deployment_block);

        let end_block = self.read_block_number(END_BLOCK_KEY)?.unwrap_or_default();

        let last_valid_event = self
            .database
            .get(LAST_VALID_KEY)?
            .map(|value| from_slice(&value))
            .transpose()?;

        Ok(DepositEventsCache {
            headers: CacheHeaders {
                start_block,
                end_block,
            },
            events,
            last_valid_event,
        })
    }

    pub fn end_block(&self) -> Result<BlockNumber> {
        Ok(self.read_block_number(END_BLOCK_KEY)?.unwrap_or_default())
    }

    fn read_block_number(&self, key: &str) -> Result<Option<BlockNumber>> {
        self.database
            .get(key)?
            .map(|value| from_slice(&value).map_err(Into::into))
            .transpose()
    }
}

fn event_key(block_number: BlockNumber, log_index: LogIndex) -> String {
    format!("{EVENT_KEY_PREFIX}{block_number:020}{log_index:010}")
}

#[cfg(test)]
mod tests {
    use types::primitives::{PublicKeyBytes, SignatureBytes, H256};

    use super::*;

    fn event(block_number: BlockNumber, log_index: LogIndex) -> VerifiedDepositEvent {
        VerifiedDepositEvent {
            block_number,
            block_hash: H256::repeat_byte(1),
            log_index,
            pubkey: PublicKeyBytes::repeat_byte(2),
            wc: H256::repeat_byte(3),
            amount: 32_000_000_000,
            signature: SignatureBytes::repeat_byte(4),
            deposit_count: 0,
            deposit_data_root: H256::repeat_byte(5),
            tx_hash: H256::repeat_byte(6),
            valid: true,
        }
    }

    fn store() -> DepositEventStore {
        DepositEventStore::new(Database::in_memory(), 0)
    }

    #[test]
    fn empty_store_reads_as_the_default_cache() -> Result<()> {
        let cache = store().get_cache()?;

        assert_eq!(cache, DepositEventsCache::default());

        Ok(())
    }

    #[test]
    fn start_block_is_clamped_to_the_deployment_block() -> Result<()> {
        let store = DepositEventStore::new(Database::in_memory(), 11_052_984);

        assert_eq!(store.get_cache()?.headers.start_block, 11_052_984);

        Ok(())
    }

    #[test]
    fn events_read_back_in_chain_order() -> Result<()> {
        let store = store();

        let headers = CacheHeaders {
            start_block: 0,
            end_block: 300,
        };

        // Inserted out of order on purpose.
        store.insert_events_batch(
            headers,
            &[event(200, 0), event(100, 2), event(100, 1)],
        )?;

        let cache = store.get_cache()?;

        assert_eq!(cache.headers, headers);
        assert_eq!(
            cache
                .events
                .iter()
                .map(VerifiedDepositEvent::chain_position)
                .collect::<Vec<_>>(),
            [(100, 1), (100, 2), (200, 0)],
        );

        Ok(())
    }

    #[test]
    fn reinserting_an_event_does_not_duplicate_it() -> Result<()> {
        let store = store();

        let headers = CacheHeaders {
            start_block: 0,
            end_block: 150,
        };

        store.insert_events_batch(headers, &[event(100, 1)])?;
        store.insert_events_batch(headers, &[event(100, 1)])?;

        assert_eq!(store.get_cache()?.events.len(), 1);

        Ok(())
    }

    #[test]
    fn end_block_cannot_move_backwards() -> Result<()> {
        let store = store();

        store.insert_events_batch(
            CacheHeaders {
                start_block: 0,
                end_block: 200,
            },
            &[],
        )?;

        store
            .insert_events_batch(
                CacheHeaders {
                    start_block: 0,
                    end_block: 100,
                },
                &[],
            )
            .expect_err("end block regression should be rejected");

        Ok(())
    }

    #[test]
    fn last_valid_event_round_trips() -> Result<()> {
        let store = store();
        let last_valid = event(123, 4);

        store.set_last_valid_event(&last_valid)?;

        assert_eq!(store.get_cache()?.last_valid_event, Some(last_valid));

        Ok(())
    }
}
