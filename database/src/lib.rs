use core::ops::RangeFrom;
use std::{borrow::Cow, path::Path, sync::Mutex};

use anyhow::Result;
use bytesize::ByteSize;
use im::OrdMap;
use itertools::Either;
use libmdbx::{DatabaseFlags, Environment, Geometry, WriteFlags};
use log::info;
use snap::raw::{Decoder, Encoder};
use thiserror::Error;

const GROWTH_STEP: ByteSize = ByteSize::mib(64);
const MAX_NAMED_DATABASES: usize = 4;

/// Embedded key-value store with ordered iteration.
///
/// Values are Snappy-compressed. Writes done through [`Database::put_batch`]
/// are committed in one transaction. The in-memory variant backs tests and
/// keeps the same observable semantics.
pub struct Database(DatabaseKind);

impl Database {
    pub fn persistent(name: &str, directory: impl AsRef<Path>, max_size: ByteSize) -> Result<Self> {
        std::fs::create_dir_all(&directory)?;

        let environment = Environment::builder()
            .set_max_dbs(MAX_NAMED_DATABASES)
            .set_geometry(Geometry {
                size: Some(..usize::try_from(max_size.as_u64())?),
                growth_step: Some(isize::try_from(GROWTH_STEP.as_u64())?),
                shrink_threshold: None,
                page_size: None,
            })
            .open(directory.as_ref())?;

        let transaction = environment.begin_rw_txn()?;
        transaction.create_db(Some(name), DatabaseFlags::default())?;
        transaction.commit()?;

        info!(
            "opened database {name} in {}",
            directory.as_ref().display(),
        );

        Ok(Self(DatabaseKind::Persistent {
            database_name: name.to_owned(),
            environment,
        }))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self(DatabaseKind::InMemory {
            map: Mutex::default(),
        })
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let contains_key = match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                transaction
                    .get::<()>(database.dbi(), key.as_ref())?
                    .is_some()
            }
            DatabaseKind::InMemory { map } => map
                .lock()
                .expect("in-memory database mutex is poisoned")
                .contains_key(key.as_ref()),
        };

        Ok(contains_key)
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                transaction
                    .get::<Cow<_>>(database.dbi(), key.as_ref())?
                    .map(|compressed| decompress(&compressed))
            }
            DatabaseKind::InMemory { map } => map
                .lock()
                .expect("in-memory database mutex is poisoned")
                .get(key.as_ref())
                .map(|compressed| decompress(compressed)),
        }
        .transpose()
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch(core::iter::once((key, value)))
    }

    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_rw_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                for (key, value) in pairs {
                    let compressed = compress(value.as_ref())?;
                    transaction.put(database.dbi(), key, compressed, WriteFlags::default())?;
                }

                transaction.commit()?;
            }
            DatabaseKind::InMemory { map } => {
                let mut map = map.lock().expect("in-memory database mutex is poisoned");
                let mut new_map = map.clone();

                for (key, value) in pairs {
                    new_map.insert(key.as_ref().to_vec(), compress(value.as_ref())?);
                }

                *map = new_map;
            }
        }

        Ok(())
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_rw_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                if cursor.set::<()>(key.as_ref())?.is_some() {
                    cursor.del(WriteFlags::default())?;
                    transaction.commit()?;
                }
            }
            DatabaseKind::InMemory { map } => {
                map.lock()
                    .expect("in-memory database mutex is poisoned")
                    .remove(key.as_ref());
            }
        }

        Ok(())
    }

    #[expect(clippy::type_complexity)]
    pub fn iterator_ascending(
        &self,
        range: RangeFrom<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Cow<[u8]>, Vec<u8>)>>> {
        let start = range.start.as_ref();

        let iterator = match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                let head = cursor.set_range(start).transpose();

                Either::Left(
                    head.into_iter()
                        .chain(core::iter::from_fn(move || cursor.next().transpose()))
                        .map(|result| decompress_pair(result?)),
                )
            }
            DatabaseKind::InMemory { map } => {
                let map = map.lock().expect("in-memory database mutex is poisoned");
                let start_pair = map.get_key_value(start).map(|(key, value)| (key.clone(), value.clone()));
                let (_, mut above) = map.split(start);

                if let Some((key, value)) = start_pair {
                    above.insert(key, value);
                }

                Either::Right(
                    above
                        .into_iter()
                        .map(|(key, value)| Ok((Cow::Owned(key), decompress(&value)?))),
                )
            }
        };

        Ok(iterator)
    }

    /// Returns the last key-value pair whose key is less than or equal to `key`.
    pub fn prev(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                let pair = match cursor.set_range::<Cow<_>, Cow<_>>(key.as_ref())? {
                    Some((found_key, value)) if *found_key == *key.as_ref() => {
                        Some((found_key, value))
                    }
                    Some(_) | None => cursor.prev::<Cow<_>, Cow<_>>()?,
                };

                pair.map(|(found_key, value)| Ok((found_key.into_owned(), decompress(&value)?)))
                    .transpose()
            }
            DatabaseKind::InMemory { map } => map
                .lock()
                .expect("in-memory database mutex is poisoned")
                .get_prev(key.as_ref())
                .map(|(found_key, value)| Ok((found_key.clone(), decompress(value)?)))
                .transpose(),
        }
    }

    const fn kind(&self) -> &DatabaseKind {
        &self.0
    }
}

enum DatabaseKind {
    Persistent {
        database_name: String,
        environment: Environment,
    },
    InMemory {
        map: Mutex<OrdMap<Vec<u8>, Vec<u8>>>,
    },
}

#[derive(Debug, Error)]
#[error("snappy frame is corrupted")]
struct CompressionError;

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    Encoder::new().compress_vec(data).map_err(Into::into)
}

fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    Decoder::new()
        .decompress_vec(compressed)
        .map_err(|_| CompressionError.into())
}

fn decompress_pair(pair: (Cow<[u8]>, Cow<[u8]>)) -> Result<(Cow<'static, [u8]>, Vec<u8>)> {
    let (key, compressed) = pair;
    Ok((Cow::Owned(key.into_owned()), decompress(&compressed)?))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use itertools::Itertools as _;

    use super::*;

    #[test]
    fn get_returns_stored_value() -> Result<()> {
        let database = Database::in_memory();

        database.put("a", [1, 2, 3])?;

        assert_eq!(database.get("a")?, Some(vec![1, 2, 3]));
        assert_eq!(database.get("b")?, None);
        assert!(database.contains_key("a")?);

        Ok(())
    }

    #[test]
    fn put_batch_overwrites_existing_keys() -> Result<()> {
        let database = Database::in_memory();

        database.put("a", [1])?;
        database.put_batch([("a", vec![2]), ("b", vec![3])])?;

        assert_eq!(database.get("a")?, Some(vec![2]));
        assert_eq!(database.get("b")?, Some(vec![3]));

        Ok(())
    }

    #[test]
    fn iterator_ascending_starts_at_the_first_matching_key() -> Result<()> {
        let database = Database::in_memory();

        database.put_batch([("a1", vec![1]), ("a2", vec![2]), ("b1", vec![3])])?;

        let pairs = database
            .iterator_ascending("a2"..)?
            .map_ok(|(key, value)| (key.into_owned(), value))
            .try_collect::<_, Vec<_>, _>()?;

        assert_eq!(
            pairs,
            [
                (b"a2".to_vec(), vec![2]),
                (b"b1".to_vec(), vec![3]),
            ],
        );

        Ok(())
    }

    #[test]
    fn prev_returns_the_closest_key_at_or_below() -> Result<()> {
        let database = Database::in_memory();

        database.put_batch([("a1", vec![1]), ("a3", vec![3])])?;

        assert_eq!(database.prev("a3")?, Some((b"a3".to_vec(), vec![3])));
        assert_eq!(database.prev("a2")?, Some((b"a1".to_vec(), vec![1])));
        assert_eq!(database.prev("a0")?, None);

        Ok(())
    }

    #[test]
    fn delete_removes_only_the_given_key() -> Result<()> {
        let database = Database::in_memory();

        database.put_batch([("a", vec![1]), ("b", vec![2])])?;
        database.delete("a")?;
        database.delete("missing")?;

        assert_eq!(database.get("a")?, None);
        assert_eq!(database.get("b")?, Some(vec![2]));

        Ok(())
    }

    #[test]
    fn persistent_database_round_trips() -> Result<()> {
        let directory = tempfile::tempdir()?;
        let database = Database::persistent("test", directory.path(), ByteSize::mib(1))?;

        database.put("a", [1, 2, 3])?;

        assert_eq!(database.get("a")?, Some(vec![1, 2, 3]));

        Ok(())
    }
}
