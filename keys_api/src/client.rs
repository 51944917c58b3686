use core::time::Duration;

use anyhow::{ensure, Result};
use futures::{stream, StreamExt as _, TryStreamExt as _};
use itertools::Itertools as _;
use log::debug;
use reqwest::Client;
use semver::{Version, VersionReq};
use serde::Serialize;
use thiserror::Error;
use types::primitives::PublicKeyBytes;
use url::Url;

use crate::responses::{KeysResponse, OperatorsResponse, StatusResponse};

/// Every request to the keys index is bounded by this timeout.
pub const FETCH_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Oldest keys index release whose consistency metadata the daemon understands.
pub const MIN_KAPI_VERSION: &str = "1.0.0";

#[derive(Clone, Debug)]
pub struct KeysApiConfig {
    pub base_url: Url,
    /// Pubkey lookups are split into batches of this size.
    pub query_batch_size: usize,
    /// At most this many lookup batches are in flight at once.
    pub query_concurrency: usize,
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
enum Error {
    #[error("keys index version {actual} is older than the supported minimum {minimum}")]
    UnsupportedVersion { actual: String, minimum: String },
    #[error("keys index answered lookup batches from different registry states")]
    InconsistentBatches,
    #[error("pubkey lookup returned no response batches")]
    NoBatches,
}

#[derive(Serialize)]
struct FindKeysRequest<'keys> {
    pubkeys: &'keys [PublicKeyBytes],
}

/// Typed client of the staking-keys index HTTP API.
pub struct KeysApiClient {
    client: Client,
    config: KeysApiConfig,
}

impl KeysApiClient {
    #[must_use]
    pub const fn new(client: Client, config: KeysApiConfig) -> Self {
        Self { client, config }
    }

    /// `GET /v1/keys`
    pub async fn keys(&self) -> Result<KeysResponse> {
        self.get("v1/keys").await
    }

    /// `GET /v1/operators`
    pub async fn operators(&self) -> Result<OperatorsResponse> {
        self.get("v1/operators").await
    }

    /// `GET /v1/status`
    pub async fn status(&self) -> Result<StatusResponse> {
        self.get("v1/status").await
    }

    /// `GET /v1/modules`, used only as a readiness probe.
    pub async fn check_readiness(&self) -> Result<()> {
        let url = self.config.base_url.join("v1/modules")?;

        self.client
            .get(url)
            .timeout(FETCH_REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// `POST /v1/keys/find`, batched and bounded by the configured concurrency.
    ///
    /// All batches must answer from the same registry state; a
    /// `lastChangedBlockHash` disagreement between batches fails the lookup.
    pub async fn find_keys(&self, pubkeys: &[PublicKeyBytes]) -> Result<KeysResponse> {
        let batches = pubkeys
            .chunks(self.config.query_batch_size.max(1))
            .collect_vec();

        debug!(
            "looking up {} pubkeys in {} batches",
            pubkeys.len(),
            batches.len(),
        );

        let mut responses = stream::iter(batches)
            .map(|batch| self.find_keys_batch(batch))
            .buffered(self.config.query_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        let mut merged = responses.pop().ok_or(Error::NoBatches)?;

        for response in responses {
            ensure!(
                response.meta.el_block_snapshot.last_changed_block_hash
                    == merged.meta.el_block_snapshot.last_changed_block_hash,
                Error::InconsistentBatches,
            );

            merged.data.extend(response.data);
        }

        Ok(merged)
    }

    /// Fails unless the index reports a supported application version.
    pub fn verify_version(status: &StatusResponse) -> Result<()> {
        let minimum = VersionReq::parse(&format!(">={MIN_KAPI_VERSION}"))
            .expect("minimum version requirement is valid");

        ensure!(
            Version::parse(&status.app_version).is_ok_and(|version| minimum.matches(&version)),
            Error::UnsupportedVersion {
                actual: status.app_version.clone(),
                minimum: MIN_KAPI_VERSION.to_owned(),
            },
        );

        Ok(())
    }

    async fn find_keys_batch(&self, pubkeys: &[PublicKeyBytes]) -> Result<KeysResponse> {
        let url = self.config.base_url.join("v1/keys/find")?;

        self.client
            .post(url)
            .timeout(FETCH_REQUEST_TIMEOUT)
            .json(&FindKeysRequest { pubkeys })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(Into::into)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.config.base_url.join(path)?;

        self.client
            .get(url)
            .timeout(FETCH_REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(Into::into)
    }
}
