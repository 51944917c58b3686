use core::future::Future;
use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use log::warn;
use prometheus_metrics::Metrics;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use types::primitives::{Address, BlockNumber, H256, U256};
use url::Url;
use web3::{
    api::Eth,
    helpers::CallFuture,
    signing::{SecretKey, SecretKeyRef},
    transports::Http,
    types::{Bytes, CallRequest, Filter, Log, TransactionParameters, U64},
    Error as Web3Error, Web3,
};

use crate::{
    eth1_block::Eth1Block,
    providers::{Provider, Providers},
};

/// EL JSON-RPC client with per-request endpoint fall-over.
///
/// Every request walks the provider pool starting from the primary endpoint
/// and rotates to the next provider on failure. Once a request succeeds the
/// serving provider is marked online; when the pool is exhausted the cursor
/// is rewound so the next request starts from the primary again.
pub struct Eth1Api {
    client: Client,
    providers: Mutex<Providers>,
    metrics: Option<Arc<Metrics>>,
}

impl Eth1Api {
    #[must_use]
    pub fn new(
        client: Client,
        rpc_urls: impl IntoIterator<Item = Url>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            client,
            providers: Mutex::new(Providers::new(rpc_urls)),
            metrics,
        }
    }

    pub async fn chain_id(&self) -> Result<U256> {
        self.request_with_fallback(|api| api.chain_id()).await
    }

    pub async fn current_head_number(&self) -> Result<BlockNumber> {
        Ok(self
            .request_with_fallback(|api| api.block_number())
            .await?
            .as_u64())
    }

    pub async fn get_block(
        &self,
        block_id: web3::types::BlockId,
    ) -> Result<Option<Eth1Block>> {
        self.request_with_fallback(|api| api.block(block_id))
            .await?
            .map(Eth1Block::try_from)
            .transpose()
    }

    pub async fn get_block_by_number(&self, block_number: BlockNumber) -> Result<Option<Eth1Block>> {
        self.get_block(U64::from(block_number).into()).await
    }

    pub async fn get_block_by_hash(&self, block_hash: H256) -> Result<Option<Eth1Block>> {
        self.get_block(block_hash.into()).await
    }

    pub async fn finalized_block(&self) -> Result<Option<Eth1Block>> {
        self.get_block(web3::types::BlockNumber::Finalized.into())
            .await
    }

    pub async fn logs(&self, filter: Filter) -> Result<Vec<Log>> {
        self.request_with_fallback(|api| api.logs(filter.clone()))
            .await
    }

    pub async fn call(&self, request: CallRequest, block: Option<web3::types::BlockId>) -> Result<Bytes> {
        self.request_with_fallback(|api| api.call(request.clone(), block))
            .await
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.request_with_fallback(|api| api.balance(address, None))
            .await
    }

    /// Signs the transaction locally and submits it through the provider
    /// pool. The wallet key never leaves the process.
    pub async fn submit_transaction(
        &self,
        params: TransactionParameters,
        secret_key: &SecretKey,
    ) -> Result<H256> {
        while let Some(provider) = self.current_provider().await {
            let url = provider.url().clone();
            let web3 = Web3::new(Http::with_client(self.client.clone(), url.clone()));

            let attempt = async {
                let signed = web3
                    .accounts()
                    .sign_transaction(params.clone(), SecretKeyRef::new(secret_key))
                    .await?;

                web3.eth().send_raw_transaction(signed.raw_transaction).await
            }
            .await;

            match attempt {
                Ok(tx_hash) => {
                    self.providers.lock().await.mark_current_online();
                    return Ok(tx_hash);
                }
                Err(error) => self.rotate_provider(&url, &error).await,
            }
        }

        self.exhausted().await
    }

    pub async fn el_offline(&self) -> bool {
        self.providers.lock().await.all_offline()
    }

    async fn request_with_fallback<R, O, F>(&self, request_from_api: R) -> Result<O>
    where
        R: Fn(Eth<Http>) -> CallFuture<O, F> + Sync + Send,
        O: DeserializeOwned + Send,
        F: Future<Output = Result<Value, Web3Error>> + Send,
    {
        while let Some(provider) = self.current_provider().await {
            let url = provider.url().clone();
            let http = Http::with_client(self.client.clone(), url.clone());
            let api = Web3::new(http).eth();

            match request_from_api(api).await {
                Ok(result) => {
                    self.providers.lock().await.mark_current_online();
                    return Ok(result);
                }
                Err(error) => self.rotate_provider(&url, &error).await,
            }
        }

        self.exhausted().await
    }

    async fn rotate_provider(&self, url: &Url, error: &Web3Error) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.eth1_rpc_errors_total.inc();
        }

        let mut providers = self.providers.lock().await;

        match providers.peek_next() {
            Some(next) => warn!(
                "EL RPC endpoint {url} returned an error: {error}; switching to {}",
                next.url(),
            ),
            None => warn!("last available EL RPC endpoint {url} returned an error: {error}"),
        }

        providers.mark_current_offline();
        providers.advance();
    }

    async fn exhausted<O>(&self) -> Result<O> {
        let mut providers = self.providers.lock().await;

        providers.reset();

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.eth1_rpc_resets_total.inc();
        }

        ensure!(!providers.is_empty(), Error::NoEndpointsProvided);

        bail!(Error::EndpointsExhausted)
    }

    async fn current_provider(&self) -> Option<Provider> {
        self.providers.lock().await.current().cloned()
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
enum Error {
    #[error("all EL RPC endpoints exhausted")]
    EndpointsExhausted,
    #[error("attempted to call an EL RPC endpoint but none were provided")]
    NoEndpointsProvided,
}
