use std::sync::Arc;

use anyhow::{ensure, Result};
use bytesize::ByteSize;
use database::Database;
use deposit_cache::{DepositEventStore, DepositFetcher, DepositIntegrityChecker, DepositService};
use deposit_verifier::{BlsKeyValidator, DepositSignatureChecker};
use eth1_api::{DepositContract, Eth1Api, SecurityContract, StakingRouter};
use futures::StreamExt as _;
use guardian::{
    BlockGuard, ChannelBroker, CycleResources, GuardianConfig, GuardianService,
    StateChangeDetector, GUARDIAN_DEPOSIT_JOB_DURATION,
};
use keys_api::{KeysApiClient, KeysApiConfig, FETCH_REQUEST_TIMEOUT};
use log::{debug, error, info};
use prometheus_metrics::{Metrics, METRICS};
use signing_keys::{SigningKeyEventStore, SigningKeyEventsService};
use thiserror::Error;
use types::primitives::ChainId;
use wallet::{BalanceMonitor, Wallet};

use crate::{
    args::{GuardianNodeConfig, APPLICATION_NAME, APPLICATION_VERSION},
    metrics_server,
};

const DEPOSIT_EVENTS_DB_SIZE: ByteSize = ByteSize::gib(1);
const SIGNING_KEY_EVENTS_DB_SIZE: ByteSize = ByteSize::gib(1);

#[derive(Debug, Error)]
enum Error {
    #[error("EL node serves chain {actual} but the daemon is configured for chain {expected}")]
    ElChainIdMismatch { expected: ChainId, actual: ChainId },
    #[error("keys index serves chain {actual} but the daemon is configured for chain {expected}")]
    KeysApiChainIdMismatch { expected: ChainId, actual: ChainId },
}

pub fn run(config: GuardianNodeConfig) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_async(config))
}

async fn run_async(config: GuardianNodeConfig) -> Result<()> {
    info!("{APPLICATION_NAME}/{APPLICATION_VERSION} starting");

    let metrics = Arc::new(Metrics::new()?);
    metrics.register_with_default_registry()?;
    METRICS.get_or_init(|| metrics.clone());

    let client = reqwest::Client::builder()
        .timeout(FETCH_REQUEST_TIMEOUT)
        .build()?;

    let eth1_api = Arc::new(Eth1Api::new(
        client.clone(),
        config.rpc_urls.clone(),
        Some(metrics.clone()),
    ));

    let keys_api = Arc::new(KeysApiClient::new(
        client,
        KeysApiConfig {
            base_url: config.keys_api_url.clone(),
            query_batch_size: config.registry_keys_query_batch_size,
            query_concurrency: config.registry_keys_query_concurrency,
        },
    ));

    startup_checks(&config, &eth1_api, &keys_api).await?;

    let wallet = Arc::new(Wallet::from_private_key(config.wallet_private_key)?);

    info!("guardian address: {:?}", wallet.address());

    let deposit_contract = Arc::new(DepositContract::new(
        eth1_api.clone(),
        config.addresses.deposit_contract,
    ));

    let security_contract = Arc::new(SecurityContract::new(
        eth1_api.clone(),
        config.addresses.deposit_security_module,
    ));

    let staking_router = Arc::new(StakingRouter::new(
        eth1_api.clone(),
        config.addresses.staking_router,
    ));

    let validator = Arc::new(BlsKeyValidator::new(config.genesis_fork_version));

    let deposit_events_db = Database::persistent(
        "deposit_events",
        config.db_dir.join("deposit_events"),
        DEPOSIT_EVENTS_DB_SIZE,
    )?;

    let signing_key_events_db = Database::persistent(
        "signing_key_events",
        config.db_dir.join("signing_key_events"),
        SIGNING_KEY_EVENTS_DB_SIZE,
    )?;

    let deposit_service = DepositService::initialize(
        eth1_api.clone(),
        DepositEventStore::new(deposit_events_db, config.deposit_contract_deploy_block),
        DepositFetcher::new(deposit_contract.clone(), validator.clone()),
        DepositIntegrityChecker::new(deposit_contract.clone(), Some(metrics.clone())),
        Some(metrics.clone()),
    )?;

    let signing_key_events = SigningKeyEventsService::new(
        eth1_api.clone(),
        SigningKeyEventStore::new(signing_key_events_db),
        config.deposit_contract_deploy_block,
    );

    let balance_monitor = Arc::new(BalanceMonitor::new(
        eth1_api.clone(),
        wallet.address(),
        Some(metrics.clone()),
    ));

    balance_monitor.refresh().await?;

    let (broker, mut published_messages) = ChannelBroker::new(config.broker_topic.clone());

    // Transport adapters live outside the daemon; published payloads are
    // drained here and handed over for delivery.
    tokio::spawn(async move {
        while let Some(message) = published_messages.next().await {
            debug!(
                "outbound message on topic {}: {} bytes",
                message.topic,
                message.payload.len(),
            );
        }
    });

    tokio::spawn(metrics_server::run_metrics_server(config.metrics_address));

    let service = GuardianService::new(
        keys_api,
        eth1_api,
        deposit_contract,
        security_contract,
        staking_router,
        wallet,
        balance_monitor,
        Arc::new(broker),
        Some(metrics),
        GuardianConfig {
            app_name: APPLICATION_NAME.to_owned(),
            app_version: APPLICATION_VERSION.to_owned(),
        },
        CycleResources {
            deposit_service,
            signing_key_events,
            signature_checker: DepositSignatureChecker::new(validator),
            block_guard: BlockGuard::default(),
            state_detector: StateChangeDetector::default(),
        },
    );

    let mut interval = tokio::time::interval(GUARDIAN_DEPOSIT_JOB_DURATION);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // A failed cycle is retried at the next tick; only startup
                // failures terminate the daemon.
                if let Err(cycle_error) = service.tick().await {
                    error!("cycle failed: {cycle_error:?}");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

/// Fails fast when the EL node or the keys index disagree with the
/// configured chain, or when the keys index is too old to trust.
async fn startup_checks(
    config: &GuardianNodeConfig,
    eth1_api: &Eth1Api,
    keys_api: &KeysApiClient,
) -> Result<()> {
    let el_chain_id = eth1_api.chain_id().await?.as_u64();

    ensure!(
        el_chain_id == config.chain_id,
        Error::ElChainIdMismatch {
            expected: config.chain_id,
            actual: el_chain_id,
        },
    );

    keys_api.check_readiness().await?;

    let status = keys_api.status().await?;

    KeysApiClient::verify_version(&status)?;

    ensure!(
        status.chain_id == config.chain_id,
        Error::KeysApiChainIdMismatch {
            expected: config.chain_id,
            actual: status.chain_id,
        },
    );

    info!(
        "connected to keys index {} at chain {}",
        status.app_version, status.chain_id,
    );

    Ok(())
}
