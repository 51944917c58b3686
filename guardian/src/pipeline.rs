use core::time::Duration;
use std::{
    collections::{BTreeSet, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{ensure, Result};
use deposit_cache::DepositService;
use deposit_verifier::{BlsKeyValidator, DepositSignatureChecker};
use eth1_api::{DepositContract, Eth1Api, SecurityContract, StakingRouter};
use futures::future;
use itertools::Itertools as _;
use keys_api::{KeysApiClient, OperatorsEntry};
use log::{debug, info, warn};
use prometheus_metrics::Metrics;
use signing_keys::{SigningKeyEventsCache, SigningKeyEventsService};
use thiserror::Error;
use tokio::sync::Mutex;
use types::{
    primitives::{Address, StakingModuleId, H256},
    registry::RegistryKey,
};
use wallet::{BalanceMonitor, Wallet};
use web3::types::BlockId;

use crate::{
    block_guard::{BlockGuard, StateMeta},
    broker::MessageBroker,
    contracts_state::{ContractsState, StateChangeDetector},
    data::{BlockData, StakingModuleData},
    duplicates::{self, ModuleVettedKeys},
    front_run,
    messages::{
        self, AppMeta, BrokerMessage, DepositMessage, PauseMessage, PingMessage, UnvetMessage,
    },
    vetting,
};

/// Cadence of the decision cycle, roughly once per block.
pub const GUARDIAN_DEPOSIT_JOB_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
enum Error {
    #[error("keys index changed state between the operators and keys calls")]
    InconsistentLastChangedBlockHash,
    #[error("EL node does not know the keys index snapshot block")]
    MissingSnapshotBlock,
    #[error("wallet address is not registered as a guardian")]
    NotAGuardian,
}

#[derive(Clone, Debug)]
pub struct GuardianConfig {
    pub app_name: String,
    pub app_version: String,
}

/// Allows one in-flight execution; concurrent attempts observe a no-op.
struct OneAtTime(AtomicBool);

struct OneAtTimeGuard<'flag>(&'flag OneAtTime);

impl OneAtTime {
    const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    fn try_acquire(&self) -> Option<OneAtTimeGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(OneAtTimeGuard(self))
    }
}

impl Drop for OneAtTimeGuard<'_> {
    fn drop(&mut self) {
        self.0 .0.store(false, Ordering::Release);
    }
}

/// State that only one cycle at a time may touch.
pub struct CycleResources {
    pub deposit_service: DepositService,
    pub signing_key_events: SigningKeyEventsService,
    pub signature_checker: DepositSignatureChecker<Arc<BlsKeyValidator>>,
    pub block_guard: BlockGuard,
    pub state_detector: StateChangeDetector,
}

/// Message prefixes of the security module, read once per cycle at the
/// pinned block.
struct SigningPrefixes {
    attest: H256,
    pause: H256,
    unvet: H256,
}

/// The per-block decision pipeline.
///
/// Each tick reads a consistent snapshot from the keys index and the EL
/// node, classifies every vetted key, and either attests the deposit,
/// withholds the attestation, or signs and broadcasts pause/unvet
/// messages. A tick that fails leaves the last-processed marker untouched
/// so the next tick retries the same block.
pub struct GuardianService {
    keys_api: Arc<KeysApiClient>,
    eth1_api: Arc<Eth1Api>,
    deposit_contract: Arc<DepositContract>,
    security_contract: Arc<SecurityContract>,
    staking_router: Arc<StakingRouter>,
    wallet: Arc<Wallet>,
    balance_monitor: Arc<BalanceMonitor>,
    broker: Arc<dyn MessageBroker>,
    metrics: Option<Arc<Metrics>>,
    config: GuardianConfig,
    resources: Mutex<CycleResources>,
    pause_tx_guard: OneAtTime,
    unvet_tx_guard: OneAtTime,
}

impl GuardianService {
    #[expect(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        keys_api: Arc<KeysApiClient>,
        eth1_api: Arc<Eth1Api>,
        deposit_contract: Arc<DepositContract>,
        security_contract: Arc<SecurityContract>,
        staking_router: Arc<StakingRouter>,
        wallet: Arc<Wallet>,
        balance_monitor: Arc<BalanceMonitor>,
        broker: Arc<dyn MessageBroker>,
        metrics: Option<Arc<Metrics>>,
        config: GuardianConfig,
        resources: CycleResources,
    ) -> Self {
        Self {
            keys_api,
            eth1_api,
            deposit_contract,
            security_contract,
            staking_router,
            wallet,
            balance_monitor,
            broker,
            metrics,
            config,
            resources: Mutex::new(resources),
            pause_tx_guard: OneAtTime::new(),
            unvet_tx_guard: OneAtTime::new(),
        }
    }

    /// Runs one decision cycle. A tick that arrives while the previous one
    /// is still in flight returns immediately without side effects.
    pub async fn tick(&self) -> Result<()> {
        let Ok(mut resources) = self.resources.try_lock() else {
            if let Some(metrics) = self.metrics.as_ref() {
                metrics.cycles_skipped_total.inc();
            }

            info!("previous cycle still in progress, skipping tick");
            return Ok(());
        };

        let _timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.cycle_duration_seconds.start_timer());

        self.run_cycle(&mut resources).await
    }

    async fn run_cycle(&self, resources: &mut CycleResources) -> Result<()> {
        let operators_response = self.keys_api.operators().await?;
        let snapshot = operators_response.meta.el_block_snapshot;

        let meta = StateMeta {
            block_number: snapshot.block_number,
            block_hash: snapshot.block_hash,
        };

        if !resources.block_guard.is_need_to_process_new_state(meta) {
            debug!("block {} already processed, skipping", meta.block_number);
            return Ok(());
        }

        let keys_response = self.keys_api.keys().await?;

        // The two keys-index reads must come from the same registry state,
        // otherwise operators and keys describe different worlds.
        ensure!(
            keys_response.meta.el_block_snapshot.last_changed_block_hash
                == snapshot.last_changed_block_hash,
            Error::InconsistentLastChangedBlockHash,
        );

        let current_block = self
            .eth1_api
            .get_block_by_hash(snapshot.block_hash)
            .await?
            .ok_or(Error::MissingSnapshotBlock)?;

        let at = BlockId::from(snapshot.block_hash);

        resources
            .deposit_service
            .update_events_cache(&current_block)
            .await?;

        let deposited_events = resources
            .deposit_service
            .get_all_deposited_events(&current_block)
            .await?;

        let module_addresses = operators_response
            .data
            .iter()
            .map(|entry| entry.module.staking_module_address)
            .collect::<BTreeSet<Address>>();

        resources
            .signing_key_events
            .update(&module_addresses, current_block.number)
            .await?;

        let key_events = resources.signing_key_events.cached_events()?;

        let deposit_root = self.deposit_contract.get_deposit_root(at).await?;
        let security_version = self.security_contract.version(at).await?;
        let lido_wc = self.staking_router.withdrawal_credentials(at).await?;

        let guardian_index = self
            .security_contract
            .guardian_index(at, self.wallet.address())
            .await?
            .ok_or(Error::NotAGuardian)?;

        let already_paused_deposits = if security_version >= 3 {
            self.security_contract.is_deposits_paused(at).await?
        } else {
            false
        };

        let prefixes = SigningPrefixes {
            attest: self.security_contract.attest_message_prefix(at).await?,
            pause: self.security_contract.pause_message_prefix(at).await?,
            unvet: self.security_contract.unvet_message_prefix(at).await?,
        };

        self.balance_monitor.on_new_block(current_block.number).await;

        let theft_happened = self
            .detect_historical_theft(&deposited_events.events, lido_wc)
            .await?;

        let block_data = BlockData {
            block_number: current_block.number,
            block_hash: current_block.hash,
            deposit_root,
            deposited_events,
            guardian_address: self.wallet.address(),
            guardian_index,
            lido_wc,
            security_version,
            already_paused_deposits,
            theft_happened,
            wallet_balance_critical: self.balance_monitor.is_critical(),
        };

        let modules_data = self.collect_modules_data(
            &operators_response.data,
            &keys_response.data,
            &key_events,
            &block_data,
            snapshot.last_changed_block_hash,
            &mut resources.signature_checker,
        );

        if block_data.theft_happened && !block_data.already_paused_deposits {
            self.handle_pause(&block_data, &modules_data, &prefixes).await;
        }

        let state_detector = &resources.state_detector;

        let results = future::join_all(modules_data.iter().map(|module_data| {
            self.handle_module(module_data, &block_data, &prefixes, state_detector)
        }))
        .await;

        let mut attested_states = vec![];

        for result in results {
            attested_states.push(result?);
        }

        for (module_id, state) in attested_states.into_iter().flatten() {
            resources.state_detector.update(module_id, state);
        }

        self.publish(BrokerMessage::Ping(PingMessage {
            guardian_address: block_data.guardian_address,
            guardian_index: block_data.guardian_index,
            block_number: block_data.block_number,
            staking_module_ids: modules_data
                .iter()
                .map(|module| module.module_id)
                .collect(),
            app: self.app_meta(),
        }));

        resources.block_guard.update(meta);

        info!(
            "cycle finished at block {} over {} staking modules",
            meta.block_number,
            modules_data.len(),
        );

        Ok(())
    }

    /// Builds the per-module views: unused and vetted-unused keys, invalid
    /// signatures, current-cycle front-runs, then one global duplicate pass.
    fn collect_modules_data(
        &self,
        entries: &[OperatorsEntry],
        registry_keys: &[RegistryKey],
        key_events: &SigningKeyEventsCache,
        block_data: &BlockData,
        last_changed_block_hash: H256,
        signature_checker: &mut DepositSignatureChecker<Arc<BlsKeyValidator>>,
    ) -> Vec<StakingModuleData> {
        let mut modules_data = entries
            .iter()
            .map(|entry| {
                let module_address = entry.module.staking_module_address;
                let unused_keys = vetting::unused_keys(module_address, registry_keys);
                let vetted_unused_keys = vetting::vetted_unused_keys(&entry.operators, &unused_keys);

                let invalid_keys =
                    signature_checker.invalid_keys(&vetted_unused_keys, block_data.lido_wc);

                let front_run_keys = front_run::front_run_keys(
                    &vetted_unused_keys,
                    &block_data.deposited_events.events,
                    block_data.lido_wc,
                );

                StakingModuleData {
                    module_id: entry.module.id,
                    module_address,
                    nonce: entry.module.nonce,
                    block_hash: block_data.block_hash,
                    last_changed_block_hash,
                    operators: entry.operators.clone(),
                    unused_keys,
                    vetted_unused_keys,
                    duplicated_keys: vec![],
                    front_run_keys,
                    invalid_keys,
                }
            })
            .collect::<Vec<_>>();

        let invalid_pubkeys = modules_data
            .iter()
            .flat_map(|module| module.invalid_keys.iter().map(|key| key.key))
            .collect::<HashSet<_>>();

        let vetted_by_module = modules_data
            .iter()
            .map(|module| ModuleVettedKeys {
                module_id: module.module_id,
                module_address: module.module_address,
                keys: &module.vetted_unused_keys,
            })
            .collect_vec();

        let mut duplicated =
            duplicates::duplicated_keys(&vetted_by_module, &invalid_pubkeys, key_events);

        for module in &mut modules_data {
            module.duplicated_keys = duplicated.remove(&module.module_id).unwrap_or_default();
        }

        modules_data
    }

    /// Confirms the historical front-run pattern with the keys index. Only
    /// keys the protocol actually owns make it theft.
    async fn detect_historical_theft(
        &self,
        deposited_events: &[types::deposit::VerifiedDepositEvent],
        lido_wc: H256,
    ) -> Result<bool> {
        let flagged = front_run::historical_front_run_pubkeys(deposited_events, lido_wc);

        if flagged.is_empty() {
            return Ok(false);
        }

        warn!(
            "found {} pubkeys with earlier foreign deposits, confirming ownership",
            flagged.len(),
        );

        let response = self.keys_api.find_keys(&flagged).await?;

        Ok(!response.data.is_empty())
    }

    /// Exactly one pause shape is emitted per security module version: one
    /// global message on v3 and above, one message per staking module below.
    async fn handle_pause(
        &self,
        block_data: &BlockData,
        modules_data: &[StakingModuleData],
        prefixes: &SigningPrefixes,
    ) {
        warn!("theft detected, signing pause messages");

        if block_data.security_version >= 3 {
            self.broadcast_pause(block_data, None, prefixes).await;
        } else {
            for module in modules_data {
                self.broadcast_pause(block_data, Some(module.module_id), prefixes)
                    .await;
            }
        }
    }

    async fn broadcast_pause(
        &self,
        block_data: &BlockData,
        staking_module_id: Option<StakingModuleId>,
        prefixes: &SigningPrefixes,
    ) {
        let digest = match staking_module_id {
            Some(module_id) => {
                messages::pause_digest_v2(prefixes.pause, block_data.block_number, module_id)
            }
            None => messages::pause_digest_v3(prefixes.pause, block_data.block_number),
        };

        let signature = match self.wallet.sign_digest(digest) {
            Ok(signature) => signature,
            Err(error) => {
                warn!("failed to sign pause message: {error}");
                return;
            }
        };

        self.publish(BrokerMessage::Pause(PauseMessage {
            guardian_address: block_data.guardian_address,
            guardian_index: block_data.guardian_index,
            block_number: block_data.block_number,
            staking_module_id,
            signature,
            app: self.app_meta(),
        }));

        let Some(_guard) = self.pause_tx_guard.try_acquire() else {
            debug!("pause transaction already in flight, not submitting another");
            return;
        };

        let submission = match staking_module_id {
            Some(module_id) => {
                self.security_contract
                    .pause_deposits_v2(
                        block_data.block_number,
                        module_id,
                        signature.compact(),
                        self.wallet.secret_key(),
                    )
                    .await
            }
            None => {
                self.security_contract
                    .pause_deposits(
                        block_data.block_number,
                        signature.compact(),
                        self.wallet.secret_key(),
                    )
                    .await
            }
        };

        match submission {
            Ok(tx_hash) => info!("submitted pause transaction {tx_hash:?}"),
            Err(error) => warn!("failed to submit pause transaction: {error}"),
        }
    }

    /// One module's decision: unvet suspect keys, then either attest the
    /// deposit or withhold the attestation. Returns the state to remember
    /// when a deposit message was signed.
    async fn handle_module(
        &self,
        module_data: &StakingModuleData,
        block_data: &BlockData,
        prefixes: &SigningPrefixes,
        state_detector: &StateChangeDetector,
    ) -> Result<Option<(StakingModuleId, ContractsState)>> {
        self.report_module_metrics(module_data);

        if module_data.has_suspect_keys() {
            self.handle_unvetting(module_data, block_data, prefixes).await;
        }

        let can_deposit = block_data.can_deposit_globally() && !module_data.has_suspect_keys();

        if !can_deposit {
            info!(
                "withholding deposit attestation for staking module {}",
                module_data.module_id,
            );

            return Ok(None);
        }

        let state = ContractsState {
            deposit_root: block_data.deposit_root,
            nonce: module_data.nonce,
            block_number: block_data.block_number,
            last_changed_block_hash: module_data.last_changed_block_hash,
        };

        if state_detector.is_same_state(module_data.module_id, &state) {
            debug!(
                "staking module {} unchanged within the signing window",
                module_data.module_id,
            );

            return Ok(None);
        }

        let digest = messages::deposit_digest(
            prefixes.attest,
            block_data.block_number,
            block_data.block_hash,
            block_data.deposit_root,
            module_data.module_id,
            module_data.nonce,
        );

        let signature = match self.wallet.sign_digest(digest) {
            Ok(signature) => signature,
            Err(error) => {
                warn!(
                    "failed to sign deposit message for staking module {}: {error}",
                    module_data.module_id,
                );

                return Ok(None);
            }
        };

        self.publish(BrokerMessage::Deposit(DepositMessage {
            guardian_address: block_data.guardian_address,
            guardian_index: block_data.guardian_index,
            block_number: block_data.block_number,
            block_hash: block_data.block_hash,
            deposit_root: block_data.deposit_root,
            staking_module_id: module_data.module_id,
            nonce: module_data.nonce,
            signature,
            app: self.app_meta(),
        }));

        Ok(Some((module_data.module_id, state)))
    }

    /// Signs and broadcasts an unvet message shrinking every affected
    /// operator back to its first suspect key, and submits the matching
    /// transaction. Failures are logged and never poison sibling modules.
    async fn handle_unvetting(
        &self,
        module_data: &StakingModuleData,
        block_data: &BlockData,
        prefixes: &SigningPrefixes,
    ) {
        let Some((operator_ids, vetted_keys_by_operator)) = unvet_payload(module_data) else {
            return;
        };

        let digest = messages::unvet_digest(
            prefixes.unvet,
            block_data.block_number,
            block_data.block_hash,
            module_data.module_id,
            module_data.nonce,
            &operator_ids,
            &vetted_keys_by_operator,
        );

        let signature = match self.wallet.sign_digest(digest) {
            Ok(signature) => signature,
            Err(error) => {
                warn!(
                    "failed to sign unvet message for staking module {}: {error}",
                    module_data.module_id,
                );

                return;
            }
        };

        self.publish(BrokerMessage::Unvet(UnvetMessage {
            guardian_address: block_data.guardian_address,
            guardian_index: block_data.guardian_index,
            block_number: block_data.block_number,
            block_hash: block_data.block_hash,
            staking_module_id: module_data.module_id,
            nonce: module_data.nonce,
            operator_ids: hex_string(&operator_ids),
            vetted_keys_by_operator: hex_string(&vetted_keys_by_operator),
            signature,
            app: self.app_meta(),
        }));

        let Some(_guard) = self.unvet_tx_guard.try_acquire() else {
            debug!("unvet transaction already in flight, not submitting another");
            return;
        };

        let submission = self
            .security_contract
            .unvet_signing_keys(
                block_data.block_number,
                block_data.block_hash,
                module_data.module_id,
                module_data.nonce,
                operator_ids,
                vetted_keys_by_operator,
                signature.compact(),
                self.wallet.secret_key(),
            )
            .await;

        match submission {
            Ok(tx_hash) => info!("submitted unvet transaction {tx_hash:?}"),
            Err(error) => warn!("failed to submit unvet transaction: {error}"),
        }
    }

    fn publish(&self, message: BrokerMessage) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics
                .messages_sent_total
                .with_label_values(&[message.kind()])
                .inc();
        }

        if let Err(error) = self.broker.publish(&message) {
            warn!("failed to publish {} message: {error}", message.kind());
        }
    }

    fn report_module_metrics(&self, module_data: &StakingModuleData) {
        let Some(metrics) = self.metrics.as_ref() else {
            return;
        };

        let module_id = module_data.module_id.to_string();
        let count = |keys: &[RegistryKey]| i64::try_from(keys.len()).unwrap_or(i64::MAX);

        metrics
            .unused_keys
            .with_label_values(&[&module_id])
            .set(count(&module_data.unused_keys));
        metrics
            .invalid_keys
            .with_label_values(&[&module_id])
            .set(count(&module_data.invalid_keys));
        metrics
            .duplicated_keys
            .with_label_values(&[&module_id])
            .set(count(&module_data.duplicated_keys));
        metrics
            .front_run_keys
            .with_label_values(&[&module_id])
            .set(count(&module_data.front_run_keys));
    }

    fn app_meta(&self) -> AppMeta {
        AppMeta {
            version: self.config.app_version.clone(),
            name: self.config.app_name.clone(),
        }
    }
}

/// Packed `(operatorIds, vettedKeysByOperator)` shrinking each affected
/// operator to the index of its first suspect key. Operators are packed in
/// ascending index order.
fn unvet_payload(module_data: &StakingModuleData) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut new_limits = module_data
        .front_run_keys
        .iter()
        .chain(&module_data.invalid_keys)
        .chain(&module_data.duplicated_keys)
        .map(|key| (u64::from(key.operator_index), u64::from(key.index)))
        .into_grouping_map()
        .min();

    if new_limits.is_empty() {
        return None;
    }

    let per_operator = new_limits.drain().sorted().collect_vec();

    let operator_ids = messages::pack_operator_ids(per_operator.iter().map(|(id, _)| *id));
    let vetted_counts = messages::pack_vetted_counts(per_operator.iter().map(|(_, limit)| *limit));

    Some((operator_ids, vetted_counts))
}

fn hex_string(bytes: &[u8]) -> String {
    format!("0x{}", bytes.iter().format_with("", |byte, f| f(&format_args!("{byte:02x}"))))
}
