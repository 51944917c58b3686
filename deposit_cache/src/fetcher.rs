use std::sync::Arc;

use anyhow::Result;
use deposit_verifier::BlsKeyValidator;
use eth1_api::{DepositContract, DepositEventLog};
use log::debug;
use types::{
    deposit::{DepositEventGroup, VerifiedDepositEvent},
    primitives::BlockNumber,
};

/// Deposit event logs are requested in windows of at most this many blocks.
pub const DEPOSIT_EVENTS_STEP: u64 = 10_000;

/// Pulls `DepositEvent` logs in fixed block windows and verifies each
/// event's BLS signature at ingestion. Endpoint fall-over happens inside
/// the EL client, one window at a time.
pub struct DepositFetcher {
    contract: Arc<DepositContract>,
    validator: Arc<BlsKeyValidator>,
}

impl DepositFetcher {
    #[must_use]
    pub const fn new(contract: Arc<DepositContract>, validator: Arc<BlsKeyValidator>) -> Self {
        Self {
            contract,
            validator,
        }
    }

    pub async fn fetch_events(
        &self,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<DepositEventGroup> {
        let mut events = vec![];
        let mut chunk_start = from;

        while chunk_start <= to {
            let chunk_end = to.min(chunk_start + DEPOSIT_EVENTS_STEP - 1);

            debug!("fetching deposit events from block {chunk_start} to block {chunk_end}");

            let logs = self.contract.events(chunk_start, chunk_end).await?;

            events.extend(logs.into_iter().map(|log| self.verify_event(log)));

            chunk_start = chunk_end + 1;
        }

        Ok(DepositEventGroup {
            events,
            start_block: from,
            end_block: to,
        })
    }

    fn verify_event(&self, log: DepositEventLog) -> VerifiedDepositEvent {
        let DepositEventLog {
            block_number,
            block_hash,
            log_index,
            tx_hash,
            pubkey,
            wc,
            amount,
            signature,
            index,
        } = log;

        let deposit_data_root = deposit_tree::form_deposit_node(wc, pubkey, signature, amount);
        let valid = self.validator.verify_deposit(pubkey, wc, amount, signature);

        VerifiedDepositEvent {
            block_number,
            block_hash,
            log_index,
            pubkey,
            wc,
            amount,
            signature,
            deposit_count: index,
            deposit_data_root,
            tx_hash,
            valid,
        }
    }
}
