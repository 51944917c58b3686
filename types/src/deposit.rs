use serde::{Deserialize, Serialize};

use crate::primitives::{BlockNumber, Gwei, LogIndex, PublicKeyBytes, SignatureBytes, H256};

/// A `DepositEvent` log decoded from the deposit contract, with the BLS
/// verification verdict computed at ingestion. Immutable once stored.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedDepositEvent {
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub log_index: LogIndex,
    pub pubkey: PublicKeyBytes,
    pub wc: H256,
    pub amount: Gwei,
    pub signature: SignatureBytes,
    /// Zero-based position in the deposit contract tree.
    pub deposit_count: u64,
    pub deposit_data_root: H256,
    pub tx_hash: H256,
    pub valid: bool,
}

impl VerifiedDepositEvent {
    /// Chain order: block number first, log index within a block.
    #[must_use]
    pub const fn chain_position(&self) -> (BlockNumber, LogIndex) {
        (self.block_number, self.log_index)
    }

    #[must_use]
    pub fn is_earlier_than(&self, other: &Self) -> bool {
        if self.block_number == other.block_number {
            return self.log_index < other.log_index;
        }

        self.block_number < other.block_number
    }
}

/// A contiguous run of verified deposit events covering `[start_block, end_block]`.
/// Blocks inside the range with no deposits contribute no events.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositEventGroup {
    pub events: Vec<VerifiedDepositEvent>,
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(block_number: BlockNumber, log_index: LogIndex) -> VerifiedDepositEvent {
        VerifiedDepositEvent {
            block_number,
            block_hash: H256::zero(),
            log_index,
            pubkey: PublicKeyBytes::zero(),
            wc: H256::zero(),
            amount: 32_000_000_000,
            signature: SignatureBytes::zero(),
            deposit_count: 0,
            deposit_data_root: H256::zero(),
            tx_hash: H256::zero(),
            valid: true,
        }
    }

    #[test]
    fn events_in_different_blocks_are_ordered_by_block_number() {
        assert!(event(1, 5).is_earlier_than(&event(2, 0)));
        assert!(!event(2, 0).is_earlier_than(&event(1, 5)));
    }

    #[test]
    fn events_in_the_same_block_are_ordered_by_log_index() {
        assert!(event(1, 0).is_earlier_than(&event(1, 1)));
        assert!(!event(1, 1).is_earlier_than(&event(1, 0)));
        assert!(!event(1, 1).is_earlier_than(&event(1, 1)));
    }
}
