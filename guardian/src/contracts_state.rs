use std::collections::HashMap;

use types::primitives::{BlockNumber, ModuleNonce, StakingModuleId, H256};

/// A deposit attestation is re-signed at most once per this many blocks
/// while the underlying state stays unchanged.
pub const GUARDIAN_DEPOSIT_RESIGNING_BLOCKS: u64 = 10;

/// On-chain facts a deposit attestation commits to, as last attested for a
/// given staking module.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ContractsState {
    pub deposit_root: H256,
    pub nonce: ModuleNonce,
    pub block_number: BlockNumber,
    pub last_changed_block_hash: H256,
}

/// Gates re-signing: an attestation identical to the previous one is only
/// repeated once the signing window advances, so the bus is not flooded
/// with one fresh signature per block.
#[derive(Default)]
pub struct StateChangeDetector {
    last_by_module: HashMap<StakingModuleId, ContractsState>,
}

impl StateChangeDetector {
    /// `true` when nothing changed since the last attestation for this
    /// module and the current block is still in the same signing window.
    #[must_use]
    pub fn is_same_state(&self, module_id: StakingModuleId, current: &ContractsState) -> bool {
        let Some(last) = self.last_by_module.get(&module_id) else {
            return false;
        };

        last.deposit_root == current.deposit_root
            && last.nonce == current.nonce
            && last.last_changed_block_hash == current.last_changed_block_hash
            && last.block_number / GUARDIAN_DEPOSIT_RESIGNING_BLOCKS
                == current.block_number / GUARDIAN_DEPOSIT_RESIGNING_BLOCKS
    }

    pub fn update(&mut self, module_id: StakingModuleId, state: ContractsState) {
        self.last_by_module.insert(module_id, state);
    }
}
