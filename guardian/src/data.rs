use types::{
    deposit::DepositEventGroup,
    primitives::{Address, BlockNumber, ModuleNonce, StakingModuleId, H256},
    registry::{Operator, RegistryKey},
};

/// Everything a cycle knows about one staking module, pinned to the cycle's
/// block snapshot. Owned by the cycle and discarded afterwards.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StakingModuleData {
    pub module_id: StakingModuleId,
    pub module_address: Address,
    pub nonce: ModuleNonce,
    pub block_hash: H256,
    pub last_changed_block_hash: H256,
    pub operators: Vec<Operator>,
    pub unused_keys: Vec<RegistryKey>,
    pub vetted_unused_keys: Vec<RegistryKey>,
    pub duplicated_keys: Vec<RegistryKey>,
    pub front_run_keys: Vec<RegistryKey>,
    pub invalid_keys: Vec<RegistryKey>,
}

impl StakingModuleData {
    /// Deposits to this module are withheld when any key is suspect.
    #[must_use]
    pub fn has_suspect_keys(&self) -> bool {
        !self.duplicated_keys.is_empty()
            || !self.front_run_keys.is_empty()
            || !self.invalid_keys.is_empty()
    }
}

/// Chain-wide facts of one cycle.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockData {
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub deposit_root: H256,
    pub deposited_events: DepositEventGroup,
    pub guardian_address: Address,
    pub guardian_index: u64,
    pub lido_wc: H256,
    pub security_version: u64,
    pub already_paused_deposits: bool,
    pub theft_happened: bool,
    pub wallet_balance_critical: bool,
}

impl BlockData {
    /// Whether deposits may be attested at all, before any per-module key
    /// findings are considered.
    #[must_use]
    pub const fn can_deposit_globally(&self) -> bool {
        !self.theft_happened && !self.already_paused_deposits
    }
}
