use serde::{Deserialize, Serialize};

use crate::primitives::{
    Address, KeyIndex, ModuleNonce, OperatorIndex, PublicKeyBytes, SignatureBytes, StakingModuleId,
};

/// A validator key catalogued by the keys index.
/// Refreshed from the index every cycle, pinned to the cycle's block snapshot.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryKey {
    pub key: PublicKeyBytes,
    pub deposit_signature: SignatureBytes,
    pub operator_index: OperatorIndex,
    pub used: bool,
    pub index: KeyIndex,
    pub module_address: Address,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub enum StakingModuleType {
    #[serde(rename = "curated-onchain-v1")]
    CuratedOnchainV1,
    #[serde(rename = "community-onchain-v1")]
    CommunityOnchainV1,
    #[serde(rename = "sdvt")]
    SimpleDvt,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingModule {
    pub id: StakingModuleId,
    pub staking_module_address: Address,
    pub nonce: ModuleNonce,
    #[serde(rename = "type")]
    pub module_type: StakingModuleType,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub index: OperatorIndex,
    pub staking_limit: u64,
    pub total_deposited_validators: u64,
    pub total_added_validators: u64,
    pub reward_address: Address,
}

impl Operator {
    /// Number of vetted keys that have not been deposited yet.
    /// Keys beyond `staking_limit` or `total_added_validators` are not vetted;
    /// keys below `total_deposited_validators` are already on chain.
    #[must_use]
    pub fn vetted_unused_count(&self) -> u64 {
        self.staking_limit
            .min(self.total_added_validators)
            .saturating_sub(self.total_deposited_validators)
    }
}
