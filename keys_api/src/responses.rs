use serde::{Deserialize, Serialize};
use types::{
    primitives::{BlockNumber, ChainId, H256},
    registry::{Operator, RegistryKey, StakingModule},
};

/// EL state the keys index pinned its answer to. `last_changed_block_hash`
/// detects mid-read mutation: two calls answering from the same registry
/// state report the same value.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElBlockSnapshot {
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub last_changed_block_hash: H256,
    pub timestamp: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub el_block_snapshot: ElBlockSnapshot,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct KeysResponse {
    pub data: Vec<RegistryKey>,
    pub meta: Meta,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct OperatorsEntry {
    pub operators: Vec<Operator>,
    pub module: StakingModule,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct OperatorsResponse {
    pub data: Vec<OperatorsEntry>,
    pub meta: Meta,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub chain_id: ChainId,
    pub app_version: String,
    pub el_block_snapshot: ElBlockSnapshot,
}
