use serde::Serialize;
use types::primitives::{Address, BlockNumber, ModuleNonce, StakingModuleId, H256};
use wallet::GuardianSignature;
use web3::{
    ethabi::{self, Token},
    signing::keccak256,
};

/// Digest of a deposit attestation:
/// `keccak256(abi.encode(prefix, blockNumber, blockHash, depositRoot, stakingModuleId, nonce))`.
#[must_use]
pub fn deposit_digest(
    prefix: H256,
    block_number: BlockNumber,
    block_hash: H256,
    deposit_root: H256,
    staking_module_id: StakingModuleId,
    nonce: ModuleNonce,
) -> H256 {
    digest(&[
        Token::FixedBytes(prefix.as_bytes().to_vec()),
        Token::Uint(block_number.into()),
        Token::FixedBytes(block_hash.as_bytes().to_vec()),
        Token::FixedBytes(deposit_root.as_bytes().to_vec()),
        Token::Uint(staking_module_id.into()),
        Token::Uint(nonce.into()),
    ])
}

/// Digest of a per-module pause attestation (security module below v3).
#[must_use]
pub fn pause_digest_v2(
    prefix: H256,
    block_number: BlockNumber,
    staking_module_id: StakingModuleId,
) -> H256 {
    digest(&[
        Token::FixedBytes(prefix.as_bytes().to_vec()),
        Token::Uint(block_number.into()),
        Token::Uint(staking_module_id.into()),
    ])
}

/// Digest of a global pause attestation (security module v3 and above).
#[must_use]
pub fn pause_digest_v3(prefix: H256, block_number: BlockNumber) -> H256 {
    digest(&[
        Token::FixedBytes(prefix.as_bytes().to_vec()),
        Token::Uint(block_number.into()),
    ])
}

/// Digest of an unvet attestation. `operator_ids` and
/// `vetted_keys_by_operator` are the packed byte strings that also go on
/// chain.
#[must_use]
pub fn unvet_digest(
    prefix: H256,
    block_number: BlockNumber,
    block_hash: H256,
    staking_module_id: StakingModuleId,
    nonce: ModuleNonce,
    operator_ids: &[u8],
    vetted_keys_by_operator: &[u8],
) -> H256 {
    digest(&[
        Token::FixedBytes(prefix.as_bytes().to_vec()),
        Token::Uint(block_number.into()),
        Token::FixedBytes(block_hash.as_bytes().to_vec()),
        Token::Uint(staking_module_id.into()),
        Token::Uint(nonce.into()),
        Token::Bytes(operator_ids.to_vec()),
        Token::Bytes(vetted_keys_by_operator.to_vec()),
    ])
}

/// Operator indices as concatenated 8-byte big-endian words.
#[must_use]
pub fn pack_operator_ids(operator_ids: impl IntoIterator<Item = u64>) -> Vec<u8> {
    operator_ids
        .into_iter()
        .flat_map(|id| id.to_be_bytes())
        .collect()
}

/// Per-operator vetted-key counts as concatenated 16-byte big-endian words,
/// in the same order as the packed operator indices.
#[must_use]
pub fn pack_vetted_counts(counts: impl IntoIterator<Item = u64>) -> Vec<u8> {
    counts
        .into_iter()
        .flat_map(|count| u128::from(count).to_be_bytes())
        .collect()
}

fn digest(tokens: &[Token]) -> H256 {
    H256(keccak256(&ethabi::encode(tokens)))
}

/// Application metadata attached to every bus payload.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct AppMeta {
    pub version: String,
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMessage {
    pub guardian_address: Address,
    pub guardian_index: u64,
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub deposit_root: H256,
    pub staking_module_id: StakingModuleId,
    pub nonce: ModuleNonce,
    pub signature: GuardianSignature,
    pub app: AppMeta,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseMessage {
    pub guardian_address: Address,
    pub guardian_index: u64,
    pub block_number: BlockNumber,
    /// Absent when the security module pauses globally (v3 and above).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staking_module_id: Option<StakingModuleId>,
    pub signature: GuardianSignature,
    pub app: AppMeta,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnvetMessage {
    pub guardian_address: Address,
    pub guardian_index: u64,
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub staking_module_id: StakingModuleId,
    pub nonce: ModuleNonce,
    /// Hex-encoded packed operator indices.
    pub operator_ids: String,
    /// Hex-encoded packed vetted-key counts.
    pub vetted_keys_by_operator: String,
    pub signature: GuardianSignature,
    pub app: AppMeta,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    pub guardian_address: Address,
    pub guardian_index: u64,
    pub block_number: BlockNumber,
    pub staking_module_ids: Vec<StakingModuleId>,
    pub app: AppMeta,
}

/// A payload published to the message bus. The `type` discriminator is what
/// off-chain consumers dispatch on.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BrokerMessage {
    Deposit(DepositMessage),
    Pause(PauseMessage),
    Unvet(UnvetMessage),
    Ping(PingMessage),
}

impl BrokerMessage {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Deposit(_) => "deposit",
            Self::Pause(_) => "pause",
            Self::Unvet(_) => "unvet",
            Self::Ping(_) => "ping",
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn deposit_digest_is_stable() {
        // Pinned so that accidental reordering of the encoded tuple shows up.
        let digest = deposit_digest(
            H256::repeat_byte(0x11),
            100,
            H256::repeat_byte(0x22),
            H256::repeat_byte(0x33),
            1,
            5,
        );

        let encoded = ethabi::encode(&[
            Token::FixedBytes(H256::repeat_byte(0x11).as_bytes().to_vec()),
            Token::Uint(100.into()),
            Token::FixedBytes(H256::repeat_byte(0x22).as_bytes().to_vec()),
            Token::FixedBytes(H256::repeat_byte(0x33).as_bytes().to_vec()),
            Token::Uint(1.into()),
            Token::Uint(5.into()),
        ]);

        assert_eq!(encoded.len(), 6 * 32);
        assert_eq!(digest, H256(keccak256(&encoded)));
    }

    #[test]
    fn packed_operator_ids_are_8_byte_big_endian() {
        assert_eq!(
            pack_operator_ids([1, 258]),
            hex!("0000000000000001" "0000000000000102"),
        );
    }

    #[test]
    fn packed_vetted_counts_are_16_byte_big_endian() {
        assert_eq!(
            pack_vetted_counts([3]),
            hex!("00000000000000000000000000000003"),
        );
    }

    #[test]
    fn broker_messages_carry_a_type_discriminator() {
        let message = BrokerMessage::Ping(PingMessage {
            guardian_address: Address::repeat_byte(1),
            guardian_index: 0,
            block_number: 7,
            staking_module_ids: vec![1, 2],
            app: AppMeta {
                version: "1.0.0".to_owned(),
                name: "guardian".to_owned(),
            },
        });

        let json = serde_json::to_value(&message).expect("message serializes");

        assert_eq!(json["type"], "ping");
        assert_eq!(json["blockNumber"], 7);
        assert_eq!(json["stakingModuleIds"], serde_json::json!([1, 2]));
    }
}
