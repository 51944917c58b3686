use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use types::primitives::{Address, BlockNumber, H256};
use web3::{
    ethabi::{self, ParamType, Token},
    signing::{keccak256, SecretKey},
    types::{BlockId, Bytes, CallRequest, FilterBuilder, TransactionParameters, U64},
};

use crate::{
    deposit_event::DepositEventLog,
    eth1_api::Eth1Api,
    signing_key_event::{SigningKeyEventLog, SIGNING_KEY_ADDED_TOPIC},
};

#[derive(Debug, Error)]
enum Error {
    #[error("contract call {method} returned malformed data")]
    MalformedReturnData { method: &'static str },
}

/// The beacon-chain deposit contract.
pub struct DepositContract {
    api: Arc<Eth1Api>,
    address: Address,
}

impl DepositContract {
    #[must_use]
    pub const fn new(api: Arc<Eth1Api>, address: Address) -> Self {
        Self { api, address }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    pub async fn get_deposit_root(&self, at: BlockId) -> Result<H256> {
        let returned = self
            .eth_call("get_deposit_root()", &[], at)
            .await?;

        decode_single(&returned, ParamType::FixedBytes(32), "get_deposit_root")?
            .into_fixed_bytes()
            .map(|bytes| H256::from_slice(&bytes))
            .ok_or_else(|| Error::MalformedReturnData { method: "get_deposit_root" }.into())
    }

    /// Fetches and decodes `DepositEvent` logs in `[from, to]`,
    /// ordered by `(block_number, log_index)`.
    pub async fn events(&self, from: BlockNumber, to: BlockNumber) -> Result<Vec<DepositEventLog>> {
        let filter = FilterBuilder::default()
            .from_block(U64::from(from).into())
            .to_block(U64::from(to).into())
            .address(vec![self.address])
            .topics(Some(vec![DepositEventLog::TOPIC]), None, None, None)
            .build();

        let mut events = self
            .api
            .logs(filter)
            .await?
            .into_iter()
            .map(DepositEventLog::try_from)
            .collect::<Result<Vec<_>>>()?;

        events.sort_by_key(|event| (event.block_number, event.log_index));

        Ok(events)
    }

    async fn eth_call(&self, method: &str, tokens: &[Token], at: BlockId) -> Result<Bytes> {
        eth_call(&self.api, self.address, method, tokens, at).await
    }
}

/// The on-chain deposit security module that aggregates guardian signatures.
pub struct SecurityContract {
    api: Arc<Eth1Api>,
    address: Address,
}

impl SecurityContract {
    #[must_use]
    pub const fn new(api: Arc<Eth1Api>, address: Address) -> Self {
        Self { api, address }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    pub async fn version(&self, at: BlockId) -> Result<u64> {
        self.call_uint("version()", at).await
    }

    pub async fn attest_message_prefix(&self, at: BlockId) -> Result<H256> {
        self.call_bytes32("getAttestMessagePrefix()", at).await
    }

    pub async fn pause_message_prefix(&self, at: BlockId) -> Result<H256> {
        self.call_bytes32("getPauseMessagePrefix()", at).await
    }

    pub async fn unvet_message_prefix(&self, at: BlockId) -> Result<H256> {
        self.call_bytes32("getUnvetMessagePrefix()", at).await
    }

    pub async fn guardians(&self, at: BlockId) -> Result<Vec<Address>> {
        let returned = self
            .eth_call("getGuardians()", &[], at)
            .await?;

        decode_single(
            &returned,
            ParamType::Array(ParamType::Address.into()),
            "getGuardians",
        )?
        .into_array()
        .map(|tokens| {
            tokens
                .into_iter()
                .filter_map(Token::into_address)
                .collect()
        })
        .ok_or_else(|| Error::MalformedReturnData { method: "getGuardians" }.into())
    }

    /// Returns `None` when `guardian` is not registered in the module.
    pub async fn guardian_index(&self, at: BlockId, guardian: Address) -> Result<Option<u64>> {
        let returned = self
            .eth_call("getGuardianIndex(address)", &[Token::Address(guardian)], at)
            .await?;

        let index = decode_single(&returned, ParamType::Int(256), "getGuardianIndex")?
            .into_int()
            .ok_or(Error::MalformedReturnData { method: "getGuardianIndex" })?;

        if index.bit(255) {
            return Ok(None);
        }

        Ok(Some(index.as_u64()))
    }

    pub async fn is_deposits_paused(&self, at: BlockId) -> Result<bool> {
        let returned = self.eth_call("isDepositsPaused()", &[], at).await?;

        decode_single(&returned, ParamType::Bool, "isDepositsPaused")?
            .into_bool()
            .ok_or_else(|| Error::MalformedReturnData { method: "isDepositsPaused" }.into())
    }

    /// `pauseDeposits` of module version 3 and above: one global pause.
    pub async fn pause_deposits(
        &self,
        block_number: BlockNumber,
        signature: (H256, H256),
        secret_key: &SecretKey,
    ) -> Result<H256> {
        let data = call_data(
            "pauseDeposits(uint256,(bytes32,bytes32))",
            &[
                Token::Uint(block_number.into()),
                signature_token(signature),
            ],
        );

        self.submit(data, secret_key).await
    }

    /// `pauseDeposits` of module versions below 3: one pause per staking module.
    pub async fn pause_deposits_v2(
        &self,
        block_number: BlockNumber,
        staking_module_id: u32,
        signature: (H256, H256),
        secret_key: &SecretKey,
    ) -> Result<H256> {
        let data = call_data(
            "pauseDeposits(uint256,uint256,(bytes32,bytes32))",
            &[
                Token::Uint(block_number.into()),
                Token::Uint(staking_module_id.into()),
                signature_token(signature),
            ],
        );

        self.submit(data, secret_key).await
    }

    #[expect(clippy::too_many_arguments)]
    pub async fn unvet_signing_keys(
        &self,
        block_number: BlockNumber,
        block_hash: H256,
        staking_module_id: u32,
        nonce: u64,
        operator_ids: Vec<u8>,
        vetted_keys_by_operator: Vec<u8>,
        signature: (H256, H256),
        secret_key: &SecretKey,
    ) -> Result<H256> {
        let data = call_data(
            "unvetSigningKeys(uint256,bytes32,uint256,uint256,bytes,bytes,(bytes32,bytes32))",
            &[
                Token::Uint(block_number.into()),
                Token::FixedBytes(block_hash.as_bytes().to_vec()),
                Token::Uint(staking_module_id.into()),
                Token::Uint(nonce.into()),
                Token::Bytes(operator_ids),
                Token::Bytes(vetted_keys_by_operator),
                signature_token(signature),
            ],
        );

        self.submit(data, secret_key).await
    }

    async fn submit(&self, data: Bytes, secret_key: &SecretKey) -> Result<H256> {
        let params = TransactionParameters {
            to: Some(self.address),
            data,
            ..TransactionParameters::default()
        };

        self.api.submit_transaction(params, secret_key).await
    }

    async fn call_bytes32(&self, method: &'static str, at: BlockId) -> Result<H256> {
        let returned = eth_call(&self.api, self.address, method, &[], at).await?;

        decode_single(&returned, ParamType::FixedBytes(32), method)?
            .into_fixed_bytes()
            .map(|bytes| H256::from_slice(&bytes))
            .ok_or_else(|| Error::MalformedReturnData { method }.into())
    }

    async fn call_uint(&self, method: &'static str, at: BlockId) -> Result<u64> {
        let returned = eth_call(&self.api, self.address, method, &[], at).await?;

        decode_single(&returned, ParamType::Uint(256), method)?
            .into_uint()
            .map(|value| value.as_u64())
            .ok_or_else(|| Error::MalformedReturnData { method }.into())
    }

    async fn eth_call(&self, method: &str, tokens: &[Token], at: BlockId) -> Result<Bytes> {
        eth_call(&self.api, self.address, method, tokens, at).await
    }
}

/// The staking router, source of the protocol withdrawal credential.
pub struct StakingRouter {
    api: Arc<Eth1Api>,
    address: Address,
}

impl StakingRouter {
    #[must_use]
    pub const fn new(api: Arc<Eth1Api>, address: Address) -> Self {
        Self { api, address }
    }

    pub async fn withdrawal_credentials(&self, at: BlockId) -> Result<H256> {
        let returned = eth_call(
            &self.api,
            self.address,
            "getWithdrawalCredentials()",
            &[],
            at,
        )
        .await?;

        decode_single(&returned, ParamType::FixedBytes(32), "getWithdrawalCredentials")?
            .into_fixed_bytes()
            .map(|bytes| H256::from_slice(&bytes))
            .ok_or_else(|| {
                Error::MalformedReturnData {
                    method: "getWithdrawalCredentials",
                }
                .into()
            })
    }
}

/// Fetches `SigningKeyAdded` logs of the given staking module registries,
/// ordered by `(block_number, log_index)`.
pub async fn signing_key_events(
    api: &Eth1Api,
    module_addresses: Vec<Address>,
    from: BlockNumber,
    to: BlockNumber,
) -> Result<Vec<SigningKeyEventLog>> {
    let filter = FilterBuilder::default()
        .from_block(U64::from(from).into())
        .to_block(U64::from(to).into())
        .address(module_addresses)
        .topics(Some(vec![*SIGNING_KEY_ADDED_TOPIC]), None, None, None)
        .build();

    let mut events = api
        .logs(filter)
        .await?
        .into_iter()
        .map(SigningKeyEventLog::try_from)
        .collect::<Result<Vec<_>>>()?;

    events.sort_by_key(|event| (event.block_number, event.log_index));

    Ok(events)
}

fn signature_token((r, vs): (H256, H256)) -> Token {
    Token::Tuple(vec![
        Token::FixedBytes(r.as_bytes().to_vec()),
        Token::FixedBytes(vs.as_bytes().to_vec()),
    ])
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn call_data(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend(ethabi::encode(tokens));
    data.into()
}

async fn eth_call(
    api: &Eth1Api,
    to: Address,
    method: &str,
    tokens: &[Token],
    at: BlockId,
) -> Result<Bytes> {
    let request = CallRequest {
        to: Some(to),
        data: Some(call_data(method, tokens)),
        ..CallRequest::default()
    };

    api.call(request, Some(at)).await
}

fn decode_single(returned: &Bytes, kind: ParamType, method: &'static str) -> Result<Token> {
    ethabi::decode(&[kind], &returned.0)
        .map_err(|_| Error::MalformedReturnData { method })?
        .into_iter()
        .next()
        .ok_or_else(|| Error::MalformedReturnData { method }.into())
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use types::primitives::U256;

    use super::*;

    #[test]
    fn selectors_match_known_values() {
        // `cast sig 'get_deposit_root()'`
        assert_eq!(selector("get_deposit_root()"), hex!("c5f2892f"));
        // `cast sig 'transfer(address,uint256)'`
        assert_eq!(selector("transfer(address,uint256)"), hex!("a9059cbb"));
    }

    #[test]
    fn call_data_is_selector_plus_encoded_arguments() {
        let data = call_data(
            "getGuardianIndex(address)",
            &[Token::Address(Address::repeat_byte(0x11))],
        );

        assert_eq!(data.0.len(), 4 + 32);
        assert_eq!(data.0[16..36], [0x11; 20]);
    }

    #[test]
    fn negative_guardian_index_decodes_as_absent() {
        let returned = Bytes(ethabi::encode(&[Token::Int(U256::MAX)]));

        let index = decode_single(&returned, ParamType::Int(256), "getGuardianIndex")
            .expect("int decodes")
            .into_int()
            .expect("token is an int");

        assert!(index.bit(255));
    }
}
