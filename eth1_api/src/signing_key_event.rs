use anyhow::{ensure, Error as AnyhowError, Result};
use once_cell::sync::Lazy;
use thiserror::Error;
use types::primitives::{Address, BlockNumber, LogIndex, OperatorIndex, PublicKeyBytes, H256};
use web3::{signing::keccak256, types::Log};

// `SigningKeyAdded(uint256 indexed nodeOperatorId, bytes pubkey)`:
// one offset word, one length word, then the zero-padded 48-byte key.
const DATA_LENGTH: usize = 4 * 32;
const PUBKEY_OFFSET: usize = 2 * 32;

/// Keccak-256 hash of `SigningKeyAdded(uint256,bytes)`.
pub static SIGNING_KEY_ADDED_TOPIC: Lazy<H256> =
    Lazy::new(|| H256(keccak256(b"SigningKeyAdded(uint256,bytes)")));

#[derive(Debug, Error)]
enum Error {
    #[error("log has unexpected topics: {log:?}")]
    UnexpectedTopics { log: Box<Log> },
    #[error("log has been removed: {log:?}")]
    Removed { log: Box<Log> },
    #[error("log data has the wrong length: {log:?}")]
    WrongLength { log: Box<Log> },
    #[error("log is not anchored to a mined block: {log:?}")]
    Unmined { log: Box<Log> },
}

/// A key-addition event of a staking module registry, used to order
/// duplicate keys by who registered them first.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SigningKeyEventLog {
    pub module_address: Address,
    pub operator_index: OperatorIndex,
    pub pubkey: PublicKeyBytes,
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub log_index: LogIndex,
    pub tx_hash: H256,
}

impl TryFrom<Log> for SigningKeyEventLog {
    type Error = AnyhowError;

    fn try_from(log: Log) -> Result<Self> {
        ensure!(
            log.topics.len() == 2 && log.topics[0] == *SIGNING_KEY_ADDED_TOPIC,
            Error::UnexpectedTopics { log: log.into() },
        );

        ensure!(!log.is_removed(), Error::Removed { log: log.into() });

        ensure!(
            log.data.0.len() == DATA_LENGTH,
            Error::WrongLength { log: log.into() },
        );

        let (Some(block_number), Some(block_hash), Some(log_index), Some(tx_hash)) = (
            log.block_number,
            log.block_hash,
            log.log_index,
            log.transaction_hash,
        ) else {
            return Err(Error::Unmined { log: log.into() }.into());
        };

        let operator_index = OperatorIndex::try_from(log.topics[1].to_low_u64_be())?;

        let pubkey =
            PublicKeyBytes::from_slice(&log.data.0[PUBKEY_OFFSET..PUBKEY_OFFSET + 48]);

        Ok(Self {
            module_address: log.address,
            operator_index,
            pubkey,
            block_number: block_number.as_u64(),
            block_hash,
            log_index: log_index.as_u64(),
            tx_hash,
        })
    }
}
