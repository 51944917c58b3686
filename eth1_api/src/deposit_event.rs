// `DepositEvent` logs encode every field as ABI `bytes` even though all of
// them are fixed in size, so the data is a fixed run of 18 EVM words:
// five offset words, then each field as a length word followed by the
// zero-padded payload. The numeric fields (`amount`, `index`) are
// little-endian, as emitted by the deposit contract.

use core::ops::Range;

use anyhow::{ensure, Error as AnyhowError, Result};
use hex_literal::hex;
use thiserror::Error;
use types::primitives::{BlockNumber, Gwei, LogIndex, PublicKeyBytes, SignatureBytes, H256};
use web3::types::Log;

const WORD: usize = 32;

const PUBKEY_RANGE: Range<usize> = 6 * WORD..6 * WORD + 48;
const WC_RANGE: Range<usize> = 9 * WORD..10 * WORD;
const AMOUNT_RANGE: Range<usize> = 11 * WORD..11 * WORD + 8;
const SIGNATURE_RANGE: Range<usize> = 13 * WORD..13 * WORD + 96;
const INDEX_RANGE: Range<usize> = 17 * WORD..17 * WORD + 8;

const DATA_LENGTH: usize = 18 * WORD;

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

/// A decoded `DepositEvent` log together with its position on chain.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DepositEventLog {
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub log_index: LogIndex,
    pub tx_hash: H256,
    pub pubkey: PublicKeyBytes,
    pub wc: H256,
    pub amount: Gwei,
    pub signature: SignatureBytes,
    /// Zero-based position in the deposit contract tree.
    pub index: u64,
}

impl DepositEventLog {
    /// Keccak-256 hash of `DepositEvent(bytes,bytes,bytes,bytes,bytes)`.
    pub const TOPIC: H256 = H256(hex!(
        "649bbc62d0e31342afea4e5cd82d4049e7e1ee912fc0889aa790803be39038c5"
    ));
}

impl TryFrom<Log> for DepositEventLog {
    type Error = AnyhowError;

    fn try_from(log: Log) -> Result<Self> {
        ensure!(
            log.topics == [Self::TOPIC],
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

        let data = log.data.0.as_slice();

        Ok(Self {
            block_number: block_number.as_u64(),
            block_hash,
            log_index: log_index.as_u64(),
            tx_hash,
            pubkey: PublicKeyBytes::from_slice(&data[PUBKEY_RANGE]),
            wc: H256::from_slice(&data[WC_RANGE]),
            amount: Gwei::from_le_bytes(
                data[AMOUNT_RANGE]
                    .try_into()
                    .expect("length is checked above"),
            ),
            signature: SignatureBytes::from_slice(&data[SIGNATURE_RANGE]),
            index: u64::from_le_bytes(
                data[INDEX_RANGE]
                    .try_into()
                    .expect("length is checked above"),
            ),
        })
    }
}
