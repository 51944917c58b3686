use anyhow::{Error as AnyhowError, Result};
use thiserror::Error;
use types::primitives::{BlockNumber, H256};
use web3::types::Block;

/// The slice of an EL block header the guardian cares about.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Eth1Block {
    pub hash: H256,
    pub parent_hash: H256,
    pub number: BlockNumber,
    pub timestamp: u64,
}

#[derive(Debug, Error)]
#[error("block is still pending")]
struct BlockPendingError;

impl TryFrom<Block<H256>> for Eth1Block {
    type Error = AnyhowError;

    fn try_from(block: Block<H256>) -> Result<Self> {
        let hash = block.hash.ok_or(BlockPendingError)?;
        let number = block.number.ok_or(BlockPendingError)?.as_u64();

        Ok(Self {
            hash,
            parent_hash: block.parent_hash,
            number,
            timestamp: block.timestamp.as_u64(),
        })
    }
}
