use anyhow::{ensure, Result};
use hashing::ZERO_HASHES;
use thiserror::Error;
use types::primitives::H256;

pub const DEPOSIT_CONTRACT_TREE_DEPTH: usize = 32;

const MAX_NODES: u64 = (1 << DEPOSIT_CONTRACT_TREE_DEPTH) - 1;

/// Incremental Merkle accumulator mirroring the deposit contract.
///
/// Only the right-edge `branch` of the tree is kept: inserting leaf `n`
/// folds it into the branch slot at the height of the lowest zero bit of
/// `n + 1`, exactly as the contract's `deposit` function does. The root is
/// reconstructed from the branch, the zero-subtree hashes, and the node
/// count mixed in as a final little-endian chunk.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct DepositTree {
    branch: [H256; DEPOSIT_CONTRACT_TREE_DEPTH],
    node_count: u64,
}

impl DepositTree {
    /// Restores a tree from a branch snapshot, as published for networks
    /// whose deposit history predates the node.
    #[must_use]
    pub const fn from_snapshot(
        branch: [H256; DEPOSIT_CONTRACT_TREE_DEPTH],
        node_count: u64,
    ) -> Self {
        Self { branch, node_count }
    }

    #[must_use]
    pub const fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn insert(&mut self, leaf: H256) -> Result<()> {
        ensure!(self.node_count < MAX_NODES, Error::Full);

        self.node_count += 1;

        let mut node = leaf;
        let mut size = self.node_count;

        for height in 0..DEPOSIT_CONTRACT_TREE_DEPTH {
            if size & 1 == 1 {
                self.branch[height] = node;
                return Ok(());
            }

            node = hashing::hash_256_256(self.branch[height], node);
            size >>= 1;
        }

        unreachable!("a branch slot is written before the loop runs out of heights")
    }

    #[must_use]
    pub fn root(&self) -> H256 {
        let mut node = ZERO_HASHES[0];
        let mut size = self.node_count;

        for height in 0..DEPOSIT_CONTRACT_TREE_DEPTH {
            if size & 1 == 1 {
                node = hashing::hash_256_256(self.branch[height], node);
            } else {
                node = hashing::hash_256_256(node, ZERO_HASHES[height]);
            }

            size >>= 1;
        }

        hashing::hash_256_64(node, self.node_count)
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("deposit tree is full")]
    Full,
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    // `get_deposit_root()` of the deposit contract before any deposits.
    const EMPTY_ROOT: H256 = H256(hex!(
        "d70a234731285c6804c2a4f56711ddb8c82c99740f207854891028af34e27e5e"
    ));

    // Branch of the mainnet deposit tree at the beacon-chain genesis:
    // 21073 deposits, execution block 11320899. Slots 15..32 are zero.
    #[rustfmt::skip]
    const MAINNET_GENESIS_BRANCH: [H256; 15] = [
        H256(hex!("ca3bfce2c304c4f52e0c83f96daf8c98a05f80281b62cf08f6be9c1bc10c0adb")),
        H256(hex!("abcf2f74605a9eb36cf243bb5009259a3717d44df3caf02acc53ab49cfd2eeb6")),
        H256(hex!("d4079d31e57638b3a6928ff3940d0d06545ae164278597bb8d46053084c335ea")),
        H256(hex!("f9585ef52fc5eaf1f11718df7988d3f414d8b0be2e56e15d7ade9f5ee4cc7ee4")),
        H256(hex!("a4c96f16c3a300034788ba8bf79c3125a697488006a4a4288c38fdc4e9891891")),
        H256(hex!("cae036d14b83ff1523749d4fabf5c91e8d455dce2f14eae3408dce22f901efc7")),
        H256(hex!("858ccad1a32af9e9796d3026ba18925103cad44cba4bdc1f3d3c23be125bba18")),
        H256(hex!("11f1e08405d5d180444147397ea0d4aebf12edff5cebc52cb05983c8d4bd2d4a")),
        H256(hex!("93d66676459ab2c5ca9d553a5c5599cc6992ed90edc939c51cc99d1820b56919")),
        H256(hex!("14bfcab6eb8016c5177e9e8f006e7893ea46b232b91b1f923b05273a927cd6d0")),
        H256(hex!("aa14720bc149ce68f20809d6fe55816acf09e72c14b54637dea24eb961558a7a")),
        H256(hex!("c726d03ced287a817fa8fea71c90bd89955b093d7c5908305177efa828945719")),
        H256(hex!("0435298b2d5b2b67543e4dceaf2c8b7fdbdac12836a70ed910c34abcd10b3ddf")),
        H256(hex!("53f640c85e35fef7e7ba4ab8c561fe9f1d763a32c65a1fbad57566bda1352362")),
        H256(hex!("57aa502116cb72c9347d10dca1b64a342b41a829cc7ba95e71499f57be2be3cd")),
    ];

    const MAINNET_GENESIS_DEPOSIT_COUNT: u64 = 21_073;

    // `eth1_data.deposit_root` of the mainnet genesis beacon state.
    const MAINNET_GENESIS_DEPOSIT_ROOT: H256 = H256(hex!(
        "1a4c3cce02935defd159e4e207890ae26a325bf03e205c9ee94ca040ecce008a"
    ));

    fn mainnet_genesis_tree() -> DepositTree {
        let mut branch = [H256::zero(); DEPOSIT_CONTRACT_TREE_DEPTH];
        branch[..MAINNET_GENESIS_BRANCH.len()].copy_from_slice(&MAINNET_GENESIS_BRANCH);

        DepositTree::from_snapshot(branch, MAINNET_GENESIS_DEPOSIT_COUNT)
    }

    #[test]
    fn empty_tree_root_matches_the_deposit_contract() {
        assert_eq!(DepositTree::default().root(), EMPTY_ROOT);
    }

    #[test]
    fn mainnet_genesis_snapshot_produces_the_published_deposit_root() {
        assert_eq!(mainnet_genesis_tree().root(), MAINNET_GENESIS_DEPOSIT_ROOT);
    }

    #[test]
    fn inserting_on_top_of_the_mainnet_snapshot_matches_reference_roots() -> Result<()> {
        // sha256 of `leaf 0` through `leaf 2`; the expected roots come from an
        // independent implementation of the contract algorithm applied to the
        // genesis snapshot.
        let leaves = [
            H256(hex!("20e325f06280f9d0d193fed01a0eda5bef79063f2e602d93e3605cbe825d96ad")),
            H256(hex!("ccbf76d20974e563eb51d22ff1171a30472e0ae643b17863befd53614e7fefad")),
            H256(hex!("bac57df66fe6368188d1d4521bcffaecee76a03a50ff297a13439f7164de0a5f")),
        ];

        let expected_roots = [
            H256(hex!("52547c84387ee7310f836066613fe3e7910a581fdd75fa4ab51427b454ea4f70")),
            H256(hex!("c8add53135abe98bd4dac8e6aab7119d7fa767c15261efb287a92c1b9f98f8dd")),
            H256(hex!("bdba6c96704f7f2bb6a8d854e00a653f96c656e1687e9b245e1bcaf498d94109")),
        ];

        let mut tree = mainnet_genesis_tree();

        for (leaf, expected_root) in leaves.into_iter().zip(expected_roots) {
            tree.insert(leaf)?;
            assert_eq!(tree.root(), expected_root);
        }

        assert_eq!(tree.node_count(), MAINNET_GENESIS_DEPOSIT_COUNT + 3);

        Ok(())
    }

    #[test]
    fn root_with_leaves_matches_explicit_reconstruction() -> Result<()> {
        let leaves = [
            H256::repeat_byte(0xa1),
            H256::repeat_byte(0xb2),
            H256::repeat_byte(0xc3),
        ];

        let mut tree = DepositTree::default();

        for leaf in leaves {
            tree.insert(leaf)?;
        }

        // Fold the full leaf layer by hand: three leaves padded with zero
        // subtrees up to the tree depth, then the count mixed in.
        let mut layer = vec![
            leaves[0],
            leaves[1],
            leaves[2],
            ZERO_HASHES[0],
        ];

        for height in 0..DEPOSIT_CONTRACT_TREE_DEPTH {
            if layer.len() == 1 {
                layer.push(ZERO_HASHES[height]);
            }

            layer = layer
                .chunks(2)
                .map(|pair| hashing::hash_256_256(pair[0], pair[1]))
                .collect();
        }

        assert_eq!(tree.root(), hashing::hash_256_64(layer[0], 3));

        Ok(())
    }

    #[test]
    fn clones_do_not_alias_branch_slots() -> Result<()> {
        let mut tree = DepositTree::default();
        tree.insert(H256::repeat_byte(0x11))?;

        let clone = tree.clone();
        let root_before = clone.root();

        // Mutating the original must leave the clone's branch untouched.
        tree.insert(H256::repeat_byte(0x22))?;

        assert_eq!(clone.root(), root_before);
        assert_ne!(tree.root(), clone.root());

        Ok(())
    }

    #[test]
    fn node_count_tracks_insertions() -> Result<()> {
        let mut tree = DepositTree::default();

        assert_eq!(tree.node_count(), 0);

        tree.insert(H256::zero())?;
        tree.insert(H256::zero())?;

        assert_eq!(tree.node_count(), 2);

        Ok(())
    }
}
