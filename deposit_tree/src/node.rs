use types::primitives::{Gwei, PublicKeyBytes, SignatureBytes, H256};

/// `hash_tree_root` of the deposit data, as computed by the deposit
/// contract when forming the leaf for a `DepositEvent`.
#[must_use]
pub fn form_deposit_node(
    wc: H256,
    pubkey: PublicKeyBytes,
    signature: SignatureBytes,
    amount: Gwei,
) -> H256 {
    let left = hashing::hash_256_256(hashing::hash_384(pubkey), wc);
    let right = hashing::hash_256_256(amount_chunk(amount), signature_root(signature));

    hashing::hash_256_256(left, right)
}

/// `hash_tree_root` of the deposit message (deposit data without the
/// signature), the value the BLS deposit signature commits to.
#[must_use]
pub fn deposit_message_root(pubkey: PublicKeyBytes, wc: H256, amount: Gwei) -> H256 {
    let left = hashing::hash_256_256(hashing::hash_384(pubkey), wc);
    let right = hashing::hash_256_256(amount_chunk(amount), H256::zero());

    hashing::hash_256_256(left, right)
}

fn amount_chunk(amount: Gwei) -> H256 {
    let mut chunk = [0_u8; 32];
    chunk[..8].copy_from_slice(&amount.to_le_bytes());
    H256(chunk)
}

fn signature_root(signature: SignatureBytes) -> H256 {
    let mut first = [0_u8; 64];
    first.copy_from_slice(&signature[..64]);

    let mut third = [0_u8; 32];
    third.copy_from_slice(&signature[64..]);

    hashing::hash_256_256(
        hashing::hash_512(&first),
        hashing::hash_256_256(H256(third), H256::zero()),
    )
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    const GENESIS_AMOUNT: Gwei = 32_000_000_000;

    // A full deposit of the first interop validator: its published pubkey,
    // the `0x00 ‖ sha256(pubkey)[1..]` withdrawal credential, and a known
    // BLS12-381 G2 signature. The expected roots come from an independent
    // implementation of the deposit contract algorithm.
    const FIXTURE_PUBKEY: PublicKeyBytes = PublicKeyBytes(hex!(
        "a99a76ed7796f7be22d5b7e85deeb7c5677e88e511e0b337618f8c4eb61349b4bf2d153f649f7b53359fe8b94a38e44c"
    ));

    const FIXTURE_WC: H256 = H256(hex!(
        "00fad2a6bfb0e7f1f0f45460944fbd8dfa7f37da06a4d13b3983cc90bb46963b"
    ));

    const FIXTURE_SIGNATURE: SignatureBytes = SignatureBytes(hex!(
        "b3baa751d0a9132cfe93e4e3d5ff9075111100e3789dca219ade5a24d27e19d16b3353149da1833e9b691bb38634e8dc04469be7032132906c927d7e1a49b414730612877bc6b2810c8f202daf793d1ab0d6b5cb21d52f9e52e883859887a5d9"
    ));

    const FIXTURE_DEPOSIT_DATA_ROOT: H256 = H256(hex!(
        "9533d4824f480de99b6bf7294c85a5760fc1c25fa67eeb7d04b24e76a1f053ae"
    ));

    const FIXTURE_DEPOSIT_MESSAGE_ROOT: H256 = H256(hex!(
        "139b510ea7f2788ab82da1f427d6cbe1db147c15a053db738ad5500cd83754a6"
    ));

    #[test]
    fn deposit_node_matches_the_reference_root() {
        assert_eq!(
            form_deposit_node(FIXTURE_WC, FIXTURE_PUBKEY, FIXTURE_SIGNATURE, GENESIS_AMOUNT),
            FIXTURE_DEPOSIT_DATA_ROOT,
        );
    }

    #[test]
    fn deposit_message_root_matches_the_reference_root() {
        assert_eq!(
            deposit_message_root(FIXTURE_PUBKEY, FIXTURE_WC, GENESIS_AMOUNT),
            FIXTURE_DEPOSIT_MESSAGE_ROOT,
        );
    }

    #[test]
    fn deposit_node_of_zero_inputs_reduces_to_zero_hash_composition() {
        // With all-zero inputs every intermediate node is a zero-subtree root,
        // so the result is expressible purely through the zero-hash table.
        let zh = hashing::ZERO_HASHES;

        let expected = hashing::hash_256_256(
            hashing::hash_256_256(zh[1], zh[0]),
            hashing::hash_256_256(zh[0], hashing::hash_256_256(zh[1], zh[1])),
        );

        assert_eq!(
            form_deposit_node(H256::zero(), PublicKeyBytes::zero(), SignatureBytes::zero(), 0),
            expected,
        );
    }

    #[test]
    fn deposit_node_commits_to_every_field() {
        let base = form_deposit_node(
            H256::repeat_byte(1),
            PublicKeyBytes::repeat_byte(2),
            SignatureBytes::repeat_byte(3),
            GENESIS_AMOUNT,
        );

        let variants = [
            form_deposit_node(
                H256::repeat_byte(9),
                PublicKeyBytes::repeat_byte(2),
                SignatureBytes::repeat_byte(3),
                GENESIS_AMOUNT,
            ),
            form_deposit_node(
                H256::repeat_byte(1),
                PublicKeyBytes::repeat_byte(9),
                SignatureBytes::repeat_byte(3),
                GENESIS_AMOUNT,
            ),
            form_deposit_node(
                H256::repeat_byte(1),
                PublicKeyBytes::repeat_byte(2),
                SignatureBytes::repeat_byte(9),
                GENESIS_AMOUNT,
            ),
            form_deposit_node(
                H256::repeat_byte(1),
                PublicKeyBytes::repeat_byte(2),
                SignatureBytes::repeat_byte(3),
                GENESIS_AMOUNT + 1,
            ),
        ];

        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn deposit_message_root_ignores_the_signature() {
        let root = deposit_message_root(PublicKeyBytes::repeat_byte(2), H256::repeat_byte(1), GENESIS_AMOUNT);

        let node_left = hashing::hash_256_256(
            hashing::hash_384(PublicKeyBytes::repeat_byte(2)),
            H256::repeat_byte(1),
        );

        let mut amount_chunk = [0_u8; 32];
        amount_chunk[..8].copy_from_slice(&GENESIS_AMOUNT.to_le_bytes());

        assert_eq!(
            root,
            hashing::hash_256_256(
                node_left,
                hashing::hash_256_256(H256(amount_chunk), H256::zero()),
            ),
        );
    }
}
