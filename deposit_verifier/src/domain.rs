use types::primitives::H256;

/// `DomainType` the beacon chain assigns to deposit messages.
const DOMAIN_DEPOSIT: [u8; 4] = [3, 0, 0, 0];

pub type ForkVersion = [u8; 4];

/// Deposit messages are signed over the genesis fork with a zero
/// `genesis_validators_root`, so the domain depends only on the chain's
/// genesis fork version.
#[must_use]
pub fn deposit_domain(fork_version: ForkVersion) -> H256 {
    let mut version_chunk = [0_u8; 32];
    version_chunk[..4].copy_from_slice(&fork_version);

    let fork_data_root = hashing::hash_256_256(H256(version_chunk), H256::zero());

    let mut domain = [0_u8; 32];
    domain[..4].copy_from_slice(&DOMAIN_DEPOSIT);
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    H256(domain)
}

/// `hash_tree_root` of `SigningData { object_root, domain }`.
#[must_use]
pub fn compute_signing_root(object_root: H256, domain: H256) -> H256 {
    hashing::hash_256_256(object_root, domain)
}
