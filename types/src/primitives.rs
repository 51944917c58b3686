use derive_more::AsRef;
use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;

pub use ethereum_types::{Address, H256, U256};

pub type BlockNumber = u64;
pub type LogIndex = u64;
pub type Gwei = u64;
pub type ChainId = u64;
/// Keys operation counter of a staking module (`keysOpIndex`).
pub type ModuleNonce = u64;
pub type StakingModuleId = u32;
pub type OperatorIndex = u32;
pub type KeyIndex = u32;

pub const PUBLIC_KEY_SIZE: usize = 48;
pub const SIGNATURE_SIZE: usize = 96;

construct_fixed_hash! {
    /// Compressed BLS12-381 G1 public key.
    #[derive(AsRef)]
    pub struct PublicKeyBytes(PUBLIC_KEY_SIZE);
}

construct_fixed_hash! {
    /// Compressed BLS12-381 G2 signature.
    #[derive(AsRef)]
    pub struct SignatureBytes(SIGNATURE_SIZE);
}

impl_fixed_hash_serde!(PublicKeyBytes, PUBLIC_KEY_SIZE);
impl_fixed_hash_serde!(SignatureBytes, SIGNATURE_SIZE);

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn public_key_bytes_round_trips_through_json() {
        let pubkey = PublicKeyBytes(hex!(
            "93247f2209abcacf57b75a51dafae777f9dd38bc7053d1af526f220a7489a6d3a2753e5f3e8b1cfe39b56f43611df74a"
        ));

        let json = serde_json::to_string(&pubkey).expect("pubkey serializes to a hex string");

        assert_eq!(
            json,
            "\"0x93247f2209abcacf57b75a51dafae777f9dd38bc7053d1af526f220a7489a6d3a2753e5f3e8b1cfe39b56f43611df74a\"",
        );

        assert_eq!(
            serde_json::from_str::<PublicKeyBytes>(&json).expect("hex string deserializes"),
            pubkey,
        );
    }
}
