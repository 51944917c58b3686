use blst::{
    min_pk::{PublicKey, Signature},
    BLST_ERROR,
};
use deposit_tree::node::deposit_message_root;
use types::primitives::{Gwei, PublicKeyBytes, SignatureBytes, H256};

use crate::{
    domain::{compute_signing_root, deposit_domain, ForkVersion},
    DEPOSIT_AMOUNT,
};

const DOMAIN_SEPARATION_TAG: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// One `(pubkey, depositSignature, wc)` triple submitted for verification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DepositKeyCandidate {
    pub pubkey: PublicKeyBytes,
    pub signature: SignatureBytes,
    pub wc: H256,
}

/// Seam between the signature cache and the underlying BLS backend.
/// Tests substitute a recording validator to observe cache behavior.
pub trait KeyValidator {
    fn validate_keys(&self, candidates: &[DepositKeyCandidate]) -> Vec<bool>;
}

impl<V: KeyValidator + ?Sized> KeyValidator for std::sync::Arc<V> {
    fn validate_keys(&self, candidates: &[DepositKeyCandidate]) -> Vec<bool> {
        (**self).validate_keys(candidates)
    }
}

pub struct BlsKeyValidator {
    domain: H256,
}

impl BlsKeyValidator {
    #[must_use]
    pub fn new(genesis_fork_version: ForkVersion) -> Self {
        Self {
            domain: deposit_domain(genesis_fork_version),
        }
    }

    /// Verifies the BLS signature of one deposit message. Used both for
    /// registry keys (with the protocol credential and the full deposit
    /// amount) and for on-chain deposit events (with the values the event
    /// actually carries).
    #[must_use]
    pub fn verify_deposit(
        &self,
        pubkey: PublicKeyBytes,
        wc: H256,
        amount: Gwei,
        signature: SignatureBytes,
    ) -> bool {
        let Ok(public_key) = PublicKey::key_validate(pubkey.as_bytes()) else {
            return false;
        };

        let Ok(signature) = Signature::uncompress(signature.as_bytes()) else {
            return false;
        };

        let message_root = deposit_message_root(pubkey, wc, amount);
        let signing_root = compute_signing_root(message_root, self.domain);

        let result = signature.verify(
            true,
            signing_root.as_bytes(),
            DOMAIN_SEPARATION_TAG,
            &[],
            &public_key,
            true,
        );

        result == BLST_ERROR::BLST_SUCCESS
    }

    fn verify(&self, candidate: &DepositKeyCandidate) -> bool {
        self.verify_deposit(
            candidate.pubkey,
            candidate.wc,
            DEPOSIT_AMOUNT,
            candidate.signature,
        )
    }
}

impl KeyValidator for BlsKeyValidator {
    fn validate_keys(&self, candidates: &[DepositKeyCandidate]) -> Vec<bool> {
        candidates
            .iter()
            .map(|candidate| self.verify(candidate))
            .collect()
    }
}
