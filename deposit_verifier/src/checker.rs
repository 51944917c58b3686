use std::collections::HashMap;

use log::debug;
use types::{
    primitives::{PublicKeyBytes, SignatureBytes, H256},
    registry::RegistryKey,
};

use crate::validator::{DepositKeyCandidate, KeyValidator};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct CacheEntry {
    signature: SignatureBytes,
    wc: H256,
    valid: bool,
}

/// Deposit-signature verdicts cached per public key.
///
/// A cached verdict is reused only while the key's deposit signature and the
/// protocol withdrawal credential both match the cached pair; changing either
/// (including a protocol-wide credential rotation) forces revalidation. The
/// underlying [`KeyValidator`] is invoked with exactly the candidates whose
/// `(signature, wc)` pair is not covered by the cache.
pub struct DepositSignatureChecker<V> {
    validator: V,
    cache: HashMap<PublicKeyBytes, CacheEntry>,
}

impl<V: KeyValidator> DepositSignatureChecker<V> {
    pub fn new(validator: V) -> Self {
        Self {
            validator,
            cache: HashMap::new(),
        }
    }

    /// Returns the keys whose deposit signatures do not verify against `lido_wc`.
    pub fn invalid_keys(&mut self, keys: &[RegistryKey], lido_wc: H256) -> Vec<RegistryKey> {
        let mut stale = Vec::new();

        for key in keys {
            let cached = self.cache.get(&key.key);

            let covered = cached.is_some_and(|entry| {
                entry.signature == key.deposit_signature && entry.wc == lido_wc
            });

            if covered {
                continue;
            }

            let candidate = DepositKeyCandidate {
                pubkey: key.key,
                signature: key.deposit_signature,
                wc: lido_wc,
            };

            if !stale.contains(&candidate) {
                stale.push(candidate);
            }
        }

        if !stale.is_empty() {
            debug!("validating {} deposit signatures", stale.len());

            let verdicts = self.validator.validate_keys(&stale);

            for (candidate, valid) in stale.iter().zip(verdicts) {
                self.cache.insert(
                    candidate.pubkey,
                    CacheEntry {
                        signature: candidate.signature,
                        wc: candidate.wc,
                        valid,
                    },
                );
            }
        }

        keys.iter()
            .filter(|key| {
                self.cache
                    .get(&key.key)
                    .is_some_and(|entry| entry.signature == key.deposit_signature && !entry.valid)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;

    use types::primitives::Address;

    use super::*;

    /// Records every batch passed to the backend and answers from a script.
    struct RecordingValidator {
        calls: RefCell<Vec<Vec<DepositKeyCandidate>>>,
        invalid_pubkeys: Vec<PublicKeyBytes>,
    }

    impl RecordingValidator {
        fn new(invalid_pubkeys: impl IntoIterator<Item = PublicKeyBytes>) -> Self {
            Self {
                calls: RefCell::new(vec![]),
                invalid_pubkeys: invalid_pubkeys.into_iter().collect(),
            }
        }
    }

    impl KeyValidator for &RecordingValidator {
        fn validate_keys(&self, candidates: &[DepositKeyCandidate]) -> Vec<bool> {
            self.calls.borrow_mut().push(candidates.to_vec());

            candidates
                .iter()
                .map(|candidate| !self.invalid_pubkeys.contains(&candidate.pubkey))
                .collect()
        }
    }

    fn registry_key(pubkey_byte: u8, signature_byte: u8) -> RegistryKey {
        RegistryKey {
            key: PublicKeyBytes::repeat_byte(pubkey_byte),
            deposit_signature: SignatureBytes::repeat_byte(signature_byte),
            operator_index: 0,
            used: false,
            index: 0,
            module_address: Address::zero(),
        }
    }

    #[test]
    fn identical_second_call_does_not_hit_the_backend() {
        let backend = RecordingValidator::new([]);
        let mut checker = DepositSignatureChecker::new(&backend);

        let keys = [registry_key(1, 1), registry_key(2, 2)];
        let wc = H256::repeat_byte(0xee);

        assert!(checker.invalid_keys(&keys, wc).is_empty());
        assert!(checker.invalid_keys(&keys, wc).is_empty());

        let calls = backend.calls.borrow();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
    }

    #[test]
    fn changed_signature_revalidates_exactly_that_key() {
        let backend = RecordingValidator::new([]);
        let mut checker = DepositSignatureChecker::new(&backend);

        let wc = H256::repeat_byte(0xee);
        let mut keys = vec![registry_key(1, 1), registry_key(2, 2)];

        checker.invalid_keys(&keys, wc);

        keys[1].deposit_signature = SignatureBytes::repeat_byte(9);
        checker.invalid_keys(&keys, wc);

        let calls = backend.calls.borrow();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].len(), 1);
        assert_eq!(calls[1][0].pubkey, PublicKeyBytes::repeat_byte(2));
        assert_eq!(calls[1][0].signature, SignatureBytes::repeat_byte(9));
    }

    #[test]
    fn changed_withdrawal_credential_revalidates_every_key() {
        let backend = RecordingValidator::new([]);
        let mut checker = DepositSignatureChecker::new(&backend);

        let keys = [registry_key(1, 1), registry_key(2, 2)];

        checker.invalid_keys(&keys, H256::repeat_byte(0xee));
        checker.invalid_keys(&keys, H256::repeat_byte(0xdd));

        let calls = backend.calls.borrow();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].len(), 2);
    }

    #[test]
    fn invalid_verdicts_are_returned_and_cached() {
        let backend = RecordingValidator::new([PublicKeyBytes::repeat_byte(2)]);
        let mut checker = DepositSignatureChecker::new(&backend);

        let keys = [registry_key(1, 1), registry_key(2, 2)];
        let wc = H256::repeat_byte(0xee);

        let invalid = checker.invalid_keys(&keys, wc);

        assert_eq!(invalid, [keys[1].clone()]);

        let invalid = checker.invalid_keys(&keys, wc);

        assert_eq!(invalid, [keys[1].clone()]);
        assert_eq!(backend.calls.borrow().len(), 1);
    }
}
