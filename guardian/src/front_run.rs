use std::collections::{HashMap, HashSet};

use types::{
    deposit::VerifiedDepositEvent,
    primitives::{PublicKeyBytes, H256},
    registry::RegistryKey,
};

/// Vetted-unused keys that already have a valid non-protocol deposit on
/// chain. Depositing through the protocol on top of such a key would hand
/// the stake to the earlier depositor's withdrawal credentials.
#[must_use]
pub fn front_run_keys(
    vetted_unused: &[RegistryKey],
    deposited_events: &[VerifiedDepositEvent],
    lido_wc: H256,
) -> Vec<RegistryKey> {
    let vetted_pubkeys = vetted_unused
        .iter()
        .map(|key| key.key)
        .collect::<HashSet<_>>();

    let front_run_pubkeys = deposited_events
        .iter()
        .filter(|event| {
            event.valid && event.wc != lido_wc && vetted_pubkeys.contains(&event.pubkey)
        })
        .map(|event| event.pubkey)
        .collect::<HashSet<_>>();

    vetted_unused
        .iter()
        .filter(|key| front_run_pubkeys.contains(&key.key))
        .cloned()
        .collect()
}

/// Public keys whose first deposit carries foreign withdrawal credentials
/// while a later valid protocol deposit exists: the historical front-run
/// pattern. The caller still has to confirm with the keys index that the
/// flagged keys belong to the protocol before treating this as theft.
#[must_use]
pub fn historical_front_run_pubkeys(
    deposited_events: &[VerifiedDepositEvent],
    lido_wc: H256,
) -> Vec<PublicKeyBytes> {
    let mut canonical_deposits = HashMap::<PublicKeyBytes, &VerifiedDepositEvent>::new();

    for event in deposited_events {
        if event.wc != lido_wc || !event.valid {
            continue;
        }

        canonical_deposits
            .entry(event.pubkey)
            .and_modify(|canonical| {
                if event.is_earlier_than(canonical) {
                    *canonical = event;
                }
            })
            .or_insert(event);
    }

    let mut flagged = deposited_events
        .iter()
        .filter(|event| {
            event.wc != lido_wc
                && canonical_deposits
                    .get(&event.pubkey)
                    .is_some_and(|canonical| event.is_earlier_than(canonical))
        })
        .map(|event| event.pubkey)
        .collect::<Vec<_>>();

    flagged.sort();
    flagged.dedup();
    flagged
}

#[cfg(test)]
mod tests {
    use types::primitives::{Address, SignatureBytes};

    use super::*;

    const LIDO_WC: H256 = H256::repeat_byte(0x01);
    const FOREIGN_WC: H256 = H256::repeat_byte(0x02);

    fn deposit(
        pubkey_byte: u8,
        wc: H256,
        block_number: u64,
        valid: bool,
    ) -> VerifiedDepositEvent {
        VerifiedDepositEvent {
            block_number,
            block_hash: H256::zero(),
            log_index: 0,
            pubkey: PublicKeyBytes::repeat_byte(pubkey_byte),
            wc,
            amount: 32_000_000_000,
            signature: SignatureBytes::zero(),
            deposit_count: 0,
            deposit_data_root: H256::zero(),
            tx_hash: H256::zero(),
            valid,
        }
    }

    fn vetted(pubkey_byte: u8) -> RegistryKey {
        RegistryKey {
            key: PublicKeyBytes::repeat_byte(pubkey_byte),
            deposit_signature: SignatureBytes::zero(),
            operator_index: 0,
            used: false,
            index: 0,
            module_address: Address::zero(),
        }
    }

    #[test]
    fn valid_foreign_deposit_on_a_vetted_key_is_a_front_run() {
        let keys = [vetted(0xaa), vetted(0xbb)];
        let events = [deposit(0xaa, FOREIGN_WC, 100, true)];

        let flagged = front_run_keys(&keys, &events, LIDO_WC);

        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].key, PublicKeyBytes::repeat_byte(0xaa));
    }

    #[test]
    fn protocol_deposits_and_invalid_deposits_are_not_front_runs() {
        let keys = [vetted(0xaa), vetted(0xbb)];

        let events = [
            deposit(0xaa, LIDO_WC, 100, true),
            deposit(0xbb, FOREIGN_WC, 100, false),
        ];

        assert!(front_run_keys(&keys, &events, LIDO_WC).is_empty());
    }

    #[test]
    fn foreign_deposits_on_unknown_keys_are_ignored() {
        let keys = [vetted(0xaa)];
        let events = [deposit(0xcc, FOREIGN_WC, 100, true)];

        assert!(front_run_keys(&keys, &events, LIDO_WC).is_empty());
    }

    #[test]
    fn earlier_foreign_deposit_before_a_protocol_deposit_is_flagged() {
        let events = [
            deposit(0xaa, FOREIGN_WC, 99, true),
            deposit(0xaa, LIDO_WC, 100, true),
        ];

        assert_eq!(
            historical_front_run_pubkeys(&events, LIDO_WC),
            [PublicKeyBytes::repeat_byte(0xaa)],
        );
    }

    #[test]
    fn later_foreign_deposit_is_not_a_front_run() {
        let events = [
            deposit(0xaa, LIDO_WC, 100, true),
            deposit(0xaa, FOREIGN_WC, 101, true),
        ];

        assert!(historical_front_run_pubkeys(&events, LIDO_WC).is_empty());
    }

    #[test]
    fn log_index_breaks_same_block_ties() {
        let mut foreign = deposit(0xaa, FOREIGN_WC, 100, true);
        foreign.log_index = 0;

        let mut protocol = deposit(0xaa, LIDO_WC, 100, true);
        protocol.log_index = 1;

        assert_eq!(
            historical_front_run_pubkeys(&[foreign, protocol], LIDO_WC),
            [PublicKeyBytes::repeat_byte(0xaa)],
        );
    }

    #[test]
    fn invalid_protocol_deposit_is_not_a_canonical_deposit() {
        let events = [
            deposit(0xaa, FOREIGN_WC, 99, true),
            deposit(0xaa, LIDO_WC, 100, false),
        ];

        assert!(historical_front_run_pubkeys(&events, LIDO_WC).is_empty());
    }
}
