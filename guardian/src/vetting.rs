use itertools::Itertools as _;
use types::{
    primitives::Address,
    registry::{Operator, RegistryKey},
};

/// Keys of the module that have not been deposited through the protocol.
#[must_use]
pub fn unused_keys(module_address: Address, keys: &[RegistryKey]) -> Vec<RegistryKey> {
    keys.iter()
        .filter(|key| !key.used && key.module_address == module_address)
        .cloned()
        .collect()
}

/// Unused keys that are eligible for deposit right now.
///
/// Per operator, eligibility covers the first
/// `min(stakingLimit, totalAddedValidators) - totalDepositedValidators`
/// unused keys in ascending registry index order; everything beyond the
/// staking limit is not vetted.
#[must_use]
pub fn vetted_unused_keys(operators: &[Operator], unused: &[RegistryKey]) -> Vec<RegistryKey> {
    operators
        .iter()
        .flat_map(|operator| {
            let count = usize::try_from(operator.vetted_unused_count()).unwrap_or(usize::MAX);

            unused
                .iter()
                .filter(|key| key.operator_index == operator.index)
                .sorted_by_key(|key| key.index)
                .take(count)
        })
        .cloned()
        .collect()
}
