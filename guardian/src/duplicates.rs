use std::collections::{HashMap, HashSet};

use itertools::Itertools as _;
use signing_keys::SigningKeyEventsCache;
use types::{
    primitives::{Address, PublicKeyBytes, StakingModuleId},
    registry::RegistryKey,
};

/// The vetted-unused keys of one module, as the duplicate scan sees them.
#[derive(Clone, Copy, Debug)]
pub struct ModuleVettedKeys<'keys> {
    pub module_id: StakingModuleId,
    pub module_address: Address,
    pub keys: &'keys [RegistryKey],
}

/// Classifies every non-canonical copy of a public key as duplicated.
///
/// The canonical copy of a key claimed by several operators or modules is
/// the one whose `SigningKeyAdded` event is earliest. When no addition
/// history is known for any copy, the lowest
/// `(module_id, operator_index, index)` wins. Copies whose deposit
/// signatures disagree cannot be ranked at all, so every copy is treated
/// as duplicated. Keys already flagged invalid are left out of the scan.
#[must_use]
pub fn duplicated_keys(
    vetted_by_module: &[ModuleVettedKeys],
    invalid_pubkeys: &HashSet<PublicKeyBytes>,
    events: &SigningKeyEventsCache,
) -> HashMap<StakingModuleId, Vec<RegistryKey>> {
    let instances = vetted_by_module
        .iter()
        .flat_map(|module| {
            module.keys.iter().map(|key| Instance {
                module_id: module.module_id,
                module_address: module.module_address,
                key,
            })
        })
        .filter(|instance| !invalid_pubkeys.contains(&instance.key.key))
        .into_group_map_by(|instance| instance.key.key);

    let mut duplicated = HashMap::<StakingModuleId, Vec<RegistryKey>>::new();

    for (_, copies) in instances {
        if copies.len() < 2 {
            continue;
        }

        let signatures_disagree = copies
            .iter()
            .map(|instance| instance.key.deposit_signature)
            .unique()
            .count()
            > 1;

        if signatures_disagree {
            for instance in copies {
                duplicated
                    .entry(instance.module_id)
                    .or_default()
                    .push(instance.key.clone());
            }

            continue;
        }

        let canonical = canonical_instance(&copies, events);

        for instance in copies {
            if instance.registry_position() == canonical {
                continue;
            }

            duplicated
                .entry(instance.module_id)
                .or_default()
                .push(instance.key.clone());
        }
    }

    duplicated
}

#[derive(Clone, Copy, Debug)]
struct Instance<'keys> {
    module_id: StakingModuleId,
    module_address: Address,
    key: &'keys RegistryKey,
}

impl Instance<'_> {
    fn registry_position(&self) -> (StakingModuleId, u32, u32) {
        (self.module_id, self.key.operator_index, self.key.index)
    }
}

/// Registry position of the copy that keeps the key.
fn canonical_instance(
    copies: &[Instance],
    events: &SigningKeyEventsCache,
) -> (StakingModuleId, u32, u32) {
    let earliest_recorded = copies
        .iter()
        .filter_map(|instance| {
            events
                .earliest_addition(
                    instance.module_address,
                    instance.key.operator_index,
                    instance.key.key,
                )
                .map(|position| (position, instance.registry_position()))
        })
        .min();

    if let Some((_, registry_position)) = earliest_recorded {
        return registry_position;
    }

    copies
        .iter()
        .map(Instance::registry_position)
        .min()
        .expect("canonical_instance is only called for non-empty groups")
}
