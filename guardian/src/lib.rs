pub mod block_guard;
pub mod broker;
pub mod contracts_state;
pub mod data;
pub mod duplicates;
pub mod front_run;
pub mod messages;
pub mod pipeline;
pub mod vetting;

pub use block_guard::{BlockGuard, StateMeta};
pub use broker::{ChannelBroker, MessageBroker, BROKER_TOPIC};
pub use contracts_state::{ContractsState, StateChangeDetector, GUARDIAN_DEPOSIT_RESIGNING_BLOCKS};
pub use data::{BlockData, StakingModuleData};
pub use pipeline::{CycleResources, GuardianConfig, GuardianService, GUARDIAN_DEPOSIT_JOB_DURATION};
