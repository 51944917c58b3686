pub mod contracts;
pub mod deposit_event;
pub mod eth1_api;
pub mod eth1_block;
pub mod providers;
pub mod signing_key_event;

pub use contracts::{DepositContract, SecurityContract, StakingRouter};
pub use deposit_event::DepositEventLog;
pub use eth1_api::Eth1Api;
pub use eth1_block::Eth1Block;
pub use signing_key_event::SigningKeyEventLog;
