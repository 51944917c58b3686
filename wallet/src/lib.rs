pub mod balance;
pub mod signature;
pub mod wallet;

pub use balance::{BalanceMonitor, WALLET_BALANCE_UPDATE_BLOCK_RATE};
pub use signature::GuardianSignature;
pub use wallet::Wallet;
