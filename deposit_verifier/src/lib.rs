pub mod checker;
pub mod domain;
pub mod validator;

pub use checker::DepositSignatureChecker;
pub use validator::{BlsKeyValidator, DepositKeyCandidate, KeyValidator};

use types::primitives::Gwei;

/// Deposits attested by guardians are always full validator deposits.
pub const DEPOSIT_AMOUNT: Gwei = 32_000_000_000;
