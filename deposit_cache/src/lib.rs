pub mod fetcher;
pub mod sanity;
pub mod service;
pub mod store;

pub use fetcher::{DepositFetcher, DEPOSIT_EVENTS_STEP};
pub use sanity::DepositIntegrityChecker;
pub use service::{DepositService, DEPOSIT_EVENTS_CACHE_LAG_BLOCKS};
pub use store::{CacheHeaders, DepositEventStore, DepositEventsCache};
