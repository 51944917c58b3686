pub mod service;
pub mod store;

pub use service::SigningKeyEventsService;
pub use store::{SigningKeyEvent, SigningKeyEventsCache, SigningKeyEventsHeaders, SigningKeyEventStore};
