//! User records: the in-memory store and its JSON file mirror.
//!
//! The two are independent. Nothing copies memory to disk or back except an
//! explicit [`UserCache::cache_to_disk`] call or the startup preload.

pub mod cache;
pub mod store;

pub use cache::{UserCache, UserMap};
pub use store::{UserRecord, UserStore};
