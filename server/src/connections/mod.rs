//! Fingerprint-keyed connection tracking.
//!
//! Clients announce themselves with `POST /connections/new/` and poll
//! `GET /connections/self/`. Records idle longer than the session timeout are
//! purged by the background sweeper.

pub mod handlers;
pub mod registry;
pub mod sweeper;

pub use registry::{ConnectionRecord, ConnectionRegistry, SelfLookup};
