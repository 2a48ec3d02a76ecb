use crate::config::Config;
use crate::connections::ConnectionRegistry;
use crate::users::{UserCache, UserStore};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live connections keyed by fingerprint
    pub connections: ConnectionRegistry,
    /// In-memory user records
    pub users: UserStore,
    /// JSON file mirror of the user records
    pub user_cache: UserCache,
    /// Accepted for compatibility; no behavior depends on it
    pub user_management: bool,
}

impl AppState {
    /// Build empty state wired to the configured user cache file.
    pub fn from_config(config: &Config) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            users: UserStore::new(),
            user_cache: UserCache::new(&config.user_cache, config.cache_io_timeout()),
            user_management: config.user_management,
        }
    }
}
