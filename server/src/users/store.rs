use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// A user as stored in memory and in the cache file.
///
/// Apart from `owner` the payload is free-form JSON and round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Fingerprint of the client that claims this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    pub fn with_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            fields: serde_json::Map::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// In-memory user store keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: Arc<DashMap<String, UserRecord>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Result<UserRecord> {
        self.users
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }

    /// Insert or replace a user. Memory only; the cache file is untouched.
    pub fn put(&self, user_id: impl Into<String>, record: UserRecord) {
        self.users.insert(user_id.into(), record);
    }

    pub fn remove(&self, user_id: &str) -> Result<UserRecord> {
        self.users
            .remove(user_id)
            .map(|(_, record)| record)
            .ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }

    /// Id of the first user whose `owner` is `fingerprint`, if any.
    pub fn find_owner_of(&self, fingerprint: &str) -> Option<String> {
        self.users
            .iter()
            .find(|entry| entry.value().owner.as_deref() == Some(fingerprint))
            .map(|entry| entry.key().clone())
    }

    pub fn snapshot(&self) -> BTreeMap<String, UserRecord> {
        self.users
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Bulk insert, overwriting users with the same id. Returns how many were inserted.
    pub fn restore(&self, users: impl IntoIterator<Item = (String, UserRecord)>) -> usize {
        let mut count = 0;
        for (user_id, record) in users {
            self.users.insert(user_id, record);
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
