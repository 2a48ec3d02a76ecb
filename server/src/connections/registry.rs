use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::users::{UserRecord, UserStore};

/// One tracked client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub fingerprint: String,
    #[serde(with = "unix_seconds")]
    pub last_update: DateTime<Utc>,
    pub current_user: Option<String>,
    #[serde(with = "unix_seconds")]
    pub creation: DateTime<Utc>,
    /// True when the record changed since its owner last looked it up.
    pub update: bool,
}

impl ConnectionRecord {
    fn new(fingerprint: &str, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            last_update: now,
            current_user: None,
            creation: now,
            update: true,
        }
    }

    fn is_live(&self, session_timeout: TimeDelta, now: DateTime<Utc>) -> bool {
        self.last_update
            .checked_add_signed(session_timeout)
            .map_or(true, |deadline| deadline >= now)
    }
}

/// Result of a successful self-lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfLookup {
    /// The record as it was before `update` was cleared.
    pub connection: ConnectionRecord,
    pub user: Option<UserRecord>,
}

/// Registry of live connections keyed by fingerprint.
///
/// Every operation runs under a single lock, so a sweep and a concurrent touch
/// never observe each other half-done.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<Mutex<HashMap<String, ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConnectionRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn touch(&self, fingerprint: &str) {
        self.touch_at(fingerprint, Utc::now());
    }

    /// Refresh `last_update`, creating the record on first sight.
    pub fn touch_at(&self, fingerprint: &str, now: DateTime<Utc>) {
        let mut entries = self.lock();
        match entries.get_mut(fingerprint) {
            Some(record) => record.last_update = now,
            None => {
                entries.insert(fingerprint.to_string(), ConnectionRecord::new(fingerprint, now));
                tracing::debug!("New connection {}", fingerprint);
            }
        }
    }

    pub fn lookup_self(&self, fingerprint: &str, users: &UserStore) -> Result<Option<SelfLookup>> {
        self.lookup_self_at(fingerprint, users, Utc::now())
    }

    /// Look up the caller's own connection and clear its `update` flag.
    ///
    /// When a user claims `fingerprint` as its owner the record is recreated
    /// from scratch first, dropping any previous `creation`, `current_user`
    /// and `update` state. Returns `Ok(None)` when no record exists.
    pub fn lookup_self_at(
        &self,
        fingerprint: &str,
        users: &UserStore,
        now: DateTime<Utc>,
    ) -> Result<Option<SelfLookup>> {
        let mut entries = self.lock();

        if let Some(owner) = users.find_owner_of(fingerprint) {
            tracing::debug!("Rebinding connection {} owned by user {}", fingerprint, owner);
            entries.insert(fingerprint.to_string(), ConnectionRecord::new(fingerprint, now));
        }

        let Some(record) = entries.get_mut(fingerprint) else {
            return Ok(None);
        };
        record.last_update = now;

        let user = match &record.current_user {
            Some(user_id) => Some(users.get(user_id).map_err(|_| Error::DanglingUser {
                fingerprint: fingerprint.to_string(),
                user_id: user_id.clone(),
            })?),
            None => None,
        };

        let snapshot = record.clone();
        record.update = false;

        Ok(Some(SelfLookup {
            connection: snapshot,
            user,
        }))
    }

    /// Attach `user_id` to a connection (or detach with `None`) and flag it updated.
    ///
    /// The user id is not checked against the store; a missing user surfaces
    /// on the next self-lookup.
    pub fn bind_user(&self, fingerprint: &str, user_id: Option<&str>) -> Result<()> {
        let mut entries = self.lock();
        let record = entries
            .get_mut(fingerprint)
            .ok_or_else(|| Error::not_found(format!("connection {}", fingerprint)))?;
        record.current_user = user_id.map(str::to_string);
        record.update = true;
        Ok(())
    }

    pub fn get(&self, fingerprint: &str) -> Option<ConnectionRecord> {
        self.lock().get(fingerprint).cloned()
    }

    /// All connections currently bound to `user_id`, ordered by fingerprint.
    pub fn connections_for_user(&self, user_id: &str) -> Vec<ConnectionRecord> {
        let mut found: Vec<ConnectionRecord> = self
            .lock()
            .values()
            .filter(|record| record.current_user.as_deref() == Some(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        found
    }

    pub fn sweep(&self, session_timeout_secs: u64) -> usize {
        self.sweep_at(session_timeout_secs, Utc::now())
    }

    /// Drop every record with `last_update + session_timeout < now`.
    /// Returns the number of records removed.
    pub fn sweep_at(&self, session_timeout_secs: u64, now: DateTime<Utc>) -> usize {
        let timeout = i64::try_from(session_timeout_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, record| record.is_live(timeout, now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Timestamps travel as fractional Unix seconds.
mod unix_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(ts.timestamp_micros() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        let micros = (secs * 1_000_000.0).round() as i64;
        DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| de::Error::custom("timestamp out of range"))
    }
}
