//! Lock record data model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default table used to persist lock records
pub const DEFAULT_STORAGE_TABLE_NAME: &str = "storage_lock";

/// Optimistic concurrency token stored alongside every lock record
///
/// Versions carry no business meaning; they are only compared for equality
/// by the storage and advanced by the lock manager.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// The version a successful mutation should move to, `None` at `i64::MAX`
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock metadata persisted as an opaque JSON string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInformation {
    /// Current holder of the lock
    pub owner_id: String,
    /// Version the record carries after the write
    pub version: Version,
    /// Re-entrant acquisition count
    #[serde(default)]
    pub lock_count: i32,
    /// When the current owner first acquired the lock
    pub lock_begin_time: DateTime<Utc>,
    /// When the current lease runs out
    pub lease_expire_time: DateTime<Utc>,
}

impl LockInformation {
    pub fn new(
        owner_id: impl Into<String>,
        version: Version,
        lock_begin_time: DateTime<Utc>,
        lease_expire_time: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            version,
            lock_count: 1,
            lock_begin_time,
            lease_expire_time,
        }
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Check whether the lease has run out at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.lease_expire_time
    }
}

impl fmt::Display for LockInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "owner={}, version={}, count={}, expires={}",
            self.owner_id, self.version, self.lock_count, self.lease_expire_time
        )
    }
}
