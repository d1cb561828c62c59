//! Audit record types and the record builder.
//!
//! Two record shapes exist: a creation record holding the full new entry,
//! and a modification record holding the old and new `value`. Both are
//! serialized with camelCase field names and no discriminator, which is the
//! row layout of the audit table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::event::{ConfigRow, VALUE_ATTRIBUTE};

/// Snapshot of a created entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewValue {
    pub key: String,
    pub value: i32,
}

/// Audit record for a newly created configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationRecord {
    pub id: Uuid,
    pub item_key: String,
    pub modification_time: DateTime<Utc>,
    pub new_value: NewValue,
}

/// Audit record for a modified configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRecord {
    pub id: Uuid,
    pub item_key: String,
    pub modification_time: DateTime<Utc>,
    /// Always `"value"`. Only value changes are tracked.
    pub updated_attribute: String,
    pub old_value: i32,
    pub new_value: i32,
}

/// An immutable audit fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditRecord {
    // Modification goes first: a creation row never has `updatedAttribute`,
    // so untagged decoding picks the right shape.
    Modification(ModificationRecord),
    Creation(CreationRecord),
}

impl AuditRecord {
    /// Unique id of this record.
    pub fn id(&self) -> Uuid {
        match self {
            Self::Creation(r) => r.id,
            Self::Modification(r) => r.id,
        }
    }

    /// Key of the audited configuration entry.
    pub fn item_key(&self) -> &str {
        match self {
            Self::Creation(r) => &r.item_key,
            Self::Modification(r) => &r.item_key,
        }
    }

    /// When the record was built.
    pub fn modification_time(&self) -> DateTime<Utc> {
        match self {
            Self::Creation(r) => r.modification_time,
            Self::Modification(r) => r.modification_time,
        }
    }

    /// Format the record as a human-readable log line.
    ///
    /// Format: `[timestamp] CREATED|MODIFIED item=... id=... ...`
    pub fn to_log_line(&self) -> String {
        let time = self.modification_time().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        match self {
            Self::Creation(r) => format!(
                "[{}] CREATED item={} id={} value={}",
                time, r.item_key, r.id, r.new_value.value
            ),
            Self::Modification(r) => format!(
                "[{}] MODIFIED item={} id={} {}: {} -> {}",
                time, r.item_key, r.id, r.updated_attribute, r.old_value, r.new_value
            ),
        }
    }
}

/// Source of record ids. Must never repeat within a process.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Random 128-bit ids (UUID v4).
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Source of record timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never goes backwards within a process.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(now);
        now
    }
}

/// Builds audit records from typed change events.
///
/// Pure apart from the injected id and time sources.
#[derive(Clone)]
pub struct AuditRecordBuilder {
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
}

impl Default for AuditRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditRecordBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecordBuilder").finish_non_exhaustive()
    }
}

impl AuditRecordBuilder {
    /// Builder using random ids and the system clock.
    pub fn new() -> Self {
        Self {
            ids: Arc::new(RandomIds),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Replace the id source.
    pub fn with_ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the record for a created entry.
    pub fn build_creation(&self, after: &ConfigRow) -> AuditRecord {
        AuditRecord::Creation(CreationRecord {
            id: self.ids.next_id(),
            item_key: after.key.clone(),
            modification_time: self.clock.now(),
            new_value: NewValue {
                key: after.key.clone(),
                value: after.value,
            },
        })
    }

    /// Build the record for a modified entry.
    ///
    /// No diffing happens: the record names `value` as the updated attribute
    /// even when both values are equal, and key changes are not detected.
    pub fn build_modification(&self, before: &ConfigRow, after: &ConfigRow) -> AuditRecord {
        AuditRecord::Modification(ModificationRecord {
            id: self.ids.next_id(),
            item_key: after.key.clone(),
            modification_time: self.clock.now(),
            updated_attribute: VALUE_ATTRIBUTE.to_string(),
            old_value: before.value,
            new_value: after.value,
        })
    }
}
