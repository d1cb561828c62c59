//! # cfgtrail-audit
//!
//! Change-data-capture audit pipeline for a key/value configuration dataset.
//!
//! This crate provides functionality for:
//! - Decoding stream batches of row-level change notifications
//! - Classifying each notification as a creation, a modification or an
//!   unhandled kind
//! - Building immutable audit records (creation / modification shapes)
//! - Appending them to an append-only audit store (JSON Lines file or memory)
//!
//! ## Record Shapes
//!
//! | Operation | Record |
//! |-----------|--------|
//! | `INSERT` | `{id, itemKey, modificationTime, newValue: {key, value}}` |
//! | `MODIFY` | `{id, itemKey, modificationTime, updatedAttribute: "value", oldValue, newValue}` |
//! | anything else | nothing, logged as unhandled |
//!
//! Every record gets a fresh id. Redelivered batches produce new records;
//! nothing is deduplicated.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cfgtrail_audit::{AuditRouter, AuditSink, MemoryStore, StreamBatch};
//! use cfgtrail_core::FailurePolicy;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let sink = AuditSink::new(store.clone(), "eu-central-1", "Audit");
//! let router = AuditRouter::new(sink, FailurePolicy::FailFast);
//!
//! let batch = StreamBatch::from_json(
//!     r#"{"Records": [{"eventName": "INSERT", "dynamodb": {
//!         "NewImage": {"key": {"S": "maxItems"}, "value": {"N": "10"}}}}]}"#,
//! )?;
//! let outcome = router.route(&batch).await?;
//! assert_eq!(outcome.written_count(), 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod record;
pub mod router;
pub mod storage;
pub mod stream;

pub use error::AuditError;
pub use event::{ChangeEvent, ConfigRow};
pub use record::{
    AuditRecord, AuditRecordBuilder, Clock, CreationRecord, IdSource, ModificationRecord,
    NewValue, RandomIds, SystemClock,
};
pub use router::{AuditRouter, BatchOutcome, FailedEvent};
pub use storage::{AuditSink, AuditStore, FileStore, MemoryStore, create_store};
pub use stream::{AttributeValue, BatchEntry, RowImage, StreamBatch, StreamRecord};
