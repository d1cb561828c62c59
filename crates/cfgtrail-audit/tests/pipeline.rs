//! End-to-end tests for the audit pipeline: stream batch in, audit rows out.
//!
//! Run with: cargo test --package cfgtrail-audit --test pipeline

use std::collections::HashSet;
use std::sync::Arc;

use cfgtrail_audit::stream::config_image;
use cfgtrail_audit::{
    AuditError, AuditRecord, AuditRouter, AuditSink, FileStore, MemoryStore, StreamBatch,
    StreamRecord,
};
use cfgtrail_core::FailurePolicy;
use chrono::Utc;

fn memory_router(policy: FailurePolicy) -> (AuditRouter, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let sink = AuditSink::new(store.clone(), "eu-central-1", "Audit");
    (AuditRouter::new(sink, policy), store)
}

fn created(key: &str, value: &str) -> StreamRecord {
    StreamRecord::insert(config_image(key, value))
}

fn updated(key: &str, old: &str, new: &str) -> StreamRecord {
    StreamRecord::modify(config_image(key, old), config_image(key, new))
}

/// Test the creation scenario from a raw stream payload.
#[tokio::test]
async fn test_created_event_end_to_end() {
    let (router, store) = memory_router(FailurePolicy::FailFast);
    let batch = StreamBatch::from_json(
        r#"{"Records": [{
            "eventID": "1",
            "eventName": "INSERT",
            "dynamodb": {"NewImage": {"key": {"S": "maxItems"}, "value": {"N": "10"}}}
        }]}"#,
    )
    .unwrap();

    let before = Utc::now();
    let outcome = router.route(&batch).await.unwrap();
    let after = Utc::now();

    assert_eq!(outcome.written_count(), 1);
    let records = store.records();
    assert_eq!(records.len(), 1);

    match &records[0] {
        AuditRecord::Creation(r) => {
            assert_eq!(r.id, outcome.written[0]);
            assert_eq!(r.item_key, "maxItems");
            assert_eq!(r.new_value.key, "maxItems");
            assert_eq!(r.new_value.value, 10);
            assert!(r.modification_time >= before && r.modification_time <= after);
        }
        other => panic!("expected creation record, got {:?}", other),
    }
}

/// Test the modification scenario from a raw stream payload.
#[tokio::test]
async fn test_updated_event_end_to_end() {
    let (router, store) = memory_router(FailurePolicy::FailFast);
    let batch = StreamBatch::from_json(
        r#"{"Records": [{
            "eventName": "MODIFY",
            "dynamodb": {
                "OldImage": {"key": {"S": "maxItems"}, "value": {"N": "10"}},
                "NewImage": {"key": {"S": "maxItems"}, "value": {"N": "20"}}
            }
        }]}"#,
    )
    .unwrap();

    let outcome = router.route(&batch).await.unwrap();
    assert_eq!(outcome.written_count(), 1);

    let json = serde_json::to_value(&store.records()[0]).unwrap();
    assert_eq!(json["itemKey"], "maxItems");
    assert_eq!(json["updatedAttribute"], "value");
    assert_eq!(json["oldValue"], 10);
    assert_eq!(json["newValue"], 20);
    assert_eq!(json["id"], outcome.written[0].to_string());
    assert!(json["modificationTime"].is_string());
}

/// A mixed batch yields two writes and one skip in any order.
#[tokio::test]
async fn test_mixed_batch_in_every_order() {
    let events = [
        created("maxItems", "10"),
        updated("maxItems", "10", "20"),
        StreamRecord::named("REMOVE"),
    ];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let (router, store) = memory_router(FailurePolicy::FailFast);
        let batch = StreamBatch::new(order.iter().map(|&i| events[i].clone()).collect());

        let outcome = router.route(&batch).await.unwrap();
        assert_eq!(outcome.written_count(), 2, "order {:?}", order);
        assert_eq!(outcome.skipped, 1, "order {:?}", order);
        assert_eq!(store.len(), 2, "order {:?}", order);

        let creations = store.records().iter().filter(|r| matches!(r, AuditRecord::Creation(_))).count();
        assert_eq!(creations, 1, "order {:?}", order);
    }
}

/// Replaying a batch produces new, independent records.
#[tokio::test]
async fn test_replayed_batch_is_not_deduplicated() {
    let (router, store) = memory_router(FailurePolicy::FailFast);
    let batch = StreamBatch::new(vec![
        created("maxItems", "10"),
        updated("maxItems", "10", "20"),
    ]);

    let first = router.route(&batch).await.unwrap();
    let second = router.route(&batch).await.unwrap();
    assert_eq!(first.written_count(), 2);
    assert_eq!(second.written_count(), 2);

    let records = store.records();
    assert_eq!(records.len(), 4);
    let ids: HashSet<_> = records.iter().map(|r| r.id()).collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(records[0].item_key(), records[2].item_key());
}

/// A creation without a value is malformed and writes nothing.
#[tokio::test]
async fn test_malformed_created_event() {
    let (router, store) = memory_router(FailurePolicy::FailFast);
    let mut image = config_image("maxItems", "10");
    image.remove("value");
    let batch = StreamBatch::new(vec![StreamRecord::insert(image)]);

    let err = router.route(&batch).await.unwrap_err();
    assert!(matches!(err, AuditError::MalformedEvent(_)));
    assert!(!err.is_retryable());
    assert!(store.is_empty());
}

/// Fail-fast stops at the bad event but keeps what was already written.
#[tokio::test]
async fn test_fail_fast_keeps_earlier_writes() {
    let (router, store) = memory_router(FailurePolicy::FailFast);
    let batch = StreamBatch::new(vec![
        created("first", "1"),
        created("broken", "not-a-number"),
        created("third", "3"),
    ]);

    let err = router.route(&batch).await.unwrap_err();
    assert!(matches!(err, AuditError::MalformedEvent(_)));

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_key(), "first");
}

/// Isolation skips the bad event and carries on.
#[tokio::test]
async fn test_isolate_continues_after_malformed_event() {
    let (router, store) = memory_router(FailurePolicy::Isolate);
    let batch = StreamBatch::new(vec![
        created("first", "1"),
        created("broken", "not-a-number").with_event_id("evt-2"),
        StreamRecord::named("REMOVE"),
        created("third", "3"),
    ]);

    let outcome = router.route(&batch).await.unwrap();
    assert_eq!(outcome.written_count(), 2);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].index, 1);
    assert_eq!(outcome.failed[0].event_id.as_deref(), Some("evt-2"));
    assert!(!outcome.is_clean());

    let keys: Vec<_> = store
        .records()
        .iter()
        .map(|r| r.item_key().to_string())
        .collect();
    assert_eq!(keys, vec!["first", "third"]);
}

/// A store outage under fail-fast surfaces as a retryable error.
#[tokio::test]
async fn test_store_outage_is_retryable() {
    let (router, store) = memory_router(FailurePolicy::FailFast);
    store.set_fail_writes(true);

    let err = router
        .route(&StreamBatch::new(vec![created("maxItems", "10")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::SinkUnavailable(_)));
    assert!(err.is_retryable());
}

/// Batches land in the table file as one JSON row per record.
#[tokio::test]
async fn test_file_backed_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Audit.jsonl");
    let store = Arc::new(FileStore::open(&path).unwrap());
    let router = AuditRouter::new(
        AuditSink::new(store, "eu-central-1", "Audit"),
        FailurePolicy::FailFast,
    );

    let batch = StreamBatch::new(vec![
        created("maxItems", "10"),
        updated("maxItems", "10", "20"),
    ]);
    router.route(&batch).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["newValue"]["value"], 10);
    assert_eq!(rows[1]["oldValue"], 10);
    assert_eq!(rows[1]["newValue"], 20);
}

const WIRE_BATCH_WITH_BAD_RECORDS: &str = r#"{"Records": [
    {"eventID": "w-1", "eventName": "INSERT",
     "dynamodb": {"NewImage": {"key": {"S": "first"}, "value": {"N": "1"}}}},
    {"eventID": "w-2", "eventName": "INSERT",
     "dynamodb": {"NewImage": {"key": {"S": "typed"}, "value": {"N": 10}}}},
    {"eventID": "w-3", "dynamodb": {}},
    {"eventID": "w-4", "eventName": "INSERT",
     "dynamodb": {"NewImage": {"key": {"S": "fourth"}, "value": {"N": "4"}}}}
]}"#;

/// Ill-typed and shapeless records in a raw payload still parse as a batch.
#[test]
fn test_wire_batch_with_bad_records_parses() {
    let batch = StreamBatch::from_json(WIRE_BATCH_WITH_BAD_RECORDS).unwrap();
    assert_eq!(batch.len(), 4);
    let ids: Vec<_> = batch.records.iter().map(|e| e.event_id()).collect();
    assert_eq!(ids, vec![Some("w-1"), Some("w-2"), Some("w-3"), Some("w-4")]);
}

/// Isolation writes the good wire records around the bad ones.
#[tokio::test]
async fn test_isolate_skips_bad_wire_records() {
    let (router, store) = memory_router(FailurePolicy::Isolate);
    let batch = StreamBatch::from_json(WIRE_BATCH_WITH_BAD_RECORDS).unwrap();

    let outcome = router.route(&batch).await.unwrap();
    assert_eq!(outcome.written_count(), 2);
    assert_eq!(outcome.skipped, 0);

    let failed: Vec<_> = outcome
        .failed
        .iter()
        .map(|f| (f.index, f.event_id.as_deref()))
        .collect();
    assert_eq!(failed, vec![(1, Some("w-2")), (2, Some("w-3"))]);
    assert!(outcome.failed[1].error.contains("eventName"));

    let keys: Vec<_> = store
        .records()
        .iter()
        .map(|r| r.item_key().to_string())
        .collect();
    assert_eq!(keys, vec!["first", "fourth"]);
}

/// Fail-fast stops at the first bad wire record as a malformed event.
#[tokio::test]
async fn test_fail_fast_stops_at_bad_wire_record() {
    let (router, store) = memory_router(FailurePolicy::FailFast);
    let batch = StreamBatch::from_json(WIRE_BATCH_WITH_BAD_RECORDS).unwrap();

    let err = router.route(&batch).await.unwrap_err();
    assert!(matches!(err, AuditError::MalformedEvent(_)));
    assert!(!err.is_retryable());

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_key(), "first");
}
