use std::io::Cursor;

use screen_healing::error::StoreError;
use screen_healing::event::event_model::{DeviceInfo, EventKind, EventPayload, Session};
use screen_healing::event::store::EventStore;

use crate::common::builders::{attrs_with_id, call, navigate, tap};

mod common;

fn store_with(session: &str) -> EventStore {
    let mut store = EventStore::new();
    store.open_session(session, DeviceInfo::default()).unwrap();
    store
}

// =========================================================================
// Ordering
// =========================================================================

#[test]
fn append_keeps_events_sorted_by_timestamp() {
    let mut store = store_with("s1");
    store.append("s1", call("s1", 500, "GET", "/a")).unwrap();
    store.append("s1", tap("s1", 100, "Login", attrs_with_id("a"))).unwrap();
    store.append("s1", navigate("s1", 300, "Login", "Home")).unwrap();

    let times: Vec<u64> = store
        .session("s1")
        .unwrap()
        .events
        .iter()
        .map(|e| e.timestamp_ms)
        .collect();
    assert_eq!(times, vec![100, 300, 500], "Out-of-order appends are sorted");
}

#[test]
fn equal_timestamps_keep_insertion_order() {
    let mut store = store_with("s1");
    let first = store.append("s1", tap("s1", 100, "Login", attrs_with_id("a"))).unwrap();
    let second = store.append("s1", call("s1", 100, "GET", "/a")).unwrap();
    assert!(second > first, "Sequence numbers increase");

    let kinds: Vec<EventKind> = store.session("s1").unwrap().events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EventKind::Ui, EventKind::Network], "Tie broken by arrival");
}

#[test]
fn session_from_events_orders_like_the_store() {
    let session = Session::from_events(
        "s1",
        vec![
            call("other", 200, "GET", "/b"),
            tap("other", 100, "Login", attrs_with_id("a")),
            call("other", 100, "GET", "/a"),
        ],
    );
    assert!(session.sealed);
    assert!(session.events.iter().all(|e| e.session_id == "s1"), "Session id is rewritten");
    let order: Vec<(u64, u64)> = session.events.iter().map(|e| e.order_key()).collect();
    assert_eq!(order, vec![(100, 1), (100, 2), (200, 0)]);
}

// =========================================================================
// Session lifecycle
// =========================================================================

#[test]
fn sealed_session_rejects_appends() {
    let mut store = store_with("s1");
    store.append("s1", tap("s1", 0, "Login", attrs_with_id("a"))).unwrap();
    store.seal("s1").unwrap();
    store.seal("s1").unwrap();

    let err = store.append("s1", tap("s1", 10, "Login", attrs_with_id("a"))).unwrap_err();
    assert!(matches!(err, StoreError::SessionSealed(ref id) if id == "s1"), "Got {:?}", err);
    assert_eq!(store.session("s1").unwrap().len(), 1);
}

#[test]
fn append_rejects_foreign_and_unknown_sessions() {
    let mut store = store_with("s1");
    let mismatch = store.append("s1", tap("s2", 0, "Login", attrs_with_id("a"))).unwrap_err();
    assert!(matches!(mismatch, StoreError::SessionMismatch { .. }));

    let unknown = store.append("nope", tap("nope", 0, "Login", attrs_with_id("a"))).unwrap_err();
    assert!(matches!(unknown, StoreError::UnknownSession(_)));

    let duplicate = store.open_session("s1", DeviceInfo::default()).unwrap_err();
    assert!(matches!(duplicate, StoreError::DuplicateSession(_)));
}

#[test]
fn export_seals_and_clear_removes() {
    let mut store = store_with("s1");
    store.append("s1", tap("s1", 0, "Login", attrs_with_id("a"))).unwrap();

    let exported = store.export("s1").unwrap();
    assert!(exported.sealed);
    assert!(store.session("s1").unwrap().sealed, "Export seals the stored session");

    let cleared = store.clear_session("s1").unwrap();
    assert_eq!(cleared.len(), 1);
    assert!(store.session("s1").is_none());
    assert!(store.session_ids().is_empty());
}

#[test]
fn query_and_stats_count_by_kind() {
    let mut store = store_with("s1");
    store.append("s1", tap("s1", 0, "Login", attrs_with_id("a"))).unwrap();
    store.append("s1", call("s1", 10, "GET", "/a")).unwrap();
    store.append("s1", call("s1", 20, "GET", "/b")).unwrap();

    assert_eq!(store.query("s1", EventKind::Network).unwrap().len(), 2);
    assert!(store.query("s1", EventKind::Navigation).unwrap().is_empty());

    let stats = store.stats();
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.events, 3);
    assert_eq!(stats.sealed_sessions, 0);
    assert_eq!(stats.by_kind.get(&EventKind::Network), Some(&2));
}

// =========================================================================
// Import
// =========================================================================

#[test]
fn jsonl_import_skips_malformed_lines() {
    let input = r#"{"session_id":"s1","timestamp_ms":0,"kind":"ui","action":"tap","element":{"resource-id":"login_btn"},"screen":"Login"}
not json at all

{"session_id":"s1","timestamp_ms":500,"kind":"network","method":"post","url":"https://api.example.com/login","statusCode":200}
{"session_id":"s1","timestamp_ms":600,"kind":"teleport"}
{"sessionId":"s2","timestamp":5,"kind":"navigation","toScreen":"Home"}
"#;
    let mut store = EventStore::new();
    let outcome = store.import_jsonl(Cursor::new(input)).unwrap();

    assert_eq!(outcome.imported, 3);
    assert_eq!(outcome.skipped, 2, "Garbage line and unknown kind are skipped");
    assert_eq!(outcome.errors.len(), 2);
    assert_eq!(outcome.sessions_created, 2);

    let s1 = store.session("s1").unwrap();
    match &s1.events[0].payload {
        EventPayload::Ui { element, .. } => {
            assert_eq!(element.stable_id.as_deref(), Some("login_btn"), "resource-id alias");
        }
        other => panic!("Expected UI event, got {:?}", other),
    }
    match &s1.events[1].payload {
        EventPayload::Network { response_code, .. } => assert_eq!(*response_code, Some(200)),
        other => panic!("Expected network event, got {:?}", other),
    }
}

#[test]
fn json_export_document_carries_device_info() {
    let doc = r#"{
        "device_info": {"platform": "android", "osVersion": "14"},
        "events": [
            {"session_id": "s9", "timestamp_ms": 1, "kind": "navigation", "to_screen": "Home"},
            {"session_id": "s9", "kind": "ui"}
        ]
    }"#;
    let mut store = EventStore::new();
    let outcome = store.import_json(doc).unwrap();
    assert_eq!(outcome.imported, 1);
    assert_eq!(outcome.skipped, 1, "Event without timestamp is skipped");

    let session = store.session("s9").unwrap();
    assert_eq!(session.device_info.platform.as_deref(), Some("android"));
    assert_eq!(session.device_info.os_version.as_deref(), Some("14"));
}

#[test]
fn import_into_sealed_session_is_counted_not_fatal() {
    let mut store = store_with("s1");
    store.seal("s1").unwrap();
    let line = r#"{"session_id":"s1","timestamp_ms":0,"kind":"hierarchy","nodes":[]}"#;
    let outcome = store.import_jsonl(Cursor::new(line)).unwrap();
    assert_eq!(outcome.imported, 0);
    assert_eq!(outcome.skipped, 1);
}

#[test]
fn import_path_dispatches_on_extension() {
    let dir = tempfile::tempdir().unwrap();
    let lines = dir.path().join("events.jsonl");
    std::fs::write(
        &lines,
        "{\"session_id\":\"a\",\"timestamp_ms\":0,\"kind\":\"navigation\",\"to_screen\":\"Home\"}\n",
    )
    .unwrap();
    let array = dir.path().join("events.json");
    std::fs::write(
        &array,
        r#"[{"session_id":"b","timestamp_ms":0,"kind":"navigation","to_screen":"Home"}]"#,
    )
    .unwrap();

    let mut store = EventStore::new();
    assert_eq!(store.import_path(&lines).unwrap().imported, 1);
    assert_eq!(store.import_path(&array).unwrap().imported, 1);
    assert_eq!(store.session_ids(), vec!["a".to_string(), "b".to_string()]);

    assert!(store.import_path(&dir.path().join("missing.json")).is_err());
}
