//! Contract Test: Change Detection & Recording
//!
//! Constraints verified:
//! - A still-resolving known address leaves stored state untouched
//! - A disjoint resolution records exactly one change with the prior addresses
//! - Detection is idempotent once a change has been applied
//! - Notification failure never undoes a recorded change
//! - An empty resolution is not a change, only a warning
//!
//! If this test fails, operators get duplicate or missing alerts.

mod common;

use common::*;
use digger_core::engine::FailureStage;
use digger_core::state::{FileRecordStore, MemoryRecordStore};
use digger_core::traits::{Bucket, RecordStore};
use digger_core::{EngineEvent, SiteState};
use std::sync::Arc;

#[tokio::test]
async fn known_address_leaves_store_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = Arc::new(FileRecordStore::open(&path).await.unwrap());

    let seeded = site("sftp.vendor.example", &["10.0.0.1"]);
    store
        .put_site(&seeded.hostname, &SiteState::from_site(&seeded, chrono::Utc::now()))
        .await
        .unwrap();
    let before = std::fs::read(&path).unwrap();

    let resolver = ControlledResolver::new();
    resolver.set("sftp.vendor.example", &["10.0.0.1", "10.0.0.5"]);
    let notifier = RecordingNotifier::new();
    let (engine, mut events) = build_engine(&resolver, store.clone(), &notifier, engine_config());

    let mut sites = vec![site("sftp.vendor.example", &[])];
    let summary = engine.check_sites(&mut sites).await;

    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.changed, 0);
    assert_eq!(std::fs::read(&path).unwrap(), before, "store file must not be rewritten");
    assert_eq!(notifier.count(), 0);
    assert!(drain_events(&mut events).contains(&EngineEvent::SiteUnchanged {
        hostname: "sftp.vendor.example".to_string()
    }));
}

#[tokio::test]
async fn disjoint_resolution_records_change() {
    let resolver = ControlledResolver::new();
    resolver.set("api.example.com", &["10.0.0.2", "10.0.0.3"]);
    let store = Arc::new(MemoryRecordStore::new());
    let notifier = RecordingNotifier::new();
    let (engine, _events) = build_engine(&resolver, store.clone(), &notifier, engine_config());

    let mut sites = vec![site("api.example.com", &["10.0.0.1"])];
    let summary = engine.check_sites(&mut sites).await;

    assert_eq!(summary.changed, 1);
    assert_eq!(sites[0].known_ips, vec!["10.0.0.2"]);

    let state = store.get_site("api.example.com").await.unwrap().unwrap();
    assert_eq!(state.known_ips, vec!["10.0.0.2"], "first resolved address becomes authoritative");

    let sent = notifier.events();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].old_ips, vec!["10.0.0.1"]);
    assert_eq!(sent[0].new_ips, vec!["10.0.0.2", "10.0.0.3"]);
    assert_eq!(sent[0].new_ip, "10.0.0.2");
    assert_eq!(store.count(Bucket::Changes).await.unwrap(), 1);
    assert!(store.get(Bucket::Changes, &sent[0].key()).await.unwrap().is_some());
}

#[tokio::test]
async fn second_pass_with_same_answer_is_unchanged() {
    let resolver = ControlledResolver::new();
    resolver.set("api.example.com", &["10.0.0.2"]);
    let store = Arc::new(MemoryRecordStore::new());
    let notifier = RecordingNotifier::new();
    let (engine, _events) = build_engine(&resolver, store.clone(), &notifier, engine_config());

    let mut sites = vec![site("api.example.com", &["10.0.0.1"])];
    let first = engine.check_sites(&mut sites).await;
    let second = engine.check_sites(&mut sites).await;

    assert_eq!(first.changed, 1);
    assert_eq!(second.changed, 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(notifier.count(), 1);
    assert_eq!(store.count(Bucket::Changes).await.unwrap(), 1);

    // A fresh catalog copy still carrying the old address picks up the stored state
    let mut stale = vec![site("api.example.com", &["10.0.0.1"])];
    let third = engine.check_sites(&mut stale).await;
    assert_eq!(third.unchanged, 1);
    assert_eq!(stale[0].known_ips, vec!["10.0.0.2"]);
}

#[tokio::test]
async fn notification_failure_keeps_recorded_change() {
    let resolver = ControlledResolver::new();
    resolver.set("api.example.com", &["10.0.0.2"]);
    let store = Arc::new(MemoryRecordStore::new());
    let notifier = FailingNotifier::new();
    let (engine, mut events) = build_engine(&resolver, store.clone(), &notifier, engine_config());

    let mut sites = vec![site("api.example.com", &["10.0.0.1"])];
    let summary = engine.check_sites(&mut sites).await;

    assert_eq!(summary.changed, 1);
    assert_eq!(summary.notification_failures, 1);
    assert!(!summary.has_persistence_failures());
    assert_eq!(notifier.attempts(), 1, "exactly one delivery attempt, no retries");
    assert_eq!(store.count(Bucket::Changes).await.unwrap(), 1);
    assert_eq!(sites[0].known_ips, vec!["10.0.0.2"]);

    let changed = drain_events(&mut events)
        .into_iter()
        .find(|e| matches!(e, EngineEvent::SiteChanged { .. }));
    assert_eq!(
        changed,
        Some(EngineEvent::SiteChanged {
            hostname: "api.example.com".to_string(),
            old_ips: vec!["10.0.0.1".to_string()],
            new_ip: "10.0.0.2".to_string(),
            notified: false,
        })
    );
}

#[tokio::test]
async fn empty_resolution_is_unchanged_without_write() {
    let (logs, _guard) = CapturedLogs::install();
    let resolver = ControlledResolver::new();
    resolver.set("legacy.example.com", &["2001:db8::1"]);
    let store = Arc::new(FailingStore::new());
    let notifier = RecordingNotifier::new();
    let (engine, _events) = build_engine(&resolver, store.clone(), &notifier, engine_config());

    let mut sites = vec![site("legacy.example.com", &["10.0.0.9"])];
    let summary = engine.check_sites(&mut sites).await;

    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.resolution_failures, 0);
    assert_eq!(store.commit_count(), 0);
    assert_eq!(notifier.count(), 0);
    assert_eq!(sites[0].known_ips, vec!["10.0.0.9"]);

    let logs = logs.contents();
    assert!(logs.contains("WARN"), "no warning logged: {}", logs);
    assert!(logs.contains("No IPv4 addresses resolved"));
    assert!(logs.contains("legacy.example.com"));
}

#[tokio::test]
async fn lookup_failure_skips_site_and_continues() {
    let resolver = ControlledResolver::new();
    resolver.fail("down.example.com", "timed out");
    resolver.set("up.example.com", &["10.0.0.2"]);
    let store = Arc::new(MemoryRecordStore::new());
    let notifier = RecordingNotifier::new();
    let (engine, _events) = build_engine(&resolver, store.clone(), &notifier, engine_config());

    let mut sites = vec![
        site("down.example.com", &["10.0.0.1"]),
        site("up.example.com", &["10.0.0.1"]),
    ];
    let summary = engine.check_sites(&mut sites).await;

    assert_eq!(summary.checked, 2);
    assert_eq!(summary.resolution_failures, 1);
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].hostname, "down.example.com");
    assert_eq!(summary.failures[0].stage, FailureStage::Resolution);
    assert_eq!(sites[0].known_ips, vec!["10.0.0.1"]);
}
