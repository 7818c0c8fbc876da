//! Change recording
//!
//! Turns a `Changed` decision into durable state and a notification:
//!
//! 1. Build the [`ChangeEvent`] with a per-host unique timestamp
//! 2. Commit the new site state and the change-log entry as one batch
//! 3. Notify, tolerating failure
//!
//! A failed commit stops before notification, so an operator is never told
//! about a change that was not recorded.

use crate::detector::ChangeDecision;
use crate::error::{Error, Result};
use crate::model::{ChangeEvent, Site, SiteState};
use crate::traits::{Notifier, RecordStore, WriteBatch};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Source of detection timestamps
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of the notification step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Delivered,
    Failed(String),
}

/// What a successful [`ChangeRecorder::record`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// The persisted event
    pub event: ChangeEvent,
    pub notification: NotificationStatus,
}

/// Persists detected changes and notifies about them
pub struct ChangeRecorder {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    clock: Clock,
    last_issued: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ChangeRecorder {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(Utc::now),
            last_issued: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the wall clock (tests)
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Record a change for `site`
    ///
    /// # Returns
    ///
    /// - `Ok(RecordOutcome)`: State and change log committed; notification attempted
    /// - `Err(Error::InvalidInput)`: `decision` is not `Changed`; nothing written
    /// - `Err(Error)`: Commit failed; nothing written, nobody notified
    pub async fn record(&self, site: &Site, decision: &ChangeDecision) -> Result<RecordOutcome> {
        let ChangeDecision::Changed {
            old_ips,
            new_ips,
            new_ip,
        } = decision
        else {
            return Err(Error::invalid_input(format!(
                "Only changed decisions can be recorded, got {} for {}",
                decision.label(),
                site.hostname
            )));
        };

        let event = ChangeEvent {
            hostname: site.hostname.clone(),
            port: site.port,
            entity_name: site.entity_name.clone(),
            old_ips: old_ips.clone(),
            new_ips: new_ips.clone(),
            new_ip: new_ip.clone(),
            detected_at: self.next_timestamp(&site.hostname),
        };

        let state = SiteState::after_change(site, &event);
        let mut batch = WriteBatch::new();
        batch
            .put_site(&site.hostname, &state)?
            .append_change(&event.key(), &event)?;
        self.store.commit(batch).await?;

        info!(
            hostname = %event.hostname,
            old_ip = %event.old_ips_joined(),
            new_ip = %event.new_ip,
            "Address change recorded"
        );

        let notification = match self.notifier.notify(&event).await {
            Ok(()) => NotificationStatus::Delivered,
            Err(e) => {
                warn!(
                    hostname = %event.hostname,
                    notifier = self.notifier.notifier_name(),
                    "Notification failed: {}",
                    e
                );
                NotificationStatus::Failed(e.to_string())
            }
        };

        Ok(RecordOutcome {
            event,
            notification,
        })
    }

    /// Current time, strictly after the last one issued for `hostname`
    fn next_timestamp(&self, hostname: &str) -> DateTime<Utc> {
        let mut now = (self.clock)();
        let mut issued = self
            .last_issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(last) = issued.get(hostname)
            && now <= *last
        {
            now = *last + Duration::nanoseconds(1);
        }
        issued.insert(hostname.to_string(), now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::state::MemoryRecordStore;
    use crate::traits::Bucket;

    fn changed(old: &str, new: &str) -> ChangeDecision {
        ChangeDecision::Changed {
            old_ips: vec![old.to_string()],
            new_ips: vec![new.to_string()],
            new_ip: new.to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_rejects_non_change() {
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = ChangeRecorder::new(store.clone(), Arc::new(LogNotifier));
        let site = Site::new("api.example.com", 22, "Vendor");

        let err = recorder
            .record(&site, &ChangeDecision::Unchanged)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_same_instant_gets_distinct_keys() {
        let frozen = Utc::now();
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = ChangeRecorder::new(store.clone(), Arc::new(LogNotifier))
            .with_clock(Arc::new(move || frozen));
        let site = Site::new("api.example.com", 22, "Vendor").with_known_ips(["10.0.0.1"]);

        let first = recorder.record(&site, &changed("10.0.0.1", "10.0.0.2")).await.unwrap();
        let second = recorder.record(&site, &changed("10.0.0.2", "10.0.0.3")).await.unwrap();

        assert!(second.event.detected_at > first.event.detected_at);
        assert_ne!(first.event.key(), second.event.key());
        assert_eq!(store.count(Bucket::Changes).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_record_writes_state_and_log() {
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = ChangeRecorder::new(store.clone(), Arc::new(LogNotifier));
        let site = Site::new("api.example.com", 22, "Vendor").with_known_ips(["10.0.0.1"]);

        let outcome = recorder.record(&site, &changed("10.0.0.1", "10.0.0.2")).await.unwrap();
        assert_eq!(outcome.notification, NotificationStatus::Delivered);

        let state = store.get_site("api.example.com").await.unwrap().unwrap();
        assert_eq!(state.known_ips, vec!["10.0.0.2"]);
        assert_eq!(state.updated_at, outcome.event.detected_at);
        assert!(store
            .get(Bucket::Changes, &outcome.event.key())
            .await
            .unwrap()
            .is_some());
    }
}
