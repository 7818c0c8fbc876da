//! Change-log reporting

use crate::error::Result;
use crate::model::ChangeEvent;
use crate::traits::{Bucket, RecordStore};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// One line of the change report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLine {
    pub hostname: String,
    pub old_ip: String,
    pub new_ip: String,
    pub detected_at: DateTime<Utc>,
}

impl From<&ChangeEvent> for ChangeLine {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            hostname: event.hostname.clone(),
            old_ip: event.old_ips_joined(),
            new_ip: event.new_ip.clone(),
            detected_at: event.detected_at,
        }
    }
}

impl fmt::Display for ChangeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Site: {}, Old IP: {}, New IP: {}, Timestamp: {}",
            self.hostname,
            self.old_ip,
            self.new_ip,
            self.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Every readable change-log entry, oldest first
///
/// Entries that no longer decode are logged and left out.
pub async fn change_report(store: &dyn RecordStore) -> Result<Vec<ChangeLine>> {
    let mut lines = Vec::new();
    store
        .for_each(Bucket::Changes, &mut |key, value| {
            match serde_json::from_value::<ChangeEvent>(value.clone()) {
                Ok(event) => lines.push(ChangeLine::from(&event)),
                Err(e) => tracing::warn!(key = %key, "Skipping unreadable change entry: {}", e),
            }
        })
        .await?;

    lines.sort_by(|a, b| {
        a.detected_at
            .cmp(&b.detected_at)
            .then_with(|| a.hostname.cmp(&b.hostname))
    });
    Ok(lines)
}

/// Number of change-log entries, optionally for one hostname only
pub async fn count_changes(store: &dyn RecordStore, hostname: Option<&str>) -> Result<usize> {
    let Some(hostname) = hostname else {
        return store.count(Bucket::Changes).await;
    };

    let mut count = 0usize;
    store
        .for_each(Bucket::Changes, &mut |key, value| {
            let matches = match serde_json::from_value::<ChangeEvent>(value.clone()) {
                Ok(event) => event.hostname == hostname,
                Err(_) => key_belongs_to(key, hostname),
            };
            if matches {
                count += 1;
            }
        })
        .await?;
    Ok(count)
}

// Hostnames may contain '-', so only accept the prefix if the rest is a timestamp
fn key_belongs_to(key: &str, hostname: &str) -> bool {
    key.strip_prefix(hostname)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|ts| DateTime::parse_from_rfc3339(ts).is_ok())
}
