// # Memory Record Store
//
// In-memory implementation of RecordStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// tests and dry runs: every site without catalog addresses is reported as
// changed on each run, and the change log starts empty every time.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::BucketSet;
use crate::Error;
use crate::traits::{Bucket, RecordStore, WriteBatch};

/// In-memory record store implementation
///
/// Both buckets live behind a single RwLock, so a commit is atomic with
/// respect to every reader.
///
/// # Example
///
/// ```rust,no_run
/// use digger_core::state::MemoryRecordStore;
/// use digger_core::traits::{Bucket, RecordStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///     assert_eq!(store.count(Bucket::Changes).await?, 0);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<BucketSet>>,
}

impl MemoryRecordStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a bucket
    pub async fn len(&self, bucket: Bucket) -> usize {
        self.inner.read().await.bucket(bucket).len()
    }

    /// Check if both buckets are empty
    pub async fn is_empty(&self) -> bool {
        let guard = self.inner.read().await;
        guard.bucket(Bucket::Sites).is_empty() && guard.bucket(Bucket::Changes).is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Value>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.bucket(bucket).get(key).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.apply(batch)
    }

    async fn for_each(
        &self,
        bucket: Bucket,
        visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v Value) + Send),
    ) -> Result<(), Error> {
        let guard = self.inner.read().await;
        for (key, value) in guard.bucket(bucket) {
            visitor(key, value);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeEvent, Site, SiteState};
    use chrono::Utc;

    fn event(hostname: &str, new_ip: &str) -> ChangeEvent {
        ChangeEvent {
            hostname: hostname.to_string(),
            port: 22,
            entity_name: "Vendor".to_string(),
            old_ips: vec!["10.0.0.1".to_string()],
            new_ips: vec![new_ip.to_string()],
            new_ip: new_ip.to_string(),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty().await);

        let site = Site::new("example.com", 443, "Example").with_known_ips(["1.2.3.4"]);
        let state = SiteState::from_site(&site, Utc::now());
        store.put_site("example.com", &state).await.unwrap();

        let retrieved = store.get_site("example.com").await.unwrap();
        assert_eq!(retrieved, Some(state));
        assert_eq!(store.len(Bucket::Sites).await, 1);
        assert!(store.get_site("missing.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_append_only() {
        let store = MemoryRecordStore::new();
        let e = event("example.com", "10.0.0.2");

        store.append_change(&e.key(), &e).await.unwrap();
        let err = store.append_change(&e.key(), &e).await.unwrap_err();

        assert!(matches!(err, Error::KeyExists(_)));
        assert_eq!(store.count(Bucket::Changes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_site_state_is_absent() {
        let store = MemoryRecordStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Bucket::Sites, "broken.example.com", serde_json::json!("garbage"));
        store.commit(batch).await.unwrap();

        assert!(store.get_site("broken.example.com").await.unwrap().is_none());
    }

    #[test]
    fn test_clones_share_buckets() {
        let store = MemoryRecordStore::new();
        let other = store.clone();
        let e = event("example.com", "10.0.0.3");

        tokio_test::block_on(async {
            other.append_change(&e.key(), &e).await.unwrap();
            assert_eq!(store.len(Bucket::Changes).await, 1);
            assert!(!store.is_empty().await);
        });
    }
}
