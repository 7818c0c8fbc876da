// # Record Store Trait
//
// Defines the interface for durable site state and change history.
//
// ## Layout
//
// Two independent namespaces behind one transactional interface:
// - `sites`: hostname -> current `SiteState`, overwritten on update
// - `changes`: `<hostname>-<timestamp>` -> `ChangeEvent`, append-only
//
// Values are stored as JSON so that a single unreadable entry can be
// skipped and logged without aborting a full-bucket pass.
//
// ## Usage
//
// ```rust,ignore
// use digger_core::traits::{RecordStore, WriteBatch};
//
// let mut batch = WriteBatch::new();
// batch.put_site(&state.hostname, &state)?;
// batch.append_change(&event.key(), &event)?;
// store.commit(batch).await?; // both writes or neither
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;
use crate::model::{ChangeEvent, SiteState};

/// Store namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Current state per hostname
    Sites,
    /// Append-only change log
    Changes,
}

impl Bucket {
    pub fn name(&self) -> &'static str {
        match self {
            Bucket::Sites => "sites",
            Bucket::Changes => "changes",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite `key`
    Put {
        bucket: Bucket,
        key: String,
        value: Value,
    },
    /// Create `key`; the whole batch fails if it already exists
    Append {
        bucket: Bucket,
        key: String,
        value: Value,
    },
}

/// Ordered set of writes applied atomically by [`RecordStore::commit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an overwrite of `key` in `bucket`
    pub fn put(&mut self, bucket: Bucket, key: impl Into<String>, value: Value) -> &mut Self {
        self.ops.push(WriteOp::Put {
            bucket,
            key: key.into(),
            value,
        });
        self
    }

    /// Queue an append-only write of `key` in `bucket`
    pub fn append(&mut self, bucket: Bucket, key: impl Into<String>, value: Value) -> &mut Self {
        self.ops.push(WriteOp::Append {
            bucket,
            key: key.into(),
            value,
        });
        self
    }

    /// Queue the current state of a site
    pub fn put_site(&mut self, hostname: &str, state: &SiteState) -> Result<&mut Self, Error> {
        let value = serde_json::to_value(state)?;
        Ok(self.put(Bucket::Sites, hostname, value))
    }

    /// Queue a change-log entry
    pub fn append_change(&mut self, key: &str, event: &ChangeEvent) -> Result<&mut Self, Error> {
        let value = serde_json::to_value(event)?;
        Ok(self.append(Bucket::Changes, key, value))
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Trait for record store implementations
///
/// This trait defines the interface for durable key/value storage with the
/// `sites` and `changes` buckets. Implementations must be thread-safe and
/// usable across async tasks.
///
/// # Atomicity
///
/// [`commit`](RecordStore::commit) is the transactional unit: either every
/// write of the batch becomes visible (and durable, for persistent stores) or
/// none does. Concurrent commits are serialized by the implementation.
///
/// # Responsibilities
///
/// Stores persist and return values. They never decide whether a change
/// happened (owned by the detector) nor notify anyone (owned by the recorder).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a raw value
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Value))`: The stored value
    /// - `Ok(None)`: No entry under `key`
    /// - `Err(Error)`: Storage error
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Value>, Error>;

    /// Apply a batch of writes atomically
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Every write was applied
    /// - `Err(Error::KeyExists)`: An append targeted an existing key; nothing was applied
    /// - `Err(Error)`: Storage error; nothing was applied
    async fn commit(&self, batch: WriteBatch) -> Result<(), Error>;

    /// Visit every entry of a bucket
    ///
    /// Iteration order is unspecified and must not be relied upon.
    async fn for_each(
        &self,
        bucket: Bucket,
        visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v Value) + Send),
    ) -> Result<(), Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), Error>;

    /// Current state of a site
    ///
    /// An entry that no longer decodes is logged and reported as absent, so
    /// the site falls back to its catalog state and the next change
    /// overwrites the damaged record.
    async fn get_site(&self, hostname: &str) -> Result<Option<SiteState>, Error> {
        let Some(value) = self.get(Bucket::Sites, hostname).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(hostname = %hostname, "Ignoring unreadable site state: {}", e);
                Ok(None)
            }
        }
    }

    /// Overwrite the current state of a site
    async fn put_site(&self, hostname: &str, state: &SiteState) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.put_site(hostname, state)?;
        self.commit(batch).await
    }

    /// Append a change-log entry; fails if `key` is already present
    async fn append_change(&self, key: &str, event: &ChangeEvent) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.append_change(key, event)?;
        self.commit(batch).await
    }

    /// Number of entries in a bucket
    async fn count(&self, bucket: Bucket) -> Result<usize, Error> {
        let mut count = 0usize;
        self.for_each(bucket, &mut |_, _| count += 1).await?;
        Ok(count)
    }
}
