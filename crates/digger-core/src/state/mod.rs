// # Record Store Implementations
//
// This module provides implementations of the RecordStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::Error;
use crate::config::StoreConfig;
use crate::traits::{Bucket, RecordStore, WriteBatch, WriteOp};

/// Open the store described by `config`
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn RecordStore>, Error> {
    match config {
        StoreConfig::File { path } => Ok(Box::new(FileRecordStore::open(path).await?)),
        StoreConfig::Memory => Ok(Box::new(MemoryRecordStore::new())),
    }
}

/// Contents of both buckets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct BucketSet {
    #[serde(default)]
    sites: BTreeMap<String, Value>,
    #[serde(default)]
    changes: BTreeMap<String, Value>,
}

impl BucketSet {
    pub(crate) fn bucket(&self, bucket: Bucket) -> &BTreeMap<String, Value> {
        match bucket {
            Bucket::Sites => &self.sites,
            Bucket::Changes => &self.changes,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut BTreeMap<String, Value> {
        match bucket {
            Bucket::Sites => &mut self.sites,
            Bucket::Changes => &mut self.changes,
        }
    }

    /// Check every append before touching anything, then apply all writes.
    pub(crate) fn apply(&mut self, batch: WriteBatch) -> Result<(), Error> {
        let mut appended: HashSet<(Bucket, &str)> = HashSet::new();
        for op in batch.ops() {
            if let WriteOp::Append { bucket, key, .. } = op
                && (self.bucket(*bucket).contains_key(key)
                    || !appended.insert((*bucket, key.as_str())))
            {
                return Err(Error::KeyExists(format!("{}/{}", bucket, key)));
            }
        }

        for op in batch.ops() {
            match op {
                WriteOp::Put { bucket, key, value } | WriteOp::Append { bucket, key, value } => {
                    self.bucket_mut(*bucket).insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}
