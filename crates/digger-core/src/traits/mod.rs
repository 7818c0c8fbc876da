//! Core traits for the digger system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Resolver`]: Resolve hostnames to IPv4 address sets
//! - [`RecordStore`]: Durable site state and append-only change log
//! - [`Notifier`]: Deliver change notifications

pub mod notifier;
pub mod record_store;
pub mod resolver;

pub use notifier::Notifier;
pub use record_store::{Bucket, RecordStore, WriteBatch, WriteOp};
pub use resolver::Resolver;
