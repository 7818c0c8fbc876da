// # digger-core
//
// Core library for the digger DNS change monitor.
//
// ## Architecture Overview
//
// digger watches a catalog of third-party hostnames and tells operators when
// one of them starts resolving somewhere new:
// - **Resolver**: Trait for hostname → IPv4 address set lookups
// - **RecordStore**: Trait for durable site state and the append-only change log
// - **Notifier**: Trait for delivering change notifications
// - **ChangeDetector**: Pure changed/unchanged/ambiguous decision per site
// - **ChangeRecorder**: Atomic state + change-log commit, then notification
// - **DiggerEngine**: Orchestrates resolve → detect → record over a catalog
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Detection decides, recording persists, adapters talk to the world
// 2. **Exactly Once**: One detected change is one committed batch and one notification attempt
// 3. **Fail Per Site**: Lookup and store failures skip a site, never the run
// 4. **Library-First**: All core functionality can be used as a library

pub mod catalog;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod lock;
pub mod model;
pub mod notify;
pub mod recorder;
pub mod report;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{DiggerConfig, EngineConfig, NotifierConfig, StoreConfig, TieBreak};
pub use detector::{ChangeDecision, ChangeDetector};
pub use engine::{DiggerEngine, EngineEvent, RunSummary};
pub use error::{Error, Result};
pub use lock::CatalogLock;
pub use model::{ChangeEvent, ResolvedAddresses, Site, SiteState};
pub use notify::LogNotifier;
pub use recorder::{ChangeRecorder, NotificationStatus, RecordOutcome};
pub use state::{FileRecordStore, MemoryRecordStore, open_store};
pub use traits::{Notifier, RecordStore, Resolver};
