//! Core digger engine
//!
//! The DiggerEngine is responsible for:
//! - Resolving every catalog site via the Resolver
//! - Reconciling each site with its stored state
//! - Deciding changed/unchanged/ambiguous via the ChangeDetector
//! - Recording changes (store + notification) via the ChangeRecorder
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐   sites    ┌──────────────┐  resolve (bounded, concurrent)  ┌──────────┐
//!  │ Catalog  │──────────▶ │ DiggerEngine │ ──────────────────────────────▶ │ Resolver │
//!  └──────────┘ ◀──────────└──────────────┘                                 └──────────┘
//!     export        │  serial, catalog order
//!                   ├──▶ RecordStore::get_site   (prior state)
//!                   ├──▶ ChangeDetector::detect  (decision)
//!                   └──▶ ChangeRecorder::record  (commit, then notify)
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Resolve all hostnames, at most `resolve_concurrency` at a time
//! 2. For each site in catalog order: load stored state, detect, record
//! 3. Advance the in-memory site only after a successful commit
//! 4. Emit events for monitoring/logging

use crate::catalog;
use crate::config::{EngineConfig, MIN_INTERVAL_SECS};
use crate::detector::{ChangeDecision, ChangeDetector};
use crate::error::{Error, Result};
use crate::model::{ResolvedAddresses, Site};
use crate::recorder::{ChangeRecorder, NotificationStatus};
use crate::traits::{Notifier, RecordStore, Resolver};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

/// Events emitted by the DiggerEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A check cycle started
    RunStarted { sites: usize },

    /// Known state still holds
    SiteUnchanged { hostname: String },

    /// Change committed
    SiteChanged {
        hostname: String,
        old_ips: Vec<String>,
        new_ip: String,
        notified: bool,
    },

    /// Multiple known addresses; nothing written
    SiteAmbiguous {
        hostname: String,
        known_ips: Vec<String>,
        resolved: Vec<String>,
    },

    /// Lookup failed; site skipped this cycle
    ResolutionFailed { hostname: String, error: String },

    /// Store read or commit failed; site not advanced
    PersistenceFailed { hostname: String, error: String },

    /// A check cycle finished
    RunCompleted { summary: RunSummary },

    /// Periodic mode stopped
    Stopped { reason: String },
}

/// Which step a site failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Resolution,
    Persistence,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Resolution => f.write_str("resolution"),
            FailureStage::Persistence => f.write_str("persistence"),
        }
    }
}

/// One per-site failure of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFailure {
    pub hostname: String,
    pub stage: FailureStage,
    pub message: String,
}

impl fmt::Display for SiteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} failed: {}", self.hostname, self.stage, self.message)
    }
}

/// Counters for one or more check cycles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub checked: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub ambiguous: usize,
    pub resolution_failures: usize,
    pub persistence_failures: usize,
    pub notification_failures: usize,
    /// Cycles that aborted after the catalog was loaded (export, flush, reload)
    pub cycle_failures: usize,
    /// Per-site failures of the last cycle
    pub failures: Vec<SiteFailure>,
}

impl RunSummary {
    /// Some change could not be committed
    pub fn has_persistence_failures(&self) -> bool {
        self.persistence_failures > 0
    }

    /// Some cycle could not finish (export, flush or catalog reload failed)
    pub fn has_cycle_failures(&self) -> bool {
        self.cycle_failures > 0
    }

    /// Add the counters of `other`; failure details are not carried over
    pub fn absorb(&mut self, other: &RunSummary) {
        self.checked += other.checked;
        self.unchanged += other.unchanged;
        self.changed += other.changed;
        self.ambiguous += other.ambiguous;
        self.resolution_failures += other.resolution_failures;
        self.persistence_failures += other.persistence_failures;
        self.notification_failures += other.notification_failures;
        self.cycle_failures += other.cycle_failures;
    }

    fn fail(&mut self, hostname: &str, stage: FailureStage, message: String) {
        match stage {
            FailureStage::Resolution => self.resolution_failures += 1,
            FailureStage::Persistence => self.persistence_failures += 1,
        }
        self.failures.push(SiteFailure {
            hostname: hostname.to_string(),
            stage,
            message,
        });
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} sites: {} changed, {} unchanged, {} ambiguous, {} lookup failures, {} store failures, {} notification failures",
            self.checked,
            self.changed,
            self.unchanged,
            self.ambiguous,
            self.resolution_failures,
            self.persistence_failures,
            self.notification_failures
        )?;
        if self.cycle_failures > 0 {
            write!(f, ", {} failed cycles", self.cycle_failures)?;
        }
        Ok(())
    }
}

/// Core digger engine
///
/// Orchestrates resolve → detect → record for a list of sites.
///
/// ## Lifecycle
///
/// 1. Create with [`DiggerEngine::new()`]
/// 2. Run a single pass with [`DiggerEngine::check_sites()`] or
///    [`DiggerEngine::run_cycle()`], or loop with [`DiggerEngine::run_periodic()`]
/// 3. Drop to cleanup
///
/// ## Ordering
///
/// Lookups run concurrently; detection and recording never do. Two sites are
/// never recorded at the same time, and sites are recorded in catalog order.
///
/// ## Load Resistance
///
/// - **Bounded lookups**: a semaphore caps in-flight resolutions
/// - **Bounded event channel**: when full, events are dropped (logged)
pub struct DiggerEngine {
    /// Resolver for hostname lookups
    resolver: Arc<dyn Resolver>,

    /// Record store for prior state
    store: Arc<dyn RecordStore>,

    detector: ChangeDetector,

    recorder: ChangeRecorder,

    /// Maximum lookups in flight
    resolve_concurrency: usize,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DiggerEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `resolver`: Resolver implementation
    /// - `store`: Record store implementation
    /// - `notifier`: Notifier implementation
    /// - `config`: Engine configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        resolver: Arc<dyn Resolver>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        info!(
            "Engine using resolver '{}', notifier '{}'",
            resolver.resolver_name(),
            notifier.notifier_name()
        );

        let engine = Self {
            resolver,
            store: store.clone(),
            detector: ChangeDetector::new(config.update_mode, config.tie_break),
            recorder: ChangeRecorder::new(store, notifier),
            resolve_concurrency: config.resolve_concurrency,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Swap in a recorder (tests use this to pin the clock)
    pub fn with_recorder(mut self, recorder: ChangeRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Check every site once
    ///
    /// `sites` is the working copy: each entry picks up its stored state and,
    /// after a committed change, its new address. Per-site failures are
    /// counted and never abort the pass.
    pub async fn check_sites(&self, sites: &mut [Site]) -> RunSummary {
        self.emit_event(EngineEvent::RunStarted { sites: sites.len() });
        info!("Checking {} sites", sites.len());

        let mut resolutions = self.resolve_all(sites).await;
        let mut summary = RunSummary::default();

        for (site, resolution) in sites.iter_mut().zip(resolutions.iter_mut()) {
            summary.checked += 1;
            let resolution = resolution
                .take()
                .unwrap_or_else(|| Err(Error::resolution(&site.hostname, "lookup task aborted")));
            self.check_site(site, resolution, &mut summary).await;
        }

        info!("{}", summary);
        self.emit_event(EngineEvent::RunCompleted {
            summary: summary.clone(),
        });
        summary
    }

    /// Read and validate the catalog
    pub async fn load_catalog(&self, catalog_path: &Path) -> Result<Vec<Site>> {
        let path = catalog_path.to_path_buf();
        blocking(move || catalog::read_catalog(path)).await
    }

    /// Check already loaded sites, write them back if `export` is set, flush
    ///
    /// # Returns
    ///
    /// - `Ok(RunSummary)`: Cycle completed (per-site failures are in the summary)
    /// - `Err(Error::Catalog)`: Catalog could not be exported
    /// - `Err(Error::Store)` / `Err(Error::Io)`: Store flush failed
    pub async fn check_catalog(
        &self,
        mut sites: Vec<Site>,
        catalog_path: &Path,
        export: bool,
    ) -> Result<RunSummary> {
        let summary = self.check_sites(&mut sites).await;

        if export {
            let path = catalog_path.to_path_buf();
            blocking(move || catalog::write_catalog(path, &sites)).await?;
            info!("Catalog written to {}", catalog_path.display());
        }

        self.store.flush().await?;
        Ok(summary)
    }

    /// Read the catalog, check it, and write it back if `export` is set
    pub async fn run_cycle(&self, catalog_path: &Path, export: bool) -> Result<RunSummary> {
        let sites = self.load_catalog(catalog_path).await?;
        self.check_catalog(sites, catalog_path, export).await
    }

    /// Run a cycle every `interval` until shutdown
    ///
    /// The catalog is loaded before the loop starts; if that fails nothing is
    /// checked and the error is returned. The first cycle starts immediately.
    /// A later cycle that fails (catalog reload, export, flush) is logged,
    /// counted in `cycle_failures`, and the loop carries on. A cycle in
    /// progress always finishes before shutdown is honoured.
    ///
    /// # Parameters
    ///
    /// - `shutdown_rx`: Optional oneshot receiver to trigger shutdown (for
    ///   testing); `None` waits for SIGINT/SIGTERM
    ///
    /// # Returns
    ///
    /// Counters accumulated over all cycles, or the initial catalog error
    pub async fn run_periodic(
        &self,
        catalog_path: &Path,
        export: bool,
        interval: Duration,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<RunSummary> {
        if interval < Duration::from_secs(MIN_INTERVAL_SECS) {
            return Err(Error::config(format!(
                "Check interval must be at least {} seconds",
                MIN_INTERVAL_SECS
            )));
        }

        let mut preloaded = Some(self.load_catalog(catalog_path).await?);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(ticker);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => shutdown_signal().await,
            }
        };
        tokio::pin!(shutdown);

        info!("Periodic mode: checking every {}s", interval.as_secs());
        let mut totals = RunSummary::default();
        let mut cycles = 0usize;

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    cycles += 1;
                    debug!("Starting cycle {}", cycles);
                    let result = match preloaded.take() {
                        Some(sites) => self.check_catalog(sites, catalog_path, export).await,
                        None => self.run_cycle(catalog_path, export).await,
                    };
                    match result {
                        Ok(summary) => totals.absorb(&summary),
                        Err(e) => {
                            error!("Cycle {} failed: {}", cycles, e);
                            totals.cycle_failures += 1;
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        self.store.flush().await?;
        info!("Stopped after {} cycles", cycles);
        Ok(totals)
    }

    /// Resolve every hostname, returning results in site order
    async fn resolve_all(&self, sites: &[Site]) -> Vec<Option<Result<ResolvedAddresses>>> {
        let permits = Arc::new(Semaphore::new(self.resolve_concurrency));
        let mut tasks = JoinSet::new();

        for (index, site) in sites.iter().enumerate() {
            let resolver = self.resolver.clone();
            let permits = permits.clone();
            let hostname = site.hostname.clone();
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => resolver.resolve(&hostname).await,
                    Err(_) => Err(Error::resolution(&hostname, "resolver pool closed")),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<ResolvedAddresses>>> =
            sites.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("Lookup task failed: {}", e),
            }
        }
        results
    }

    /// Reconcile, detect and record one site
    async fn check_site(
        &self,
        site: &mut Site,
        resolution: Result<ResolvedAddresses>,
        summary: &mut RunSummary,
    ) {
        let hostname = site.hostname.clone();

        match self.store.get_site(&hostname).await {
            Ok(Some(state)) => site.apply_state(&state),
            Ok(None) => debug!(hostname = %hostname, "No stored state, using catalog"),
            Err(e) => {
                error!(hostname = %hostname, "Failed to read stored state: {}", e);
                self.emit_event(EngineEvent::PersistenceFailed {
                    hostname: hostname.clone(),
                    error: e.to_string(),
                });
                summary.fail(&hostname, FailureStage::Persistence, e.to_string());
                return;
            }
        }

        let resolved = match resolution {
            Ok(resolved) => resolved,
            // Detector treats an empty set as "nothing to compare"
            Err(Error::NoAddressesFound(_)) => ResolvedAddresses::default(),
            Err(e) => {
                error!(hostname = %hostname, "Lookup failed: {}", e);
                self.emit_event(EngineEvent::ResolutionFailed {
                    hostname: hostname.clone(),
                    error: e.to_string(),
                });
                summary.fail(&hostname, FailureStage::Resolution, e.to_string());
                return;
            }
        };

        let decision = self.detector.detect(site, &resolved);
        match &decision {
            ChangeDecision::Unchanged => {
                summary.unchanged += 1;
                self.emit_event(EngineEvent::SiteUnchanged { hostname });
            }
            ChangeDecision::Ambiguous {
                known_ips,
                resolved,
            } => {
                summary.ambiguous += 1;
                self.emit_event(EngineEvent::SiteAmbiguous {
                    hostname,
                    known_ips: known_ips.clone(),
                    resolved: resolved.clone(),
                });
            }
            ChangeDecision::Changed { .. } => match self.recorder.record(site, &decision).await {
                Ok(outcome) => {
                    site.apply_change(&outcome.event);
                    summary.changed += 1;
                    let notified = outcome.notification == NotificationStatus::Delivered;
                    if !notified {
                        summary.notification_failures += 1;
                    }
                    self.emit_event(EngineEvent::SiteChanged {
                        hostname,
                        old_ips: outcome.event.old_ips,
                        new_ip: outcome.event.new_ip,
                        notified,
                    });
                }
                Err(e) => {
                    error!(hostname = %hostname, "Failed to record change: {}", e);
                    self.emit_event(EngineEvent::PersistenceFailed {
                        hostname: hostname.clone(),
                        error: e.to_string(),
                    });
                    summary.fail(&hostname, FailureStage::Persistence, e.to_string());
                }
            },
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
        // Closed: nobody is listening, which is fine
    }
}

/// Run blocking catalog I/O off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("Blocking task failed: {}", e)))?
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
