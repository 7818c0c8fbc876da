//! Test doubles and common utilities for contract tests
//!
//! These doubles stand in for DNS, SMTP and storage so the contract tests
//! exercise only the core's decisions and bookkeeping.

#![allow(dead_code)]

use async_trait::async_trait;
use digger_core::error::{Error, Result};
use digger_core::model::{ChangeEvent, ResolvedAddresses, Site};
use digger_core::state::MemoryRecordStore;
use digger_core::traits::{Bucket, Notifier, RecordStore, Resolver, WriteBatch};
use digger_core::{DiggerEngine, EngineConfig, EngineEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Scripted answer for one hostname
#[derive(Debug, Clone)]
pub enum Answer {
    /// Lookup returns these addresses (IPv6 entries are filtered out)
    Addrs(Vec<IpAddr>),
    /// Lookup fails with this message
    Fail(String),
}

/// A resolver whose answers are set by the test
///
/// Unknown hostnames fail like NXDOMAIN. Clones share answers and counters.
#[derive(Clone, Default)]
pub struct ControlledResolver {
    answers: Arc<Mutex<HashMap<String, Answer>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ControlledResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every lookup for `delay` (to observe concurrency)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script `hostname` to resolve to `ips`
    pub fn set(&self, hostname: &str, ips: &[&str]) {
        let addrs = ips.iter().map(|ip| ip.parse().unwrap()).collect();
        self.answers
            .lock()
            .unwrap()
            .insert(hostname.to_string(), Answer::Addrs(addrs));
    }

    /// Script `hostname` to fail
    pub fn fail(&self, hostname: &str, message: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(hostname.to_string(), Answer::Fail(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for ControlledResolver {
    async fn resolve(&self, hostname: &str) -> Result<ResolvedAddresses> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let answer = self.answers.lock().unwrap().get(hostname).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match answer {
            Some(Answer::Addrs(addrs)) => {
                let resolved = ResolvedAddresses::from_ips(addrs);
                if resolved.is_empty() {
                    Err(Error::no_addresses(hostname))
                } else {
                    Ok(resolved)
                }
            }
            Some(Answer::Fail(message)) => Err(Error::resolution(hostname, message)),
            None => Err(Error::resolution(hostname, "NXDOMAIN")),
        }
    }
}

/// A notifier that records every event it is given
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<ChangeEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// A notifier that counts attempts and always fails
#[derive(Clone, Default)]
pub struct FailingNotifier {
    attempts: Arc<AtomicUsize>,
}

impl FailingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _event: &ChangeEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::notification("relay refused connection"))
    }

    fn notifier_name(&self) -> &'static str {
        "failing"
    }
}

/// A memory store whose commits can be made to fail
#[derive(Clone, Default)]
pub struct FailingStore {
    inner: MemoryRecordStore,
    fail_commits: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Commit attempts, failed ones included
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryRecordStore {
        &self.inner
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Value>> {
        self.inner.get(bucket, key).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::store("disk full"));
        }
        self.inner.commit(batch).await
    }

    async fn for_each(
        &self,
        bucket: Bucket,
        visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v Value) + Send),
    ) -> Result<()> {
        self.inner.for_each(bucket, visitor).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// A site with the given known addresses
pub fn site(hostname: &str, ips: &[&str]) -> Site {
    Site::new(hostname, 22, "Vendor").with_known_ips(ips)
}

/// Engine configuration used by most tests
pub fn engine_config() -> EngineConfig {
    EngineConfig::default()
}

/// Build an engine over the given doubles
pub fn build_engine<S, N>(
    resolver: &ControlledResolver,
    store: Arc<S>,
    notifier: &N,
    config: EngineConfig,
) -> (DiggerEngine, mpsc::Receiver<EngineEvent>)
where
    S: RecordStore + 'static,
    N: Notifier + Clone + 'static,
{
    DiggerEngine::new(
        Arc::new(resolver.clone()),
        store,
        Arc::new(notifier.clone()),
        config,
    )
    .expect("engine construction succeeds")
}

/// Every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Log lines captured from a scoped tracing subscriber
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Capture WARN and above on this thread until the guard is dropped
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
