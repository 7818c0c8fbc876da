//! Configuration types for the digger system
//!
//! This module defines all configuration structures used throughout the crate.
//! The binary owns one [`DiggerConfig`] and hands the relevant section to each
//! component when it is constructed.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Shortest allowed period between two checks in periodic mode
pub const MIN_INTERVAL_SECS: u64 = 60;

/// Main digger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiggerConfig {
    /// Site catalog location
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Notification settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl DiggerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.catalog.validate()?;
        self.store.validate()?;
        self.resolver.validate()?;
        self.notifier.validate()?;
        self.engine.validate()?;
        self.log.validate()?;
        Ok(())
    }
}

/// Site catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to the CSV catalog
    #[serde(default = "default_catalog_path")]
    pub path: String,

    /// Path of the advisory lock file (defaults to `<path>.lock`)
    #[serde(default)]
    pub lock_path: Option<String>,
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.path.trim().is_empty() {
            return Err(crate::Error::config("Catalog path cannot be empty"));
        }
        Ok(())
    }

    /// Resolved lock file path
    pub fn lock_path(&self) -> PathBuf {
        match &self.lock_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(format!("{}.lock", self.path)),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            lock_path: None,
        }
    }
}

fn default_catalog_path() -> String {
    "sites.csv".to_string()
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("Store file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: "digger.db.json".to_string(),
        }
    }
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound for a single hostname lookup
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,

    /// Explicit name servers (`ip:port`); empty means the system configuration
    #[serde(default)]
    pub nameservers: Vec<String>,
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(crate::Error::config(format!(
                "Resolver timeout must be between 1 and 300 seconds, got {}",
                self.timeout_secs
            )));
        }
        self.nameserver_addrs()?;
        Ok(())
    }

    /// Parsed name server addresses
    pub fn nameserver_addrs(&self) -> Result<Vec<SocketAddr>, crate::Error> {
        self.nameservers
            .iter()
            .map(|ns| {
                ns.parse::<SocketAddr>().map_err(|e| {
                    crate::Error::config(format!("Invalid name server '{}': {}", ns, e))
                })
            })
            .collect()
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_resolver_timeout_secs(),
            nameservers: Vec::new(),
        }
    }
}

fn default_resolver_timeout_secs() -> u64 {
    5
}

/// Notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Deliver change notifications by email
    Smtp(SmtpConfig),

    /// Only log change notifications
    #[default]
    Log,
}

impl NotifierConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Smtp(smtp) => smtp.validate(),
            NotifierConfig::Log => Ok(()),
        }
    }
}

/// SMTP settings
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay host
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Sender address
    pub from: String,

    /// Recipient addresses
    pub to: Vec<String>,

    /// Upgrade the connection with STARTTLS
    #[serde(default = "default_true")]
    pub starttls: bool,

    /// Optional HTML template file
    #[serde(default)]
    pub template_path: Option<String>,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// Greeting name used in the message body
    #[serde(default = "default_recipient_name")]
    pub recipient_name: String,

    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

impl SmtpConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.host.trim().is_empty() {
            return Err(crate::Error::config("SMTP host cannot be empty"));
        }
        if self.port == 0 {
            return Err(crate::Error::config("SMTP port cannot be 0"));
        }
        if self.from.trim().is_empty() {
            return Err(crate::Error::config("SMTP sender cannot be empty"));
        }
        if self.to.is_empty() || self.to.iter().any(|t| t.trim().is_empty()) {
            return Err(crate::Error::config(
                "SMTP recipients must contain at least one non-empty address",
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(crate::Error::config(
                "SMTP username and password must be set together",
            ));
        }
        Ok(())
    }
}

// Keeps the password out of logs
impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("to", &self.to)
            .field("starttls", &self.starttls)
            .field("template_path", &self.template_path)
            .field("subject", &self.subject)
            .field("recipient_name", &self.recipient_name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_smtp_port() -> u16 {
    25
}

fn default_true() -> bool {
    true
}

fn default_subject() -> String {
    "IP Address Change Notification".to_string()
}

fn default_recipient_name() -> String {
    "Network Security Team".to_string()
}

fn default_smtp_timeout_secs() -> u64 {
    30
}

/// How the authoritative address is chosen when a change is detected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// First address in resolver order
    #[default]
    First,
    /// Numerically lowest address
    Lowest,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Overwrite multi-address state instead of reporting it as ambiguous
    #[serde(default)]
    pub update_mode: bool,

    /// Representative address selection
    #[serde(default)]
    pub tie_break: TieBreak,

    /// Maximum number of lookups in flight at once
    #[serde(default = "default_resolve_concurrency")]
    pub resolve_concurrency: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Period between checks in periodic mode; `None` runs once
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.resolve_concurrency == 0 {
            return Err(crate::Error::config("Resolve concurrency must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if let Some(interval) = self.interval_secs
            && interval < MIN_INTERVAL_SECS
        {
            return Err(crate::Error::config(format!(
                "Check interval must be at least {} seconds, got {}",
                MIN_INTERVAL_SECS, interval
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_mode: false,
            tie_break: TieBreak::default(),
            resolve_concurrency: default_resolve_concurrency(),
            event_channel_capacity: default_event_channel_capacity(),
            interval_secs: None,
        }
    }
}

fn default_resolve_concurrency() -> usize {
    4
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append log lines to this file in addition to stderr
    #[serde(default)]
    pub file: Option<String>,
}

impl LogConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(crate::Error::config(format!(
                "Log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            ))),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
