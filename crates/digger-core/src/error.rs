//! Error types for the digger system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for digger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the digger system
#[derive(Error, Debug)]
pub enum Error {
    /// Hostname lookup failed (NXDOMAIN, timeout, network error)
    #[error("Resolution of {hostname} failed: {message}")]
    Resolution {
        /// Hostname that was being resolved
        hostname: String,
        /// Underlying cause
        message: String,
    },

    /// Lookup succeeded but nothing survived address-family filtering
    #[error("No IPv4 addresses found for {0}")]
    NoAddressesFound(String),

    /// Record store errors
    #[error("Record store error: {0}")]
    Store(String),

    /// An append-only key was written twice
    #[error("Change log key already exists: {0}")]
    KeyExists(String),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Site catalog errors (unreadable file, malformed rows)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Another process holds the catalog lock
    #[error("Catalog is locked by another process: {0}")]
    Locked(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding/decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a resolution error
    pub fn resolution(hostname: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            hostname: hostname.into(),
            message: message.into(),
        }
    }

    /// Create a "no addresses found" error
    pub fn no_addresses(hostname: impl Into<String>) -> Self {
        Self::NoAddressesFound(hostname.into())
    }

    /// Create a record store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a catalog error
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
