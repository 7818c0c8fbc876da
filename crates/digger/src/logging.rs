// Tracing setup: stderr always, plus an append-only log file when configured.

use anyhow::{Context, Result};
use digger_core::config::LogConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub fn init(config: &LogConfig) -> Result<()> {
    let level: LevelFilter = config
        .level
        .to_lowercase()
        .parse()
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(level)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to set tracing subscriber")?;

    Ok(())
}
