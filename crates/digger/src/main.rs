// # digger
//
// Watches the DNS addresses of third-party endpoints listed in a CSV
// catalog, records every change, and emails the people who maintain
// firewall rules for those endpoints.
//
// ## Modes
//
// - `digger` / `digger check`: resolve every site once, record and notify
//   changes, write the catalog back
// - `digger check --interval 300`: the same, every 300 seconds until
//   SIGINT/SIGTERM
// - `digger report`: print the change log
// - `digger count [HOSTNAME]`: print the number of recorded changes
//
// ## Configuration
//
// Defaults, then the YAML file (`--config`, or `./config.yaml` when it
// exists), then `DIGGER_*` environment variables, then command-line flags.
// Nested keys use a double underscore:
//
// ```bash
// DIGGER_CATALOG__PATH=/srv/digger/sites.csv \
// DIGGER_NOTIFIER__TYPE=log \
// digger --no-export
// ```
//
// ## Exit codes
//
// - 0: clean run
// - 1: configuration or setup error (nothing was checked)
// - 2: runtime error (catalog export or store flush failed)
// - 3: at least one site's change could not be persisted

mod cli;
mod logging;

use anyhow::{Context, Result, bail};
use cli::{CommandLine, Commands};
use digger_core::report::{change_report, count_changes};
use digger_core::{
    CatalogLock, DiggerConfig, DiggerEngine, EngineEvent, Error, LogNotifier, Notifier,
    NotifierConfig, RecordStore, RunSummary, open_store,
};
use digger_notify::SmtpNotifier;
use digger_resolver::DnsResolver;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum DiggerExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
    PersistenceFailure = 3,
}

impl From<DiggerExitCode> for ExitCode {
    fn from(code: DiggerExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = CommandLine::parse_args();

    let config = match load_config(cli.config.as_deref()) {
        Ok(mut config) => {
            cli.apply_overrides(&mut config);
            config
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DiggerExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        return DiggerExitCode::ConfigError.into();
    }

    if let Err(e) = logging::init(&config.log) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return DiggerExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            return DiggerExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match cli.command() {
            Commands::Check => run_check(&config, !cli.no_export).await,
            Commands::Report => run_report(&config).await,
            Commands::Count { hostname } => run_count(&config, hostname.as_deref()).await,
        }
    });

    code.into()
}

/// Layer defaults, the YAML file and `DIGGER_*` variables
///
/// An explicit `path` must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<DiggerConfig> {
    let file = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Configuration file {} not found", path.display());
            }
            path.to_path_buf()
        }
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };

    Figment::from(Serialized::defaults(DiggerConfig::default()))
        .merge(Yaml::file(&file))
        .merge(Env::prefixed("DIGGER_").split("__"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", file.display()))
}

async fn run_check(config: &DiggerConfig, export: bool) -> DiggerExitCode {
    let lock_path = config.catalog.lock_path();
    let _lock = match CatalogLock::acquire(&lock_path) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("{}", e);
            return DiggerExitCode::ConfigError;
        }
    };

    let store = match open_store(&config.store).await {
        Ok(store) => Arc::<dyn RecordStore>::from(store),
        Err(e) => {
            eprintln!("Failed to open record store: {}", e);
            return DiggerExitCode::ConfigError;
        }
    };

    let resolver = match DnsResolver::new(&config.resolver) {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            eprintln!("Failed to create resolver: {}", e);
            return DiggerExitCode::ConfigError;
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notifier {
        NotifierConfig::Smtp(smtp) => match SmtpNotifier::new(smtp) {
            Ok(notifier) => Arc::new(notifier),
            Err(e) => {
                eprintln!("Failed to create SMTP notifier: {}", e);
                return DiggerExitCode::ConfigError;
            }
        },
        NotifierConfig::Log => Arc::new(LogNotifier),
    };

    info!("Record store: {:?}", config.store);

    let (engine, events) =
        match DiggerEngine::new(resolver, store, notifier, config.engine.clone()) {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Failed to create engine: {}", e);
                return DiggerExitCode::ConfigError;
            }
        };
    let periodic = config.engine.interval_secs.is_some();
    let event_task = tokio::spawn(log_events(events, periodic));

    let catalog_path = PathBuf::from(&config.catalog.path);
    let code = match config.engine.interval_secs {
        Some(secs) => {
            match engine
                .run_periodic(&catalog_path, export, Duration::from_secs(secs), None)
                .await
            {
                Ok(totals) => finish(&totals),
                Err(e) => {
                    eprintln!("{}", e);
                    setup_or_runtime(&e)
                }
            }
        }
        None => run_once(&engine, &catalog_path, export).await,
    };

    drop(engine);
    let _ = event_task.await;
    code
}

async fn run_once(engine: &DiggerEngine, catalog_path: &Path, export: bool) -> DiggerExitCode {
    let sites = match engine.load_catalog(catalog_path).await {
        Ok(sites) => sites,
        Err(e) => {
            eprintln!("{}", e);
            return DiggerExitCode::ConfigError;
        }
    };

    match engine.check_catalog(sites, catalog_path, export).await {
        Ok(summary) => {
            print_failures(&summary);
            finish(&summary)
        }
        Err(e) => {
            eprintln!("Check cycle failed: {}", e);
            DiggerExitCode::RuntimeError
        }
    }
}

/// Catalog and configuration errors happen before any site is checked
fn setup_or_runtime(err: &Error) -> DiggerExitCode {
    match err {
        Error::Catalog(_) | Error::Config(_) => DiggerExitCode::ConfigError,
        _ => DiggerExitCode::RuntimeError,
    }
}

fn print_failures(summary: &RunSummary) {
    for failure in &summary.failures {
        eprintln!("{}", failure);
    }
}

fn finish(summary: &RunSummary) -> DiggerExitCode {
    if summary.has_persistence_failures() {
        warn!(
            "{} site(s) could not be persisted",
            summary.persistence_failures
        );
        DiggerExitCode::PersistenceFailure
    } else if summary.has_cycle_failures() {
        warn!("{} cycle(s) failed", summary.cycle_failures);
        DiggerExitCode::RuntimeError
    } else {
        DiggerExitCode::Success
    }
}

async fn run_report(config: &DiggerConfig) -> DiggerExitCode {
    let store = match open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open record store: {}", e);
            return DiggerExitCode::ConfigError;
        }
    };

    match change_report(store.as_ref()).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            DiggerExitCode::Success
        }
        Err(e) => {
            eprintln!("Failed to read change log: {}", e);
            DiggerExitCode::RuntimeError
        }
    }
}

async fn run_count(config: &DiggerConfig, hostname: Option<&str>) -> DiggerExitCode {
    let store = match open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open record store: {}", e);
            return DiggerExitCode::ConfigError;
        }
    };

    match count_changes(store.as_ref(), hostname).await {
        Ok(count) => {
            println!("{}", count);
            DiggerExitCode::Success
        }
        Err(e) => {
            eprintln!("Failed to count changes: {}", e);
            DiggerExitCode::RuntimeError
        }
    }
}

/// Log engine events until the engine is dropped
///
/// In periodic mode each cycle's per-site failures are printed here, since
/// the run only returns once it is stopped.
async fn log_events(mut events: mpsc::Receiver<EngineEvent>, print_cycle_failures: bool) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::RunCompleted { summary } if print_cycle_failures => {
                print_failures(&summary)
            }
            EngineEvent::SiteChanged {
                hostname,
                old_ips,
                new_ip,
                notified,
            } => info!(
                hostname = %hostname,
                old = %old_ips.join(";"),
                new = %new_ip,
                notified,
                "Site changed"
            ),
            EngineEvent::Stopped { reason } => info!("Engine stopped: {}", reason),
            other => debug!("Engine event: {:?}", other),
        }
    }
}
