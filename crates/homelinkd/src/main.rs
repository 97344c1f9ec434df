// # homelinkd - Integration Host Daemon
//
// This daemon is a THIN host layer:
// - DO NOT add integration logic, projection logic, or retry logic here
// - All polling and lifecycle logic lives in homelink-core
// - Configuration is via environment variables plus an optional JSON document
//
// The homelinkd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering integrations
// 4. Setting up legacy sections and stored config entries
// 5. Running the polling engine until SIGTERM/SIGINT, then tearing down
//
// ## Configuration
//
// ### Host
// - `HOMELINK_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `HOMELINK_CONFIG_PATH`: JSON document with one section per domain (optional)
//
// ### Entry Store
// - `HOMELINK_ENTRY_STORE_TYPE`: file or memory (default file)
// - `HOMELINK_ENTRY_STORE_PATH`: Path to the entries file (for file store)
//
// ### Polling
// - `HOMELINK_SCAN_INTERVAL_SECS`: Seconds between ticks (default 30)
// - `HOMELINK_MIN_FETCH_INTERVAL_SECS`: Minimum seconds between reads of one source (default 10)
// - `HOMELINK_REQUEST_TIMEOUT_SECS`: Upper bound of one remote read (default 10)
//
// ## Example
//
// ```bash
// cat > /etc/homelink/config.json <<'EOF'
// {"asuswrt": {"host": "192.168.1.1", "username": "admin", "password": "...",
//              "sensors": ["download_speed", "2g_wifi"]}}
// EOF
// export HOMELINK_CONFIG_PATH=/etc/homelink/config.json
// export HOMELINK_ENTRY_STORE_PATH=/var/lib/homelink/entries.json
//
// homelinkd
// ```

use anyhow::{Context, Result};
use homelink_core::{
    ConfigEntrySetup, EngineConfig, EngineEvent, EntryStoreConfig, HostConfig, Integration,
    IntegrationRegistry, LegacyConfig, Lifecycle, PollingConfig, PollingEngine,
};
use serde_json::Value;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound for tearing down every integration after shutdown
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum HomelinkExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<HomelinkExitCode> for ExitCode {
    fn from(code: HomelinkExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    log_level: String,
    config_path: Option<PathBuf>,
    entry_store_type: String,
    entry_store_path: Option<PathBuf>,
    scan_interval_secs: Option<u64>,
    min_fetch_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let seconds = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a whole number of seconds, got '{}'", key, raw))
                })
                .transpose()
        };

        Ok(Self {
            log_level: lookup("HOMELINK_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            config_path: lookup("HOMELINK_CONFIG_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            entry_store_type: lookup("HOMELINK_ENTRY_STORE_TYPE")
                .unwrap_or_else(|| "file".to_string()),
            entry_store_path: lookup("HOMELINK_ENTRY_STORE_PATH").map(PathBuf::from),
            scan_interval_secs: seconds("HOMELINK_SCAN_INTERVAL_SECS")?,
            min_fetch_interval_secs: seconds("HOMELINK_MIN_FETCH_INTERVAL_SECS")?,
            request_timeout_secs: seconds("HOMELINK_REQUEST_TIMEOUT_SECS")?,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "HOMELINK_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        match self.entry_store_type.as_str() {
            "file" => match &self.entry_store_path {
                None => anyhow::bail!(
                    "HOMELINK_ENTRY_STORE_PATH is required when HOMELINK_ENTRY_STORE_TYPE=file. \
                    Set it via: export HOMELINK_ENTRY_STORE_PATH=/var/lib/homelink/entries.json"
                ),
                Some(path) if path.as_os_str().is_empty() => anyhow::bail!(
                    "HOMELINK_ENTRY_STORE_PATH cannot be empty when HOMELINK_ENTRY_STORE_TYPE=file"
                ),
                Some(path) => {
                    if let Some(parent) = path.parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "HOMELINK_ENTRY_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
            },
            "memory" => {}
            other => anyhow::bail!(
                "HOMELINK_ENTRY_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        if let Some(path) = &self.config_path
            && !path.is_file()
        {
            anyhow::bail!("HOMELINK_CONFIG_PATH does not exist: {}", path.display());
        }

        self.host_config().validate()?;
        Ok(())
    }

    /// Host settings for homelink-core
    fn host_config(&self) -> HostConfig {
        let defaults = PollingConfig::default();
        let entry_store = match (self.entry_store_type.as_str(), &self.entry_store_path) {
            ("file", Some(path)) => EntryStoreConfig::File {
                path: path.to_string_lossy().into_owned(),
            },
            _ => EntryStoreConfig::Memory,
        };

        HostConfig {
            polling: PollingConfig {
                scan_interval_secs: self.scan_interval_secs.unwrap_or(defaults.scan_interval_secs),
                min_fetch_interval_secs: self
                    .min_fetch_interval_secs
                    .unwrap_or(defaults.min_fetch_interval_secs),
                request_timeout_secs: self
                    .request_timeout_secs
                    .unwrap_or(defaults.request_timeout_secs),
            },
            engine: EngineConfig::default(),
            entry_store,
        }
    }

    /// Root document handed to legacy setups
    fn load_document(&self) -> Result<Value> {
        let Some(path) = &self.config_path else {
            return Ok(Value::Object(Default::default()));
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let document: Value = serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        if !document.is_object() {
            anyhow::bail!("{} must contain a JSON object", path.display());
        }
        Ok(document)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return HomelinkExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return HomelinkExitCode::ConfigError.into();
    }

    let document = match config.load_document() {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return HomelinkExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HomelinkExitCode::ConfigError.into();
    }

    info!("Starting homelinkd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HomelinkExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config.host_config(), document).await {
            error!("Daemon error: {:#}", e);
            HomelinkExitCode::RuntimeError
        } else {
            HomelinkExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Register every integration compiled into this build
fn register_integrations(registry: &IntegrationRegistry) {
    #[cfg(feature = "asuswrt")]
    {
        info!("Registering ASUSWRT integration");
        homelink_asuswrt::register(registry);
    }

    #[cfg(feature = "fitbark")]
    {
        info!("Registering FitBark integration");
        homelink_fitbark::register(registry);
    }

    if registry.list().is_empty() {
        warn!("No integrations compiled in, the engine will idle");
    }
}

/// One integration with the lifecycles set up for it
struct Hosted {
    integration: Box<dyn Integration>,
    lifecycles: Vec<Box<dyn Lifecycle>>,
}

/// Run the daemon
async fn run_daemon(host: HostConfig, document: Value) -> Result<()> {
    let registry = IntegrationRegistry::new();
    register_integrations(&registry);

    let store = homelink_core::open_entry_store(&host.entry_store).await?;
    let (engine, mut events) = PollingEngine::new(&host.polling, &host.engine)?;
    let engine = engine.with_entry_store(Arc::clone(&store));

    for entry_id in store.list_entries().await? {
        let Some(entry) = store.get_entry(&entry_id).await? else {
            continue;
        };
        if !registry.has(&entry.domain) {
            warn!(
                "Config entry {} belongs to unknown integration '{}', skipping",
                entry.entry_id, entry.domain
            );
        }
    }

    let mut hosted = Vec::new();
    for domain in registry.list() {
        let integration = registry.create(&domain, &host.polling)?;
        let mut lifecycles: Vec<Box<dyn Lifecycle>> = Vec::new();

        // Legacy sections first: they may register what entries depend on
        if document.get(&domain).is_some() {
            let legacy = LegacyConfig::new(document.clone());
            if legacy.initialize(integration.as_ref(), &engine).await {
                lifecycles.push(Box::new(legacy));
            } else {
                error!("Legacy setup of {} failed", domain);
            }
        }

        for entry in store.entries_for_domain(&domain).await? {
            let entry_id = entry.entry_id.clone();
            let setup = ConfigEntrySetup::new(entry).with_store(Arc::clone(&store));
            if setup.initialize(integration.as_ref(), &engine).await {
                lifecycles.push(Box::new(setup));
            } else {
                error!("Setup of {} entry {} failed", domain, entry_id);
            }
        }

        hosted.push(Hosted {
            integration,
            lifecycles,
        });
    }

    info!(
        "Daemon initialized with {} entities",
        engine.entity_count().await
    );

    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::EntityStale {
                    unique_id,
                    class,
                    error,
                } => warn!("{} is stale ({}): {}", unique_id, class, error),
                other => tracing::debug!("Engine event: {:?}", other),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let signal_wait = async {
        let outcome = wait_for_shutdown().await;
        let _ = shutdown_tx.send(());
        outcome
    };
    let (engine_result, signal_result) =
        tokio::join!(engine.run_with_shutdown(Some(shutdown_rx)), signal_wait);

    match signal_result {
        Ok(signal) => info!("Received shutdown signal: {}", signal),
        Err(e) => error!("Shutdown error: {}", e),
    }

    let teardown = async {
        for hosted in hosted.iter().rev() {
            for lifecycle in hosted.lifecycles.iter().rev() {
                if !lifecycle.teardown(hosted.integration.as_ref(), &engine).await {
                    warn!("Teardown of {} did not complete", hosted.integration.domain());
                }
            }
        }
    };
    if tokio::time::timeout(TEARDOWN_TIMEOUT, teardown).await.is_err() {
        warn!("Teardown timed out after {:?}", TEARDOWN_TIMEOUT);
    }

    drop(engine);
    if let Err(e) = event_log.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    engine_result?;
    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
