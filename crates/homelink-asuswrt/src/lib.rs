// # ASUSWRT Router Integration
//
// This crate exposes an ASUSWRT router's traffic counters and NVRAM settings
// as homelink sensors.
//
// ## Implementation Status
//
// - ✅ Legacy `asuswrt:` section and config entry setup
// - ✅ Exclusive secret group (password | ssh_key | pub_key)
// - ✅ Web API login (`login.cgi`) and reads (`appGet.cgi`)
// - ✅ One traffic fetch shared by the four traffic sensors
// - ✅ One NVRAM fetch per group per throttle window
// - ✅ Config flow validation with a real login
// - ❌ NO ssh/telnet transport (the connector answers a connect error)
// - ❌ NO device tracker platform
// - ❌ NO retry logic (a failed fetch waits for the next tick)
// - ❌ NO background tasks (violates shutdown determinism)
//
// ## Trust Level: Untrusted (Integration)
//
// **Allowed Capabilities**:
// - ✅ Talk to the configured router only
// - ✅ Build sensors from its own context
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Access other integrations' contexts
// - ❌ Make scheduling decisions (owned by PollingEngine)
//
// ## Security Requirements
//
// - The router password NEVER appears in logs or Debug output
// - Setup fails closed: no connection, no entities

pub mod api;
pub mod config;
pub mod sensors;

use async_trait::async_trait;
use homelink_core::{
    ConfigEntry, Entity, Integration, IntegrationContext, IntegrationFactory, IntegrationRegistry,
    PollingConfig, Result, SnapshotSource,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub use api::{HttpConnector, HttpRouterApi, RouterApi, RouterConnector, Traffic};
pub use config::{DOMAIN, Mode, Protocol, RouterConfig, Secret, SensorKind};
pub use sensors::{NvramSource, TrafficSource};

type RouterContext = IntegrationContext<dyn RouterApi>;

/// ASUSWRT integration
///
/// Holds one [`IntegrationContext`] per set-up entry (keyed by entry id, or
/// by the domain for the legacy section).
pub struct AsusWrtIntegration {
    polling: PollingConfig,
    connector: Arc<dyn RouterConnector>,
    contexts: Mutex<HashMap<String, Arc<RouterContext>>>,
}

impl AsusWrtIntegration {
    /// Create the integration with the bundled web connector
    pub fn new(polling: PollingConfig) -> Self {
        let connector = Arc::new(HttpConnector::new(polling.request_timeout()));
        Self::with_connector(polling, connector)
    }

    /// Create the integration with a custom connector
    pub fn with_connector(polling: PollingConfig, connector: Arc<dyn RouterConnector>) -> Self {
        Self {
            polling,
            connector,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Entry ids with a live context
    pub fn loaded_entries(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Connect and build the configured sensors under `owner`
    async fn load(&self, owner: &str, config: RouterConfig) -> Result<Vec<Arc<dyn Entity>>> {
        let api = self.connector.connect(&config).await.inspect_err(|e| {
            tracing::error!("Unable to set up asuswrt router {}: {}", config.host, e);
        })?;

        if config.mode == Mode::Ap {
            tracing::debug!("Router {} runs in access point mode", config.host);
        }

        let context = Arc::new(RouterContext::new(
            DOMAIN,
            owner,
            api,
            self.polling.clone(),
        ));

        let entities: Vec<Arc<dyn Entity>> = config
            .sensors
            .iter()
            .map(|&kind| {
                let descriptor = sensors::descriptor(kind);
                let unique_id = sensors::unique_id(&config.host, kind);
                let sensor = match kind.nvram_group() {
                    None => context.sensor(sensors::TRAFFIC_FETCHER, descriptor, unique_id, |api| {
                        Arc::new(TrafficSource::new(Arc::clone(api))) as Arc<dyn SnapshotSource>
                    }),
                    Some(group) => {
                        let key = format!("nvram:{}", group);
                        context.sensor(&key, descriptor, unique_id, |api| {
                            Arc::new(NvramSource::new(Arc::clone(api), group)) as Arc<dyn SnapshotSource>
                        })
                    }
                };
                Arc::new(sensor) as Arc<dyn Entity>
            })
            .collect();

        tracing::info!(
            "Router {} set up with {} sensors over {} fetchers",
            config.host,
            entities.len(),
            context.fetcher_count()
        );

        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner.to_string(), context);
        Ok(entities)
    }
}

impl std::fmt::Debug for AsusWrtIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsusWrtIntegration")
            .field("loaded_entries", &self.loaded_entries())
            .finish()
    }
}

#[async_trait]
impl Integration for AsusWrtIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    async fn setup(&self, section: &Value) -> Result<Vec<Arc<dyn Entity>>> {
        let config = RouterConfig::from_value(section)?;
        self.load(DOMAIN, config).await
    }

    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<Vec<Arc<dyn Entity>>> {
        let config = RouterConfig::from_value(&entry.data)?;
        self.load(&entry.entry_id, config).await
    }

    async fn unload_entry(&self, entry_id: &str) -> Result<()> {
        let removed = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entry_id);
        if removed.is_none() {
            tracing::debug!("No asuswrt context loaded for {}", entry_id);
        }
        Ok(())
    }

    async fn validate_input(&self, data: &Value) -> Result<String> {
        let config = RouterConfig::from_value(data)?;
        self.connector.connect(&config).await?;
        Ok(format!("Asuswrt {}", config.host))
    }
}

/// Factory for the ASUSWRT integration
pub struct AsusWrtFactory;

impl IntegrationFactory for AsusWrtFactory {
    fn create(&self, polling: &PollingConfig) -> Result<Box<dyn Integration>> {
        Ok(Box::new(AsusWrtIntegration::new(polling.clone())))
    }
}

/// Register the ASUSWRT integration with a registry
pub fn register(registry: &IntegrationRegistry) {
    registry.register(DOMAIN, Box::new(AsusWrtFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_under_its_domain() {
        let registry = IntegrationRegistry::new();
        register(&registry);
        assert!(registry.has("asuswrt"));

        let integration = registry
            .create("asuswrt", &PollingConfig::default())
            .unwrap();
        assert_eq!(integration.domain(), "asuswrt");
    }
}
