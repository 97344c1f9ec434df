// # FitBark Integration
//
// This crate exposes the hourly activity of FitBark-tracked dogs as homelink
// sensors.
//
// ## Setup Paths
//
// - Legacy `fitbark:` section: registers a local OAuth2 implementation from
//   `client_id`/`client_secret` and, with `callback_base_url`, adds the
//   host's OAuth callback to the client's redirect URIs. Creates no entities.
// - Config entry: selects the implementation named by `auth_implementation`,
//   builds an API client from the stored token and creates one sensor per
//   dog in the user's relations.
//
// ## Architecture
//
// - The relation list is read through a throttled fetcher (30 s minimum)
// - Each dog sensor reads its own dog record through its own fetcher
// - Token refresh happens inside the client, 20 s before expiry
//
// ## Security Requirements
//
// - Client secret and tokens NEVER appear in logs or Debug output
// - Redirect URI registration failures are logged, never fatal

pub mod client;
pub mod oauth;
pub mod redirect;
pub mod sensors;

use async_trait::async_trait;
use homelink_core::{
    ConfigEntry, Entity, Error, Integration, IntegrationContext, IntegrationFactory,
    IntegrationRegistry, PollingConfig, Result, SnapshotSource,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

pub use client::{ApiBuilder, FitbarkApi, FitbarkClient, HttpApiBuilder};
pub use oauth::{OAuth2Implementation, OAuth2Session, OAuthToken, TokenSession};
pub use redirect::RedirectUriRegistrar;
pub use sensors::{DogRelationsSource, DogSource};

/// Integration domain
pub const DOMAIN: &str = "fitbark";

/// Config entry key naming the OAuth2 implementation
pub const AUTH_IMPLEMENTATION: &str = "auth_implementation";

/// Minimum interval between two reads of the same FitBark resource
pub const MIN_FETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Title of config entries created by the flow
pub const ENTRY_TITLE: &str = "FitBark";

type KennelContext = IntegrationContext<dyn FitbarkApi>;

#[derive(Deserialize)]
struct LegacySection {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    callback_base_url: Option<String>,
}

#[derive(Deserialize)]
struct EntryData {
    auth_implementation: String,
    token: OAuthToken,
}

/// FitBark integration
pub struct FitbarkIntegration {
    polling: PollingConfig,
    builder: Arc<dyn ApiBuilder>,
    implementations: RwLock<HashMap<String, OAuth2Implementation>>,
    contexts: Mutex<HashMap<String, Arc<KennelContext>>>,
}

impl FitbarkIntegration {
    /// Create the integration with the bundled HTTP client
    pub fn new(polling: PollingConfig) -> Self {
        let builder = Arc::new(HttpApiBuilder::new(polling.request_timeout()));
        Self::with_builder(polling, builder)
    }

    /// Create the integration with a custom API builder
    pub fn with_builder(polling: PollingConfig, builder: Arc<dyn ApiBuilder>) -> Self {
        Self {
            polling,
            builder,
            implementations: RwLock::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Make an OAuth2 implementation available to config entries
    pub fn register_implementation(&self, implementation: OAuth2Implementation) {
        let name = implementation.name().to_string();
        let previous = self
            .implementations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), implementation);
        if previous.is_some() {
            tracing::warn!("Replacing FitBark OAuth2 implementation '{}'", name);
        }
    }

    /// Implementation registered under `name`
    pub fn implementation(&self, name: &str) -> Option<OAuth2Implementation> {
        self.implementations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
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

    async fn register_callback(&self, implementation: OAuth2Implementation, base_url: &str) {
        let http = match reqwest::Client::builder()
            .timeout(self.polling.request_timeout())
            .build()
        {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!("Cannot register FitBark redirect URL: {}", e);
                return;
            }
        };

        let registrar = RedirectUriRegistrar::new(implementation, http, base_url);
        match registrar.add_callback_url().await {
            Ok(true) => tracing::info!("Registered FitBark redirect URL {}", registrar.callback_url()),
            Ok(false) => tracing::debug!(
                "FitBark redirect URL {} already registered",
                registrar.callback_url()
            ),
            Err(e) => tracing::warn!(
                "Cannot register FitBark redirect URL {}: {}",
                registrar.callback_url(),
                e
            ),
        }
    }
}

impl std::fmt::Debug for FitbarkIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitbarkIntegration")
            .field("loaded_entries", &self.loaded_entries())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Integration for FitbarkIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    async fn setup(&self, section: &Value) -> Result<Vec<Arc<dyn Entity>>> {
        let section = LegacySection::deserialize(section)
            .map_err(|e| Error::config(format!("invalid fitbark configuration: {}", e)))?;
        if section.client_id.is_empty() || section.client_secret.is_empty() {
            return Err(Error::config("fitbark client_id and client_secret are required"));
        }

        let implementation =
            OAuth2Implementation::local(DOMAIN, section.client_id, section.client_secret);
        if let Some(base_url) = section.callback_base_url.as_deref() {
            self.register_callback(implementation.clone(), base_url).await;
        }
        self.register_implementation(implementation);

        Ok(Vec::new())
    }

    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<Vec<Arc<dyn Entity>>> {
        let data = EntryData::deserialize(&entry.data)
            .map_err(|e| Error::config(format!("invalid fitbark entry data: {}", e)))?;
        let implementation = self.implementation(&data.auth_implementation).ok_or_else(|| {
            Error::config(format!(
                "no OAuth2 implementation registered as '{}'",
                data.auth_implementation
            ))
        })?;

        let api = self.builder.build(implementation, data.token)?;
        let context = Arc::new(
            KennelContext::new(DOMAIN, entry.entry_id.as_str(), api, self.polling.clone())
                .with_min_fetch_interval(MIN_FETCH_INTERVAL),
        );

        let relations = context
            .fetcher(sensors::RELATIONS_FETCHER, |api| {
                Arc::new(DogRelationsSource::new(Arc::clone(api))) as Arc<dyn SnapshotSource>
            })
            .fetch()
            .await
            .inspect_err(|e| tracing::warn!("Cannot update FitBark dogs: {}", e))?;

        let entities: Vec<Arc<dyn Entity>> = sensors::dogs_in(&relations)
            .into_iter()
            .map(|dog| {
                let key = format!("dog:{}", dog.slug);
                let slug = dog.slug.clone();
                let sensor = context.sensor(
                    &key,
                    sensors::descriptor(&dog),
                    sensors::unique_id(&dog.slug),
                    |api| Arc::new(DogSource::new(Arc::clone(api), slug)) as Arc<dyn SnapshotSource>,
                );
                Arc::new(sensor) as Arc<dyn Entity>
            })
            .collect();

        tracing::info!(
            "FitBark entry {} set up with {} dogs",
            entry.entry_id,
            entities.len()
        );
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.entry_id.clone(), context);
        Ok(entities)
    }

    async fn unload_entry(&self, entry_id: &str) -> Result<()> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entry_id);
        Ok(())
    }

    fn migrate_entry_data(&self, data: &mut Value) -> bool {
        match data.as_object_mut() {
            Some(map) if !map.contains_key(AUTH_IMPLEMENTATION) => {
                map.insert(AUTH_IMPLEMENTATION.to_string(), Value::from(DOMAIN));
                true
            }
            _ => false,
        }
    }

    async fn validate_input(&self, data: &Value) -> Result<String> {
        let token = data
            .get("token")
            .ok_or_else(|| Error::auth("no OAuth2 token was provided"))?;
        OAuthToken::deserialize(token)
            .map_err(|e| Error::auth(format!("OAuth2 token is invalid: {}", e)))?;
        Ok(ENTRY_TITLE.to_string())
    }
}

/// Factory for the FitBark integration
pub struct FitbarkFactory;

impl IntegrationFactory for FitbarkFactory {
    fn create(&self, polling: &PollingConfig) -> Result<Box<dyn Integration>> {
        Ok(Box::new(FitbarkIntegration::new(polling.clone())))
    }
}

/// Register the FitBark integration with a registry
pub fn register(registry: &IntegrationRegistry) {
    registry.register(DOMAIN, Box::new(FitbarkFactory));
}
