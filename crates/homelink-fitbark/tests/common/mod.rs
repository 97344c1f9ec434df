#![allow(dead_code)]

use async_trait::async_trait;
use homelink_core::{Error, PollingConfig, Result};
use homelink_fitbark::{ApiBuilder, FitbarkApi, OAuth2Implementation, OAuthToken};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory FitBark account
pub struct FakeKennel {
    pub dogs: Mutex<HashMap<String, Value>>,
    pub relation_calls: AtomicUsize,
    pub dog_calls: AtomicUsize,
    pub revoked: AtomicBool,
}

impl FakeKennel {
    pub fn new() -> Arc<Self> {
        let mut dogs = HashMap::new();
        dogs.insert(
            "rex-the-dog".to_string(),
            json!({
                "slug": "rex-the-dog",
                "name": "Rex",
                "hourly_average": 42,
                "bluetooth_id": "00:11",
                "medical_conditions": [{"id": 1, "name": "Arthritis"}],
            }),
        );
        dogs.insert(
            "fido".to_string(),
            json!({
                "slug": "fido",
                "name": "Fido",
                "hourly_average": 7.9,
                "zip": "75001",
            }),
        );
        Arc::new(Self {
            dogs: Mutex::new(dogs),
            relation_calls: AtomicUsize::new(0),
            dog_calls: AtomicUsize::new(0),
            revoked: AtomicBool::new(false),
        })
    }

    pub fn set_activity(&self, slug: &str, average: i64) {
        if let Some(dog) = self.dogs.lock().unwrap().get_mut(slug) {
            dog["hourly_average"] = json!(average);
        }
    }

    /// Drop `hourly_average` and move the dog to `zip`
    pub fn lose_activity(&self, slug: &str, zip: &str) {
        if let Some(Value::Object(dog)) = self.dogs.lock().unwrap().get_mut(slug) {
            dog.remove("hourly_average");
            dog.insert("zip".to_string(), json!(zip));
            dog.insert("weight".to_string(), json!(31));
        }
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    fn check_token(&self) -> Result<()> {
        if self.revoked.load(Ordering::SeqCst) {
            Err(Error::auth("refresh token was revoked"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FitbarkApi for FakeKennel {
    async fn dog_relations(&self) -> Result<Vec<Value>> {
        self.relation_calls.fetch_add(1, Ordering::SeqCst);
        self.check_token()?;
        let mut slugs: Vec<String> = self.dogs.lock().unwrap().keys().cloned().collect();
        slugs.sort();
        Ok(slugs
            .into_iter()
            .map(|slug| json!({"status": "OWNER", "dog": {"slug": slug}}))
            .collect())
    }

    async fn dog(&self, slug: &str) -> Result<Map<String, Value>> {
        self.dog_calls.fetch_add(1, Ordering::SeqCst);
        self.check_token()?;
        match self.dogs.lock().unwrap().get(slug) {
            Some(Value::Object(dog)) => Ok(dog.clone()),
            _ => Err(Error::not_found(format!("dog {}", slug))),
        }
    }
}

/// Hands out one shared kennel and records what it was built with
pub struct FakeBuilder {
    pub kennel: Arc<FakeKennel>,
    pub built_with: Mutex<Vec<(String, String)>>,
}

impl FakeBuilder {
    pub fn new(kennel: Arc<FakeKennel>) -> Arc<Self> {
        Arc::new(Self {
            kennel,
            built_with: Mutex::new(Vec::new()),
        })
    }

    /// `(implementation name, access token)` pairs
    pub fn built_with(&self) -> Vec<(String, String)> {
        self.built_with.lock().unwrap().clone()
    }
}

impl ApiBuilder for FakeBuilder {
    fn build(
        &self,
        implementation: OAuth2Implementation,
        token: OAuthToken,
    ) -> Result<Arc<dyn FitbarkApi>> {
        self.built_with
            .lock()
            .unwrap()
            .push((implementation.name().to_string(), token.access_token));
        Ok(self.kennel.clone())
    }
}

pub fn polling() -> PollingConfig {
    PollingConfig {
        scan_interval_secs: 30,
        min_fetch_interval_secs: 10,
        request_timeout_secs: 5,
    }
}

pub fn entry_data() -> Value {
    json!({
        "token": {
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_at": 4_102_444_800.0,
            "token_type": "Bearer",
        }
    })
}
