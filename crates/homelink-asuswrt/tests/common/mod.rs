#![allow(dead_code)]

use async_trait::async_trait;
use homelink_asuswrt::{RouterApi, RouterConfig, RouterConnector, Traffic};
use homelink_core::{Error, PollingConfig, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory router with call counters
#[derive(Default)]
pub struct FakeRouter {
    pub traffic_calls: AtomicUsize,
    pub nvram_calls: Mutex<Vec<String>>,
    pub offline: AtomicBool,
    pub nvram: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl FakeRouter {
    pub fn new() -> Arc<Self> {
        let mut groups = HashMap::new();
        groups.insert(
            "2G_WIFI".to_string(),
            fields(&[("wl0_bss_enabled", json!("1")), ("wl0_ssid", json!("home"))]),
        );
        groups.insert(
            "QOS".to_string(),
            fields(&[("qos_enable", json!("0")), ("qos_type", json!("1"))]),
        );
        groups.insert(
            "FIRMWARE".to_string(),
            fields(&[("buildno", json!("386")), ("firmver", json!("3.0.0.4"))]),
        );
        Arc::new(Self {
            nvram: Mutex::new(groups),
            ..Default::default()
        })
    }

    pub fn set_nvram(&self, group: &str, key: &str, value: Value) {
        self.nvram
            .lock()
            .unwrap()
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn nvram_calls(&self) -> Vec<String> {
        self.nvram_calls.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::transient("router did not answer"))
        } else {
            Ok(())
        }
    }
}

fn fields(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[async_trait]
impl RouterApi for FakeRouter {
    async fn traffic(&self) -> Result<Traffic> {
        self.traffic_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(Traffic {
            rx_bytes: 12_345_678_901,
            tx_bytes: 987_654_321,
            rx_rate: 1_250_000.0,
            tx_rate: 62_500.0,
        })
    }

    async fn nvram(&self, group: &str) -> Result<HashMap<String, Value>> {
        self.nvram_calls.lock().unwrap().push(group.to_string());
        self.check_online()?;
        Ok(self
            .nvram
            .lock()
            .unwrap()
            .get(group)
            .cloned()
            .unwrap_or_default())
    }
}

/// How the fake connector answers
#[derive(Clone, Copy)]
pub enum ConnectBehavior {
    Accept,
    Unreachable,
    BadCredentials,
}

/// Connector handing out one shared [`FakeRouter`]
pub struct FakeConnector {
    pub router: Arc<FakeRouter>,
    pub behavior: ConnectBehavior,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(router: Arc<FakeRouter>, behavior: ConnectBehavior) -> Arc<Self> {
        Arc::new(Self {
            router,
            behavior,
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouterConnector for FakeConnector {
    async fn connect(&self, config: &RouterConfig) -> Result<Arc<dyn RouterApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ConnectBehavior::Accept => Ok(self.router.clone()),
            ConnectBehavior::Unreachable => {
                Err(Error::connect(format!("{} is unreachable", config.host)))
            }
            ConnectBehavior::BadCredentials => Err(Error::auth("invalid username or password")),
        }
    }
}

pub fn polling() -> PollingConfig {
    PollingConfig {
        scan_interval_secs: 30,
        min_fetch_interval_secs: 10,
        request_timeout_secs: 5,
    }
}

pub fn router_section(sensors: &[&str]) -> Value {
    json!({
        "host": "192.168.1.1",
        "username": "admin",
        "password": "hunter2",
        "protocol": "https",
        "sensors": sensors,
    })
}
