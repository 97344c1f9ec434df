// # Router API
//
// Vendor boundary of the ASUSWRT integration.
//
// ## Trust Level: Untrusted (Vendor Client)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS calls to the configured router only
// - ✅ Keep the login token and the previous traffic sample
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Retry beyond a single re-login on an expired session
// - ❌ Make scheduling decisions (owned by PollingEngine)
//
// ## Web API Reference
//
// - Login: POST `/login.cgi` with `login_authorization=base64(user:pass)`,
//   answers `{"asus_token": "..."}`
// - Reads: POST `/appGet.cgi` with `hook=nvram_get(key);...`, cookie
//   `asus_token=...`, answers a JSON object
// - Traffic: hook `netdev(appobj)`, answers hex byte counters under
//   `netdev.INTERNET_rx` / `netdev.INTERNET_tx`

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use homelink_core::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{Protocol, RouterConfig, Secret};

/// Header the router firmware expects from its companion app
const USER_AGENT: &str = "asusrouter-Android-DUTUtil-1.0.0.245";

/// NVRAM keys read for each sensor group
const NVRAM_GROUPS: &[(&str, &[&str])] = &[
    ("DHCP", &["dhcp_dns1_x", "dhcp_dns2_x", "dhcp_enable_x", "dhcp_start", "dhcp_end", "dhcp_lease"]),
    ("MODEL", &["model"]),
    ("QOS", &["qos_ack", "qos_atc", "qos_enable", "qos_ibw", "qos_obw", "qos_type"]),
    ("REBOOT", &["reboot_schedule", "reboot_schedule_enable"]),
    ("WLAN", &["wan_dns", "wan_gateway", "wan_ipaddr", "wan_lease", "wan_netmask", "wan_proto"]),
    ("2G_WIFI", &["wl0_bss_enabled", "wl0_chanspec", "wl0_closed", "wl0_ssid", "wl0_auth_mode_x"]),
    ("2G_GUEST_1", &["wl0.1_bss_enabled", "wl0.1_lanaccess", "wl0.1_closed", "wl0.1_ssid", "wl0.1_auth_mode_x"]),
    ("2G_GUEST_2", &["wl0.2_bss_enabled", "wl0.2_lanaccess", "wl0.2_closed", "wl0.2_ssid", "wl0.2_auth_mode_x"]),
    ("2G_GUEST_3", &["wl0.3_bss_enabled", "wl0.3_lanaccess", "wl0.3_closed", "wl0.3_ssid", "wl0.3_auth_mode_x"]),
    ("5G_WIFI", &["wl1_bss_enabled", "wl1_chanspec", "wl1_closed", "wl1_ssid", "wl1_auth_mode_x"]),
    ("5G_GUEST_1", &["wl1.1_bss_enabled", "wl1.1_lanaccess", "wl1.1_closed", "wl1.1_ssid", "wl1.1_auth_mode_x"]),
    ("5G_GUEST_2", &["wl1.2_bss_enabled", "wl1.2_lanaccess", "wl1.2_closed", "wl1.2_ssid", "wl1.2_auth_mode_x"]),
    ("5G_GUEST_3", &["wl1.3_bss_enabled", "wl1.3_lanaccess", "wl1.3_closed", "wl1.3_ssid", "wl1.3_auth_mode_x"]),
    ("FIRMWARE", &["firmver", "buildno", "extendno"]),
];

/// Keys read for an NVRAM group, if the group exists
pub fn nvram_keys(group: &str) -> Option<&'static [&'static str]> {
    NVRAM_GROUPS
        .iter()
        .find(|(name, _)| *name == group)
        .map(|(_, keys)| *keys)
}

/// WAN traffic at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Traffic {
    /// Bytes received since the router booted
    pub rx_bytes: u64,
    /// Bytes sent since the router booted
    pub tx_bytes: u64,
    /// Download rate in bytes per second
    pub rx_rate: f64,
    /// Upload rate in bytes per second
    pub tx_rate: f64,
}

/// Authenticated session with one router
///
/// Implementations answer one request at a time per router.
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// WAN counters and rates from a single counter read
    ///
    /// The first read of a session reports zero rates.
    async fn traffic(&self) -> Result<Traffic>;

    /// Key/value pairs of an NVRAM group (e.g. `"2G_WIFI"`)
    async fn nvram(&self, group: &str) -> Result<HashMap<String, Value>>;
}

/// Opens router sessions
#[async_trait]
pub trait RouterConnector: Send + Sync {
    /// Connect and log in
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`]: Router unreachable or transport unsupported
    /// - [`Error::Authentication`]: Credentials rejected
    async fn connect(&self, config: &RouterConfig) -> Result<Arc<dyn RouterApi>>;
}

/// Connector for the router web interface (http/https with a password)
#[derive(Debug, Clone)]
pub struct HttpConnector {
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl RouterConnector for HttpConnector {
    async fn connect(&self, config: &RouterConfig) -> Result<Arc<dyn RouterApi>> {
        if !config.protocol.is_web() {
            return Err(Error::connect(format!(
                "protocol {} is not supported by the web connector, use http or https",
                config.protocol
            )));
        }
        let password = match &config.secret {
            Secret::Password(password) => password.clone(),
            Secret::KeyFile(_) => {
                return Err(Error::connect(
                    "key file credentials need an SSH transport, use a password with http or https",
                ));
            }
        };

        let api = HttpRouterApi::new(config, password, self.request_timeout)?;
        api.login().await?;
        tracing::info!(
            "Logged in to router {} over {}",
            config.host,
            config.protocol
        );
        Ok(Arc::new(api))
    }
}

#[derive(Debug, Clone, Copy)]
struct TrafficSample {
    rx: u64,
    tx: u64,
    taken_at: Instant,
}

#[derive(Default)]
struct Session {
    token: Option<String>,
    last_sample: Option<TrafficSample>,
}

/// Router web API client
///
/// # Security
///
/// The Debug implementation does NOT expose the password or the session token.
pub struct HttpRouterApi {
    client: reqwest::Client,
    base_url: String,
    username: String,
    /// ⚠️ NEVER log this value
    password: String,
    // Held for the whole request, so one request is in flight per router
    session: Mutex<Session>,
}

impl std::fmt::Debug for HttpRouterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRouterApi")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl HttpRouterApi {
    /// Build a client without logging in
    pub fn new(config: &RouterConfig, password: String, request_timeout: Duration) -> Result<Self> {
        let scheme = match config.protocol {
            Protocol::Https => "https",
            _ => "http",
        };
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::connect(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}://{}:{}", scheme, config.host, config.port),
            username: config.username.clone(),
            password,
            session: Mutex::new(Session::default()),
        })
    }

    /// Log in and keep the session token
    pub async fn login(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.token = Some(self.request_token().await?);
        Ok(())
    }

    async fn request_token(&self) -> Result<String> {
        let credentials = BASE64.encode(format!("{}:{}", self.username, self.password));
        let response = self
            .client
            .post(format!("{}/login.cgi", self.base_url))
            .header(reqwest::header::REFERER, format!("{}/Main_Login.asp", self.base_url))
            .form(&[("login_authorization", credentials.as_str())])
            .send()
            .await
            .map_err(|e| Error::connect(format!("Router login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("asuswrt", status.as_u16(), &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::malformed(format!("Router login answer is not JSON: {}", e)))?;

        body.get("asus_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::auth("router rejected the login (no asus_token in answer)"))
    }

    /// Run one `appGet.cgi` hook, logging in again once if the session expired
    async fn app_get(&self, hook: &str) -> Result<Map<String, Value>> {
        let mut session = self.session.lock().await;

        for attempt in 0..2 {
            let token = match &session.token {
                Some(token) => token.clone(),
                None => {
                    let token = self.request_token().await?;
                    session.token = Some(token.clone());
                    token
                }
            };

            let response = self
                .client
                .post(format!("{}/appGet.cgi", self.base_url))
                .header(reqwest::header::COOKIE, format!("asus_token={}", token))
                .form(&[("hook", hook)])
                .send()
                .await
                .map_err(|e| Error::transient(format!("Router request failed: {}", e)))?;

            let status = response.status();
            if matches!(status.as_u16(), 401 | 403) && attempt == 0 {
                tracing::debug!("Router session expired, logging in again");
                session.token = None;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::from_status("asuswrt", status.as_u16(), &body));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| Error::malformed(format!("Router answer is not JSON: {}", e)))?;
            return match body {
                Value::Object(map) => Ok(map),
                other => Err(Error::malformed(format!(
                    "Router answered {} where an object was expected",
                    other
                ))),
            };
        }

        Err(Error::auth("router rejected the session after a fresh login"))
    }

    async fn traffic_counters(&self) -> Result<(u64, u64)> {
        let body = self.app_get("netdev(appobj)").await?;
        let netdev = body
            .get("netdev")
            .ok_or_else(|| Error::malformed("Router answer has no netdev section"))?;
        Ok((
            hex_counter(netdev, "INTERNET_rx")?,
            hex_counter(netdev, "INTERNET_tx")?,
        ))
    }
}

#[async_trait]
impl RouterApi for HttpRouterApi {
    async fn traffic(&self) -> Result<Traffic> {
        let (rx, tx) = self.traffic_counters().await?;
        let sample = TrafficSample {
            rx,
            tx,
            taken_at: Instant::now(),
        };

        let mut session = self.session.lock().await;
        Ok(record_sample(&mut session.last_sample, sample))
    }

    async fn nvram(&self, group: &str) -> Result<HashMap<String, Value>> {
        let keys = nvram_keys(group)
            .ok_or_else(|| Error::config(format!("unknown NVRAM group '{}'", group)))?;
        let hook = keys
            .iter()
            .map(|key| format!("nvram_get({})", key))
            .collect::<Vec<_>>()
            .join(";");

        let body = self.app_get(&hook).await?;
        Ok(keys
            .iter()
            .filter_map(|key| body.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }
}

fn hex_counter(netdev: &Value, key: &str) -> Result<u64> {
    let raw = netdev
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed(format!("Router answer has no {} counter", key)))?;
    let digits = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::malformed(format!("Counter {} is not hex ({}): {}", key, raw, e)))
}

/// Totals of `sample` with rates against the previous one, which it replaces
fn record_sample(last: &mut Option<TrafficSample>, sample: TrafficSample) -> Traffic {
    let (rx_rate, tx_rate) = last
        .map(|previous| rates_between(&previous, &sample))
        .unwrap_or((0.0, 0.0));
    *last = Some(sample);
    Traffic {
        rx_bytes: sample.rx,
        tx_bytes: sample.tx,
        rx_rate,
        tx_rate,
    }
}

/// Byte/s rates between two samples; a counter reset yields zero
fn rates_between(previous: &TrafficSample, current: &TrafficSample) -> (f64, f64) {
    let elapsed = current
        .taken_at
        .saturating_duration_since(previous.taken_at)
        .as_secs_f64();
    if elapsed <= 0.0 {
        return (0.0, 0.0);
    }
    let rate = |now: u64, before: u64| now.checked_sub(before).map_or(0.0, |d| d as f64 / elapsed);
    (rate(current.rx, previous.rx), rate(current.tx, previous.tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use serde_json::json;

    fn config(protocol: Protocol, secret: Secret) -> RouterConfig {
        RouterConfig {
            host: "192.168.1.1".to_string(),
            username: "admin".to_string(),
            protocol,
            mode: Mode::Router,
            port: protocol.default_port(),
            require_ip: true,
            secret,
            sensors: Vec::new(),
        }
    }

    #[test]
    fn every_nvram_sensor_has_a_group() {
        for kind in crate::config::SensorKind::ALL {
            if let Some(group) = kind.nvram_group() {
                assert!(nvram_keys(&group).is_some(), "missing group {}", group);
            }
        }
        assert!(nvram_keys("2G_WIFI").unwrap().contains(&"wl0_bss_enabled"));
        assert!(nvram_keys("TOASTER").is_none());
    }

    #[test]
    fn hex_counters_parse_with_or_without_prefix() {
        let netdev = json!({"INTERNET_rx": "0x1f4", "INTERNET_tx": "ff"});
        assert_eq!(hex_counter(&netdev, "INTERNET_rx").unwrap(), 500);
        assert_eq!(hex_counter(&netdev, "INTERNET_tx").unwrap(), 255);
        assert!(hex_counter(&netdev, "INTERNET_missing").is_err());
        assert!(hex_counter(&json!({"INTERNET_rx": "0xzz"}), "INTERNET_rx").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rates_are_deltas_over_elapsed_time() {
        let first = TrafficSample {
            rx: 1_000,
            tx: 500,
            taken_at: Instant::now(),
        };
        tokio::time::advance(Duration::from_secs(2)).await;
        let second = TrafficSample {
            rx: 3_000,
            tx: 400,
            taken_at: Instant::now(),
        };

        let (down, up) = rates_between(&first, &second);
        assert_eq!(down, 1_000.0);
        assert_eq!(up, 0.0, "counter reset reports zero");
    }

    #[tokio::test(start_paused = true)]
    async fn one_sample_yields_totals_and_rates() {
        let mut last = None;
        let first = record_sample(
            &mut last,
            TrafficSample {
                rx: 1_000,
                tx: 500,
                taken_at: Instant::now(),
            },
        );
        assert_eq!(
            first,
            Traffic {
                rx_bytes: 1_000,
                tx_bytes: 500,
                rx_rate: 0.0,
                tx_rate: 0.0,
            }
        );

        tokio::time::advance(Duration::from_secs(4)).await;
        let second = record_sample(
            &mut last,
            TrafficSample {
                rx: 9_000,
                tx: 2_500,
                taken_at: Instant::now(),
            },
        );
        assert_eq!(second.rx_bytes, 9_000);
        assert_eq!(second.tx_bytes, 2_500);
        assert_eq!(second.rx_rate, 2_000.0);
        assert_eq!(second.tx_rate, 500.0);
        assert_eq!(last.map(|s| s.rx), Some(9_000));
    }

    #[tokio::test]
    async fn ssh_and_key_files_are_refused() {
        let connector = HttpConnector::new(Duration::from_secs(1));

        let ssh = connector
            .connect(&config(Protocol::Ssh, Secret::Password("p".into())))
            .await;
        assert!(matches!(ssh, Err(Error::Connect(_))));

        let key = connector
            .connect(&config(Protocol::Https, Secret::KeyFile("/tmp/id_rsa".into())))
            .await;
        assert!(matches!(key, Err(Error::Connect(_))));
    }

    #[test]
    fn debug_redacts_password() {
        let api = HttpRouterApi::new(
            &config(Protocol::Http, Secret::Password("hunter2".into())),
            "hunter2".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        let rendered = format!("{:?}", api);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("http://192.168.1.1:80"));
    }
}
