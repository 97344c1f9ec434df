//! Router configuration
//!
//! The same document shape is accepted from the legacy `asuswrt:` section and
//! from config entry data. Secrets form one exclusive group: exactly one of
//! `password`, `ssh_key` or `pub_key` must be present.

use homelink_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

/// Integration domain
pub const DOMAIN: &str = "asuswrt";

/// Errors raised while reading a router configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid asuswrt configuration: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("exactly one of password, ssh_key or pub_key is required, got {0}")]
    SecretCount(usize),

    #[error("SSH key file {} does not exist", .0.display())]
    MissingKeyFile(PathBuf),

    #[error("unknown sensor kind '{0}'")]
    UnknownSensor(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::config(err.to_string())
    }
}

/// Transport used to reach the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ssh,
    Telnet,
    Http,
    #[default]
    Https,
}

impl Protocol {
    /// Port used when the configuration does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Ssh => 22,
            Protocol::Telnet => 23,
            Protocol::Http => 80,
            Protocol::Https => 8443,
        }
    }

    /// Whether the bundled web API can serve this transport
    pub fn is_web(self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Protocol::Ssh => "ssh",
            Protocol::Telnet => "telnet",
            Protocol::Http => "http",
            Protocol::Https => "https",
        };
        f.write_str(label)
    }
}

/// Operating mode of the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Router,
    Ap,
}

/// Credential used to log in
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Password(String),
    /// Private key file (`ssh_key`, or its legacy alias `pub_key`)
    KeyFile(PathBuf),
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Secret::Password(_) => f.write_str("Password(<REDACTED>)"),
            Secret::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

/// One of the eighteen router sensor kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorKind {
    #[serde(rename = "upload_speed")]
    UploadSpeed,
    #[serde(rename = "download_speed")]
    DownloadSpeed,
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "upload")]
    Upload,
    #[serde(rename = "dhcp")]
    Dhcp,
    #[serde(rename = "model")]
    Model,
    #[serde(rename = "qos")]
    Qos,
    #[serde(rename = "reboot")]
    Reboot,
    #[serde(rename = "wlan")]
    Wlan,
    #[serde(rename = "2g_wifi")]
    Wifi2g,
    #[serde(rename = "2g_guest_1")]
    Guest2g1,
    #[serde(rename = "2g_guest_2")]
    Guest2g2,
    #[serde(rename = "2g_guest_3")]
    Guest2g3,
    #[serde(rename = "5g_wifi")]
    Wifi5g,
    #[serde(rename = "5g_guest_1")]
    Guest5g1,
    #[serde(rename = "5g_guest_2")]
    Guest5g2,
    #[serde(rename = "5g_guest_3")]
    Guest5g3,
    #[serde(rename = "firmware")]
    Firmware,
}

impl SensorKind {
    pub const ALL: [SensorKind; 18] = [
        SensorKind::UploadSpeed,
        SensorKind::DownloadSpeed,
        SensorKind::Download,
        SensorKind::Upload,
        SensorKind::Dhcp,
        SensorKind::Model,
        SensorKind::Qos,
        SensorKind::Reboot,
        SensorKind::Wlan,
        SensorKind::Wifi2g,
        SensorKind::Guest2g1,
        SensorKind::Guest2g2,
        SensorKind::Guest2g3,
        SensorKind::Wifi5g,
        SensorKind::Guest5g1,
        SensorKind::Guest5g2,
        SensorKind::Guest5g3,
        SensorKind::Firmware,
    ];

    /// Configuration key of this kind
    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::UploadSpeed => "upload_speed",
            SensorKind::DownloadSpeed => "download_speed",
            SensorKind::Download => "download",
            SensorKind::Upload => "upload",
            SensorKind::Dhcp => "dhcp",
            SensorKind::Model => "model",
            SensorKind::Qos => "qos",
            SensorKind::Reboot => "reboot",
            SensorKind::Wlan => "wlan",
            SensorKind::Wifi2g => "2g_wifi",
            SensorKind::Guest2g1 => "2g_guest_1",
            SensorKind::Guest2g2 => "2g_guest_2",
            SensorKind::Guest2g3 => "2g_guest_3",
            SensorKind::Wifi5g => "5g_wifi",
            SensorKind::Guest5g1 => "5g_guest_1",
            SensorKind::Guest5g2 => "5g_guest_2",
            SensorKind::Guest5g3 => "5g_guest_3",
            SensorKind::Firmware => "firmware",
        }
    }

    /// Traffic sensors read counters; the rest read an NVRAM group
    pub fn is_traffic(self) -> bool {
        matches!(
            self,
            SensorKind::UploadSpeed
                | SensorKind::DownloadSpeed
                | SensorKind::Download
                | SensorKind::Upload
        )
    }

    /// NVRAM group read by this kind (`2g_wifi` → `2G_WIFI`)
    pub fn nvram_group(self) -> Option<String> {
        (!self.is_traffic()).then(|| self.as_str().to_uppercase())
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownSensor(s.to_string()))
    }
}

#[derive(Deserialize)]
struct RawRouterConfig {
    host: String,
    username: String,
    #[serde(default)]
    protocol: Protocol,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default = "default_require_ip")]
    require_ip: bool,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    ssh_key: Option<PathBuf>,
    #[serde(default)]
    pub_key: Option<PathBuf>,
    #[serde(default)]
    sensors: Vec<String>,
}

fn default_require_ip() -> bool {
    true
}

/// Validated router configuration
#[derive(Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub host: String,
    pub username: String,
    pub protocol: Protocol,
    pub mode: Mode,
    pub port: u16,
    pub require_ip: bool,
    pub secret: Secret,
    pub sensors: Vec<SensorKind>,
}

impl RouterConfig {
    /// Parse and validate a configuration document
    ///
    /// # Errors
    ///
    /// - Missing `host`/`username` or values of the wrong type
    /// - Zero or several secrets
    /// - A key file that does not exist
    /// - An unknown sensor kind
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let raw = RawRouterConfig::deserialize(value)?;

        let supplied = [
            raw.password.is_some(),
            raw.ssh_key.is_some(),
            raw.pub_key.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();
        if supplied != 1 {
            return Err(ConfigError::SecretCount(supplied));
        }

        let secret = match (raw.password, raw.ssh_key.or(raw.pub_key)) {
            (Some(password), _) => Secret::Password(password),
            (None, Some(path)) => {
                if !path.is_file() {
                    return Err(ConfigError::MissingKeyFile(path));
                }
                Secret::KeyFile(path)
            }
            (None, None) => return Err(ConfigError::SecretCount(0)),
        };

        let mut sensors = Vec::with_capacity(raw.sensors.len());
        for name in &raw.sensors {
            let kind: SensorKind = name.parse()?;
            if !sensors.contains(&kind) {
                sensors.push(kind);
            }
        }

        Ok(Self {
            port: raw.port.unwrap_or_else(|| raw.protocol.default_port()),
            host: raw.host,
            username: raw.username,
            protocol: raw.protocol,
            mode: raw.mode,
            require_ip: raw.require_ip,
            secret,
            sensors,
        })
    }
}

impl std::fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("protocol", &self.protocol)
            .field("mode", &self.mode)
            .field("port", &self.port)
            .field("require_ip", &self.require_ip)
            .field("secret", &self.secret)
            .field("sensors", &self.sensors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    #[test]
    fn defaults_follow_protocol() {
        let config = assert_ok!(RouterConfig::from_value(&json!({
            "host": "192.168.1.1",
            "username": "admin",
            "password": "hunter2",
        })));

        assert_eq!(config.protocol, Protocol::Https);
        assert_eq!(config.port, 8443);
        assert_eq!(config.mode, Mode::Router);
        assert!(config.require_ip);
        assert!(config.sensors.is_empty());

        let ssh = RouterConfig::from_value(&json!({
            "host": "192.168.1.1",
            "username": "admin",
            "password": "hunter2",
            "protocol": "ssh",
        }))
        .unwrap();
        assert_eq!(ssh.port, 22);
    }

    #[test]
    fn secrets_are_exclusive() {
        let none = RouterConfig::from_value(&json!({"host": "h", "username": "u"}));
        assert!(matches!(none, Err(ConfigError::SecretCount(0))));

        let key = tempfile::NamedTempFile::new().unwrap();
        let both = RouterConfig::from_value(&json!({
            "host": "h",
            "username": "u",
            "password": "p",
            "ssh_key": key.path(),
        }));
        assert!(matches!(both, Err(ConfigError::SecretCount(2))));
    }

    #[test]
    fn pub_key_is_an_alias_of_ssh_key() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let config = RouterConfig::from_value(&json!({
            "host": "h",
            "username": "u",
            "pub_key": key.path(),
        }))
        .unwrap();
        assert_eq!(config.secret, Secret::KeyFile(key.path().to_path_buf()));

        let missing = RouterConfig::from_value(&json!({
            "host": "h",
            "username": "u",
            "ssh_key": "/nonexistent/id_rsa",
        }));
        assert!(matches!(missing, Err(ConfigError::MissingKeyFile(_))));
    }

    #[test]
    fn sensors_are_parsed_and_deduplicated() {
        let config = RouterConfig::from_value(&json!({
            "host": "h",
            "username": "u",
            "password": "p",
            "sensors": ["2g_wifi", "download_speed", "2g_wifi"],
        }))
        .unwrap();
        assert_eq!(config.sensors, vec![SensorKind::Wifi2g, SensorKind::DownloadSpeed]);

        let unknown = RouterConfig::from_value(&json!({
            "host": "h",
            "username": "u",
            "password": "p",
            "sensors": ["toaster"],
        }));
        assert!(matches!(unknown, Err(ConfigError::UnknownSensor(ref s)) if s == "toaster"));
    }

    #[test]
    fn nvram_groups_are_uppercase_kinds() {
        assert_eq!(SensorKind::Wifi2g.nvram_group().as_deref(), Some("2G_WIFI"));
        assert_eq!(SensorKind::Guest5g3.nvram_group().as_deref(), Some("5G_GUEST_3"));
        assert_eq!(SensorKind::Download.nvram_group(), None);
        assert_eq!(SensorKind::ALL.len(), 18);
    }

    #[test]
    fn debug_redacts_password() {
        let config = RouterConfig::from_value(&json!({
            "host": "h",
            "username": "u",
            "password": "hunter2",
        }))
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<REDACTED>"));
    }
}
