//! Router sensor descriptors and snapshot sources
//!
//! Four traffic sensors share one traffic source; every NVRAM sensor reads
//! its own group. All sources of one router go through the same
//! [`RouterApi`] session.

use async_trait::async_trait;
use homelink_core::{
    Result, SensorDescriptor, Snapshot, SnapshotSource, Transform, UniqueId,
};
use serde_json::Value;
use std::sync::Arc;

use crate::api::RouterApi;
use crate::config::{DOMAIN, SensorKind};

/// Snapshot field names of the traffic source
pub const FIELD_RX_BYTES: &str = "rx_bytes";
pub const FIELD_TX_BYTES: &str = "tx_bytes";
pub const FIELD_RX_RATE: &str = "rx_rate";
pub const FIELD_TX_RATE: &str = "tx_rate";

/// Provenance attached to NVRAM sensor attributes
pub const ATTRIBUTION: &str = "Data provided by ASUSWRT router";

/// Fetcher key of the shared traffic source
pub const TRAFFIC_FETCHER: &str = "traffic";

const BYTES_PER_MBIT: f64 = 125_000.0;
const BYTES_PER_GIGABYTE: f64 = 1_000_000_000.0;

/// Title-case a sensor kind the way display names expect
///
/// Underscores become spaces and every letter following a non-letter is
/// uppercased: `2g_wifi` → `2G Wifi`.
pub fn format_name(kind: &str) -> String {
    let mut previous_is_letter = false;
    kind.replace('_', " ")
        .chars()
        .map(|c| {
            let mapped = if !c.is_alphabetic() {
                c
            } else if previous_is_letter {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            };
            previous_is_letter = c.is_alphabetic();
            mapped
        })
        .collect()
}

/// Descriptor of one router sensor kind
pub fn descriptor(kind: SensorKind) -> SensorDescriptor {
    let traffic = |name: &str, field: &str, divisor: f64, precision: u32, unit: &str| {
        SensorDescriptor::new(
            kind.as_str(),
            name,
            field,
            Transform::Scale { divisor, precision },
        )
        .with_unit(unit)
    };

    match kind {
        SensorKind::DownloadSpeed => traffic(
            "Asuswrt Download Speed",
            FIELD_RX_RATE,
            BYTES_PER_MBIT,
            2,
            "Mbit/s",
        ),
        SensorKind::UploadSpeed => traffic(
            "Asuswrt Upload Speed",
            FIELD_TX_RATE,
            BYTES_PER_MBIT,
            2,
            "Mbit/s",
        ),
        SensorKind::Download => traffic(
            "Asuswrt Download",
            FIELD_RX_BYTES,
            BYTES_PER_GIGABYTE,
            1,
            "Gigabyte",
        ),
        SensorKind::Upload => traffic(
            "Asuswrt Upload",
            FIELD_TX_BYTES,
            BYTES_PER_GIGABYTE,
            1,
            "Gigabyte",
        ),
        _ => {
            let (field, transform) = nvram_primary(kind);
            SensorDescriptor::new(
                kind.as_str(),
                format!("Asuswrt {}", format_name(kind.as_str())),
                field,
                transform,
            )
            .with_attributes([field])
            .with_attribution(ATTRIBUTION)
        }
    }
}

fn nvram_primary(kind: SensorKind) -> (&'static str, Transform) {
    match kind {
        SensorKind::Wifi2g => ("wl0_bss_enabled", Transform::OnOff),
        SensorKind::Guest2g1 => ("wl0.1_bss_enabled", Transform::OnOff),
        SensorKind::Guest2g2 => ("wl0.2_bss_enabled", Transform::OnOff),
        SensorKind::Guest2g3 => ("wl0.3_bss_enabled", Transform::OnOff),
        SensorKind::Wifi5g => ("wl1_bss_enabled", Transform::OnOff),
        SensorKind::Guest5g1 => ("wl1.1_bss_enabled", Transform::OnOff),
        SensorKind::Guest5g2 => ("wl1.2_bss_enabled", Transform::OnOff),
        SensorKind::Guest5g3 => ("wl1.3_bss_enabled", Transform::OnOff),
        SensorKind::Dhcp => ("dhcp_enable_x", Transform::OnOff),
        SensorKind::Qos => ("qos_enable", Transform::OnOff),
        SensorKind::Reboot => ("reboot_schedule_enable", Transform::OnOff),
        SensorKind::Model => ("model", Transform::PassThrough),
        SensorKind::Wlan => ("wan_ipaddr", Transform::PassThrough),
        SensorKind::Firmware => ("buildno", Transform::PassThrough),
        // Traffic kinds are handled by the caller
        SensorKind::UploadSpeed
        | SensorKind::DownloadSpeed
        | SensorKind::Download
        | SensorKind::Upload => ("", Transform::PassThrough),
    }
}

/// `asuswrt_<host>_<kind>`, normalized
pub fn unique_id(host: &str, kind: SensorKind) -> UniqueId {
    UniqueId::from_parts([DOMAIN, host, kind.as_str()])
}

/// WAN counters and rates in one snapshot
pub struct TrafficSource {
    api: Arc<dyn RouterApi>,
}

impl TrafficSource {
    pub fn new(api: Arc<dyn RouterApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SnapshotSource for TrafficSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let traffic = self.api.traffic().await?;

        Ok(Snapshot::from_pairs([
            (FIELD_RX_BYTES, Value::from(traffic.rx_bytes)),
            (FIELD_TX_BYTES, Value::from(traffic.tx_bytes)),
            (FIELD_RX_RATE, Value::from(traffic.rx_rate)),
            (FIELD_TX_RATE, Value::from(traffic.tx_rate)),
        ]))
    }

    fn source_name(&self) -> &str {
        TRAFFIC_FETCHER
    }
}

/// One NVRAM group as a snapshot
pub struct NvramSource {
    api: Arc<dyn RouterApi>,
    group: String,
}

impl NvramSource {
    pub fn new(api: Arc<dyn RouterApi>, group: impl Into<String>) -> Self {
        Self {
            api,
            group: group.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for NvramSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let fields = self.api.nvram(&self.group).await?;
        Ok(Snapshot::new(fields))
    }

    fn source_name(&self) -> &str {
        &self.group
    }
}
