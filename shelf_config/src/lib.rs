#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the shelf node.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every timing bound the node relies on (association timeout, reconnect
//!   interval, scan period, calibration pacing) lives here with its default.
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Longest slot id that still leaves room for the `_len` key suffix within
/// a 15-byte storage key.
pub const MAX_SLOT_ID_LEN: usize = 11;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceCfg {
    /// Prefix of the derived identity: `{id_prefix}_{hardware id hex}`
    pub id_prefix: String,
    /// Explicit identity; bypasses derivation from the hardware id
    pub id: Option<String>,
    /// Human-readable name for discovery replies (defaults to the identity)
    pub name: Option<String>,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            id_prefix: "SHELF".to_string(),
            id: None,
            name: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Network {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WifiCfg {
    /// Ordered credential list. Accepts either:
    /// - array of tables: [{ ssid = "home", password = "..." }, ...]
    /// - array of tuples: [["home", "..."], ...]
    #[serde(deserialize_with = "de_networks")]
    pub networks: Vec<Network>,
    /// Upper bound on a single association attempt
    pub attempt_timeout_ms: u64,
    /// Cadence of the link check that triggers re-association
    pub poll_ms: u64,
}

impl Default for WifiCfg {
    fn default() -> Self {
        Self {
            networks: Vec::new(),
            attempt_timeout_ms: 10_000,
            poll_ms: 60_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BrokerCfg {
    /// Logical name tried through the name service first
    pub host: String,
    /// Used whenever the lookup fails or answers 0.0.0.0
    pub fallback_addr: Ipv4Addr,
    pub port: u16,
    /// Reconnect cadence while the network is up
    pub reconnect_ms: u64,
    pub keep_alive_s: u64,
    /// Max wait for the broker's acknowledgement per attempt
    pub connect_timeout_ms: u64,
}

impl Default for BrokerCfg {
    fn default() -> Self {
        Self {
            host: "raspberrypi.local".to_string(),
            fallback_addr: Ipv4Addr::new(192, 168, 1, 100),
            port: 1883,
            reconnect_ms: 5_000,
            keep_alive_s: 60,
            connect_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlotCfg {
    pub id: String,
    /// GPIO line of the slot's ultrasonic sensor
    pub gpio: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RangingCfg {
    /// Samples below this are treated as "no reading"
    pub min_mm: u32,
    /// Samples above this are treated as "no reading"
    pub max_mm: u32,
    /// Max wait for one echo
    pub read_timeout_ms: u64,
}

impl Default for RangingCfg {
    fn default() -> Self {
        Self {
            min_mm: 20,
            max_mm: 4_000,
            read_timeout_ms: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    pub samples: u32,
    /// Fewer valid samples than this fails the calibration
    pub min_valid: u32,
    /// Pause between samples to let echoes die out
    pub sample_delay_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            samples: 10,
            min_valid: 5,
            sample_delay_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingCfg {
    pub scan_ms: u64,
    pub status_ms: u64,
    /// Gap between consecutive sensor publishes in one scan cycle
    pub publish_gap_ms: u64,
    /// Sleep between control-loop ticks
    pub idle_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            scan_ms: 5_000,
            status_ms: 30_000,
            publish_gap_ms: 100,
            idle_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
    /// State file holding the persisted slot configuration
    pub path: PathBuf,
    pub namespace: String,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("var/shelf_state.toml"),
            namespace: "shelves".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceCfg,
    pub wifi: WifiCfg,
    #[serde(default)]
    pub broker: BrokerCfg,
    /// Monitored slots in reporting order
    pub slots: Vec<SlotCfg>,
    #[serde(default)]
    pub ranging: RangingCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub timing: TimingCfg,
    #[serde(default)]
    pub storage: StorageCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text)
        .map_err(|e| eyre::eyre!("invalid configuration in {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NetworkToml {
    Tuple((String, String)),
    Table(Network),
}

fn de_networks<'de, D>(deserializer: D) -> Result<Vec<Network>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<NetworkToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for n in items {
            match n {
                NetworkToml::Tuple((ssid, password)) => out.push(Network { ssid, password }),
                NetworkToml::Table(net) => out.push(net),
            }
        }
    }
    Ok(out)
}

/// The identity is embedded in topic names and the broker client id.
fn valid_topic_token(s: &str) -> bool {
    !s.is_empty()
        && !s
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '+' | '#'))
}

fn valid_slot_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        match &self.device.id {
            Some(id) if !valid_topic_token(id) => eyre::bail!(
                "device.id must be non-empty, without whitespace and free of '/', '+', '#'"
            ),
            None if !valid_topic_token(&self.device.id_prefix) => eyre::bail!(
                "device.id_prefix must be non-empty, without whitespace and free of '/', '+', '#'"
            ),
            _ => {}
        }

        // Wi-Fi
        if self.wifi.networks.is_empty() {
            eyre::bail!("wifi.networks must list at least one network");
        }
        for (i, n) in self.wifi.networks.iter().enumerate() {
            if n.ssid.is_empty() || n.ssid.len() > 32 {
                eyre::bail!("wifi.networks[{i}].ssid must be 1..=32 bytes");
            }
            if n.password.len() > 64 {
                eyre::bail!("wifi.networks[{i}].password must be at most 64 bytes");
            }
        }
        if self.wifi.attempt_timeout_ms == 0 {
            eyre::bail!("wifi.attempt_timeout_ms must be >= 1");
        }
        if self.wifi.poll_ms == 0 {
            eyre::bail!("wifi.poll_ms must be >= 1");
        }

        // Broker
        if self.broker.host.trim().is_empty() {
            eyre::bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            eyre::bail!("broker.port must be > 0");
        }
        if self.broker.reconnect_ms == 0 {
            eyre::bail!("broker.reconnect_ms must be >= 1");
        }
        if self.broker.keep_alive_s < 5 {
            eyre::bail!("broker.keep_alive_s must be >= 5");
        }
        if self.broker.connect_timeout_ms == 0 {
            eyre::bail!("broker.connect_timeout_ms must be >= 1");
        }

        // Slots
        if self.slots.is_empty() {
            eyre::bail!("slots must define at least one slot");
        }
        let mut ids = HashSet::new();
        let mut pins = HashSet::new();
        for (i, s) in self.slots.iter().enumerate() {
            if !valid_slot_id(&s.id) {
                eyre::bail!("slots[{i}].id must be uppercase letters and digits, got {:?}", s.id);
            }
            if s.id.len() > MAX_SLOT_ID_LEN {
                eyre::bail!("slots[{i}].id must be at most {MAX_SLOT_ID_LEN} characters");
            }
            if !ids.insert(s.id.as_str()) {
                eyre::bail!("slots[{i}].id {} is duplicated", s.id);
            }
            if !pins.insert(s.gpio) {
                eyre::bail!("slots[{i}].gpio {} is used by another slot", s.gpio);
            }
        }

        // Ranging
        if self.ranging.min_mm >= self.ranging.max_mm {
            eyre::bail!("ranging.min_mm must be < ranging.max_mm");
        }
        if self.ranging.read_timeout_ms == 0 {
            eyre::bail!("ranging.read_timeout_ms must be >= 1");
        }

        // Calibration
        if self.calibration.samples == 0 {
            eyre::bail!("calibration.samples must be >= 1");
        }
        if self.calibration.min_valid == 0 || self.calibration.min_valid > self.calibration.samples
        {
            eyre::bail!("calibration.min_valid must be in [1, calibration.samples]");
        }
        if self.calibration.sample_delay_ms > 10_000 {
            eyre::bail!("calibration.sample_delay_ms is unreasonably large (>10s)");
        }

        // Timing
        if self.timing.scan_ms == 0 {
            eyre::bail!("timing.scan_ms must be >= 1");
        }
        if self.timing.status_ms == 0 {
            eyre::bail!("timing.status_ms must be >= 1");
        }
        if self.timing.idle_ms == 0 {
            eyre::bail!("timing.idle_ms must be >= 1");
        }

        // Storage
        if self.storage.namespace.trim().is_empty() {
            eyre::bail!("storage.namespace must not be empty");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
