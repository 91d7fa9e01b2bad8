//! `From` implementations bridging `shelf_config` types to `shelf_core` types.

use std::time::Duration;

use crate::associator::{Credential, CredentialList};
use crate::config::{BrokerCfg, CalibrationCfg, NodeCfg, RangeCfg, ScanCfg, WifiCfg};
use crate::slots::SlotSpec;

// ── WifiCfg ──────────────────────────────────────────────────────────────────

impl From<&shelf_config::WifiCfg> for WifiCfg {
    fn from(c: &shelf_config::WifiCfg) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(c.attempt_timeout_ms),
            poll_interval: Duration::from_millis(c.poll_ms),
        }
    }
}

impl From<&shelf_config::WifiCfg> for CredentialList {
    fn from(c: &shelf_config::WifiCfg) -> Self {
        c.networks
            .iter()
            .map(|n| Credential::new(n.ssid.clone(), n.password.clone()))
            .collect()
    }
}

// ── BrokerCfg ────────────────────────────────────────────────────────────────

impl From<&shelf_config::BrokerCfg> for BrokerCfg {
    fn from(c: &shelf_config::BrokerCfg) -> Self {
        Self {
            host: c.host.clone(),
            fallback_addr: c.fallback_addr,
            port: c.port,
            reconnect_interval: Duration::from_millis(c.reconnect_ms),
            keep_alive: Duration::from_secs(c.keep_alive_s),
            connect_timeout: Duration::from_millis(c.connect_timeout_ms),
        }
    }
}

// ── RangeCfg / CalibrationCfg ────────────────────────────────────────────────

impl From<&shelf_config::RangingCfg> for RangeCfg {
    fn from(c: &shelf_config::RangingCfg) -> Self {
        Self {
            min_mm: c.min_mm,
            max_mm: c.max_mm,
            read_timeout: Duration::from_millis(c.read_timeout_ms),
        }
    }
}

impl From<&shelf_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &shelf_config::CalibrationCfg) -> Self {
        Self {
            samples: c.samples,
            min_valid: c.min_valid,
            sample_delay: Duration::from_millis(c.sample_delay_ms),
        }
    }
}

// ── ScanCfg ──────────────────────────────────────────────────────────────────

impl From<&shelf_config::TimingCfg> for ScanCfg {
    fn from(c: &shelf_config::TimingCfg) -> Self {
        Self {
            period: Duration::from_millis(c.scan_ms),
            publish_gap: Duration::from_millis(c.publish_gap_ms),
        }
    }
}

// ── SlotSpec ─────────────────────────────────────────────────────────────────

impl From<&shelf_config::SlotCfg> for SlotSpec {
    fn from(c: &shelf_config::SlotCfg) -> Self {
        SlotSpec::new(c.id.clone(), c.gpio)
    }
}

// ── NodeCfg ──────────────────────────────────────────────────────────────────

impl From<&shelf_config::Config> for NodeCfg {
    fn from(c: &shelf_config::Config) -> Self {
        Self {
            wifi: (&c.wifi).into(),
            broker: (&c.broker).into(),
            range: (&c.ranging).into(),
            calibration: (&c.calibration).into(),
            scan: (&c.timing).into(),
            status_interval: Duration::from_millis(c.timing.status_ms),
            namespace: c.storage.namespace.clone(),
            device_name: c.device.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_maps_to_runtime_types() {
        let cfg = shelf_config::load_toml(
            r#"
[wifi]
networks = [["home", "pw"], ["backup", "pw2"]]
attempt_timeout_ms = 2500

[broker]
host = "broker.local"
fallback_addr = "10.0.0.2"

[[slots]]
id = "A1"
gpio = 4
"#,
        )
        .expect("parse");
        let node: NodeCfg = (&cfg).into();
        assert_eq!(node.wifi.attempt_timeout, Duration::from_millis(2500));
        assert_eq!(node.broker.host, "broker.local");
        assert_eq!(node.broker.fallback_addr.to_string(), "10.0.0.2");
        assert_eq!(node.scan.period, Duration::from_secs(5));
        assert_eq!(node.status_interval, Duration::from_secs(30));

        let creds: CredentialList = (&cfg.wifi).into();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds.get(1).map(|c| c.ssid.as_str()), Some("backup"));

        let spec: SlotSpec = (&cfg.slots[0]).into();
        assert_eq!(spec.id, "A1");
        assert_eq!(spec.gpio, 4);
    }
}
