//! Runtime configuration types for the node.
//!
//! These are the structs the control loop works with. They are separate from
//! the TOML-deserialized config in `shelf_config`; see `conversions`.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::slots::Sample;

/// Network association bounds.
#[derive(Debug, Clone)]
pub struct WifiCfg {
    /// Upper bound on one association attempt.
    pub attempt_timeout: Duration,
    /// How often the link is checked for silent disconnection.
    pub poll_interval: Duration,
}

impl Default for WifiCfg {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// Broker endpoint and session pacing.
#[derive(Debug, Clone)]
pub struct BrokerCfg {
    /// Logical name resolved through the name service.
    pub host: String,
    /// Static address used when the lookup fails or is rejected.
    pub fallback_addr: Ipv4Addr,
    pub port: u16,
    pub reconnect_interval: Duration,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Default for BrokerCfg {
    fn default() -> Self {
        Self {
            host: "raspberrypi.local".to_string(),
            fallback_addr: Ipv4Addr::new(192, 168, 1, 100),
            port: 1883,
            reconnect_interval: Duration::from_secs(5),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// Valid ranging window; anything outside is "no reading".
#[derive(Debug, Clone, Copy)]
pub struct RangeCfg {
    pub min_mm: u32,
    pub max_mm: u32,
    /// Max wait for one echo.
    pub read_timeout: Duration,
}

impl Default for RangeCfg {
    fn default() -> Self {
        Self {
            min_mm: 20,
            max_mm: 4_000,
            read_timeout: Duration::from_millis(30),
        }
    }
}

impl RangeCfg {
    /// Turn a raw ranger result into a sample, filtering to `[min_mm, max_mm]`.
    #[inline]
    pub fn classify(&self, raw: Option<u32>) -> Sample {
        match raw {
            Some(mm) if (self.min_mm..=self.max_mm).contains(&mm) => Sample::Mm(mm),
            _ => Sample::NoReading,
        }
    }
}

/// Calibration sampling sequence.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationCfg {
    pub samples: u32,
    pub min_valid: u32,
    pub sample_delay: Duration,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            samples: 10,
            min_valid: 5,
            sample_delay: Duration::from_millis(100),
        }
    }
}

/// Scan cadence and publish pacing.
#[derive(Debug, Clone, Copy)]
pub struct ScanCfg {
    pub period: Duration,
    pub publish_gap: Duration,
}

impl Default for ScanCfg {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
            publish_gap: Duration::from_millis(100),
        }
    }
}

/// Everything the `Node` needs besides its peripherals.
#[derive(Debug, Clone)]
pub struct NodeCfg {
    pub wifi: WifiCfg,
    pub broker: BrokerCfg,
    pub range: RangeCfg,
    pub calibration: CalibrationCfg,
    pub scan: ScanCfg,
    /// Periodic `shelf/status` cadence while connected.
    pub status_interval: Duration,
    /// Persistence namespace holding slot state.
    pub namespace: String,
    /// Name reported in discovery replies; the identity when unset.
    pub device_name: Option<String>,
}

impl Default for NodeCfg {
    fn default() -> Self {
        Self {
            wifi: WifiCfg::default(),
            broker: BrokerCfg::default(),
            range: RangeCfg::default(),
            calibration: CalibrationCfg::default(),
            scan: ScanCfg::default(),
            status_interval: Duration::from_secs(30),
            namespace: "shelves".to_string(),
            device_name: None,
        }
    }
}
