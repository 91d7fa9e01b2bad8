//! Topics, payloads and the text command grammar.
//!
//! All payloads are JSON objects carrying the sender's `device_id`. Outbound
//! messages are published at-most-once and never retained.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::identity::DeviceIdentity;

pub mod topics {
    use crate::identity::DeviceIdentity;

    pub const DISCOVERY: &str = "shelf/discovery";
    pub const DISCOVERY_RESPONSE: &str = "shelf/discovery/response";
    pub const HEARTBEAT: &str = "shelf/heartbeat";
    pub const HEARTBEAT_RESPONSE: &str = "shelf/heartbeat/response";
    pub const STATUS: &str = "shelf/status";
    pub const SENSOR: &str = "shelf/sensor";

    pub fn command(id: &DeviceIdentity) -> String {
        format!("shelf/{id}/command")
    }
    pub fn config_request(id: &DeviceIdentity) -> String {
        format!("shelf/{id}/config/request")
    }
    pub fn config_response(id: &DeviceIdentity) -> String {
        format!("shelf/{id}/config/response")
    }
    pub fn calibrate_response(id: &DeviceIdentity) -> String {
        format!("shelf/{id}/calibrate/response")
    }

    /// Topics subscribed on every new session.
    pub fn subscriptions(id: &DeviceIdentity) -> [String; 4] {
        [
            command(id),
            config_request(id),
            DISCOVERY.to_string(),
            HEARTBEAT.to_string(),
        ]
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// A parsed text command from the per-device command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish a status message now.
    Status,
    /// Measure every slot and publish the readings now.
    Read,
    /// Measure and publish one slot.
    ReadSlot(String),
    Enable(String),
    Disable(String),
    Calibrate(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownVerb(String),
    #[error("command '{0}' needs a slot id")]
    MissingSlot(&'static str),
}

impl FromStr for Command {
    type Err = ParseError;

    /// Verbs are case-insensitive; slot ids are upper-cased.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(ParseError::Empty);
        }
        let (verb, rest) = match text.split_once(char::is_whitespace) {
            Some((v, r)) => (v, r.trim()),
            None => (text, ""),
        };
        let slot = |name: &'static str| {
            if rest.is_empty() {
                Err(ParseError::MissingSlot(name))
            } else {
                Ok(rest.to_ascii_uppercase())
            }
        };
        match verb.to_ascii_lowercase().as_str() {
            "status" => Ok(Command::Status),
            "read" | "data" if rest.is_empty() => Ok(Command::Read),
            "read" | "data" => Ok(Command::ReadSlot(rest.to_ascii_uppercase())),
            "shelf" => slot("shelf").map(Command::ReadSlot),
            "enable" => slot("enable").map(Command::Enable),
            "disable" => slot("disable").map(Command::Disable),
            "calibrate" => slot("calibrate").map(Command::Calibrate),
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

/// True when a JSON payload names, under `key`, a device other than `me`.
/// Anything else (non-JSON, missing key, non-string value) is a broadcast.
pub fn addressed_elsewhere(payload: &[u8], key: &str, me: &DeviceIdentity) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return false;
    };
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .is_some_and(|target| target != me.as_str())
}

// ── Outbound payloads ────────────────────────────────────────────────────────

pub fn link_state(up: bool) -> &'static str {
    if up { "connected" } else { "disconnected" }
}

#[derive(Debug, Serialize)]
pub struct StatusMsg<'a> {
    pub device_id: &'a str,
    pub wifi: &'static str,
    pub mqtt: &'static str,
    pub uptime_ms: u64,
    pub shelf_count: usize,
    pub enabled_shelf_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SensorMsg<'a> {
    pub device_id: &'a str,
    pub shelf_id: &'a str,
    pub index: usize,
    pub distance_cm: f64,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct CalibrateResponse<'a> {
    pub device_id: &'a str,
    pub shelf_id: &'a str,
    pub success: bool,
    pub shelf_length: f64,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse<'a> {
    pub device_id: &'a str,
    pub device_name: &'a str,
    pub shelves: Vec<&'a str>,
    pub total_shelves: usize,
    pub enabled_shelves: usize,
    pub wifi_signal: i32,
    pub uptime_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse<'a> {
    pub device_id: &'a str,
    pub status: &'static str,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct SlotEntry<'a> {
    pub shelf_id: &'a str,
    pub index: usize,
    pub gpio: u8,
    pub enabled: bool,
    pub shelf_length: f64,
    pub sensor_connected: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse<'a> {
    pub device_id: &'a str,
    pub shelves: Vec<SlotEntry<'a>>,
    pub total_count: usize,
    pub enabled_count: usize,
}

#[derive(Debug, Serialize)]
pub struct OfflineWill<'a> {
    pub device_id: &'a str,
    pub status: &'static str,
}

/// Serialize an outbound payload; `None` (logged) if serialization fails.
pub fn encode<T: Serialize>(msg: &T) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(s) => Some(s),
        Err(e) => {
            error!(error = %e, "payload serialization failed");
            None
        }
    }
}

/// One-decimal centimeters as they appear on the wire.
pub fn cm_one_decimal(cm: f32) -> f64 {
    (f64::from(cm) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_embed_identity() {
        let id = DeviceIdentity::explicit("SHELF_0000000000AA");
        assert_eq!(topics::command(&id), "shelf/SHELF_0000000000AA/command");
        assert_eq!(
            topics::calibrate_response(&id),
            "shelf/SHELF_0000000000AA/calibrate/response"
        );
        assert_eq!(topics::subscriptions(&id)[3], "shelf/heartbeat");
    }

    #[test]
    fn one_decimal_rounding() {
        assert!((cm_one_decimal(20.0) - 20.0).abs() < 1e-9);
        assert!((cm_one_decimal(19.95) - 20.0).abs() < 1e-6);
        assert!((cm_one_decimal(0.0)).abs() < 1e-9);
    }

    #[test]
    fn status_payload_shape() {
        let msg = StatusMsg {
            device_id: "SHELF_X",
            wifi: link_state(true),
            mqtt: link_state(false),
            uptime_ms: 42,
            shelf_count: 3,
            enabled_shelf_count: 1,
        };
        let v: serde_json::Value =
            serde_json::from_str(&encode(&msg).expect("encode")).expect("json");
        assert_eq!(v["device_id"], "SHELF_X");
        assert_eq!(v["wifi"], "connected");
        assert_eq!(v["mqtt"], "disconnected");
        assert_eq!(v["enabled_shelf_count"], 1);
    }
}
