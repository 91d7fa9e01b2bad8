//! Inbound message routing and command execution.
//!
//! `route` turns a raw message into a `Request` (or drops it with a log line);
//! `Node::dispatch` carries it out against the slot store and publishes the
//! reply. The protocol has no error channel: bad input is never answered.

use shelf_traits::InboundMessage;
use tracing::{debug, info, warn};

use crate::error::CalibrationError;
use crate::identity::DeviceIdentity;
use crate::node::Node;
use crate::protocol::{
    self, CalibrateResponse, Command, ConfigResponse, DiscoveryResponse, HeartbeatResponse,
    SlotEntry, addressed_elsewhere, cm_one_decimal, topics,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Command(Command),
    Discovery,
    Heartbeat,
    ConfigRequest,
}

/// Classify a message by topic. Returns `None` for anything this node
/// should not act on.
pub fn route(msg: &InboundMessage, me: &DeviceIdentity) -> Option<Request> {
    let topic = msg.topic.as_str();
    if topic == topics::command(me) {
        let text = msg.text();
        return match text.parse::<Command>() {
            Ok(cmd) => Some(Request::Command(cmd)),
            Err(e) => {
                warn!(command = %text.trim(), error = %e, "command ignored");
                None
            }
        };
    }
    if topic == topics::config_request(me) {
        if addressed_elsewhere(&msg.payload, "device_id", me) {
            debug!("config request for another device ignored");
            return None;
        }
        return Some(Request::ConfigRequest);
    }
    match topic {
        topics::DISCOVERY => Some(Request::Discovery),
        topics::HEARTBEAT => {
            if addressed_elsewhere(&msg.payload, "target_device", me) {
                debug!("heartbeat for another device ignored");
                None
            } else {
                Some(Request::Heartbeat)
            }
        }
        other => {
            debug!(topic = %other, "message on unhandled topic");
            None
        }
    }
}

impl Node {
    pub(crate) fn dispatch(&mut self, req: Request) {
        match req {
            Request::Command(cmd) => self.execute(cmd),
            Request::Discovery => {
                self.publish_discovery();
            }
            Request::Heartbeat => {
                self.publish_heartbeat();
            }
            Request::ConfigRequest => {
                self.publish_config();
            }
        }
    }

    fn execute(&mut self, cmd: Command) {
        info!(?cmd, "command received");
        match cmd {
            Command::Status => {
                self.publish_status();
            }
            Command::Read => {
                self.run_scan();
            }
            Command::ReadSlot(id) => self.read_one(&id),
            Command::Enable(id) => self.toggle(&id, true),
            Command::Disable(id) => self.toggle(&id, false),
            Command::Calibrate(id) => self.calibrate_and_report(&id),
        }
    }

    fn read_one(&mut self, id: &str) {
        let Some(index) = self.slots.index_of(id) else {
            warn!(slot = %id, "unknown slot");
            return;
        };
        if !self.slots.slots()[index].enabled() {
            warn!(slot = %id, "slot disabled, not read");
            return;
        }
        self.scan.read_slot(index, &mut self.slots, &mut *self.ranger);
        self.scan
            .publish_slot(index, &self.slots, &mut self.broker, &self.identity);
    }

    fn toggle(&mut self, id: &str, enabled: bool) {
        if self.slots.index_of(id).is_none() {
            warn!(slot = %id, "unknown slot");
            return;
        }
        match self.slots.set_enabled(id, enabled) {
            Ok(()) => {
                info!(slot = %id, enabled, "slot updated");
                self.publish_status();
            }
            Err(e) => warn!(slot = %id, error = %e, "slot update not persisted"),
        }
    }

    fn calibrate_and_report(&mut self, id: &str) {
        let (success, length) = match self.calibrate(id) {
            Ok(cm) => (true, cm_one_decimal(cm)),
            Err(CalibrationError::UnknownSlot(_)) => {
                warn!(slot = %id, "unknown slot");
                (false, -1.0)
            }
            Err(_) => (false, -1.0),
        };
        let msg = CalibrateResponse {
            device_id: self.identity.as_str(),
            shelf_id: id,
            success,
            shelf_length: length,
        };
        if let Some(payload) = protocol::encode(&msg) {
            let topic = topics::calibrate_response(&self.identity);
            self.broker.publish(&topic, &payload);
        }
    }

    pub(crate) fn publish_discovery(&mut self) -> bool {
        let msg = DiscoveryResponse {
            device_id: self.identity.as_str(),
            device_name: &self.device_name,
            shelves: self.slots.enabled_ids(),
            total_shelves: self.slots.len(),
            enabled_shelves: self.slots.enabled_count(),
            wifi_signal: self.associator.rssi(),
            uptime_ms: self.uptime_ms(),
        };
        protocol::encode(&msg)
            .is_some_and(|payload| self.broker.publish(topics::DISCOVERY_RESPONSE, &payload))
    }

    pub(crate) fn publish_heartbeat(&mut self) -> bool {
        let msg = HeartbeatResponse {
            device_id: self.identity.as_str(),
            status: "online",
            timestamp: self.uptime_ms(),
        };
        protocol::encode(&msg)
            .is_some_and(|payload| self.broker.publish(topics::HEARTBEAT_RESPONSE, &payload))
    }

    pub(crate) fn publish_config(&mut self) -> bool {
        let Some(payload) = self.config_json() else {
            return false;
        };
        let topic = topics::config_response(&self.identity);
        self.broker.publish(&topic, &payload)
    }

    /// Full slot table as served on the config-response topic.
    pub fn config_json(&self) -> Option<String> {
        let shelves = self
            .slots
            .slots()
            .iter()
            .enumerate()
            .map(|(index, s)| SlotEntry {
                shelf_id: s.id(),
                index,
                gpio: s.gpio(),
                enabled: s.enabled(),
                shelf_length: cm_one_decimal(s.reference_cm()),
                sensor_connected: s.sample().is_valid(),
            })
            .collect();
        protocol::encode(&ConfigResponse {
            device_id: self.identity.as_str(),
            shelves,
            total_count: self.slots.len(),
            enabled_count: self.slots.enabled_count(),
        })
    }
}
