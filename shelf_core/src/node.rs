//! The node: every component owned by one cooperative control loop.

use std::sync::Arc;
use std::time::Instant;

use shelf_traits::{Clock, Ranger};
use tracing::{debug, info};

use crate::associator::NetworkAssociator;
use crate::broker::BrokerLink;
use crate::builder::NodeBuilder;
use crate::calibration::CalibrationEngine;
use crate::error::{CalibrationError, Result};
use crate::identity::DeviceIdentity;
use crate::protocol::{self, StatusMsg, link_state, topics};
use crate::router;
use crate::scan::ScanLoop;
use crate::slots::{Sample, SlotStore};
use crate::util::Interval;

pub struct Node {
    pub(crate) identity: DeviceIdentity,
    pub(crate) device_name: String,
    pub(crate) slots: SlotStore,
    pub(crate) associator: NetworkAssociator,
    pub(crate) broker: BrokerLink,
    pub(crate) ranger: Box<dyn Ranger>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) calibration: CalibrationEngine,
    pub(crate) scan: ScanLoop,
    pub(crate) status_timer: Interval,
    pub(crate) epoch: Instant,
    pub(crate) booted: bool,
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("identity", &self.identity)
            .field("slots", &self.slots)
            .field("network_up", &self.associator.is_up())
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Start building a Node.
    pub fn builder() -> NodeBuilder {
        NodeBuilder::default()
    }

    /// Restore persisted slot state. Idempotent; `tick` calls it on first use.
    pub fn boot(&mut self) {
        if self.booted {
            return;
        }
        self.slots.load();
        self.booted = true;
        info!(
            device_id = %self.identity,
            slots = self.slots.len(),
            enabled = self.slots.enabled_count(),
            "node booted"
        );
    }

    /// One pass of the control loop. Never blocks longer than the bounded
    /// waits of the component that is due.
    pub fn tick(&mut self) {
        self.boot();
        let clock = Arc::clone(&self.clock);

        let network_up = self.associator.poll(&*clock);
        if self.broker.service(&*clock, network_up, &self.identity) {
            self.publish_status();
            self.status_timer.reset(clock.now());
        }

        for msg in self.broker.drain() {
            if let Some(req) = router::route(&msg, &self.identity) {
                self.dispatch(req);
            }
        }

        if self.broker.connected() && self.status_timer.due(clock.now()) {
            self.publish_status();
        }

        if self.scan.due(clock.now()) {
            self.run_scan();
        }
    }

    /// Measure every enabled slot now and publish when connected.
    pub fn run_scan(&mut self) -> usize {
        self.scan.run_cycle(
            &mut self.slots,
            &mut *self.ranger,
            &mut self.broker,
            &*self.clock,
            &self.identity,
        )
    }

    pub(crate) fn publish_status(&mut self) -> bool {
        let msg = StatusMsg {
            device_id: self.identity.as_str(),
            wifi: link_state(self.associator.is_up()),
            mqtt: link_state(self.broker.connected()),
            uptime_ms: self.uptime_ms(),
            shelf_count: self.slots.len(),
            enabled_shelf_count: self.slots.enabled_count(),
        };
        let sent = protocol::encode(&msg)
            .is_some_and(|payload| self.broker.publish(topics::STATUS, &payload));
        debug!(sent, "status published");
        sent
    }

    /// Calibrate one slot against its current (empty) distance.
    pub fn calibrate(&mut self, slot_id: &str) -> std::result::Result<f32, CalibrationError> {
        self.boot();
        self.calibration.calibrate(
            slot_id,
            &mut self.slots,
            &mut *self.ranger,
            &*self.clock,
        )
    }

    /// Enable or disable a slot and persist the change.
    pub fn set_slot_enabled(&mut self, slot_id: &str, enabled: bool) -> Result<()> {
        self.boot();
        self.slots.set_enabled(slot_id, enabled)
    }

    /// Take one reading of every slot regardless of the scan timer, without
    /// publishing. Disabled slots report `NoReading`.
    pub fn read_all(&mut self) -> Vec<(String, Sample)> {
        self.boot();
        self.scan.measure_all(&mut self.slots, &mut *self.ranger);
        self.slots
            .slots()
            .iter()
            .map(|s| (s.id().to_string(), s.sample()))
            .collect()
    }

    /// Erase all persisted slot state.
    pub fn reset(&mut self) -> Result<()> {
        self.slots.clear()
    }

    /// Close the broker session.
    pub fn shutdown(&mut self) {
        self.broker.shutdown();
        info!(device_id = %self.identity, uptime_ms = self.uptime_ms(), "node stopped");
    }

    pub fn uptime_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    pub fn is_network_up(&self) -> bool {
        self.associator.is_up()
    }

    pub fn is_broker_connected(&self) -> bool {
        self.broker.connected()
    }

    pub fn broker(&self) -> &BrokerLink {
        &self.broker
    }

    pub fn associator(&self) -> &NetworkAssociator {
        &self.associator
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }
}
