//! Periodic measure-and-publish cycle.

use std::time::Instant;

use shelf_traits::{Clock, Ranger};
use tracing::{debug, trace};

use crate::broker::BrokerLink;
use crate::config::{RangeCfg, ScanCfg};
use crate::hw_error::map_hw_error;
use crate::identity::DeviceIdentity;
use crate::protocol::{self, SensorMsg, topics};
use crate::slots::{Sample, SlotStore};
use crate::util::Interval;

#[derive(Debug, Clone)]
pub struct ScanLoop {
    cfg: ScanCfg,
    range: RangeCfg,
    timer: Interval,
}

impl ScanLoop {
    pub fn new(cfg: ScanCfg, range: RangeCfg) -> Self {
        Self {
            cfg,
            range,
            timer: Interval::new(cfg.period),
        }
    }

    pub fn due(&mut self, now: Instant) -> bool {
        self.timer.due(now)
    }

    /// Bounded read of one slot. Disabled slots are never ranged.
    pub fn read_slot(&self, index: usize, store: &mut SlotStore, ranger: &mut dyn Ranger) -> Sample {
        let Some(slot) = store.get(index) else {
            return Sample::NoReading;
        };
        if !slot.enabled() {
            return Sample::NoReading;
        }
        let channel = slot.channel();
        let sample = match ranger.read_mm(channel, self.range.read_timeout) {
            Ok(raw) => self.range.classify(raw),
            Err(e) => {
                debug!(slot = %slot.id(), error = %map_hw_error(&*e), "ranging failed");
                Sample::NoReading
            }
        };
        trace!(slot = %slot.id(), ?sample, "measured");
        store.record_sample(index, sample);
        sample
    }

    /// Measure every enabled slot in table order.
    pub fn measure_all(&self, store: &mut SlotStore, ranger: &mut dyn Ranger) {
        for index in 0..store.len() {
            self.read_slot(index, store, ranger);
        }
    }

    /// Publish one slot's latest sample. Disabled slots are skipped.
    pub fn publish_slot(
        &self,
        index: usize,
        store: &SlotStore,
        link: &mut BrokerLink,
        identity: &DeviceIdentity,
    ) -> bool {
        let Some(slot) = store.get(index).filter(|s| s.enabled()) else {
            return false;
        };
        let msg = SensorMsg {
            device_id: identity.as_str(),
            shelf_id: slot.id(),
            index,
            distance_cm: slot.sample().distance_cm(),
            enabled: true,
        };
        protocol::encode(&msg).is_some_and(|payload| link.publish(topics::SENSOR, &payload))
    }

    /// Publish every enabled slot, pausing `publish_gap` between messages.
    /// Returns how many messages the transport accepted.
    pub fn publish_all(
        &self,
        store: &SlotStore,
        link: &mut BrokerLink,
        clock: &dyn Clock,
        identity: &DeviceIdentity,
    ) -> usize {
        let mut sent = 0;
        let mut first = true;
        for index in 0..store.len() {
            if store.get(index).is_none_or(|s| !s.enabled()) {
                continue;
            }
            if !first {
                clock.sleep(self.cfg.publish_gap);
            }
            first = false;
            if self.publish_slot(index, store, link, identity) {
                sent += 1;
            }
        }
        sent
    }

    /// One full cycle: measure, then publish when the broker is up.
    pub fn run_cycle(
        &self,
        store: &mut SlotStore,
        ranger: &mut dyn Ranger,
        link: &mut BrokerLink,
        clock: &dyn Clock,
        identity: &DeviceIdentity,
    ) -> usize {
        self.measure_all(store, ranger);
        if !link.connected() {
            debug!("broker down, readings kept locally");
            return 0;
        }
        let sent = self.publish_all(store, link, clock, identity);
        debug!(sent, enabled = store.enabled_count(), "scan cycle published");
        sent
    }
}
