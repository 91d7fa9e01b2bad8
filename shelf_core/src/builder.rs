//! Builder assembling a `Node` from peripherals and configuration.
//!
//! Every peripheral is required; `build()` reports the first missing one as
//! a `BuildError`. Runtime configuration defaults to `NodeCfg::default()`.

use std::sync::Arc;

use shelf_traits::clock::{Clock, MonotonicClock};
use shelf_traits::{KvStore, Ranger, Resolver, Transport, WifiRadio};

use crate::associator::{CredentialList, NetworkAssociator};
use crate::broker::BrokerLink;
use crate::calibration::CalibrationEngine;
use crate::config::NodeCfg;
use crate::error::{BuildError, Result};
use crate::identity::DeviceIdentity;
use crate::node::Node;
use crate::scan::ScanLoop;
use crate::slots::{SlotSpec, SlotStore};
use crate::util::Interval;

#[derive(Default)]
pub struct NodeBuilder {
    ranger: Option<Box<dyn Ranger>>,
    radio: Option<Box<dyn WifiRadio>>,
    transport: Option<Box<dyn Transport>>,
    resolver: Option<Box<dyn Resolver>>,
    store: Option<Box<dyn KvStore>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    identity: Option<DeviceIdentity>,
    cfg: Option<NodeCfg>,
    slots: Vec<SlotSpec>,
    credentials: CredentialList,
}

impl NodeBuilder {
    /// Take timing, slot table and credentials from a validated config file.
    pub fn with_config(mut self, cfg: &shelf_config::Config) -> Self {
        self.cfg = Some(cfg.into());
        self.slots = cfg.slots.iter().map(SlotSpec::from).collect();
        self.credentials = (&cfg.wifi).into();
        self
    }
    pub fn with_node_cfg(mut self, cfg: NodeCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }
    pub fn with_slots(mut self, slots: Vec<SlotSpec>) -> Self {
        self.slots = slots;
        self
    }
    pub fn with_credentials(mut self, credentials: CredentialList) -> Self {
        self.credentials = credentials;
        self
    }
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
    pub fn with_ranger(mut self, ranger: impl Ranger + 'static) -> Self {
        self.ranger = Some(Box::new(ranger));
        self
    }
    pub fn with_radio(mut self, radio: impl WifiRadio + 'static) -> Self {
        self.radio = Some(Box::new(radio));
        self
    }
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }
    pub fn with_store(mut self, store: impl KvStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Node> {
        let ranger = self
            .ranger
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRanger))?;
        let radio = self
            .radio
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRadio))?;
        let transport = self
            .transport
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransport))?;
        let resolver = self
            .resolver
            .ok_or_else(|| eyre::Report::new(BuildError::MissingResolver))?;
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let identity = self
            .identity
            .ok_or_else(|| eyre::Report::new(BuildError::MissingIdentity))?;
        let cfg = self.cfg.unwrap_or_default();

        // ── Validation ───────────────────────────────────────────────────────
        if self.slots.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "at least one slot is required",
            )));
        }
        if self.credentials.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "at least one network credential is required",
            )));
        }
        if cfg.range.min_mm >= cfg.range.max_mm {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "min_mm must be < max_mm",
            )));
        }
        if cfg.calibration.min_valid == 0 || cfg.calibration.min_valid > cfg.calibration.samples {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "min_valid must be in [1, samples]",
            )));
        }
        for (i, s) in self.slots.iter().enumerate() {
            if self.slots[..i].iter().any(|o| o.id == s.id) {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "slot ids must be unique",
                )));
            }
        }

        // ── Assemble ─────────────────────────────────────────────────────────
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();
        let device_name = cfg
            .device_name
            .clone()
            .unwrap_or_else(|| identity.as_str().to_string());

        Ok(Node {
            slots: SlotStore::new(&self.slots, cfg.namespace.clone(), store),
            associator: NetworkAssociator::new(
                radio,
                self.credentials,
                cfg.wifi.attempt_timeout,
                cfg.wifi.poll_interval,
            ),
            broker: BrokerLink::new(transport, resolver, cfg.broker.clone()),
            ranger,
            calibration: CalibrationEngine::new(cfg.calibration, cfg.range),
            scan: ScanLoop::new(cfg.scan, cfg.range),
            status_timer: Interval::new(cfg.status_interval),
            clock,
            epoch,
            identity,
            device_name,
            booted: false,
        })
    }
}
