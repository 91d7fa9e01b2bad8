//! Broker session management.
//!
//! The broker address is resolved once through the name service and cached;
//! a failed or rejected lookup falls back to the static address. Any failed
//! connect attempt drops the cache so the next attempt resolves afresh.

use std::net::Ipv4Addr;

use shelf_traits::{Clock, InboundMessage, Resolver, SessionParams, Transport, Will};
use tracing::{debug, info, warn};

use crate::config::BrokerCfg;
use crate::error::{NodeError, Result};
use crate::hw_error::map_hw_error;
use crate::identity::DeviceIdentity;
use crate::protocol::{self, OfflineWill, topics};
use crate::util::Interval;

pub struct BrokerLink {
    transport: Box<dyn Transport>,
    resolver: Box<dyn Resolver>,
    cfg: BrokerCfg,
    cached: Option<Ipv4Addr>,
    reconnect: Interval,
    connected: bool,
    client_id: Option<String>,
}

impl core::fmt::Debug for BrokerLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrokerLink")
            .field("host", &self.cfg.host)
            .field("cached", &self.cached)
            .field("connected", &self.connected)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl BrokerLink {
    pub fn new(transport: Box<dyn Transport>, resolver: Box<dyn Resolver>, cfg: BrokerCfg) -> Self {
        let reconnect = Interval::new(cfg.reconnect_interval);
        Self {
            transport,
            resolver,
            cfg,
            cached: None,
            reconnect,
            connected: false,
            client_id: None,
        }
    }

    /// Broker address: the cached one, else a fresh lookup, else the fallback.
    /// An unspecified (0.0.0.0) answer counts as a failed lookup.
    pub fn resolve(&mut self) -> Ipv4Addr {
        if let Some(addr) = self.cached {
            return addr;
        }
        let addr = match self.resolver.lookup(&self.cfg.host) {
            Ok(addr) if !addr.is_unspecified() => {
                info!(host = %self.cfg.host, %addr, "broker resolved");
                addr
            }
            Ok(_) => {
                warn!(host = %self.cfg.host, fallback = %self.cfg.fallback_addr, "lookup answered 0.0.0.0, using fallback");
                self.cfg.fallback_addr
            }
            Err(e) => {
                warn!(host = %self.cfg.host, fallback = %self.cfg.fallback_addr, error = %map_hw_error(&*e), "lookup failed, using fallback");
                self.cfg.fallback_addr
            }
        };
        self.cached = Some(addr);
        addr
    }

    pub fn cached_addr(&self) -> Option<Ipv4Addr> {
        self.cached
    }

    /// Forget the cached address; the next `resolve` looks it up again.
    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            debug!("broker address cache invalidated");
        }
    }

    /// Open a session with a fresh client id, register the offline will and
    /// subscribe to the node's topics.
    pub fn connect(&mut self, identity: &DeviceIdentity) -> Result<()> {
        let addr = self.resolve();
        let client_id = identity.session_client_id();
        let will = protocol::encode(&OfflineWill {
            device_id: identity.as_str(),
            status: "offline",
        })
        .map(|payload| Will {
            topic: topics::STATUS.to_string(),
            payload: payload.into_bytes(),
        });
        let params = SessionParams {
            addr,
            port: self.cfg.port,
            client_id: client_id.clone(),
            keep_alive: self.cfg.keep_alive,
            connect_timeout: self.cfg.connect_timeout,
            will,
        };
        info!(%addr, port = self.cfg.port, %client_id, "connecting to broker");
        if let Err(e) = self.transport.connect(&params) {
            return Err(self.fail(map_hw_error(&*e)));
        }
        for topic in topics::subscriptions(identity) {
            if let Err(e) = self.transport.subscribe(&topic) {
                self.transport.disconnect();
                return Err(self.fail(map_hw_error(&*e)));
            }
            debug!(%topic, "subscribed");
        }
        self.connected = true;
        self.client_id = Some(client_id);
        info!(%addr, "broker session up");
        Ok(())
    }

    fn fail(&mut self, cause: NodeError) -> eyre::Report {
        self.connected = false;
        self.invalidate();
        let msg = match cause {
            NodeError::BrokerConnect(m) => m,
            other => other.to_string(),
        };
        eyre::Report::new(NodeError::BrokerConnect(msg))
    }

    /// Keep the session alive. Attempts a connect at most once per reconnect
    /// interval, and only while the network is up. Returns true when a new
    /// session came up during this call.
    pub fn service(&mut self, clock: &dyn Clock, network_up: bool, identity: &DeviceIdentity) -> bool {
        if self.connected && !network_up {
            warn!("network down, closing broker session");
            self.transport.disconnect();
            self.connected = false;
        }
        if self.connected && !self.transport.is_connected() {
            warn!("broker session lost");
            self.connected = false;
        }
        if self.connected || !network_up {
            return false;
        }
        if !self.reconnect.due(clock.now()) {
            return false;
        }
        match self.connect(identity) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, retry_ms = u64::try_from(self.cfg.reconnect_interval.as_millis()).unwrap_or(u64::MAX), "broker connect failed");
                false
            }
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Publish at-most-once, not retained. Silently dropped while down;
    /// returns whether the transport accepted the message.
    pub fn publish(&mut self, topic: &str, payload: &str) -> bool {
        if !self.connected {
            debug!(%topic, "broker down, publish dropped");
            return false;
        }
        match self.transport.publish(topic, payload.as_bytes(), false) {
            Ok(()) => true,
            Err(e) => {
                warn!(%topic, error = %map_hw_error(&*e), "publish failed");
                false
            }
        }
    }

    /// Messages received since the last drain, in arrival order.
    pub fn drain(&mut self) -> Vec<InboundMessage> {
        if !self.connected {
            return Vec::new();
        }
        self.transport.poll()
    }

    /// Close the session on shutdown.
    pub fn shutdown(&mut self) {
        if self.connected {
            self.transport.disconnect();
            self.connected = false;
            info!("broker session closed");
        }
    }
}
