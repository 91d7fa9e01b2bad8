//! Platform implementations of the `shelf_traits` seams.
//!
//! - `ultrasonic` (feature `hardware`): single-pin ultrasonic rangers on Raspberry Pi GPIO
//! - `mqtt`: broker session over `rumqttc`
//! - `resolver`: system and static name resolution
//! - `kv_file`: power-safe TOML key/value store
//! - simulated ranger, radio and transport for running without a rig
#[cfg(feature = "hardware")]
pub mod ultrasonic;

pub mod error;
pub mod kv_file;
pub mod mqtt;
pub mod resolver;
pub mod util;

pub use kv_file::FileKvStore;
pub use mqtt::MqttTransport;
pub use resolver::{StaticResolver, SystemResolver};

use shelf_traits::{InboundMessage, Ranger, SessionParams, Transport, WifiRadio};
use std::collections::VecDeque;
use std::time::Duration;

/// Simulated ranger: every channel reports a fixed base distance plus a small
/// repeating ripple, so successive readings differ like a real sensor's.
pub struct SimulatedRanger {
    base_mm: Vec<Option<u32>>,
    tick: u32,
}

impl SimulatedRanger {
    pub fn new(channels: usize, base_mm: u32) -> Self {
        SimulatedRanger {
            base_mm: vec![Some(base_mm); channels],
            tick: 0,
        }
    }

    /// Override one channel; `None` simulates a missing echo.
    pub fn set_channel(&mut self, channel: usize, mm: Option<u32>) {
        if let Some(slot) = self.base_mm.get_mut(channel) {
            *slot = mm;
        }
    }
}

impl Ranger for SimulatedRanger {
    fn read_mm(
        &mut self,
        channel: usize,
        _timeout: Duration,
    ) -> Result<Option<u32>, Box<dyn std::error::Error + Send + Sync>> {
        let base = *self
            .base_mm
            .get(channel)
            .ok_or(error::HwError::NoChannel(channel))?;
        self.tick = self.tick.wrapping_add(1);
        let reading = base.map(|mm| mm + self.tick % 5);
        tracing::trace!(channel, ?reading, "simulated ranging");
        Ok(reading)
    }
}

/// Simulated radio that can only see the networks it was told about.
pub struct SimulatedRadio {
    reachable: Vec<String>,
    associated: Option<String>,
}

impl SimulatedRadio {
    pub fn new<I, S>(reachable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SimulatedRadio {
            reachable: reachable.into_iter().map(Into::into).collect(),
            associated: None,
        }
    }
}

impl WifiRadio for SimulatedRadio {
    fn begin(
        &mut self,
        ssid: &str,
        _secret: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.associated = self.reachable.iter().find(|s| *s == ssid).cloned();
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        self.associated.is_some()
    }

    fn disconnect(&mut self) {
        self.associated = None;
    }

    fn rssi(&self) -> Option<i32> {
        self.associated.as_ref().map(|_| -55)
    }
}

/// Radio for hosts whose operating system owns the wireless link (a Pi running
/// NetworkManager, a wired bench machine). Association always succeeds.
#[derive(Debug, Default)]
pub struct HostRadio {
    up: bool,
}

impl WifiRadio for HostRadio {
    fn begin(
        &mut self,
        ssid: &str,
        _secret: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(%ssid, "host-managed network, nothing to associate");
        self.up = true;
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        self.up
    }

    fn disconnect(&mut self) {
        self.up = false;
    }

    fn rssi(&self) -> Option<i32> {
        None
    }
}

/// Transport that never leaves the process: publishes are logged, and
/// messages queued with `inject` are delivered on the next `poll`.
#[derive(Default)]
pub struct LoopbackTransport {
    connected: bool,
    subscriptions: Vec<String>,
    inbound: VecDeque<InboundMessage>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message; delivered only if its topic was subscribed.
    pub fn inject(&mut self, topic: &str, payload: &[u8]) {
        self.inbound.push_back(InboundMessage::new(topic, payload));
    }
}

impl Transport for LoopbackTransport {
    fn connect(
        &mut self,
        params: &SessionParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(addr = %params.addr, port = params.port, client_id = %params.client_id, "loopback session open");
        self.connected = true;
        self.subscriptions.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        _retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.connected {
            return Err(Box::new(error::HwError::NotConnected));
        }
        tracing::info!(%topic, payload = %String::from_utf8_lossy(payload), "publish");
        Ok(())
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        let subs = &self.subscriptions;
        self.inbound
            .drain(..)
            .filter(|m| subs.iter().any(|s| s == &m.topic))
            .collect()
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
