//! Hardware and platform seams for the shelf node.
//!
//! Everything the control loop touches outside of its own memory goes through
//! one of these traits: ranging, the wireless radio, the pub/sub transport,
//! name resolution, and the persistent key/value store. Implementations live in
//! `shelf_hardware` (real and simulated) and in `shelf_core::mocks` (tests).
pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::net::Ipv4Addr;
use std::time::Duration;

/// Bounded distance read for one ranging channel.
pub trait Ranger {
    /// Returns the distance in millimeters, `None` when no echo arrived
    /// within `timeout`. Range filtering is the caller's job.
    fn read_mm(
        &mut self,
        channel: usize,
        timeout: Duration,
    ) -> Result<Option<u32>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Station-mode wireless radio.
///
/// `begin` only starts association; callers poll `is_associated` until their
/// own deadline expires.
pub trait WifiRadio {
    fn begin(
        &mut self,
        ssid: &str,
        secret: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn is_associated(&mut self) -> bool;
    fn disconnect(&mut self);
    /// Received signal strength in dBm while associated.
    fn rssi(&self) -> Option<i32>;
}

/// Name-service lookup (mDNS/DNS) for the broker's logical name.
pub trait Resolver {
    fn lookup(
        &mut self,
        name: &str,
    ) -> Result<Ipv4Addr, Box<dyn std::error::Error + Send + Sync>>;
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, lossy for non-UTF-8 bytes.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Last-will message registered with the broker at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Parameters for one session attempt.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Upper bound on waiting for the broker's acknowledgement.
    pub connect_timeout: Duration,
    pub will: Option<Will>,
}

/// At-most-once publish/subscribe session.
pub trait Transport {
    fn connect(
        &mut self,
        params: &SessionParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn is_connected(&self) -> bool;
    fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Drain messages buffered since the last call. Never blocks.
    fn poll(&mut self) -> Vec<InboundMessage>;
    fn disconnect(&mut self);
}

/// Typed get/set by key within a namespace, surviving power loss.
pub trait KvStore {
    fn get_bool(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<bool>, Box<dyn std::error::Error + Send + Sync>>;
    fn get_f32(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<f32>, Box<dyn std::error::Error + Send + Sync>>;
    fn put_bool(
        &mut self,
        namespace: &str,
        key: &str,
        value: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn put_f32(
        &mut self,
        namespace: &str,
        key: &str,
        value: f32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Remove every key in `namespace`.
    fn clear(&mut self, namespace: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

// Boxed trait objects forward to their contents, so callers that choose an
// implementation at runtime can hand a `Box<dyn ...>` to generic setters.

impl<T: Ranger + ?Sized> Ranger for Box<T> {
    fn read_mm(
        &mut self,
        channel: usize,
        timeout: Duration,
    ) -> Result<Option<u32>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_mm(channel, timeout)
    }
}

impl<T: WifiRadio + ?Sized> WifiRadio for Box<T> {
    fn begin(
        &mut self,
        ssid: &str,
        secret: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).begin(ssid, secret)
    }
    fn is_associated(&mut self) -> bool {
        (**self).is_associated()
    }
    fn disconnect(&mut self) {
        (**self).disconnect();
    }
    fn rssi(&self) -> Option<i32> {
        (**self).rssi()
    }
}

impl<T: Resolver + ?Sized> Resolver for Box<T> {
    fn lookup(
        &mut self,
        name: &str,
    ) -> Result<Ipv4Addr, Box<dyn std::error::Error + Send + Sync>> {
        (**self).lookup(name)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(
        &mut self,
        params: &SessionParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).connect(params)
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).subscribe(topic)
    }
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).publish(topic, payload, retain)
    }
    fn poll(&mut self) -> Vec<InboundMessage> {
        (**self).poll()
    }
    fn disconnect(&mut self) {
        (**self).disconnect();
    }
}
