//! In-memory peripherals for tests and dry runs.
//!
//! Each mock is a cheap handle around shared state: keep a clone in the test,
//! hand the other to the `Node`, then script or inspect through the clone.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use shelf_traits::{InboundMessage, KvStore, Ranger, Resolver, SessionParams, Transport, WifiRadio};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn mock_err(msg: &str) -> BoxError {
    Box::new(std::io::Error::other(msg.to_string()))
}

// ── MemoryKv ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum KvValue {
    Bool(bool),
    F32(f32),
}

#[derive(Debug, Default)]
struct KvState {
    values: HashMap<(String, String), KvValue>,
    fail_writes: bool,
    fail_bool_writes: bool,
    fail_f32_writes: bool,
    writes: usize,
}

/// Key/value store kept in memory. Clones share contents, so a clone
/// outliving one `Node` plays the role of flash surviving a reboot.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    inner: Rc<RefCell<KvState>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Make only bool writes fail.
    pub fn fail_bool_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_bool_writes = fail;
    }

    /// Make only f32 writes fail.
    pub fn fail_f32_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_f32_writes = fail;
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.inner.borrow().writes
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, namespace: &str, key: &str, value: KvValue) -> Result<(), BoxError> {
        let mut st = self.inner.borrow_mut();
        let typed_failure = match value {
            KvValue::Bool(_) => st.fail_bool_writes,
            KvValue::F32(_) => st.fail_f32_writes,
        };
        if st.fail_writes || typed_failure {
            return Err(mock_err("storage write failed"));
        }
        st.values
            .insert((namespace.to_string(), key.to_string()), value);
        st.writes += 1;
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Option<KvValue> {
        self.inner
            .borrow()
            .values
            .get(&(namespace.to_string(), key.to_string()))
            .copied()
    }
}

impl KvStore for MemoryKv {
    fn get_bool(&self, namespace: &str, key: &str) -> Result<Option<bool>, BoxError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(KvValue::Bool(b)) => Ok(Some(b)),
            Some(KvValue::F32(_)) => Err(mock_err("type mismatch: expected bool")),
        }
    }

    fn get_f32(&self, namespace: &str, key: &str) -> Result<Option<f32>, BoxError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(KvValue::F32(v)) => Ok(Some(v)),
            Some(KvValue::Bool(_)) => Err(mock_err("type mismatch: expected f32")),
        }
    }

    fn put_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), BoxError> {
        self.put(namespace, key, KvValue::Bool(value))
    }

    fn put_f32(&mut self, namespace: &str, key: &str, value: f32) -> Result<(), BoxError> {
        self.put(namespace, key, KvValue::F32(value))
    }

    fn clear(&mut self, namespace: &str) -> Result<(), BoxError> {
        let mut st = self.inner.borrow_mut();
        if st.fail_writes {
            return Err(mock_err("storage write failed"));
        }
        st.values.retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}

// ── ScriptedRanger ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RangerState {
    scripts: HashMap<usize, VecDeque<Option<u32>>>,
    fallback: HashMap<usize, Option<u32>>,
    failing: Vec<usize>,
    reads: Vec<usize>,
}

/// Ranger replaying per-channel scripts, then a per-channel fallback value
/// (no echo when none was set).
#[derive(Debug, Clone, Default)]
pub struct ScriptedRanger {
    inner: Rc<RefCell<RangerState>>,
}

impl ScriptedRanger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue readings for `channel`, consumed one per read.
    pub fn push<I>(&self, channel: usize, readings: I)
    where
        I: IntoIterator<Item = Option<u32>>,
    {
        self.inner
            .borrow_mut()
            .scripts
            .entry(channel)
            .or_default()
            .extend(readings);
    }

    /// Reading returned once `channel`'s script is exhausted.
    pub fn set_fallback(&self, channel: usize, reading: Option<u32>) {
        self.inner.borrow_mut().fallback.insert(channel, reading);
    }

    /// Make every read of `channel` return an error.
    pub fn fail_channel(&self, channel: usize) {
        self.inner.borrow_mut().failing.push(channel);
    }

    /// Channels read so far, in order.
    pub fn reads(&self) -> Vec<usize> {
        self.inner.borrow().reads.clone()
    }

    pub fn read_count(&self, channel: usize) -> usize {
        self.inner
            .borrow()
            .reads
            .iter()
            .filter(|c| **c == channel)
            .count()
    }
}

impl Ranger for ScriptedRanger {
    fn read_mm(&mut self, channel: usize, _timeout: Duration) -> Result<Option<u32>, BoxError> {
        let mut st = self.inner.borrow_mut();
        st.reads.push(channel);
        if st.failing.contains(&channel) {
            return Err(mock_err("ranger fault"));
        }
        if let Some(v) = st.scripts.get_mut(&channel).and_then(VecDeque::pop_front) {
            return Ok(v);
        }
        Ok(st.fallback.get(&channel).copied().flatten())
    }
}

// ── ScriptedRadio ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RadioState {
    /// ssid -> status checks before association completes
    reachable: HashMap<String, u32>,
    attempts: Vec<String>,
    pending: Option<String>,
    checks_left: u32,
    associated: Option<String>,
}

/// Radio that joins only networks marked reachable, after a scripted number
/// of status checks.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRadio {
    inner: Rc<RefCell<RadioState>>,
}

impl ScriptedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ssid` associates after `checks` unsuccessful status checks.
    pub fn reachable(&self, ssid: &str, checks: u32) {
        self.inner
            .borrow_mut()
            .reachable
            .insert(ssid.to_string(), checks);
    }

    pub fn unreachable(&self, ssid: &str) {
        self.inner.borrow_mut().reachable.remove(ssid);
    }

    /// Every ssid passed to `begin`, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.inner.borrow().attempts.clone()
    }

    pub fn clear_attempts(&self) {
        self.inner.borrow_mut().attempts.clear();
    }

    /// Silently lose the current association.
    pub fn drop_link(&self) {
        let mut st = self.inner.borrow_mut();
        st.associated = None;
        st.pending = None;
    }

    pub fn associated_ssid(&self) -> Option<String> {
        self.inner.borrow().associated.clone()
    }
}

impl WifiRadio for ScriptedRadio {
    fn begin(&mut self, ssid: &str, _secret: &str) -> Result<(), BoxError> {
        let mut st = self.inner.borrow_mut();
        st.attempts.push(ssid.to_string());
        st.associated = None;
        match st.reachable.get(ssid).copied() {
            Some(checks) => {
                st.pending = Some(ssid.to_string());
                st.checks_left = checks;
            }
            None => st.pending = None,
        }
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        let mut st = self.inner.borrow_mut();
        if st.associated.is_some() {
            return true;
        }
        if st.pending.is_none() {
            return false;
        }
        if st.checks_left == 0 {
            st.associated = st.pending.take();
            return true;
        }
        st.checks_left -= 1;
        false
    }

    fn disconnect(&mut self) {
        let mut st = self.inner.borrow_mut();
        st.associated = None;
        st.pending = None;
    }

    fn rssi(&self) -> Option<i32> {
        self.inner.borrow().associated.as_ref().map(|_| -61)
    }
}

// ── ScriptedResolver ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ResolverState {
    answer: Option<Ipv4Addr>,
    lookups: Vec<String>,
}

/// Resolver answering every lookup with one address, or failing when unset.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResolver {
    inner: Rc<RefCell<ResolverState>>,
}

impl ScriptedResolver {
    pub fn new(answer: Option<Ipv4Addr>) -> Self {
        let r = Self::default();
        r.set_answer(answer);
        r
    }

    pub fn set_answer(&self, answer: Option<Ipv4Addr>) {
        self.inner.borrow_mut().answer = answer;
    }

    pub fn lookups(&self) -> usize {
        self.inner.borrow().lookups.len()
    }
}

impl Resolver for ScriptedResolver {
    fn lookup(&mut self, name: &str) -> Result<Ipv4Addr, BoxError> {
        let mut st = self.inner.borrow_mut();
        st.lookups.push(name.to_string());
        st.answer.ok_or_else(|| mock_err("name not found"))
    }
}

// ── RecordingTransport ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TransportState {
    connected: bool,
    refuse: bool,
    fail_subscribe: bool,
    sessions: Vec<SessionParams>,
    subscriptions: Vec<String>,
    published: Vec<(String, String)>,
    inbound: VecDeque<InboundMessage>,
}

/// Transport recording sessions and publishes; inbound messages are queued
/// with `inject` and delivered on `poll` when their topic is subscribed.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Rc<RefCell<TransportState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or accept again) subsequent connect attempts.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.borrow_mut().refuse = refuse;
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.inner.borrow_mut().fail_subscribe = fail;
    }

    /// Parameters of every connect attempt, accepted or not.
    pub fn sessions(&self) -> Vec<SessionParams> {
        self.inner.borrow().sessions.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.borrow().subscriptions.clone()
    }

    /// `(topic, payload)` of every accepted publish.
    pub fn published(&self) -> Vec<(String, String)> {
        self.inner.borrow().published.clone()
    }

    /// Payloads published on `topic`, parsed as JSON.
    pub fn published_on(&self, topic: &str) -> Vec<serde_json::Value> {
        self.inner
            .borrow()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, p)| serde_json::from_str(p).ok())
            .collect()
    }

    pub fn clear_published(&self) {
        self.inner.borrow_mut().published.clear();
    }

    pub fn inject(&self, topic: &str, payload: &str) {
        self.inner
            .borrow_mut()
            .inbound
            .push_back(InboundMessage::new(topic, payload.as_bytes()));
    }

    /// Drop the session as a broker restart would.
    pub fn drop_session(&self) {
        self.inner.borrow_mut().connected = false;
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, params: &SessionParams) -> Result<(), BoxError> {
        let mut st = self.inner.borrow_mut();
        st.sessions.push(params.clone());
        if st.refuse {
            st.connected = false;
            return Err(mock_err("connection refused"));
        }
        st.connected = true;
        st.subscriptions.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError> {
        let mut st = self.inner.borrow_mut();
        if st.fail_subscribe {
            return Err(mock_err("subscribe rejected"));
        }
        st.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], _retain: bool) -> Result<(), BoxError> {
        let mut st = self.inner.borrow_mut();
        if !st.connected {
            return Err(mock_err("not connected"));
        }
        st.published
            .push((topic.to_string(), String::from_utf8_lossy(payload).into_owned()));
        Ok(())
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        let mut st = self.inner.borrow_mut();
        let st = &mut *st;
        let subs = &st.subscriptions;
        st.inbound
            .drain(..)
            .filter(|m| subs.iter().any(|s| s == &m.topic))
            .collect()
    }

    fn disconnect(&mut self) {
        self.inner.borrow_mut().connected = false;
    }
}
