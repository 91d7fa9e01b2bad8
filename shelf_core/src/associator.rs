//! Multi-credential network association.
//!
//! Credentials are tried in rotation starting at the last one that worked,
//! each with a bounded wait, so a node moved between sites rejoins whichever
//! network is in range without operator help.

use std::fmt;
use std::time::Duration;

use shelf_traits::{Clock, WifiRadio};
use tracing::{debug, info, warn};

use crate::error::{NodeError, Result};
use crate::hw_error::map_hw_error;
use crate::util::Interval;

/// How often association status is checked while waiting.
pub const ASSOCIATION_CHECK: Duration = Duration::from_millis(100);

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub ssid: String,
    pub secret: String,
}

impl Credential {
    pub fn new(ssid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            secret: secret.into(),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("ssid", &self.ssid)
            .field("secret", &"***")
            .finish()
    }
}

/// Ordered, fixed list of networks the node may join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialList(Vec<Credential>);

impl CredentialList {
    pub fn new(items: Vec<Credential>) -> Self {
        Self(items)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.0.get(index)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.0.iter()
    }
}

impl FromIterator<Credential> for CredentialList {
    fn from_iter<I: IntoIterator<Item = Credential>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct NetworkAssociator {
    radio: Box<dyn WifiRadio>,
    credentials: CredentialList,
    /// Index tried first on the next pass; the last success.
    cursor: usize,
    current: Option<usize>,
    attempt_timeout: Duration,
    poll: Interval,
}

impl fmt::Debug for NetworkAssociator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkAssociator")
            .field("credentials", &self.credentials)
            .field("cursor", &self.cursor)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Poll `is_associated` every `ASSOCIATION_CHECK` until `timeout` elapses.
fn wait_associated(radio: &mut dyn WifiRadio, clock: &dyn Clock, timeout: Duration) -> bool {
    let deadline = clock.now() + timeout;
    loop {
        if radio.is_associated() {
            return true;
        }
        let now = clock.now();
        if now >= deadline {
            return false;
        }
        clock.sleep(ASSOCIATION_CHECK.min(deadline - now));
    }
}

impl NetworkAssociator {
    pub fn new(
        radio: Box<dyn WifiRadio>,
        credentials: CredentialList,
        attempt_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            radio,
            credentials,
            cursor: 0,
            current: None,
            attempt_timeout,
            poll: Interval::new(poll_interval),
        }
    }

    /// One pass over the credential list beginning at the cursor, at most
    /// `timeout` per credential. Returns the index that associated.
    ///
    /// On failure the radio is left disconnected and the cursor unchanged.
    pub fn associate(&mut self, clock: &dyn Clock, timeout: Duration) -> Result<usize> {
        let n = self.credentials.len();
        for step in 0..n {
            let index = (self.cursor + step) % n;
            let cred = &self.credentials.0[index];
            self.radio.disconnect();
            info!(ssid = %cred.ssid, attempt = step + 1, of = n, "associating");
            if let Err(e) = self.radio.begin(&cred.ssid, &cred.secret) {
                warn!(ssid = %cred.ssid, error = %map_hw_error(&*e), "radio refused association");
                continue;
            }
            if wait_associated(&mut *self.radio, clock, timeout) {
                self.cursor = index;
                self.current = Some(index);
                info!(ssid = %cred.ssid, rssi = ?self.radio.rssi(), "network associated");
                return Ok(index);
            }
            warn!(
                ssid = %cred.ssid,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "association timed out"
            );
        }
        self.radio.disconnect();
        self.current = None;
        Err(eyre::Report::new(NodeError::AssociationFailed { tried: n }))
    }

    /// Cadenced link check; re-associates when the link silently dropped.
    /// The first call always checks. Returns whether the network is up.
    pub fn poll(&mut self, clock: &dyn Clock) -> bool {
        if !self.poll.due(clock.now()) {
            return self.current.is_some();
        }
        if self.current.is_some() && self.radio.is_associated() {
            debug!(ssid = ?self.current_ssid(), "network link ok");
            return true;
        }
        if self.current.take().is_some() {
            warn!("network link lost");
        }
        match self.associate(clock, self.attempt_timeout) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "no network joined, will retry");
                false
            }
        }
    }

    /// Network state as of the last association or poll.
    pub fn is_up(&self) -> bool {
        self.current.is_some()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_ssid(&self) -> Option<&str> {
        self.current
            .and_then(|i| self.credentials.get(i))
            .map(|c| c.ssid.as_str())
    }

    /// Signal strength in dBm, 0 when unknown (matches what receivers expect
    /// from a disconnected radio).
    pub fn rssi(&self) -> i32 {
        if self.current.is_some() {
            self.radio.rssi().unwrap_or(0)
        } else {
            0
        }
    }

    pub fn credentials(&self) -> &CredentialList {
        &self.credentials
    }
}
