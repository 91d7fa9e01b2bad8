//! Slot table with write-through persistence.
//!
//! Each slot owns one ranging channel. Its `enabled` flag and calibrated
//! reference length survive restarts; the latest sample is volatile.
//!
//! Persisted layout inside the configured namespace:
//! - `{id}`: bool, enabled flag (absent = false)
//! - `{id}_len`: f32, reference length in cm (absent = 0.0)

use shelf_traits::KvStore;
use tracing::{debug, info, warn};

use crate::error::{NodeError, Result};
use crate::hw_error::map_hw_error;

/// Latest reading of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sample {
    /// Valid distance in millimeters, inside the ranging window.
    Mm(u32),
    /// Disabled, timed out, or out of range.
    #[default]
    NoReading,
}

impl Sample {
    #[inline]
    pub fn mm(self) -> Option<u32> {
        match self {
            Sample::Mm(mm) => Some(mm),
            Sample::NoReading => None,
        }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        matches!(self, Sample::Mm(_))
    }

    /// Wire value: centimeters with one decimal, `-1.0` for no reading.
    pub fn distance_cm(self) -> f64 {
        match self {
            Sample::Mm(mm) => f64::from(mm) / 10.0,
            Sample::NoReading => -1.0,
        }
    }
}

/// Static description of a slot, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub id: String,
    pub gpio: u8,
}

impl SlotSpec {
    pub fn new(id: impl Into<String>, gpio: u8) -> Self {
        Self {
            id: id.into(),
            gpio,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    id: String,
    channel: usize,
    gpio: u8,
    enabled: bool,
    reference_cm: f32,
    sample: Sample,
}

impl Slot {
    pub fn id(&self) -> &str {
        &self.id
    }
    /// Ranging channel, equal to the slot's position in the table.
    pub fn channel(&self) -> usize {
        self.channel
    }
    pub fn gpio(&self) -> u8 {
        self.gpio
    }
    pub fn enabled(&self) -> bool {
        self.enabled
    }
    /// Calibrated empty-slot distance in cm; 0.0 when never calibrated.
    pub fn reference_cm(&self) -> f32 {
        self.reference_cm
    }
    pub fn sample(&self) -> Sample {
        self.sample
    }

    fn len_key(&self) -> String {
        format!("{}_len", self.id)
    }
}

/// Ordered slot table backed by a `KvStore`.
///
/// Every mutation persists before it becomes visible; a failed write leaves
/// the in-memory state as it was.
pub struct SlotStore {
    slots: Vec<Slot>,
    namespace: String,
    kv: Box<dyn KvStore>,
}

impl core::fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlotStore")
            .field("namespace", &self.namespace)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

impl SlotStore {
    /// Build the table in configuration order. Every slot starts disabled and
    /// uncalibrated until `load` runs.
    pub fn new(specs: &[SlotSpec], namespace: impl Into<String>, kv: Box<dyn KvStore>) -> Self {
        let slots = specs
            .iter()
            .enumerate()
            .map(|(channel, s)| Slot {
                id: s.id.clone(),
                channel,
                gpio: s.gpio,
                enabled: false,
                reference_cm: 0.0,
                sample: Sample::NoReading,
            })
            .collect();
        Self {
            slots,
            namespace: namespace.into(),
            kv,
        }
    }

    /// Restore enabled flags and reference lengths. Missing or unreadable
    /// keys fall back to disabled / 0.0; a storage fault never aborts boot.
    pub fn load(&mut self) {
        for slot in &mut self.slots {
            slot.enabled = match self.kv.get_bool(&self.namespace, &slot.id) {
                Ok(v) => v.unwrap_or(false),
                Err(e) => {
                    warn!(slot = %slot.id, error = %map_hw_error(&*e), "enabled flag unreadable, using default");
                    false
                }
            };
            slot.reference_cm = match self.kv.get_f32(&self.namespace, &slot.len_key()) {
                Ok(v) => v.filter(|cm| cm.is_finite() && *cm >= 0.0).unwrap_or(0.0),
                Err(e) => {
                    warn!(slot = %slot.id, error = %map_hw_error(&*e), "reference length unreadable, using default");
                    0.0
                }
            };
            slot.sample = Sample::NoReading;
        }
        info!(
            slots = self.slots.len(),
            enabled = self.enabled_count(),
            namespace = %self.namespace,
            "slot state loaded"
        );
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Position of the slot with exactly this id.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    pub fn enabled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.enabled).count()
    }

    pub fn enabled_ids(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.id.as_str())
            .collect()
    }

    fn require(&self, id: &str) -> Result<usize> {
        self.index_of(id)
            .ok_or_else(|| eyre::Report::new(NodeError::UnknownSlot(id.to_string())))
    }

    /// Set the enabled flag and persist it together with the slot's reference
    /// length. Disabling clears the latest sample.
    ///
    /// The length is written first and the flag last: the length value is the
    /// one already held in memory, so a failure at either step leaves storage
    /// and memory agreeing on both keys.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let index = self.require(id)?;
        let key = self.slots[index].id.clone();
        let len_key = self.slots[index].len_key();
        let reference_cm = self.slots[index].reference_cm;
        self.kv
            .put_f32(&self.namespace, &len_key, reference_cm)
            .and_then(|()| self.kv.put_bool(&self.namespace, &key, enabled))
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
        let slot = &mut self.slots[index];
        slot.enabled = enabled;
        if !enabled {
            slot.sample = Sample::NoReading;
        }
        debug!(slot = %key, enabled, "slot flag persisted");
        Ok(())
    }

    /// Set and persist the calibrated reference length.
    pub fn set_reference_length(&mut self, id: &str, cm: f32) -> Result<()> {
        let index = self.require(id)?;
        let key = self.slots[index].len_key();
        self.kv
            .put_f32(&self.namespace, &key, cm)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
        self.slots[index].reference_cm = cm;
        debug!(slot = %self.slots[index].id, reference_cm = cm, "reference length persisted");
        Ok(())
    }

    /// Store the latest sample. A disabled slot always holds `NoReading`.
    pub fn record_sample(&mut self, index: usize, sample: Sample) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.sample = if slot.enabled {
                sample
            } else {
                Sample::NoReading
            };
        }
    }

    /// Erase the namespace and return every slot to its factory state.
    pub fn clear(&mut self) -> Result<()> {
        self.kv
            .clear(&self.namespace)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
        for slot in &mut self.slots {
            slot.enabled = false;
            slot.reference_cm = 0.0;
            slot.sample = Sample::NoReading;
        }
        info!(namespace = %self.namespace, "persisted slot state cleared");
        Ok(())
    }
}
