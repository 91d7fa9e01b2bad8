//! Reference-length calibration.
//!
//! With the slot empty, take a fixed number of paced samples, keep those
//! inside the ranging window and average them. The mean (cm, one decimal)
//! becomes the slot's persisted reference length. Too few valid samples
//! leaves the stored value untouched.

use shelf_traits::{Clock, Ranger};
use tracing::{debug, info, warn};

use crate::config::{CalibrationCfg, RangeCfg};
use crate::error::CalibrationError;
use crate::hw_error::map_hw_error;
use crate::slots::SlotStore;
use crate::util::{mean_mm_round_half_up, mm_to_cm};

/// Reduce raw samples to a reference length in whole millimeters.
///
/// Samples outside `range` (or missing) are discarded; fewer than
/// `min_valid` survivors is an error.
pub fn reference_mm(
    samples: &[Option<u32>],
    range: &RangeCfg,
    min_valid: u32,
) -> Result<u64, CalibrationError> {
    let (sum, valid) = samples
        .iter()
        .filter_map(|raw| range.classify(*raw).mm())
        .fold((0_u64, 0_u32), |(sum, n), mm| (sum + u64::from(mm), n + 1));
    if valid < min_valid {
        return Err(CalibrationError::InsufficientSamples {
            valid,
            required: min_valid,
        });
    }
    mean_mm_round_half_up(sum, u64::from(valid)).ok_or(CalibrationError::InsufficientSamples {
        valid,
        required: min_valid,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationEngine {
    cfg: CalibrationCfg,
    range: RangeCfg,
}

impl CalibrationEngine {
    pub fn new(cfg: CalibrationCfg, range: RangeCfg) -> Self {
        Self { cfg, range }
    }

    pub fn cfg(&self) -> &CalibrationCfg {
        &self.cfg
    }

    /// Sample `slot_id`'s channel and persist the resulting reference length
    /// in cm. Blocks for roughly `samples * sample_delay`.
    pub fn calibrate(
        &self,
        slot_id: &str,
        store: &mut SlotStore,
        ranger: &mut dyn Ranger,
        clock: &dyn Clock,
    ) -> Result<f32, CalibrationError> {
        let index = store
            .index_of(slot_id)
            .ok_or_else(|| CalibrationError::UnknownSlot(slot_id.to_string()))?;
        let channel = store.get(index).map_or(index, |s| s.channel());

        info!(slot = %slot_id, samples = self.cfg.samples, "calibration started");
        let mut samples = Vec::with_capacity(self.cfg.samples as usize);
        for i in 0..self.cfg.samples {
            if i > 0 {
                clock.sleep(self.cfg.sample_delay);
            }
            let raw = match ranger.read_mm(channel, self.range.read_timeout) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(slot = %slot_id, sample = i, error = %map_hw_error(&*e), "sample failed");
                    None
                }
            };
            samples.push(raw);
        }

        let mm = match reference_mm(&samples, &self.range, self.cfg.min_valid) {
            Ok(mm) => mm,
            Err(e) => {
                warn!(slot = %slot_id, error = %e, "calibration failed");
                return Err(e);
            }
        };
        let cm = mm_to_cm(mm);
        store
            .set_reference_length(slot_id, cm)
            .map_err(|e| CalibrationError::Persist(e.to_string()))?;
        info!(slot = %slot_id, reference_cm = cm, "calibration complete");
        Ok(cm)
    }
}
