use std::time::Duration;
use tracing::trace;

use rppal::gpio::{Gpio, IoPin, Mode};

use crate::error::{HwError, Result};
use crate::util::{echo_us_to_mm, wait_until_with_timeout};

/// Single-pin ultrasonic sensor: the same GPIO line carries the trigger
/// pulse and, after switching to input, the echo pulse.
pub struct PingSensor {
    pin: IoPin,
}

impl PingSensor {
    pub fn new(gpio: &Gpio, bcm_pin: u8) -> Result<Self> {
        let mut pin = gpio
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(format!("open pin {bcm_pin}: {e}")))?
            .into_io(Mode::Output);
        pin.set_low(); // trigger idle low
        Ok(Self { pin })
    }

    /// One measurement. `Ok(None)` when no echo starts or ends within `timeout`.
    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<Option<u32>> {
        self.pin.set_mode(Mode::Output);
        self.pin.set_low();
        std::thread::sleep(Duration::from_micros(2));
        self.pin.set_high();
        std::thread::sleep(Duration::from_micros(10));
        self.pin.set_low();
        self.pin.set_mode(Mode::Input);

        let pin = &self.pin;
        let rise = match wait_until_with_timeout(|| pin.is_high(), timeout, Duration::ZERO) {
            Ok(t) => t,
            Err(HwError::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        };
        let fall = match wait_until_with_timeout(|| pin.is_low(), timeout, Duration::ZERO) {
            Ok(t) => t,
            Err(HwError::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        };

        let us = u64::try_from(fall.duration_since(rise).as_micros()).unwrap_or(u64::MAX);
        let mm = echo_us_to_mm(us);
        trace!(echo_us = us, mm, "ultrasonic echo");
        Ok(Some(mm))
    }
}

/// One `PingSensor` per slot, addressed by slot index.
pub struct GpioRanger {
    sensors: Vec<PingSensor>,
}

impl GpioRanger {
    pub fn new(pins: &[u8]) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let sensors = pins
            .iter()
            .map(|&p| PingSensor::new(&gpio, p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sensors })
    }
}

impl shelf_traits::Ranger for GpioRanger {
    fn read_mm(
        &mut self,
        channel: usize,
        timeout: Duration,
    ) -> std::result::Result<Option<u32>, Box<dyn std::error::Error + Send + Sync>> {
        let sensor = self
            .sensors
            .get_mut(channel)
            .ok_or(HwError::NoChannel(channel))?;
        Ok(sensor.read_with_timeout(timeout)?)
    }
}
