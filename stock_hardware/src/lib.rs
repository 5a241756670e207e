pub mod error;
pub mod hx711;
pub mod util;

pub use hx711::{Gain, Hx711, twos_complement_24};

use std::collections::VecDeque;
use std::time::Duration;

use stock_traits::{BoxError, Scale};

use crate::error::HwError;

/// One scripted outcome for [`SimulatedScale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimReading {
    Raw(i32),
    Timeout,
}

/// Host-side stand-in for the load cell.
///
/// Replays a script first; once it is exhausted, produces `idle_raw` plus a
/// linear drift per read, with an optional square-wave load that models an
/// item being placed and removed.
#[derive(Debug, Clone)]
pub struct SimulatedScale {
    script: VecDeque<SimReading>,
    idle_raw: i32,
    drift_per_read: i32,
    load_raw: i32,
    load_period: u32,
    always_timeout: bool,
    reads: u32,
}

impl SimulatedScale {
    pub fn new(idle_raw: i32) -> Self {
        Self {
            script: VecDeque::new(),
            idle_raw,
            drift_per_read: 0,
            load_raw: 0,
            load_period: 0,
            always_timeout: false,
            reads: 0,
        }
    }

    /// Replay `raws` before falling back to the idle value.
    pub fn scripted(idle_raw: i32, raws: impl IntoIterator<Item = SimReading>) -> Self {
        let mut s = Self::new(idle_raw);
        s.script.extend(raws);
        s
    }

    pub fn push(&mut self, r: SimReading) {
        self.script.push_back(r);
    }

    pub fn with_drift(mut self, raw_per_read: i32) -> Self {
        self.drift_per_read = raw_per_read;
        self
    }

    /// Alternate between empty and `load_raw` every `period` reads (0 disables).
    pub fn with_load_cycle(mut self, load_raw: i32, period: u32) -> Self {
        self.load_raw = load_raw;
        self.load_period = period;
        self
    }

    pub fn always_timeout(mut self) -> Self {
        self.always_timeout = true;
        self
    }

    /// Build from `STOCK_SIM_*` environment variables:
    /// - `STOCK_SIM_IDLE_RAW`: raw count at zero load (default 84000)
    /// - `STOCK_SIM_DRIFT`: raw counts added per read (default 0)
    /// - `STOCK_SIM_LOAD_RAW` / `STOCK_SIM_LOAD_PERIOD`: load square wave
    /// - `STOCK_SIM_TIMEOUT=1`: every read times out
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
        }
        let mut s = Self::new(var("STOCK_SIM_IDLE_RAW").unwrap_or(84_000))
            .with_drift(var("STOCK_SIM_DRIFT").unwrap_or(0))
            .with_load_cycle(
                var("STOCK_SIM_LOAD_RAW").unwrap_or(0),
                var("STOCK_SIM_LOAD_PERIOD").unwrap_or(0),
            );
        if var::<u8>("STOCK_SIM_TIMEOUT").unwrap_or(0) != 0 {
            s = s.always_timeout();
        }
        s
    }

    fn generated(&self, n: u32) -> i32 {
        let drift = self
            .drift_per_read
            .saturating_mul(i32::try_from(n).unwrap_or(i32::MAX));
        let loaded = self.load_period > 0 && (n / self.load_period) % 2 == 1;
        let load = if loaded { self.load_raw } else { 0 };
        self.idle_raw.saturating_add(drift).saturating_add(load)
    }
}

impl Scale for SimulatedScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        let n = self.reads;
        self.reads = self.reads.saturating_add(1);
        if self.always_timeout {
            return Err(Box::new(HwError::DataReadyTimeout));
        }
        let outcome = self
            .script
            .pop_front()
            .unwrap_or_else(|| SimReading::Raw(self.generated(n)));
        match outcome {
            SimReading::Raw(v) => {
                tracing::trace!(raw = v, "simulated read");
                Ok(v)
            }
            SimReading::Timeout => Err(Box::new(HwError::DataReadyTimeout)),
        }
    }
}

#[cfg(feature = "hardware")]
pub mod hardware {
    use super::*;
    use crate::hx711::Hx711;
    use rppal::gpio::{Gpio, InputPin, OutputPin};
    use stock_traits::MonotonicClock;

    type Driver = Hx711<InputPin, OutputPin, rppal::hal::Delay, MonotonicClock>;

    /// HX711 wired to Raspberry Pi GPIO lines.
    pub struct HardwareScale {
        hx711: Driver,
    }

    impl HardwareScale {
        pub fn new(dt_pin: u8, sck_pin: u8, gain: Gain, poll_interval: Duration) -> Result<Self, HwError> {
            let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
            let dt = gpio
                .get(dt_pin)
                .map_err(|e| HwError::Gpio(format!("open hx711 dt pin {dt_pin}: {e}")))?
                .into_input();
            let sck = gpio
                .get(sck_pin)
                .map_err(|e| HwError::Gpio(format!("open hx711 sck pin {sck_pin}: {e}")))?
                .into_output_low();
            let hx711 = Hx711::new(dt, sck, rppal::hal::Delay::new(), MonotonicClock::new(), gain)?
                .with_poll_interval(poll_interval);
            Ok(Self { hx711 })
        }

        pub fn power_on(&mut self) -> Result<(), HwError> {
            self.hx711.power_on()
        }

        pub fn power_off(&mut self) -> Result<(), HwError> {
            self.hx711.power_off()
        }
    }

    impl Scale for HardwareScale {
        fn read(&mut self, timeout: Duration) -> Result<i32, BoxError> {
            match self.hx711.read_with_timeout(timeout) {
                Ok(raw) => {
                    tracing::debug!(raw, "hx711 sample");
                    Ok(raw)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "hx711 read failed");
                    Err(Box::new(e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn script_then_idle() {
        let mut scale = SimulatedScale::scripted(
            100,
            [SimReading::Raw(5), SimReading::Timeout, SimReading::Raw(-7)],
        );
        assert_eq!(scale.read(T).unwrap(), 5);
        assert!(scale.read(T).is_err());
        assert_eq!(scale.read(T).unwrap(), -7);
        assert_eq!(scale.read(T).unwrap(), 100);
    }

    #[test]
    fn drift_accumulates_per_read() {
        let mut scale = SimulatedScale::new(0).with_drift(10);
        let v: Vec<i32> = (0..3).map(|_| scale.read(T).unwrap()).collect();
        assert_eq!(v, vec![0, 10, 20]);
    }

    #[test]
    fn load_cycle_alternates() {
        let mut scale = SimulatedScale::new(0).with_load_cycle(500, 2);
        let v: Vec<i32> = (0..6).map(|_| scale.read(T).unwrap()).collect();
        assert_eq!(v, vec![0, 0, 500, 500, 0, 0]);
    }

    #[test]
    fn forced_timeout_mentions_timeout() {
        let mut scale = SimulatedScale::new(0).always_timeout();
        let err = scale.read(T).expect_err("timeout");
        assert!(err.to_string().contains("timeout"));
    }
}
