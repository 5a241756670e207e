//! HX711 24-bit load-cell ADC, bit-banged over two GPIO lines.
//!
//! DT (DOUT) goes low when a conversion is ready. Each rising edge on SCK
//! shifts out one bit, MSB first. After the 24 data bits, 1..=3 extra pulses
//! select the channel and gain used for the *next* conversion.
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use stock_traits::Clock;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::poll_until;

/// Data bits per conversion.
pub const DATA_BITS: u32 = 24;

const SIGN_BIT: u32 = 1 << (DATA_BITS - 1);
const FULL_RANGE: i32 = 1 << DATA_BITS;

/// Default bound on the data-ready wait.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Default sleep between data-ready polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

// Datasheet: SCK low for >= 80 us after power-up, high for > 60 us enters power-down.
const POWER_ON_SETTLE_US: u32 = 80;
const POWER_OFF_HOLD_US: u32 = 100;
// SCK high/low time per pulse; must stay well below the 60 us power-down threshold.
const PULSE_US: u32 = 1;

/// Channel/gain selector, applied to the conversion after the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Gain {
    /// Channel A, gain 128.
    #[default]
    A128,
    /// Channel B, gain 32.
    B32,
    /// Channel A, gain 64.
    A64,
}

impl Gain {
    /// Clock pulses after the 24 data bits that select this gain.
    pub fn extra_pulses(self) -> u8 {
        match self {
            Gain::A128 => 1,
            Gain::B32 => 2,
            Gain::A64 => 3,
        }
    }
}

/// Reinterpret a 24-bit accumulator as two's complement.
///
/// Bits above 23 are ignored.
#[inline]
pub fn twos_complement_24(raw: u32) -> i32 {
    let v = (raw & 0x00FF_FFFF) as i32;
    if raw & SIGN_BIT != 0 { v - FULL_RANGE } else { v }
}

pub struct Hx711<DT, SCK, D, C> {
    dt: DT,
    sck: SCK,
    delay: D,
    clock: C,
    gain: Gain,
    timeout: Duration,
    poll_interval: Duration,
    powered: bool,
}

fn gpio<E: core::fmt::Debug>(e: E) -> HwError {
    HwError::Gpio(format!("{e:?}"))
}

impl<DT, SCK, D, C> Hx711<DT, SCK, D, C>
where
    DT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
    C: Clock,
{
    /// Take ownership of the lines. The device starts out unpowered from the
    /// driver's point of view; call [`power_on`](Self::power_on) before reading.
    pub fn new(dt: DT, mut sck: SCK, delay: D, clock: C, gain: Gain) -> Result<Self> {
        sck.set_low().map_err(gpio)?; // clock idle low
        Ok(Self {
            dt,
            sck,
            delay,
            clock,
            gain,
            timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            powered: false,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn power_on(&mut self) -> Result<()> {
        self.sck.set_low().map_err(gpio)?;
        self.delay.delay_us(POWER_ON_SETTLE_US);
        self.powered = true;
        Ok(())
    }

    pub fn power_off(&mut self) -> Result<()> {
        self.sck.set_low().map_err(gpio)?;
        self.sck.set_high().map_err(gpio)?;
        self.delay.delay_us(POWER_OFF_HOLD_US);
        self.powered = false;
        Ok(())
    }

    /// DT low means a conversion is waiting to be clocked out.
    pub fn is_ready(&mut self) -> Result<bool> {
        self.dt.is_low().map_err(gpio)
    }

    /// Read one conversion using the configured timeout.
    pub fn read(&mut self) -> Result<i32> {
        self.read_with_timeout(self.timeout)
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        if !self.powered {
            return Err(HwError::PoweredDown);
        }

        let dt = &mut self.dt;
        poll_until(
            || dt.is_low().map_err(gpio),
            timeout,
            self.poll_interval,
            &self.clock,
        )?;

        let mut acc: u32 = 0;
        for _ in 0..DATA_BITS {
            let bit = self.pulse(true)?;
            acc = (acc << 1) | u32::from(bit);
        }
        for _ in 0..self.gain.extra_pulses() {
            self.pulse(false)?;
        }

        let value = twos_complement_24(acc);
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    /// One SCK pulse; when `sample` is set, DT is read while SCK is high.
    fn pulse(&mut self, sample: bool) -> Result<bool> {
        self.sck.set_high().map_err(gpio)?;
        self.delay.delay_us(PULSE_US);
        let bit = if sample {
            self.dt.is_high().map_err(gpio)?
        } else {
            false
        };
        self.sck.set_low().map_err(gpio)?;
        self.delay.delay_us(PULSE_US);
        Ok(bit)
    }

    /// Give the lines back, e.g. to reconfigure them.
    pub fn release(self) -> (DT, SCK) {
        (self.dt, self.sck)
    }
}
