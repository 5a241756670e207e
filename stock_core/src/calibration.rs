//! Tare calibration: raw-count offset from an empty platform, verified
//! against a residual tolerance before the station is allowed to run.
use std::time::Duration;

use stock_traits::{Actuator, Clock, Display, Scale};
use tracing::{debug, info, warn};

use crate::config::CalibrationCfg;
use crate::error::{BuildError, StartupError};

/// Linear raw→grams model for one power cycle.
///
/// `offset` is the raw count measured with nothing on the platform; it is
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub offset: i32,
    /// Raw counts per gram. Negative when the cell is wired so that load
    /// lowers the count.
    pub scale_factor: f32,
}

impl Calibration {
    pub fn new(offset: i32, scale_factor: f32) -> Result<Self, BuildError> {
        if !scale_factor.is_finite() || scale_factor == 0.0 {
            return Err(BuildError::ScaleFactor);
        }
        Ok(Self {
            offset,
            scale_factor,
        })
    }

    /// `(raw - offset) / scale_factor`, no smoothing.
    #[inline]
    pub fn to_grams(&self, raw: i32) -> f32 {
        // i64 so that extreme raw/offset pairs cannot overflow the subtraction
        let delta = i64::from(raw) - i64::from(self.offset);
        delta as f32 / self.scale_factor
    }
}

/// Median of the samples: `sorted[len / 2]`, i.e. the upper median for an
/// even count. `None` when there is nothing to take the median of.
pub fn median_offset(samples: &[i32]) -> Option<i32> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

/// Result of the verification pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub mean_g: f32,
    pub ok: bool,
}

/// Drives the startup tare + verify sequence against a [`Scale`].
pub struct Calibrator<C: Clock> {
    cfg: CalibrationCfg,
    clock: C,
    read_timeout: Duration,
    last_weight: f32,
}

impl<C: Clock> Calibrator<C> {
    pub fn new(cfg: CalibrationCfg, clock: C) -> Result<Self, BuildError> {
        if !cfg.scale_factor.is_finite() || cfg.scale_factor == 0.0 {
            return Err(BuildError::ScaleFactor);
        }
        if cfg.tare_samples == 0 {
            return Err(BuildError::InvalidConfig("tare_samples must be >= 1"));
        }
        if cfg.verify_samples == 0 {
            return Err(BuildError::InvalidConfig("verify_samples must be >= 1"));
        }
        Ok(Self {
            cfg,
            clock,
            read_timeout: crate::config::Timeouts::default().sensor,
            last_weight: 0.0,
        })
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Last calibrated weight seen during verification (0 before any).
    pub fn last_weight(&self) -> f32 {
        self.last_weight
    }

    /// Take `tare_samples` raw readings, pausing `sample_delay` after each
    /// attempt, and return their median. Failed reads are skipped.
    pub fn calibrate_tare<S: Scale + ?Sized>(&mut self, scale: &mut S) -> Result<i32, StartupError> {
        let mut samples = Vec::with_capacity(self.cfg.tare_samples);
        for i in 0..self.cfg.tare_samples {
            match scale.read(self.read_timeout) {
                Ok(raw) => {
                    debug!(sample = i, raw, "tare sample");
                    samples.push(raw);
                }
                Err(e) => warn!(sample = i, error = %e, "tare sample failed; skipping"),
            }
            self.clock.sleep(self.cfg.sample_delay);
        }
        let offset = median_offset(&samples).ok_or(StartupError::NoTareSamples)?;
        info!(offset, samples = samples.len(), "tare offset measured");
        Ok(offset)
    }

    /// Average `verify_samples` calibrated readings and compare the mean
    /// against `tolerance_g`. A failed read repeats the last known weight.
    pub fn verify<S: Scale + ?Sized>(&mut self, scale: &mut S, cal: &Calibration) -> Verification {
        let n = self.cfg.verify_samples;
        let mut sum = 0.0_f32;
        for _ in 0..n {
            sum += self.weigh(scale, cal);
            self.clock.sleep(self.cfg.sample_delay);
        }
        let mean_g = sum / n as f32;
        let ok = mean_g.abs() <= self.cfg.tolerance_g;
        info!(mean_g, tolerance_g = self.cfg.tolerance_g, ok, "tare verification");
        Verification { mean_g, ok }
    }

    /// One more reading after verification, held to the looser
    /// `initial_tolerance_g`.
    pub fn check_initial<S: Scale + ?Sized>(
        &mut self,
        scale: &mut S,
        cal: &Calibration,
    ) -> Result<f32, StartupError> {
        let w = self.weigh(scale, cal);
        info!(weight_g = w, "initial reading");
        if w.abs() > self.cfg.initial_tolerance_g {
            return Err(StartupError::CalibrationFailure {
                mean_g: w,
                tolerance_g: self.cfg.initial_tolerance_g,
            });
        }
        Ok(w)
    }

    /// Full startup calibration: tare (or the fixed offset), verify, then the
    /// initial-reading check. Any failure is fatal for this power cycle.
    pub fn run<S: Scale + ?Sized>(&mut self, scale: &mut S) -> Result<Calibration, StartupError> {
        let offset = match self.cfg.fixed_offset {
            Some(offset) => {
                info!(offset, "using configured tare offset");
                offset
            }
            None => self.calibrate_tare(scale)?,
        };
        let cal = Calibration {
            offset,
            scale_factor: self.cfg.scale_factor,
        };

        let v = self.verify(scale, &cal);
        if !v.ok {
            warn!(mean_g = v.mean_g, "residual weight after tare");
            return Err(StartupError::CalibrationFailure {
                mean_g: v.mean_g,
                tolerance_g: self.cfg.tolerance_g,
            });
        }
        self.check_initial(scale, &cal)?;
        Ok(cal)
    }

    /// [`run`](Self::run) with the tare progress on the display and the
    /// calibrated cue on the actuator once it passes.
    pub fn run_with_feedback<S, A, D>(
        &mut self,
        scale: &mut S,
        actuator: &mut A,
        display: &mut D,
    ) -> Result<Calibration, StartupError>
    where
        S: Scale + ?Sized,
        A: Actuator + ?Sized,
        D: Display + ?Sized,
    {
        show(display, "Calibrating tare", "Do not touch!");
        let cal = self.run(scale)?;
        show(display, "Calibrated!", &format!("Offset: {}", cal.offset));
        actuator.signal_calibrated();
        Ok(cal)
    }

    fn weigh<S: Scale + ?Sized>(&mut self, scale: &mut S, cal: &Calibration) -> f32 {
        match scale.read(self.read_timeout) {
            Ok(raw) => {
                self.last_weight = cal.to_grams(raw);
            }
            Err(e) => debug!(error = %e, "verification read failed; repeating last weight"),
        }
        self.last_weight
    }
}

fn show<D: Display + ?Sized>(display: &mut D, line1: &str, line2: &str) {
    if let Err(e) = display.show(line1, line2) {
        debug!(error = %e, "display update failed");
    }
}
