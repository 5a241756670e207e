//! The station context: everything one acquisition tick touches.
//!
//! Owns the scale, the session calibration, the detector and the feedback
//! outputs, and is passed explicitly to the telemetry loop.
use std::time::Duration;

use stock_traits::{Actuator, Display, Scale};
use tracing::{debug, info, warn};

use crate::calibration::Calibration;
use crate::detector::{DetectorState, Event, EventDetector};
use crate::error::StockError;
use crate::hw_error::map_hw_error;
use crate::telemetry::Command;

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Acquisition {
    Fresh(f32),
    /// The read failed; `last_known` is the previous good weight (0 before
    /// the first one).
    TimedOut { last_known: f32 },
}

impl Acquisition {
    /// Weight to report for this tick, stale or not.
    pub fn weight(&self) -> f32 {
        match *self {
            Acquisition::Fresh(w) => w,
            Acquisition::TimedOut { last_known } => last_known,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Acquisition::Fresh(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub acquisition: Acquisition,
    pub event: Option<Event>,
}

pub struct Station<S, A, D> {
    scale: S,
    calibration: Calibration,
    detector: EventDetector,
    actuator: A,
    display: D,
    read_timeout: Duration,
    local_feedback: bool,
    last_weight: f32,
}

impl<S: Scale, A: Actuator, D: Display> Station<S, A, D> {
    pub fn new(
        scale: S,
        calibration: Calibration,
        detector: EventDetector,
        actuator: A,
        display: D,
    ) -> Self {
        Self {
            scale,
            calibration,
            detector,
            actuator,
            display,
            read_timeout: crate::config::Timeouts::default().sensor,
            local_feedback: false,
            last_weight: 0.0,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Signal ENTRY/EXIT on the actuators as soon as they are detected.
    pub fn with_local_feedback(mut self, on: bool) -> Self {
        self.local_feedback = on;
        self
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn detector(&self) -> &EventDetector {
        &self.detector
    }

    pub fn stock(&self) -> u32 {
        self.detector.stock()
    }

    pub fn last_weight(&self) -> f32 {
        self.last_weight
    }

    pub fn scale_mut(&mut self) -> &mut S {
        &mut self.scale
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Read and convert one sample. Read failures never propagate: the tick
    /// reports the last known weight instead.
    pub fn acquire(&mut self) -> Acquisition {
        match self.scale.read(self.read_timeout) {
            Ok(raw) => {
                let w = self.calibration.to_grams(raw);
                debug!(raw, weight_g = w, "sample");
                self.last_weight = w;
                Acquisition::Fresh(w)
            }
            Err(e) => {
                let fault = map_hw_error(e.as_ref());
                warn!(
                    error = %fault,
                    timeout = matches!(fault, StockError::AcquisitionTimeout),
                    last_known = self.last_weight,
                    "sensor read failed; reporting last weight"
                );
                Acquisition::TimedOut {
                    last_known: self.last_weight,
                }
            }
        }
    }

    /// Acquire, then run the detector on fresh readings only.
    pub fn tick(&mut self) -> Tick {
        let acquisition = self.acquire();
        let event = match acquisition {
            Acquisition::Fresh(w) => self.detector.on_reading(w),
            Acquisition::TimedOut { .. } => None,
        };
        if let Some(ev) = event {
            info!(event = %ev, stock = self.stock(), weight_g = acquisition.weight(), "stock change");
            if self.local_feedback {
                match ev {
                    Event::Entry => self.actuator.signal_entry(),
                    Event::Exit => self.actuator.signal_exit(),
                }
            }
        }
        Tick { acquisition, event }
    }

    /// Drive the outputs for a host command.
    pub fn apply(&mut self, cmd: Command) {
        info!(?cmd, "host feedback");
        let stock = format!("Stock: {}", self.stock());
        match cmd {
            Command::EntryAck => {
                self.actuator.signal_entry();
                self.show("ENTRY OK", &stock);
            }
            Command::ExitAck => {
                self.actuator.signal_exit();
                self.show("EXIT OK", &stock);
            }
            Command::Error => {
                self.actuator.signal_error();
                self.show("ERROR", "Try again");
            }
            Command::Waiting => self.actuator.signal_waiting(),
        }
    }

    /// Cue shown each time a broker session comes up.
    pub fn announce_connected(&mut self) {
        self.show("Connected", "Waiting...");
        self.actuator.signal_waiting();
    }

    /// Weight/state summary for the display.
    pub fn show_status(&mut self, weight_g: f32) {
        let state = match self.detector.state() {
            DetectorState::Empty => "empty",
            DetectorState::Loaded => "loaded",
        };
        let line1 = format!("{weight_g:.1} g {state}");
        let line2 = format!("Stock: {}", self.stock());
        self.show(&line1, &line2);
    }

    /// Best-effort; display faults are logged and dropped.
    pub fn show(&mut self, line1: &str, line2: &str) {
        if let Err(e) = self.display.show(line1, line2) {
            debug!(error = %e, "display update failed");
        }
    }
}
