//! In-memory outputs for tests and headless runs.
use std::sync::{Arc, Mutex, PoisonError};

use stock_traits::{Actuator, BoxError, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Entry,
    Exit,
    Error,
    Waiting,
    Calibrated,
}

/// Records every actuator call. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator(Arc<Mutex<Vec<Signal>>>);

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, s: Signal) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(s);
    }
}

impl Actuator for RecordingActuator {
    fn signal_entry(&mut self) {
        self.push(Signal::Entry);
    }
    fn signal_exit(&mut self) {
        self.push(Signal::Exit);
    }
    fn signal_error(&mut self) {
        self.push(Signal::Error);
    }
    fn signal_waiting(&mut self) {
        self.push(Signal::Waiting);
    }
    fn signal_calibrated(&mut self) {
        self.push(Signal::Calibrated);
    }
}

/// Records every display update. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay(Arc<Mutex<Vec<(String, String)>>>);

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<(String, String)> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Display for RecordingDisplay {
    fn show(&mut self, line1: &str, line2: &str) -> Result<(), BoxError> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((line1.to_owned(), line2.to_owned()));
        Ok(())
    }
}

/// A display that is not there.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, _line1: &str, _line2: &str) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A display whose bus always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenDisplay;

impl Display for BrokenDisplay {
    fn show(&mut self, _line1: &str, _line2: &str) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("i2c nack")))
    }
}
