//! Two-state hysteresis detector turning a weight stream into ENTRY/EXIT
//! events and a stock count.
use serde::Serialize;

use crate::config::{DetectorCfg, Polarity};
use crate::error::BuildError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorState {
    #[default]
    Empty,
    Loaded,
}

/// A confirmed placement or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Entry,
    Exit,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Entry => "entry",
            Event::Exit => "exit",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item count, never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockCounter(u32);

impl StockCounter {
    pub fn get(self) -> u32 {
        self.0
    }

    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// No-op at zero.
    pub fn decrement(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }
}

#[derive(Debug, Clone)]
pub struct EventDetector {
    enter_g: f32,
    exit_g: f32,
    polarity: Polarity,
    state: DetectorState,
    stock: StockCounter,
}

impl EventDetector {
    pub fn new(cfg: &DetectorCfg) -> Result<Self, BuildError> {
        if !(cfg.enter_g.is_finite() && cfg.exit_g.is_finite()) || cfg.exit_g >= cfg.enter_g {
            return Err(BuildError::Thresholds {
                enter_g: cfg.enter_g,
                exit_g: cfg.exit_g,
            });
        }
        Ok(Self {
            enter_g: cfg.enter_g,
            exit_g: cfg.exit_g,
            polarity: cfg.polarity,
            state: DetectorState::Empty,
            stock: StockCounter::default(),
        })
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn stock(&self) -> u32 {
        self.stock.get()
    }

    /// Feed one weight reading.
    ///
    /// Empty→Loaded when the reading is strictly above `enter_g`, Loaded→Empty
    /// when strictly below `exit_g`. Readings inside the band, and non-finite
    /// readings, change nothing.
    pub fn on_reading(&mut self, weight_g: f32) -> Option<Event> {
        if !weight_g.is_finite() {
            return None;
        }
        let w = match self.polarity {
            Polarity::Signed => weight_g,
            Polarity::Magnitude => weight_g.abs(),
        };
        match self.state {
            DetectorState::Empty if w > self.enter_g => {
                self.state = DetectorState::Loaded;
                self.stock.increment();
                Some(Event::Entry)
            }
            DetectorState::Loaded if w < self.exit_g => {
                self.state = DetectorState::Empty;
                self.stock.decrement();
                Some(Event::Exit)
            }
            _ => None,
        }
    }
}
