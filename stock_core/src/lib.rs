#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core station logic (hardware-agnostic).
//!
//! All hardware goes through `stock_traits::Scale`, `Actuator` and `Display`;
//! the broker goes through `stock_traits::Link`.
//!
//! ## Architecture
//!
//! - **Calibration**: median tare + residual verification (`calibration`)
//! - **Detection**: hysteresis ENTRY/EXIT detector and stock count (`detector`)
//! - **Station**: explicit per-tick context (`station`)
//! - **Telemetry**: session loop with backoff and command dispatch (`telemetry`)
//! - **MQTT**: 3.1.1 codec and blocking client implementing `Link` (`mqtt`)
//!
//! Per-tick read failures are values (`Acquisition::TimedOut`), never errors.
//! Startup faults (`StartupError`) end the process.

pub mod calibration;
pub mod config;
pub mod conversions;
pub mod detector;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod mqtt;
pub mod station;
pub mod telemetry;

pub use calibration::{Calibration, Calibrator, Verification, median_offset};
pub use config::{CalibrationCfg, DetectorCfg, Polarity, TelemetryCfg, Timeouts, Topics};
pub use detector::{DetectorState, Event, EventDetector, StockCounter};
pub use error::{BuildError, StartupError, StockError};
pub use station::{Acquisition, Station, Tick};
pub use telemetry::{Backoff, Command, ConnectionState, Periodic, TelemetryChannel};
