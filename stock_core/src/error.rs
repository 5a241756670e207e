use thiserror::Error;

/// Recoverable per-tick failures. None of these stop the station.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StockError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("timeout waiting for sensor")]
    AcquisitionTimeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Faults that abort the startup sequence. Never retried in-process.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StartupError {
    #[error("calibration failed: residual {mean_g:.1} g exceeds tolerance of {tolerance_g:.1} g")]
    CalibrationFailure { mean_g: f32, tolerance_g: f32 },
    #[error("calibration failed: no tare sample could be read")]
    NoTareSamples,
    #[error("hardware init failed: {0}")]
    HardwareInit(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("detector thresholds invalid: exit ({exit_g} g) must be below enter ({enter_g} g)")]
    Thresholds { enter_g: f32, exit_g: f32 },
    #[error("scale factor must be finite and non-zero")]
    ScaleFactor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
