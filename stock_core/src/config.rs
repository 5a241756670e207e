//! Runtime configuration types for the station.
//!
//! These are the structs the core logic consumes. They are separate from the
//! TOML-deserialized config in `stock_config`; see `conversions`.
use std::time::Duration;

/// Tare and verification parameters.
#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    /// Raw counts per gram; the sign follows the load cell wiring.
    pub scale_factor: f32,
    pub tare_samples: usize,
    pub verify_samples: usize,
    /// Pause between consecutive calibration samples.
    pub sample_delay: Duration,
    /// Max |mean| of the verification readings.
    pub tolerance_g: f32,
    /// Max |weight| of the first reading once calibration is done.
    pub initial_tolerance_g: f32,
    /// Skip tare and use this offset.
    pub fixed_offset: Option<i32>,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            scale_factor: -56.97,
            tare_samples: 15,
            verify_samples: 5,
            sample_delay: Duration::from_millis(100),
            tolerance_g: 10.0,
            initial_tolerance_g: 15.0,
            fixed_offset: None,
        }
    }
}

/// How a reading is compared against the thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Use the calibrated weight as-is.
    #[default]
    Signed,
    /// Use |weight|, for load cells whose scale factor makes load read negative.
    Magnitude,
}

/// Hysteresis band for the placement detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorCfg {
    pub enter_g: f32,
    pub exit_g: f32,
    pub polarity: Polarity,
    /// Drive the actuators directly on local ENTRY/EXIT, without waiting
    /// for the host to acknowledge.
    pub local_feedback: bool,
}

impl Default for DetectorCfg {
    fn default() -> Self {
        Self {
            enter_g: 150.0,
            exit_g: 50.0,
            polarity: Polarity::Signed,
            local_feedback: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Topics {
    pub weight: String,
    pub status: String,
    pub feedback: String,
    pub events: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            weight: "balanca/esp32/peso_raw".into(),
            status: "balanca/esp32/status".into(),
            feedback: "balanca/rpi/feedback".into(),
            events: "balanca/esp32/events".into(),
        }
    }
}

/// Session cadence and retry policy.
#[derive(Debug, Clone)]
pub struct TelemetryCfg {
    pub topics: Topics,
    pub publish_interval: Duration,
    pub keepalive_interval: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Cooperative loop period.
    pub tick: Duration,
    /// Broker endpoint, shown on the display while connecting.
    pub endpoint: String,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            topics: Topics::default(),
            publish_interval: Duration::from_millis(500),
            keepalive_interval: Duration::from_secs(5),
            base_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(30),
            tick: Duration::from_millis(100),
            endpoint: String::new(),
        }
    }
}

/// Timeouts and watchdogs.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Max sensor wait per read.
    pub sensor: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            sensor: Duration::from_secs(5),
        }
    }
}
