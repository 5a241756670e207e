#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the inventory scale station.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section has defaults matching the reference deployment, so an
//!   empty file (plus a broker host) is a usable configuration.
//! - Values are read once at startup; nothing here is mutated at runtime.
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            hx711_dt: 25,
            hx711_sck: 26,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GainCfg {
    #[default]
    A128,
    B32,
    A64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for HX711 data-ready (DT low) before failing
    #[serde(alias = "sensor_ms")]
    pub sensor_read_timeout_ms: u64,
    /// Sleep between data-ready polls
    pub poll_interval_ms: u64,
    /// Channel/gain for the next conversion: "a128" | "b32" | "a64"
    pub gain: GainCfg,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 5_000,
            poll_interval_ms: 5,
            gain: GainCfg::A128,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Raw counts per gram; the sign follows the load cell wiring.
    pub scale_factor: f32,
    /// Samples taken under an empty platform to find the tare offset
    pub tare_samples: usize,
    /// Calibrated readings averaged to verify the tare
    pub verify_samples: usize,
    pub sample_delay_ms: u64,
    /// Max |mean| in grams accepted by the verification pass
    pub tolerance_g: f32,
    /// Max |weight| of the first reading after calibration
    pub initial_tolerance_g: f32,
    /// Skip tare and use this raw offset instead
    pub offset: Option<i32>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale_factor: -56.97,
            tare_samples: 15,
            verify_samples: 5,
            sample_delay_ms: 100,
            tolerance_g: 10.0,
            initial_tolerance_g: 15.0,
            offset: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolarityCfg {
    #[default]
    Signed,
    Magnitude,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Detector {
    /// EMPTY -> LOADED when weight rises above this
    pub enter_g: f32,
    /// LOADED -> EMPTY when weight falls below this
    pub exit_g: f32,
    /// Compare the signed weight or its magnitude against the thresholds
    pub polarity: PolarityCfg,
    /// Beep/blink on local ENTRY/EXIT instead of waiting for the host ack
    pub local_feedback: bool,
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            enter_g: 150.0,
            exit_g: 50.0,
            polarity: PolarityCfg::Signed,
            local_feedback: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topics: Topics,
    pub publish_interval_ms: u64,
    pub keepalive_s: u64,
    pub base_backoff_s: u64,
    pub max_backoff_s: u64,
    /// Cooperative loop period
    pub tick_ms: u64,
    pub connect_timeout_ms: u64,
    /// Socket read/write timeout; also bounds one inbound poll
    pub io_timeout_ms: u64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            host: "192.168.1.10".into(),
            port: 1883,
            client_id: "esp32-balanca-01".into(),
            username: None,
            password: None,
            topics: Topics::default(),
            publish_interval_ms: 500,
            keepalive_s: 5,
            base_backoff_s: 5,
            max_backoff_s: 30,
            tick_ms: 100,
            connect_timeout_ms: 3_000,
            io_timeout_ms: 20,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Startup {
    /// Wait after power-on before the first conversion
    pub settle_ms: u64,
    /// Delay before exiting on a hardware init failure (supervisor restarts us)
    pub reboot_delay_s: u64,
}

impl Default for Startup {
    fn default() -> Self {
        Self {
            settle_ms: 1_000,
            reboot_delay_s: 5,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub hardware: Hardware,
    pub calibration: Calibration,
    pub detector: Detector,
    pub telemetry: Telemetry,
    pub logging: Logging,
    pub startup: Startup,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.hx711_dt == self.pins.hx711_sck {
            eyre::bail!("pins.hx711_dt and pins.hx711_sck must differ");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }
        if self.hardware.poll_interval_ms == 0 {
            eyre::bail!("hardware.poll_interval_ms must be >= 1");
        }
        if self.hardware.poll_interval_ms > self.hardware.sensor_read_timeout_ms {
            eyre::bail!("hardware.poll_interval_ms must not exceed sensor_read_timeout_ms");
        }

        // Calibration
        let c = &self.calibration;
        if !c.scale_factor.is_finite() || c.scale_factor == 0.0 {
            eyre::bail!("calibration.scale_factor must be finite and non-zero");
        }
        if c.tare_samples == 0 {
            eyre::bail!("calibration.tare_samples must be >= 1");
        }
        if c.verify_samples == 0 {
            eyre::bail!("calibration.verify_samples must be >= 1");
        }
        if !(c.tolerance_g.is_finite() && c.tolerance_g > 0.0) {
            eyre::bail!("calibration.tolerance_g must be > 0");
        }
        if !(c.initial_tolerance_g.is_finite() && c.initial_tolerance_g > 0.0) {
            eyre::bail!("calibration.initial_tolerance_g must be > 0");
        }
        if let Some(offset) = c.offset
            && !(-(1 << 23)..(1 << 23)).contains(&offset)
        {
            eyre::bail!("calibration.offset must fit in 24 bits");
        }

        // Detector
        let d = &self.detector;
        if !(d.enter_g.is_finite() && d.exit_g.is_finite()) {
            eyre::bail!("detector thresholds must be finite");
        }
        if d.exit_g >= d.enter_g {
            eyre::bail!("detector.exit_g must be below detector.enter_g");
        }

        // Telemetry
        let t = &self.telemetry;
        if t.host.trim().is_empty() {
            eyre::bail!("telemetry.host must not be empty");
        }
        if t.port == 0 {
            eyre::bail!("telemetry.port must be > 0");
        }
        if t.client_id.is_empty() || t.client_id.len() > 23 {
            eyre::bail!("telemetry.client_id must be 1..=23 bytes");
        }
        if t.password.is_some() && t.username.is_none() {
            eyre::bail!("telemetry.password requires telemetry.username");
        }
        for (name, topic) in [
            ("weight", &t.topics.weight),
            ("status", &t.topics.status),
            ("feedback", &t.topics.feedback),
            ("events", &t.topics.events),
        ] {
            if topic.is_empty() || topic.contains(['+', '#']) {
                eyre::bail!("telemetry.topics.{name} must be a non-empty topic without wildcards");
            }
        }
        if t.publish_interval_ms == 0 {
            eyre::bail!("telemetry.publish_interval_ms must be >= 1");
        }
        if t.keepalive_s == 0 || t.keepalive_s > u64::from(u16::MAX) {
            eyre::bail!("telemetry.keepalive_s must be in 1..=65535");
        }
        if t.base_backoff_s == 0 {
            eyre::bail!("telemetry.base_backoff_s must be >= 1");
        }
        if t.base_backoff_s > t.max_backoff_s {
            eyre::bail!("telemetry.base_backoff_s must not exceed max_backoff_s");
        }
        if t.tick_ms == 0 {
            eyre::bail!("telemetry.tick_ms must be >= 1");
        }
        if t.io_timeout_ms == 0 || t.connect_timeout_ms == 0 {
            eyre::bail!("telemetry timeouts must be >= 1 ms");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
