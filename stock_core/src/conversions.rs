//! `From` implementations bridging `stock_config` types to `stock_core` types.

use std::time::Duration;

use crate::config::{CalibrationCfg, DetectorCfg, Polarity, TelemetryCfg, Timeouts, Topics};
use crate::mqtt::{MqttOptions, Will};

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&stock_config::Calibration> for CalibrationCfg {
    fn from(c: &stock_config::Calibration) -> Self {
        Self {
            scale_factor: c.scale_factor,
            tare_samples: c.tare_samples,
            verify_samples: c.verify_samples,
            sample_delay: Duration::from_millis(c.sample_delay_ms),
            tolerance_g: c.tolerance_g,
            initial_tolerance_g: c.initial_tolerance_g,
            fixed_offset: c.offset,
        }
    }
}

// ── DetectorCfg ──────────────────────────────────────────────────────────────

impl From<stock_config::PolarityCfg> for Polarity {
    fn from(p: stock_config::PolarityCfg) -> Self {
        match p {
            stock_config::PolarityCfg::Signed => Polarity::Signed,
            stock_config::PolarityCfg::Magnitude => Polarity::Magnitude,
        }
    }
}

impl From<&stock_config::Detector> for DetectorCfg {
    fn from(c: &stock_config::Detector) -> Self {
        Self {
            enter_g: c.enter_g,
            exit_g: c.exit_g,
            polarity: c.polarity.into(),
            local_feedback: c.local_feedback,
        }
    }
}

// ── TelemetryCfg ─────────────────────────────────────────────────────────────

impl From<&stock_config::Topics> for Topics {
    fn from(t: &stock_config::Topics) -> Self {
        Self {
            weight: t.weight.clone(),
            status: t.status.clone(),
            feedback: t.feedback.clone(),
            events: t.events.clone(),
        }
    }
}

impl From<&stock_config::Telemetry> for TelemetryCfg {
    fn from(c: &stock_config::Telemetry) -> Self {
        Self {
            topics: (&c.topics).into(),
            publish_interval: Duration::from_millis(c.publish_interval_ms),
            keepalive_interval: Duration::from_secs(c.keepalive_s),
            base_backoff: Duration::from_secs(c.base_backoff_s),
            max_backoff: Duration::from_secs(c.max_backoff_s),
            tick: Duration::from_millis(c.tick_ms),
            endpoint: format!("{}:{}", c.host, c.port),
        }
    }
}

// ── MqttOptions ──────────────────────────────────────────────────────────────

impl From<&stock_config::Telemetry> for MqttOptions {
    fn from(c: &stock_config::Telemetry) -> Self {
        Self {
            client_id: c.client_id.clone(),
            // validate() bounds keepalive_s to u16
            keep_alive_s: u16::try_from(c.keepalive_s).unwrap_or(u16::MAX),
            will: Some(Will {
                topic: c.topics.status.clone(),
                payload: b"offline".to_vec(),
                retain: false,
            }),
            username: c.username.clone(),
            password: c.password.clone(),
            ack_timeout: Duration::from_millis(c.connect_timeout_ms),
        }
    }
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

impl From<&stock_config::Hardware> for Timeouts {
    fn from(c: &stock_config::Hardware) -> Self {
        Self {
            sensor: Duration::from_millis(c.sensor_read_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_through() {
        let cfg = stock_config::Config::default();
        let tel: TelemetryCfg = (&cfg.telemetry).into();
        assert_eq!(tel.publish_interval, Duration::from_millis(500));
        assert_eq!(tel.keepalive_interval, Duration::from_secs(5));
        assert_eq!(tel.endpoint, "192.168.1.10:1883");

        let opts: MqttOptions = (&cfg.telemetry).into();
        let will = opts.will.expect("last will");
        assert_eq!(will.topic, "balanca/esp32/status");
        assert_eq!(will.payload, b"offline");
        assert_eq!(opts.keep_alive_s, 5);

        let cal: CalibrationCfg = (&cfg.calibration).into();
        assert_eq!(cal.sample_delay, Duration::from_millis(100));
        assert_eq!(cal.fixed_offset, None);
    }
}
