//! Scale assembly and the subcommand bodies.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::Result;
use stock_config::Config;
use stock_core::hw_error::map_hw_error;
use stock_core::mqtt::{MqttClient, TcpDial};
use stock_core::{
    Calibration, Calibrator, DetectorCfg, EventDetector, StartupError, Station, TelemetryChannel,
    Timeouts, Verification,
};
use stock_hardware::SimulatedScale;
use stock_traits::{BoxError, Clock, MonotonicClock, Scale};
use tracing::info;

use crate::outputs::{ConsoleDisplay, LogActuator};

/// The load cell behind the station.
pub enum Backend {
    Sim(SimulatedScale),
    #[cfg(feature = "hardware")]
    Hx711(stock_hardware::hardware::HardwareScale),
}

impl Backend {
    /// Open and power the HX711. `STOCK_SIM=1` selects the simulator instead.
    #[cfg(feature = "hardware")]
    pub fn open(cfg: &Config) -> Result<Self, StartupError> {
        use stock_config::GainCfg;
        use stock_hardware::Gain;
        use stock_hardware::hardware::HardwareScale;

        if std::env::var("STOCK_SIM").is_ok_and(|v| v == "1") {
            info!("STOCK_SIM=1; using simulated scale");
            return Ok(Self::Sim(SimulatedScale::from_env()));
        }
        let gain = match cfg.hardware.gain {
            GainCfg::A128 => Gain::A128,
            GainCfg::B32 => Gain::B32,
            GainCfg::A64 => Gain::A64,
        };
        let mut hx = HardwareScale::new(
            cfg.pins.hx711_dt,
            cfg.pins.hx711_sck,
            gain,
            Duration::from_millis(cfg.hardware.poll_interval_ms),
        )
        .map_err(|e| StartupError::HardwareInit(e.to_string()))?;
        hx.power_on()
            .map_err(|e| StartupError::HardwareInit(e.to_string()))?;
        info!(dt = cfg.pins.hx711_dt, sck = cfg.pins.hx711_sck, ?gain, "hx711 ready");
        Ok(Self::Hx711(hx))
    }

    /// Simulated scale driven by `STOCK_SIM_*` variables.
    #[cfg(not(feature = "hardware"))]
    pub fn open(_cfg: &Config) -> Result<Self, StartupError> {
        info!("hardware feature disabled; using simulated scale");
        Ok(Self::Sim(SimulatedScale::from_env()))
    }

    pub fn power_off(&mut self) {
        match self {
            Self::Sim(_) => {}
            #[cfg(feature = "hardware")]
            Self::Hx711(hx) => {
                if let Err(e) = hx.power_off() {
                    tracing::warn!(error = %e, "hx711 power-down failed");
                }
            }
        }
    }
}

impl Scale for Backend {
    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        match self {
            Self::Sim(s) => s.read(timeout),
            #[cfg(feature = "hardware")]
            Self::Hx711(hx) => hx.read(timeout),
        }
    }
}

fn settle(cfg: &Config) {
    MonotonicClock::new().sleep(Duration::from_millis(cfg.startup.settle_ms));
}

fn calibrator(cfg: &Config) -> Result<Calibrator<MonotonicClock>> {
    let timeouts: Timeouts = (&cfg.hardware).into();
    Ok(Calibrator::new((&cfg.calibration).into(), MonotonicClock::new())?
        .with_read_timeout(timeouts.sensor))
}

/// Calibrate, then serve the broker session until `shutdown` is raised.
pub fn run_station(cfg: &Config, shutdown: Arc<AtomicBool>, json: bool) -> Result<()> {
    let mut scale = Backend::open(cfg)?;
    settle(cfg);

    let mut actuator = LogActuator;
    let mut display = ConsoleDisplay::new(json);
    let cal = match calibrator(cfg)?.run_with_feedback(&mut scale, &mut actuator, &mut display) {
        Ok(cal) => cal,
        Err(e) => {
            scale.power_off();
            return Err(e.into());
        }
    };
    info!(offset = cal.offset, scale_factor = cal.scale_factor, "calibrated");

    let det: DetectorCfg = (&cfg.detector).into();
    let timeouts: Timeouts = (&cfg.hardware).into();
    let mut station = Station::new(
        scale,
        cal,
        EventDetector::new(&det)?,
        actuator,
        display,
    )
    .with_read_timeout(timeouts.sensor)
    .with_local_feedback(det.local_feedback);

    let t = &cfg.telemetry;
    let dial = TcpDial::new(
        format!("{}:{}", t.host, t.port),
        Duration::from_millis(t.connect_timeout_ms),
        Duration::from_millis(t.io_timeout_ms),
    );
    let link = MqttClient::new(dial, t.into());
    let mut channel =
        TelemetryChannel::new(link, MonotonicClock::new(), t.into()).with_shutdown(shutdown);
    channel.run_forever(&mut station);

    station.scale_mut().power_off();
    info!(stock = station.stock(), "station stopped");
    Ok(())
}

/// Tare (or the configured offset) and one verification pass, reported
/// whether or not the residual is within tolerance.
pub fn calibrate(cfg: &Config, json: bool) -> Result<()> {
    let mut scale = Backend::open(cfg)?;
    settle(cfg);
    let result = measure(cfg, &mut scale);
    scale.power_off();
    let (cal, v) = result?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "offset": cal.offset,
                "scale_factor": cal.scale_factor,
                "residual_g": v.mean_g,
                "ok": v.ok,
            })
        );
    } else {
        println!("offset: {}", cal.offset);
        println!("scale factor: {}", cal.scale_factor);
        println!("residual: {:.2} g", v.mean_g);
    }

    if !v.ok {
        return Err(StartupError::CalibrationFailure {
            mean_g: v.mean_g,
            tolerance_g: cfg.calibration.tolerance_g,
        }
        .into());
    }
    Ok(())
}

fn measure(cfg: &Config, scale: &mut Backend) -> Result<(Calibration, Verification)> {
    let mut c = calibrator(cfg)?;
    let offset = match cfg.calibration.offset {
        Some(offset) => offset,
        None => c.calibrate_tare(scale)?,
    };
    let cal = Calibration::new(offset, cfg.calibration.scale_factor)?;
    let v = c.verify(scale, &cal);
    Ok((cal, v))
}

/// One raw reading, converted with the configured offset when there is one.
pub fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let mut scale = Backend::open(cfg)?;
    settle(cfg);
    let timeouts: Timeouts = (&cfg.hardware).into();
    let read = scale.read(timeouts.sensor);
    scale.power_off();
    let raw = read.map_err(|e| map_hw_error(e.as_ref()))?;

    let grams = match cfg.calibration.offset {
        Some(offset) => Some(Calibration::new(offset, cfg.calibration.scale_factor)?.to_grams(raw)),
        None => None,
    };
    if json {
        println!(
            "{}",
            serde_json::json!({ "self_check": "ok", "raw": raw, "weight_g": grams })
        );
    } else {
        match grams {
            Some(g) => println!("self-check ok: raw {raw} ({g:.1} g)"),
            None => println!("self-check ok: raw {raw}"),
        }
    }
    Ok(())
}
