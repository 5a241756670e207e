use rstest::rstest;
use stock_config::{GainCfg, PolarityCfg, load_file, load_toml};

#[test]
fn empty_file_uses_reference_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.detector.enter_g, 150.0);
    assert_eq!(cfg.detector.exit_g, 50.0);
    assert_eq!(cfg.calibration.tare_samples, 15);
    assert_eq!(cfg.calibration.verify_samples, 5);
    assert_eq!(cfg.calibration.tolerance_g, 10.0);
    assert_eq!(cfg.calibration.scale_factor, -56.97);
    assert_eq!(cfg.telemetry.publish_interval_ms, 500);
    assert_eq!(cfg.telemetry.keepalive_s, 5);
    assert_eq!(cfg.telemetry.base_backoff_s, 5);
    assert_eq!(cfg.telemetry.max_backoff_s, 30);
    assert_eq!(cfg.hardware.sensor_read_timeout_ms, 5_000);
    assert_eq!(cfg.hardware.gain, GainCfg::A128);
}

#[test]
fn parses_full_config() {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6

[hardware]
sensor_read_timeout_ms = 1000
gain = "a64"

[calibration]
scale_factor = 420.0
offset = -1200

[detector]
enter_g = 120.0
exit_g = 40.0
polarity = "magnitude"

[telemetry]
host = "broker.local"
client_id = "shelf-3"
username = "shelf"
password = "secret"

[telemetry.topics]
weight = "shelf/3/weight"

[logging]
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.hardware.gain, GainCfg::A64);
    assert_eq!(cfg.detector.polarity, PolarityCfg::Magnitude);
    assert_eq!(cfg.calibration.offset, Some(-1200));
    assert_eq!(cfg.telemetry.topics.weight, "shelf/3/weight");
    assert_eq!(cfg.telemetry.topics.status, "balanca/esp32/status");
}

#[rstest]
#[case("[detector]\nenter_g = 50.0\nexit_g = 50.0", "exit_g must be below")]
#[case("[calibration]\nscale_factor = 0.0", "scale_factor must be finite")]
#[case("[calibration]\ntare_samples = 0", "tare_samples must be >= 1")]
#[case("[telemetry]\nbase_backoff_s = 60\nmax_backoff_s = 30", "must not exceed max_backoff_s")]
#[case("[telemetry]\npublish_interval_ms = 0", "publish_interval_ms must be >= 1")]
#[case("[telemetry]\nclient_id = \"\"", "client_id must be")]
#[case("[telemetry.topics]\nfeedback = \"balanca/#\"", "without wildcards")]
#[case("[telemetry]\npassword = \"x\"", "requires telemetry.username")]
#[case("[pins]\nhx711_dt = 4\nhx711_sck = 4", "must differ")]
#[case("[hardware]\nsensor_read_timeout_ms = 0", "sensor_read_timeout_ms must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"", "rotation must be one of")]
fn rejects_invalid(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "{msg:?} does not contain {needle:?}");
}

#[test]
fn unknown_gain_is_a_parse_error() {
    assert!(load_toml("[hardware]\ngain = \"c16\"").is_err());
}

#[test]
fn load_file_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[detector]\nenter_g = 10.0\nexit_g = 20.0\n").unwrap();
    let err = load_file(&path).expect_err("invalid thresholds");
    assert!(format!("{err}").contains("exit_g"));

    let missing = dir.path().join("missing.toml");
    let err = load_file(&missing).expect_err("missing file");
    assert!(format!("{err}").contains("read config"));
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/stockscale.toml");
    let cfg = load_file(&path).expect("sample config");
    assert_eq!(cfg.telemetry.topics.feedback, "balanca/rpi/feedback");
    assert_eq!(cfg.detector.polarity, PolarityCfg::Signed);
}
