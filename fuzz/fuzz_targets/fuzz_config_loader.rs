#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate must reject bad input with an error, never a panic.
    if let Ok(cfg) = stock_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
