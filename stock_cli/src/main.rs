#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `stockscale`: load-cell inventory station.
//!
//! Startup is power-on, settle, calibrate; then the telemetry loop runs until
//! SIGINT/SIGTERM. Startup faults exit with a stable code so a supervisor can
//! restart the process.

mod cli;
mod error_fmt;
mod logging;
mod outputs;
mod run;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};

use crate::cli::{Cli, Commands, JSON_MODE, REBOOT_DELAY};
use crate::error_fmt::{EXIT_HARDWARE_INIT, exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        let code = exit_code_for_error(&e);
        tracing::error!(error = %e, code, "exiting");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        if code == EXIT_HARDWARE_INIT {
            std::thread::sleep(REBOOT_DELAY.get().copied().unwrap_or_default());
        }
        std::process::exit(code);
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = stock_config::load_file(&cli.config)
        .wrap_err_with(|| format!("load config {}", cli.config.display()))?;
    let _ = REBOOT_DELAY.set(Duration::from_secs(cfg.startup.reboot_delay_s));
    logging::init(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    tracing::info!(config = %cli.config.display(), command = ?cli.cmd, "starting");

    match cli.cmd {
        Commands::Run => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install signal handler")?;
            run::run_station(&cfg, shutdown, cli.json)
        }
        Commands::Calibrate => run::calibrate(&cfg, cli.json),
        Commands::SelfCheck => run::self_check(&cfg, cli.json),
    }
}
