//! Host-side feedback outputs: the buzzer/LED script and the two-line display
//! are rendered as log records and console lines.

use stock_traits::{Actuator, BoxError, Display};

/// Logs each feedback script instead of driving GPIO.
#[derive(Debug, Default)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn signal_entry(&mut self) {
        tracing::info!(target: "actuator", beeps = 1, led = "steady", "entry");
    }
    fn signal_exit(&mut self) {
        tracing::info!(target: "actuator", beeps = 2, led = "blink", "exit");
    }
    fn signal_error(&mut self) {
        tracing::info!(target: "actuator", beeps = 3, led = "blink", "error");
    }
    fn signal_waiting(&mut self) {
        tracing::info!(target: "actuator", led = "pulse", "waiting");
    }
    fn signal_calibrated(&mut self) {
        tracing::info!(target: "actuator", beeps = 3, "calibrated");
    }
}

/// Prints the display contents to stdout when they change.
///
/// In JSON mode each update is one object per line.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    json: bool,
    last: Option<(String, String)>,
}

impl ConsoleDisplay {
    pub fn new(json: bool) -> Self {
        Self { json, last: None }
    }
}

impl Display for ConsoleDisplay {
    fn show(&mut self, line1: &str, line2: &str) -> Result<(), BoxError> {
        if self
            .last
            .as_ref()
            .is_some_and(|(a, b)| a == line1 && b == line2)
        {
            return Ok(());
        }
        if self.json {
            println!("{}", serde_json::json!({ "display": [line1, line2] }));
        } else {
            println!("[{line1:<16}] [{line2:<16}]");
        }
        self.last = Some((line1.to_string(), line2.to_string()));
        Ok(())
    }
}
