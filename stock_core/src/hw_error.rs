//! Classify scale and link faults for logs and CLI exit reporting.
//!
//! During a session no scale fault is fatal: the station turns every failed
//! read into a stale tick. The class only picks the log line there. Outside
//! the loop (`self-check`) a fault is returned and reported with its class.

use crate::error::StockError;
use crate::mqtt::MqttError;

/// A missed data-ready is [`StockError::AcquisitionTimeout`]; anything else
/// the scale reports is [`StockError::Hardware`].
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> StockError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<stock_hardware::error::HwError>() {
            return match hw {
                stock_hardware::error::HwError::DataReadyTimeout => StockError::AcquisitionTimeout,
                other => StockError::Hardware(other.to_string()),
            };
        }
    }

    // non-HX711 backends only say "timeout" in the message
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        StockError::AcquisitionTimeout
    } else {
        StockError::Hardware(s)
    }
}

/// Map a link error: malformed traffic is a protocol error, everything else
/// is a transport failure.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> StockError {
    if let Some(MqttError::Packet(p)) = e.downcast_ref::<MqttError>() {
        return StockError::Protocol(p.to_string());
    }
    StockError::Transport(e.to_string())
}
