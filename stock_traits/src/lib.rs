//! Boundary traits between the station logic and everything it drives:
//! the load cell, the publish/subscribe link and the feedback outputs.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type used at every trait boundary in this workspace.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A raw load-cell sampler.
pub trait Scale {
    /// Block until one conversion is available and return the signed raw count,
    /// or fail once `timeout` elapses without the device signalling readiness.
    fn read(&mut self, timeout: std::time::Duration) -> Result<i32, BoxError>;
}

impl<S: Scale + ?Sized> Scale for Box<S> {
    fn read(&mut self, timeout: std::time::Duration) -> Result<i32, BoxError> {
        (**self).read(timeout)
    }
}

/// One inbound message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A publish/subscribe session with a broker.
///
/// The last-will message is part of the link's own configuration and is
/// registered by `connect`.
pub trait Link {
    fn connect(&mut self) -> Result<(), BoxError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BoxError>;
    /// Return at most one pending inbound message without blocking past the
    /// transport's own read timeout.
    fn poll(&mut self) -> Result<Option<Message>, BoxError>;
    fn ping(&mut self) -> Result<(), BoxError>;
    fn disconnect(&mut self) -> Result<(), BoxError>;
}

/// Fire-and-forget feedback outputs (buzzer, LEDs).
///
/// Each call runs its own fixed timing script synchronously and must return
/// within about one second.
pub trait Actuator {
    fn signal_entry(&mut self);
    fn signal_exit(&mut self);
    fn signal_error(&mut self);
    fn signal_waiting(&mut self);
    /// Startup calibration passed.
    fn signal_calibrated(&mut self);
}

/// Best-effort two-line status display.
pub trait Display {
    fn show(&mut self, line1: &str, line2: &str) -> Result<(), BoxError>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn signal_entry(&mut self) {
        (**self).signal_entry();
    }
    fn signal_exit(&mut self) {
        (**self).signal_exit();
    }
    fn signal_error(&mut self) {
        (**self).signal_error();
    }
    fn signal_waiting(&mut self) {
        (**self).signal_waiting();
    }
    fn signal_calibrated(&mut self) {
        (**self).signal_calibrated();
    }
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn show(&mut self, line1: &str, line2: &str) -> Result<(), BoxError> {
        (**self).show(line1, line2)
    }
}
