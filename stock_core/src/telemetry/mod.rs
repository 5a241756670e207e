//! Resilient publish/subscribe session around the station loop.
//!
//! One outer loop owns the connection: connect, subscribe to feedback,
//! announce `online`, then run ticks until something fails. Any failure
//! tears the session down and waits out an exponential backoff before the
//! next attempt. Nothing is buffered while disconnected.
pub mod backoff;
pub mod command;
pub mod schedule;

pub use backoff::Backoff;
pub use command::{Command, UnknownCommand};
pub use schedule::Periodic;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use stock_traits::{Actuator, BoxError, Clock, Display, Link, Message, Scale};
use tracing::{debug, info, warn};

use crate::config::TelemetryCfg;
use crate::detector::Event;
use crate::hw_error::map_link_error;
use crate::station::Station;

pub const STATUS_ONLINE: &[u8] = b"online";
pub const STATUS_OFFLINE: &[u8] = b"offline";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// JSON body published on the events topic.
#[derive(Debug, Serialize)]
struct EventReport {
    event: Event,
    stock: u32,
    weight_g: f32,
}

pub struct TelemetryChannel<L, C> {
    link: L,
    clock: C,
    cfg: TelemetryCfg,
    state: ConnectionState,
    backoff: Backoff,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<L: Link, C: Clock> TelemetryChannel<L, C> {
    pub fn new(link: L, clock: C, cfg: TelemetryCfg) -> Self {
        let backoff = Backoff::new(cfg.base_backoff, cfg.max_backoff);
        Self {
            link,
            clock,
            cfg,
            state: ConnectionState::Disconnected,
            backoff,
            shutdown: None,
        }
    }

    /// Stop [`run_forever`](Self::run_forever) once `flag` is raised.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn shutting_down(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Keep a session up and run station ticks inside it.
    ///
    /// Only returns after the shutdown flag is raised; transport failures
    /// are retried forever.
    pub fn run_forever<S, A, D>(&mut self, station: &mut Station<S, A, D>)
    where
        S: Scale,
        A: Actuator,
        D: Display,
    {
        loop {
            if self.shutting_down() {
                self.state = ConnectionState::Disconnected;
                return;
            }

            self.state = ConnectionState::Connecting;
            station.show("Connecting MQTT", &self.cfg.endpoint);
            match self.open_session() {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    self.backoff.reset();
                    info!(endpoint = %self.cfg.endpoint, "telemetry session up");
                    station.announce_connected();
                    match self.serve(station) {
                        Ok(()) => {
                            self.close_for_shutdown();
                            return;
                        }
                        Err(e) => {
                            warn!(error = %map_link_error(e.as_ref()), "telemetry session dropped");
                        }
                    }
                }
                Err(e) => warn!(error = %map_link_error(e.as_ref()), "connect failed"),
            }

            if let Err(e) = self.link.disconnect() {
                debug!(error = %e, "disconnect after failure");
            }
            self.state = ConnectionState::Disconnected;

            let delay = self.backoff.next_delay();
            warn!(delay_s = delay.as_secs(), "retrying telemetry");
            station.show("MQTT offline", &format!("retry in {}s", delay.as_secs()));
            self.sleep_unless_shutdown(delay);
        }
    }

    fn open_session(&mut self) -> Result<(), BoxError> {
        self.link.connect()?;
        self.link.subscribe(&self.cfg.topics.feedback)?;
        self.link.publish(&self.cfg.topics.status, STATUS_ONLINE)?;
        Ok(())
    }

    /// Tick loop for one session. `Ok` means shutdown was requested.
    fn serve<S, A, D>(&mut self, station: &mut Station<S, A, D>) -> Result<(), BoxError>
    where
        S: Scale,
        A: Actuator,
        D: Display,
    {
        let now = self.clock.now();
        let mut weight_due = Periodic::immediate(self.cfg.publish_interval, now);
        let mut ping_due = Periodic::new(self.cfg.keepalive_interval, now);

        loop {
            if self.shutting_down() {
                return Ok(());
            }

            let tick = station.tick();
            let weight = tick.acquisition.weight();
            if let Some(event) = tick.event {
                self.publish_event(event, station.stock(), weight)?;
            }

            if weight_due.fire(self.clock.now()) {
                let payload = format!("{weight:.2}");
                self.link.publish(&self.cfg.topics.weight, payload.as_bytes())?;
                station.show_status(weight);
            }

            if let Some(msg) = self.link.poll()? {
                self.dispatch(station, &msg);
            }

            if ping_due.fire(self.clock.now()) {
                self.link.ping()?;
            }

            self.clock.sleep(self.cfg.tick);
        }
    }

    fn publish_event(&mut self, event: Event, stock: u32, weight_g: f32) -> Result<(), BoxError> {
        let report = EventReport {
            event,
            stock,
            weight_g: (weight_g * 10.0).round() / 10.0,
        };
        let body = serde_json::to_vec(&report)?;
        self.link.publish(&self.cfg.topics.events, &body)
    }

    fn dispatch<S, A, D>(&self, station: &mut Station<S, A, D>, msg: &Message)
    where
        S: Scale,
        A: Actuator,
        D: Display,
    {
        if msg.topic != self.cfg.topics.feedback {
            debug!(topic = %msg.topic, "message on unexpected topic ignored");
            return;
        }
        match Command::from_payload(&msg.payload) {
            Ok(cmd) => station.apply(cmd),
            Err(e) => debug!(error = %e, "ignored"),
        }
    }

    fn close_for_shutdown(&mut self) {
        if let Err(e) = self.link.publish(&self.cfg.topics.status, STATUS_OFFLINE) {
            debug!(error = %e, "offline status not sent");
        }
        if let Err(e) = self.link.disconnect() {
            debug!(error = %e, "disconnect on shutdown");
        }
        self.state = ConnectionState::Disconnected;
        info!("telemetry stopped");
    }

    /// Sleep in tick-sized steps so a shutdown request is noticed promptly.
    fn sleep_unless_shutdown(&self, total: Duration) {
        let step = self.cfg.tick.max(Duration::from_millis(1));
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.shutting_down() {
                return;
            }
            let d = remaining.min(step);
            self.clock.sleep(d);
            remaining -= d;
        }
    }
}
