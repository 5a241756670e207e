//! Blocking MQTT 3.1.1 client over any `Read + Write` stream.
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use stock_traits::{BoxError, Clock, Link, Message, MonotonicClock};
use thiserror::Error;
use tracing::{debug, trace};

use super::packet::{self, Connect, Packet, PacketError, PacketReader, SUBACK_FAILURE, Will};

// Sleep between empty reads while waiting for CONNACK/SUBACK.
const ACK_POLL: Duration = Duration::from_millis(1);
const READ_CHUNK: usize = 512;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
    #[error("protocol: {0}")]
    Packet(#[from] PacketError),
    #[error("not connected")]
    NotConnected,
    #[error("broker refused connection (code {0}: {reason})", reason = refusal_reason(*.0))]
    Refused(u8),
    #[error("broker rejected subscription to {0}")]
    SubscribeRejected(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("connection closed by broker")]
    Closed,
    #[error("no PINGRESP since the previous keepalive")]
    KeepAlive,
}

fn refusal_reason(code: u8) -> &'static str {
    match code {
        1 => "unacceptable protocol version",
        2 => "client identifier rejected",
        3 => "server unavailable",
        4 => "bad user name or password",
        5 => "not authorized",
        _ => "unknown",
    }
}

/// Opens a fresh transport for each session.
pub trait Dial {
    type Stream: Read + Write;
    fn dial(&mut self) -> io::Result<Self::Stream>;
}

/// TCP transport with bounded connect and per-read timeouts.
///
/// The read timeout bounds how long one `poll` can block.
#[derive(Debug, Clone)]
pub struct TcpDial {
    addr: String,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpDial {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            io_timeout,
        }
    }
}

impl Dial for TcpDial {
    type Stream = TcpStream;

    fn dial(&mut self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for sa in self.addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&sa, self.connect_timeout) {
                Ok(s) => {
                    s.set_read_timeout(Some(self.io_timeout))?;
                    s.set_write_timeout(Some(self.connect_timeout))?;
                    s.set_nodelay(true)?;
                    return Ok(s);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", self.addr))
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MqttOptions {
    pub client_id: String,
    pub keep_alive_s: u16,
    /// Registered in CONNECT; the broker publishes it if we vanish.
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Bound on the CONNACK and SUBACK waits.
    pub ack_timeout: Duration,
}

impl Default for MqttOptions {
    fn default() -> Self {
        Self {
            client_id: "stockscale".into(),
            keep_alive_s: 5,
            will: None,
            username: None,
            password: None,
            ack_timeout: Duration::from_secs(3),
        }
    }
}

pub struct MqttClient<D: Dial, C: Clock = MonotonicClock> {
    dial: D,
    opts: MqttOptions,
    clock: C,
    stream: Option<D::Stream>,
    reader: PacketReader,
    inbox: VecDeque<Message>,
    next_packet_id: u16,
    ping_outstanding: bool,
}

impl<D: Dial> MqttClient<D> {
    pub fn new(dial: D, opts: MqttOptions) -> Self {
        Self::with_clock(dial, opts, MonotonicClock::new())
    }
}

impl<D: Dial, C: Clock> MqttClient<D, C> {
    pub fn with_clock(dial: D, opts: MqttOptions, clock: C) -> Self {
        Self {
            dial,
            opts,
            clock,
            stream: None,
            reader: PacketReader::new(),
            inbox: VecDeque::new(),
            next_packet_id: 0,
            ping_outstanding: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Dial, send CONNECT and wait for a successful CONNACK.
    pub fn open(&mut self) -> Result<(), MqttError> {
        self.close();
        self.stream = Some(self.dial.dial()?);
        let connect = Packet::Connect(Connect {
            client_id: self.opts.client_id.clone(),
            keep_alive_s: self.opts.keep_alive_s,
            will: self.opts.will.clone(),
            username: self.opts.username.clone(),
            password: self.opts.password.clone(),
        });
        let res = self.send(&connect).and_then(|()| self.await_connack());
        if res.is_err() {
            self.close();
        }
        res
    }

    fn await_connack(&mut self) -> Result<(), MqttError> {
        let deadline = self.clock.now() + self.opts.ack_timeout;
        loop {
            match self.next_packet()? {
                Some(Packet::ConnAck { code: 0, .. }) => {
                    debug!(client_id = %self.opts.client_id, "mqtt session open");
                    return Ok(());
                }
                Some(Packet::ConnAck { code, .. }) => return Err(MqttError::Refused(code)),
                Some(other) => trace!(packet = other.name(), "ignored before CONNACK"),
                None => self.wait_or_timeout(deadline, "CONNACK")?,
            }
        }
    }

    /// Subscribe at QoS 0 and wait for the matching SUBACK. Publishes that
    /// arrive meanwhile are queued for [`recv`](Self::recv).
    pub fn subscribe_to(&mut self, topic: &str) -> Result<(), MqttError> {
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        let packet_id = self.next_packet_id;
        self.send(&Packet::Subscribe {
            packet_id,
            topic: topic.to_owned(),
        })?;
        let deadline = self.clock.now() + self.opts.ack_timeout;
        loop {
            match self.next_packet()? {
                Some(Packet::SubAck {
                    packet_id: id,
                    granted_qos,
                }) if id == packet_id => {
                    if granted_qos == SUBACK_FAILURE {
                        return Err(MqttError::SubscribeRejected(topic.to_owned()));
                    }
                    debug!(topic, "subscribed");
                    return Ok(());
                }
                Some(Packet::Publish { topic, payload }) => {
                    self.inbox.push_back(Message { topic, payload });
                }
                Some(Packet::PingResp) => self.ping_outstanding = false,
                Some(other) => trace!(packet = other.name(), "ignored before SUBACK"),
                None => self.wait_or_timeout(deadline, "SUBACK")?,
            }
        }
    }

    pub fn send_publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.send(&Packet::Publish {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
        })
    }

    /// Next inbound PUBLISH, if one is already available. Blocks at most for
    /// the transport's read timeout.
    pub fn recv(&mut self) -> Result<Option<Message>, MqttError> {
        if let Some(m) = self.inbox.pop_front() {
            return Ok(Some(m));
        }
        loop {
            match self.next_packet()? {
                Some(Packet::Publish { topic, payload }) => {
                    return Ok(Some(Message { topic, payload }));
                }
                Some(Packet::PingResp) => self.ping_outstanding = false,
                Some(other) => trace!(packet = other.name(), "ignored inbound packet"),
                None => return Ok(None),
            }
        }
    }

    /// Send PINGREQ. Fails if the previous one was never answered.
    pub fn keepalive(&mut self) -> Result<(), MqttError> {
        if self.ping_outstanding {
            return Err(MqttError::KeepAlive);
        }
        self.send(&Packet::PingReq)?;
        self.ping_outstanding = true;
        Ok(())
    }

    /// Send DISCONNECT if a session is open and drop the transport.
    pub fn close_gracefully(&mut self) -> Result<(), MqttError> {
        let res = if self.stream.is_some() {
            self.send(&Packet::Disconnect)
        } else {
            Ok(())
        };
        self.close();
        res
    }

    fn close(&mut self) {
        self.stream = None;
        self.reader.reset();
        self.inbox.clear();
        self.ping_outstanding = false;
    }

    fn send(&mut self, packet: &Packet) -> Result<(), MqttError> {
        let stream = self.stream.as_mut().ok_or(MqttError::NotConnected)?;
        let mut out = Vec::new();
        packet::encode(packet, &mut out)?;
        stream.write_all(&out)?;
        stream.flush()?;
        trace!(packet = packet.name(), bytes = out.len(), "mqtt out");
        Ok(())
    }

    /// Decode a buffered packet, reading from the transport if needed. Reads
    /// once, or for as long as the tail of an oversized PUBLISH is arriving.
    fn next_packet(&mut self) -> Result<Option<Packet>, MqttError> {
        if let Some(p) = self.reader.next_packet()? {
            return Ok(Some(p));
        }
        let stream = self.stream.as_mut().ok_or(MqttError::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Err(MqttError::Closed),
                Ok(n) => {
                    self.reader.feed(&chunk[..n]);
                    if let Some(p) = self.reader.next_packet()? {
                        return Ok(Some(p));
                    }
                    if !self.reader.skipping() {
                        return Ok(None);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn wait_or_timeout(
        &self,
        deadline: std::time::Instant,
        what: &'static str,
    ) -> Result<(), MqttError> {
        if self.clock.now() >= deadline {
            return Err(MqttError::Timeout(what));
        }
        self.clock.sleep(ACK_POLL);
        Ok(())
    }
}

impl<D: Dial, C: Clock> Link for MqttClient<D, C> {
    fn connect(&mut self) -> Result<(), BoxError> {
        Ok(self.open()?)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError> {
        Ok(self.subscribe_to(topic)?)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BoxError> {
        Ok(self.send_publish(topic, payload)?)
    }

    fn poll(&mut self) -> Result<Option<Message>, BoxError> {
        Ok(self.recv()?)
    }

    fn ping(&mut self) -> Result<(), BoxError> {
        Ok(self.keepalive()?)
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        Ok(self.close_gracefully()?)
    }
}
