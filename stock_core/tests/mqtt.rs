use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use rstest::rstest;
use stock_core::mqtt::{
    Connect, Dial, MAX_PACKET_SIZE, MqttClient, MqttError, MqttOptions, Packet, PacketError, Will,
    decode, encode,
};
use stock_traits::Link;
use stock_traits::clock::test_clock::TestClock;

fn wire(p: &Packet) -> Vec<u8> {
    let mut out = Vec::new();
    encode(p, &mut out).expect("encode");
    out
}

// ── codec ───────────────────────────────────────────────────────────────────

#[test]
fn connect_vector() {
    let p = Packet::Connect(Connect {
        client_id: "c1".into(),
        keep_alive_s: 5,
        will: None,
        username: None,
        password: None,
    });
    assert_eq!(
        wire(&p),
        vec![
            0x10, 0x0E, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x05, 0x00, 0x02,
            b'c', b'1'
        ]
    );
}

#[test]
fn connect_with_will_and_credentials_sets_flags() {
    let p = Packet::Connect(Connect {
        client_id: "esp32-balanca-01".into(),
        keep_alive_s: 5,
        will: Some(Will {
            topic: "balanca/esp32/status".into(),
            payload: b"offline".to_vec(),
            retain: false,
        }),
        username: Some("u".into()),
        password: Some("p".into()),
    });
    let bytes = wire(&p);
    // flags byte follows protocol name (6) and level (1)
    assert_eq!(bytes[2 + 7], 0x02 | 0x04 | 0x40 | 0x80);
    let (back, used) = decode(&bytes).unwrap().unwrap();
    assert_eq!(used, bytes.len());
    assert_eq!(back, p);
}

#[rstest]
#[case::publish(
    Packet::Publish { topic: "a/b".into(), payload: b"1.00".to_vec() },
    vec![0x30, 0x09, 0x00, 0x03, b'a', b'/', b'b', b'1', b'.', b'0', b'0']
)]
#[case::subscribe(
    Packet::Subscribe { packet_id: 1, topic: "f".into() },
    vec![0x82, 0x06, 0x00, 0x01, 0x00, 0x01, b'f', 0x00]
)]
#[case::suback(
    Packet::SubAck { packet_id: 1, granted_qos: 0 },
    vec![0x90, 0x03, 0x00, 0x01, 0x00]
)]
#[case::connack(
    Packet::ConnAck { session_present: false, code: 0 },
    vec![0x20, 0x02, 0x00, 0x00]
)]
fn packet_vectors(#[case] p: Packet, #[case] bytes: Vec<u8>) {
    assert_eq!(wire(&p), bytes);
    assert_eq!(decode(&bytes).unwrap(), Some((p, bytes.len())));
}

#[test]
fn qos1_publish_skips_packet_id() {
    let bytes = [0x32, 0x06, 0x00, 0x01, b't', 0x00, 0x07, b'x'];
    let (p, _) = decode(&bytes).unwrap().unwrap();
    assert_eq!(
        p,
        Packet::Publish {
            topic: "t".into(),
            payload: b"x".to_vec()
        }
    );
}

#[test]
fn every_prefix_is_incomplete() {
    let bytes = wire(&Packet::Publish {
        topic: "balanca/rpi/feedback".into(),
        payload: b"ENTRADA_OK".to_vec(),
    });
    for n in 0..bytes.len() {
        assert_eq!(decode(&bytes[..n]).unwrap(), None, "prefix of {n} bytes");
    }
}

#[test]
fn oversize_packets_rejected_both_ways() {
    // remaining length 65535
    assert!(matches!(
        decode(&[0x30, 0xFF, 0xFF, 0x03]),
        Err(PacketError::TooLarge(_))
    ));
    let mut out = vec![0xAA];
    let err = encode(
        &Packet::Publish {
            topic: "t".into(),
            payload: vec![0; MAX_PACKET_SIZE],
        },
        &mut out,
    )
    .unwrap_err();
    assert!(matches!(err, PacketError::TooLarge(_)));
    assert_eq!(out, vec![0xAA], "nothing appended on failure");
}

#[rstest]
#[case::bad_utf8(vec![0x30, 0x04, 0x00, 0x02, 0xFF, 0xFE])]
#[case::truncated_topic(vec![0x30, 0x02, 0x00, 0x05])]
#[case::bad_subscribe_flags(vec![0x80, 0x06, 0x00, 0x01, 0x00, 0x01, b'f', 0x00])]
#[case::ping_with_body(vec![0xD0, 0x01, 0x00])]
#[case::unsupported(vec![0xB0, 0x02, 0x00, 0x01])]
fn malformed_input_is_an_error(#[case] bytes: Vec<u8>) {
    assert!(decode(&bytes).is_err());
}

// ── client over an in-memory stream ─────────────────────────────────────────

#[derive(Clone, Default)]
struct Pipe {
    inbound: Rc<RefCell<VecDeque<u8>>>,
    outbound: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
}

impl Pipe {
    fn broker_sends(&self, p: &Packet) {
        self.inbound.borrow_mut().extend(wire(p));
    }

    fn broker_sends_raw(&self, bytes: &[u8]) {
        self.inbound.borrow_mut().extend(bytes);
    }

    fn client_sent(&self) -> Vec<Packet> {
        let buf = self.outbound.borrow();
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some((p, used)) = decode(&buf[pos..]).expect("client bytes decode") {
            out.push(p);
            pos += used;
        }
        out
    }
}

struct MemStream(Pipe);

impl Read for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut q = self.0.inbound.borrow_mut();
        if q.is_empty() {
            return if self.0.closed.get() {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(q.len());
        for (slot, b) in buf.iter_mut().zip(q.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl Write for MemStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.outbound.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MemDial(Pipe);

impl Dial for MemDial {
    type Stream = MemStream;
    fn dial(&mut self) -> io::Result<MemStream> {
        Ok(MemStream(self.0.clone()))
    }
}

fn opts() -> MqttOptions {
    MqttOptions {
        client_id: "esp32-balanca-01".into(),
        will: Some(Will {
            topic: "balanca/esp32/status".into(),
            payload: b"offline".to_vec(),
            retain: false,
        }),
        ack_timeout: Duration::from_millis(50),
        ..MqttOptions::default()
    }
}

fn client(pipe: &Pipe) -> (MqttClient<MemDial, TestClock>, TestClock) {
    let clock = TestClock::new();
    let c = MqttClient::with_clock(MemDial(pipe.clone()), opts(), clock.clone());
    (c, clock)
}

fn connack(code: u8) -> Packet {
    Packet::ConnAck {
        session_present: false,
        code,
    }
}

#[test]
fn connect_registers_will() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    let (mut c, _) = client(&pipe);
    c.open().unwrap();
    assert!(c.is_connected());
    match &pipe.client_sent()[..] {
        [Packet::Connect(conn)] => {
            assert_eq!(conn.client_id, "esp32-balanca-01");
            assert_eq!(conn.keep_alive_s, 5);
            let will = conn.will.as_ref().expect("will");
            assert_eq!(will.payload, b"offline");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn refused_connection_reports_code() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(5));
    let (mut c, _) = client(&pipe);
    let err = c.open().unwrap_err();
    assert!(matches!(err, MqttError::Refused(5)));
    assert!(err.to_string().contains("not authorized"));
    assert!(!c.is_connected());
}

#[test]
fn missing_connack_times_out() {
    let pipe = Pipe::default();
    let (mut c, clock) = client(&pipe);
    assert!(matches!(c.open(), Err(MqttError::Timeout("CONNACK"))));
    assert!(clock.elapsed() >= Duration::from_millis(50));
}

#[test]
fn publish_before_suback_is_kept() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    pipe.broker_sends(&Packet::Publish {
        topic: "balanca/rpi/feedback".into(),
        payload: b"ERRO".to_vec(),
    });
    pipe.broker_sends(&Packet::SubAck {
        packet_id: 1,
        granted_qos: 0,
    });
    let (mut c, _) = client(&pipe);
    c.open().unwrap();
    c.subscribe_to("balanca/rpi/feedback").unwrap();
    let m = c.recv().unwrap().expect("queued publish");
    assert_eq!(m.payload, b"ERRO");
    assert_eq!(c.recv().unwrap(), None);
}

// PUBLISH on `topic` whose encoded size is past MAX_PACKET_SIZE.
fn oversized_publish(topic: &str, payload_len: usize) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    body.extend_from_slice(topic.as_bytes());
    body.resize(body.len() + payload_len, b'x');
    let mut out = vec![0x30];
    let mut len = body.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
    out.extend(body);
    out
}

#[test]
fn oversized_publish_is_dropped_by_recv() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    let (mut c, _) = client(&pipe);
    c.open().unwrap();

    let big = oversized_publish("balanca/rpi/feedback", 5000);
    assert_eq!(big.len(), 5025);
    pipe.broker_sends_raw(&big);
    pipe.broker_sends(&Packet::Publish {
        topic: "balanca/rpi/feedback".into(),
        payload: b"ERRO".to_vec(),
    });

    let m = c.recv().unwrap().expect("publish after the oversized one");
    assert_eq!(m.payload, b"ERRO");
    assert_eq!(c.recv().unwrap(), None);
    assert!(c.is_connected());
}

#[test]
fn retained_oversized_publish_does_not_block_subscribe() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    pipe.broker_sends_raw(&oversized_publish("balanca/rpi/feedback", 5000));
    pipe.broker_sends(&Packet::SubAck {
        packet_id: 1,
        granted_qos: 0,
    });
    pipe.broker_sends(&Packet::Publish {
        topic: "balanca/rpi/feedback".into(),
        payload: b"SAIDA_OK".to_vec(),
    });
    let (mut c, _) = client(&pipe);
    c.open().unwrap();
    c.subscribe_to("balanca/rpi/feedback").unwrap();
    let m = c.recv().unwrap().expect("publish after SUBACK");
    assert_eq!(m.payload, b"SAIDA_OK");
}

#[test]
fn rejected_subscription_is_an_error() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    pipe.broker_sends(&Packet::SubAck {
        packet_id: 1,
        granted_qos: 0x80,
    });
    let (mut c, _) = client(&pipe);
    c.open().unwrap();
    assert!(matches!(
        c.subscribe_to("x"),
        Err(MqttError::SubscribeRejected(_))
    ));
}

#[test]
fn unanswered_ping_fails_next_keepalive() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    let (mut c, _) = client(&pipe);
    c.open().unwrap();
    c.keepalive().unwrap();
    pipe.broker_sends(&Packet::PingResp);
    assert_eq!(c.recv().unwrap(), None);
    c.keepalive().unwrap();
    assert!(matches!(c.keepalive(), Err(MqttError::KeepAlive)));
}

#[test]
fn broker_hangup_is_an_error() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    let (mut c, _) = client(&pipe);
    c.open().unwrap();
    pipe.closed.set(true);
    assert!(matches!(c.recv(), Err(MqttError::Closed)));
}

#[test]
fn link_trait_round_trip() {
    let pipe = Pipe::default();
    pipe.broker_sends(&connack(0));
    let (mut c, _) = client(&pipe);
    Link::connect(&mut c).unwrap();
    Link::publish(&mut c, "balanca/esp32/peso_raw", b"206.00").unwrap();
    Link::disconnect(&mut c).unwrap();
    assert!(!c.is_connected());
    let sent = pipe.client_sent();
    assert_eq!(
        sent[1..],
        [
            Packet::Publish {
                topic: "balanca/esp32/peso_raw".into(),
                payload: b"206.00".to_vec(),
            },
            Packet::Disconnect,
        ]
    );
    assert!(Link::publish(&mut c, "t", b"x").is_err());
}
