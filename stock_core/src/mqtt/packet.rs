//! MQTT 3.1.1 packet codec (QoS 0 subset).
//!
//! Wire format of every control packet:
//! ```text
//! ┌──────────────┬─────────────────────────┬──────────────────────────┐
//! │ type | flags │ remaining length (1-4B) │ variable header+payload │
//! │ 1 byte       │ base-128 varint         │ N bytes                  │
//! └──────────────┴─────────────────────────┴──────────────────────────┘
//! ```
//!
//! [`decode`] works on a byte slice that may hold a partial packet, one
//! packet, or several concatenated; [`PacketReader`] wraps it for streams.
use thiserror::Error;
use tracing::debug;

/// Largest packet (header included) accepted in either direction.
pub const MAX_PACKET_SIZE: usize = 4096;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// SUBACK return code for a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("malformed remaining length")]
    MalformedLength,
    #[error("packet of {0} bytes exceeds the {MAX_PACKET_SIZE} byte limit")]
    TooLarge(usize),
    #[error("unsupported packet type {0}")]
    UnsupportedType(u8),
    #[error("malformed {0} packet")]
    Malformed(&'static str),
    #[error("string field is not valid UTF-8")]
    Utf8,
    #[error("field of {0} bytes does not fit a 16-bit length prefix")]
    FieldTooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    pub keep_alive_s: u16,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck { session_present: bool, code: u8 },
    Publish { topic: String, payload: Vec<u8> },
    Subscribe { packet_id: u16, topic: String },
    SubAck { packet_id: u16, granted_qos: u8 },
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Connect(_) => "CONNECT",
            Packet::ConnAck { .. } => "CONNACK",
            Packet::Publish { .. } => "PUBLISH",
            Packet::Subscribe { .. } => "SUBSCRIBE",
            Packet::SubAck { .. } => "SUBACK",
            Packet::PingReq => "PINGREQ",
            Packet::PingResp => "PINGRESP",
            Packet::Disconnect => "DISCONNECT",
        }
    }
}

// ── encoding ────────────────────────────────────────────────────────────────

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_bytes(out: &mut Vec<u8>, b: &[u8]) -> Result<(), PacketError> {
    let len = u16::try_from(b.len()).map_err(|_| PacketError::FieldTooLong(b.len()))?;
    put_u16(out, len);
    out.extend_from_slice(b);
    Ok(())
}

fn put_remaining_length(out: &mut Vec<u8>, mut len: usize) {
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
}

/// Append the wire form of `packet` to `out`.
pub fn encode(packet: &Packet, out: &mut Vec<u8>) -> Result<(), PacketError> {
    let mut body = Vec::new();
    let first = match packet {
        Packet::Connect(c) => {
            body.extend_from_slice(&[0, 4]);
            body.extend_from_slice(PROTOCOL_NAME);
            body.push(PROTOCOL_LEVEL);
            let mut flags = FLAG_CLEAN_SESSION;
            if let Some(w) = &c.will {
                flags |= FLAG_WILL;
                if w.retain {
                    flags |= FLAG_WILL_RETAIN;
                }
            }
            if c.username.is_some() {
                flags |= FLAG_USERNAME;
            }
            if c.password.is_some() {
                flags |= FLAG_PASSWORD;
            }
            body.push(flags);
            put_u16(&mut body, c.keep_alive_s);
            put_bytes(&mut body, c.client_id.as_bytes())?;
            if let Some(w) = &c.will {
                put_bytes(&mut body, w.topic.as_bytes())?;
                put_bytes(&mut body, &w.payload)?;
            }
            if let Some(u) = &c.username {
                put_bytes(&mut body, u.as_bytes())?;
            }
            if let Some(p) = &c.password {
                put_bytes(&mut body, p.as_bytes())?;
            }
            CONNECT << 4
        }
        Packet::ConnAck {
            session_present,
            code,
        } => {
            body.push(u8::from(*session_present));
            body.push(*code);
            CONNACK << 4
        }
        Packet::Publish { topic, payload } => {
            if topic.is_empty() {
                return Err(PacketError::Malformed("PUBLISH"));
            }
            put_bytes(&mut body, topic.as_bytes())?;
            body.extend_from_slice(payload);
            PUBLISH << 4
        }
        Packet::Subscribe { packet_id, topic } => {
            put_u16(&mut body, *packet_id);
            put_bytes(&mut body, topic.as_bytes())?;
            body.push(0); // requested QoS
            (SUBSCRIBE << 4) | 0x02
        }
        Packet::SubAck {
            packet_id,
            granted_qos,
        } => {
            put_u16(&mut body, *packet_id);
            body.push(*granted_qos);
            SUBACK << 4
        }
        Packet::PingReq => PINGREQ << 4,
        Packet::PingResp => PINGRESP << 4,
        Packet::Disconnect => DISCONNECT << 4,
    };

    let start = out.len();
    out.push(first);
    put_remaining_length(out, body.len());
    out.extend_from_slice(&body);
    let total = out.len() - start;
    if total > MAX_PACKET_SIZE {
        out.truncate(start);
        return Err(PacketError::TooLarge(total));
    }
    Ok(())
}

// ── decoding ────────────────────────────────────────────────────────────────

/// Bounds-checked reader over one packet body.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
    kind: &'static str,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8], kind: &'static str) -> Self {
        Self { buf, pos: 0, kind }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.buf.len())
            .ok_or(PacketError::Malformed(self.kind))?;
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PacketError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn bytes(&mut self) -> Result<&'a [u8], PacketError> {
        let len = self.u16()?;
        self.take(usize::from(len))
    }

    fn string(&mut self) -> Result<String, PacketError> {
        let b = self.bytes()?;
        std::str::from_utf8(b)
            .map(str::to_owned)
            .map_err(|_| PacketError::Utf8)
    }

    fn rest(&mut self) -> &'a [u8] {
        let s = &self.buf[self.pos..];
        self.pos = self.buf.len();
        s
    }

    fn finish(&self) -> Result<(), PacketError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(PacketError::Malformed(self.kind))
        }
    }
}

/// Decode the remaining-length varint starting at `buf[1]`.
///
/// Returns `(length, bytes used by the varint)` or `None` if more input is
/// needed.
fn remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, PacketError> {
    let mut value = 0usize;
    for i in 0..4 {
        let Some(&byte) = buf.get(1 + i) else {
            return Ok(None);
        };
        value |= usize::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Err(PacketError::MalformedLength)
}

/// Try to decode one packet from the front of `buf`.
///
/// `Ok(None)` means `buf` holds an incomplete packet; otherwise returns the
/// packet and the number of bytes it occupied.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet, usize)>, PacketError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let Some((len, varint)) = remaining_length(buf)? else {
        return Ok(None);
    };
    let total = 1 + varint + len;
    if total > MAX_PACKET_SIZE {
        return Err(PacketError::TooLarge(total));
    }
    if buf.len() < total {
        return Ok(None);
    }
    let body = &buf[1 + varint..total];
    let flags = first & 0x0F;

    let packet = match first >> 4 {
        CONNECT if flags == 0 => decode_connect(body)?,
        CONNACK if flags == 0 => {
            let mut f = Fields::new(body, "CONNACK");
            let ack = f.u8()?;
            let code = f.u8()?;
            f.finish()?;
            Packet::ConnAck {
                session_present: ack & 0x01 != 0,
                code,
            }
        }
        PUBLISH => {
            let mut f = Fields::new(body, "PUBLISH");
            let qos = (flags >> 1) & 0x03;
            if qos == 3 {
                return Err(PacketError::Malformed("PUBLISH"));
            }
            let topic = f.string()?;
            if qos > 0 {
                f.u16()?; // packet identifier; QoS>0 is never acknowledged here
            }
            Packet::Publish {
                topic,
                payload: f.rest().to_vec(),
            }
        }
        SUBSCRIBE if flags == 0x02 => {
            let mut f = Fields::new(body, "SUBSCRIBE");
            let packet_id = f.u16()?;
            let topic = f.string()?;
            f.u8()?;
            Packet::Subscribe { packet_id, topic }
        }
        SUBACK if flags == 0 => {
            let mut f = Fields::new(body, "SUBACK");
            let packet_id = f.u16()?;
            let granted_qos = f.u8()?;
            Packet::SubAck {
                packet_id,
                granted_qos,
            }
        }
        PINGREQ | PINGRESP | DISCONNECT if flags == 0 => {
            if len != 0 {
                return Err(PacketError::Malformed("empty-body"));
            }
            match first >> 4 {
                PINGREQ => Packet::PingReq,
                PINGRESP => Packet::PingResp,
                _ => Packet::Disconnect,
            }
        }
        CONNECT | CONNACK | SUBSCRIBE | SUBACK | PINGREQ | PINGRESP | DISCONNECT => {
            return Err(PacketError::Malformed("fixed-header flags"));
        }
        other => return Err(PacketError::UnsupportedType(other)),
    };
    Ok(Some((packet, total)))
}

fn decode_connect(body: &[u8]) -> Result<Packet, PacketError> {
    let mut f = Fields::new(body, "CONNECT");
    if f.bytes()? != PROTOCOL_NAME || f.u8()? != PROTOCOL_LEVEL {
        return Err(PacketError::Malformed("CONNECT"));
    }
    let flags = f.u8()?;
    let keep_alive_s = f.u16()?;
    let client_id = f.string()?;
    let will = if flags & FLAG_WILL != 0 {
        Some(Will {
            topic: f.string()?,
            payload: f.bytes()?.to_vec(),
            retain: flags & FLAG_WILL_RETAIN != 0,
        })
    } else {
        None
    };
    let username = if flags & FLAG_USERNAME != 0 {
        Some(f.string()?)
    } else {
        None
    };
    let password = if flags & FLAG_PASSWORD != 0 {
        Some(f.string()?)
    } else {
        None
    };
    f.finish()?;
    Ok(Packet::Connect(Connect {
        client_id,
        keep_alive_s,
        will,
        username,
        password,
    }))
}

/// Accumulates stream bytes and yields whole packets.
///
/// An inbound PUBLISH over [`MAX_PACKET_SIZE`] is skipped as its bytes
/// arrive. Any other decode error discards everything buffered; the caller is
/// expected to drop the connection.
#[derive(Debug, Default)]
pub struct PacketReader {
    buf: Vec<u8>,
    skip: usize,
    dropped: u64,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn next_packet(&mut self) -> Result<Option<Packet>, PacketError> {
        loop {
            if self.skip > 0 {
                let n = self.skip.min(self.buf.len());
                self.buf.drain(..n);
                self.skip -= n;
                if self.skip > 0 {
                    return Ok(None);
                }
            }
            match decode(&self.buf) {
                Ok(Some((packet, used))) => {
                    self.buf.drain(..used);
                    return Ok(Some(packet));
                }
                Ok(None) => return Ok(None),
                Err(PacketError::TooLarge(total))
                    if self.buf.first().is_some_and(|b| b >> 4 == PUBLISH) =>
                {
                    debug!(bytes = total, "oversized PUBLISH dropped");
                    self.skip = total;
                    self.dropped += 1;
                }
                Err(e) => {
                    self.buf.clear();
                    return Err(e);
                }
            }
        }
    }

    /// True while the tail of an oversized PUBLISH is still expected.
    pub fn skipping(&self) -> bool {
        self.skip > 0
    }

    /// Oversized PUBLISH packets dropped since the last reset.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.skip = 0;
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(p: &Packet) -> Vec<u8> {
        let mut out = Vec::new();
        encode(p, &mut out).unwrap();
        out
    }

    #[test]
    fn remaining_length_uses_continuation_bits() {
        let mut out = Vec::new();
        put_remaining_length(&mut out, 321);
        assert_eq!(out, vec![0xC1, 0x02]);
        let mut buf = vec![0x30];
        buf.extend_from_slice(&out);
        assert_eq!(remaining_length(&buf).unwrap(), Some((321, 2)));
    }

    #[test]
    fn five_byte_length_is_malformed() {
        let buf = [0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert_eq!(decode(&buf), Err(PacketError::MalformedLength));
    }

    #[test]
    fn ping_and_disconnect_are_two_bytes() {
        assert_eq!(bytes(&Packet::PingReq), vec![0xC0, 0x00]);
        assert_eq!(bytes(&Packet::PingResp), vec![0xD0, 0x00]);
        assert_eq!(bytes(&Packet::Disconnect), vec![0xE0, 0x00]);
    }

    #[test]
    fn reader_yields_packets_across_feeds() {
        let mut wire = bytes(&Packet::PingResp);
        wire.extend(bytes(&Packet::Publish {
            topic: "t".into(),
            payload: b"x".to_vec(),
        }));
        let mut r = PacketReader::new();
        r.feed(&wire[..3]);
        assert_eq!(r.next_packet().unwrap(), Some(Packet::PingResp));
        assert_eq!(r.next_packet().unwrap(), None);
        r.feed(&wire[3..]);
        assert!(matches!(r.next_packet().unwrap(), Some(Packet::Publish { .. })));
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn reader_clears_on_error() {
        let mut r = PacketReader::new();
        r.feed(&[0x40, 0x02, 0x00, 0x01]); // PUBACK
        assert_eq!(r.next_packet(), Err(PacketError::UnsupportedType(4)));
        assert_eq!(r.buffered(), 0);
    }

    fn oversized_publish(payload_len: usize) -> Vec<u8> {
        let mut body = Vec::new();
        put_bytes(&mut body, b"cmd").unwrap();
        body.resize(body.len() + payload_len, b'x');
        let mut wire = vec![PUBLISH << 4];
        put_remaining_length(&mut wire, body.len());
        wire.extend(body);
        wire
    }

    #[test]
    fn oversized_publish_is_skipped_across_feeds() {
        let mut wire = oversized_publish(5000);
        assert!(wire.len() > MAX_PACKET_SIZE);
        wire.extend(bytes(&Packet::PingResp));

        let mut r = PacketReader::new();
        let mut got = Vec::new();
        for chunk in wire.chunks(512) {
            r.feed(chunk);
            while let Some(p) = r.next_packet().unwrap() {
                got.push(p);
            }
        }
        assert_eq!(got, vec![Packet::PingResp]);
        assert_eq!(r.dropped(), 1);
        assert!(!r.skipping());
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn oversized_control_packet_is_still_an_error() {
        let mut r = PacketReader::new();
        r.feed(&[SUBACK << 4, 0xFF, 0xFF, 0x03]);
        assert!(matches!(r.next_packet(), Err(PacketError::TooLarge(_))));
        assert_eq!(r.buffered(), 0);
    }
}
