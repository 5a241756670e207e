//! Minimal MQTT 3.1.1 link: QoS 0 publish/subscribe, keepalive and last will.
pub mod client;
pub mod packet;

pub use client::{Dial, MqttClient, MqttError, MqttOptions, TcpDial};
pub use packet::{Connect, MAX_PACKET_SIZE, Packet, PacketError, PacketReader, Will, decode, encode};
