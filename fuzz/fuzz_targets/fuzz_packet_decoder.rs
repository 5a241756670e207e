#![no_main]
use libfuzzer_sys::fuzz_target;
use stock_core::mqtt::{MAX_PACKET_SIZE, PacketReader, decode, encode};

fuzz_target!(|data: &[u8]| {
    // Whole-buffer decode: a decoded packet never claims more bytes than given,
    // and re-encodes within the size limit.
    if let Ok(Some((packet, used))) = decode(data) {
        assert!(used <= data.len());
        let mut out = Vec::new();
        if encode(&packet, &mut out).is_ok() {
            assert!(out.len() <= MAX_PACKET_SIZE);
        }
    }

    // Same bytes fed in two pieces through the streaming reader.
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut reader = PacketReader::new();
    reader.feed(&data[..split]);
    reader.feed(&data[split..]);
    while let Ok(Some(_)) = reader.next_packet() {}
});
