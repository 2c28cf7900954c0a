#![no_main]

use bytes::Bytes;
use kuling_core::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly, never panic or
    // over-allocate from a hostile length field.
    let mut src = Bytes::copy_from_slice(data);
    let _ = Message::decode(&mut src);

    // Round-trip: a message built from fuzz input must decode to itself.
    if data.len() >= 9 {
        let sequence_id = i64::from_be_bytes(data[0..8].try_into().unwrap());
        let split = 9 + (data[8] as usize).min(data.len() - 9);
        let key = Bytes::copy_from_slice(&data[9..split]);
        let payload = Bytes::copy_from_slice(&data[split..]);

        let message = Message::new(sequence_id, key, payload);
        let mut encoded = message.to_bytes();
        let decoded = Message::decode(&mut encoded).expect("round-trip must decode");
        assert_eq!(decoded, message);
        assert!(encoded.is_empty());
    }
});
