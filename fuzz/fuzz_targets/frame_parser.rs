#![no_main]

use bytes::BytesMut;
use kuling_protocol::{encode_frame, parse_frame, parse_frame_with_limits, ParserLimits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The parser must consume arbitrary bytes without panicking and
    // without allocating for lengths the buffer cannot back.
    let mut buf = BytesMut::from(data);
    if let Ok(Some(frame)) = parse_frame(&mut buf) {
        // Whatever parsed must re-encode and re-parse identically.
        let mut encoded = BytesMut::new();
        encode_frame(&frame, &mut encoded);
        let reparsed = parse_frame(&mut encoded)
            .expect("re-parse must not error")
            .expect("re-parse must complete");
        assert_eq!(reparsed, frame);
    }

    // Tight limits must reject rather than blow up.
    let limits = ParserLimits {
        max_bulk_len: 64,
        max_array_len: 8,
        max_depth: 4,
    };
    let mut buf = BytesMut::from(data);
    let _ = parse_frame_with_limits(&mut buf, &limits);
});
