//! Edge-case tests for the wire protocol parser and encoder.

use bytes::{BufMut, Bytes, BytesMut};
use kuling_protocol::{encode_frame, parse_frame, Frame};

// ---------------------------------------------------------------
// Incremental feeding
// ---------------------------------------------------------------

#[test]
fn frame_split_at_every_byte_boundary() {
    let mut encoded = BytesMut::new();
    encode_frame(
        &Frame::command(["PUT", "topic", "0", "key", "payload"]),
        &mut encoded,
    );

    // Feed the frame one byte at a time; it must parse exactly once, at
    // the final byte, and never mis-parse a prefix.
    for split in 1..encoded.len() {
        let mut buf = BytesMut::new();
        buf.put_slice(&encoded[..split]);
        assert_eq!(
            parse_frame(&mut buf).unwrap(),
            None,
            "prefix of {split} bytes must be incomplete"
        );

        buf.put_slice(&encoded[split..]);
        let frame = parse_frame(&mut buf).unwrap().unwrap();
        assert!(matches!(frame, Frame::Array(Some(ref items)) if items.len() == 5));
        assert!(buf.is_empty());
    }
}

#[test]
fn pipelined_frames_parse_in_order() {
    let mut buf = BytesMut::new();
    encode_frame(&Frame::command(["PING"]), &mut buf);
    encode_frame(&Frame::Integer(7), &mut buf);
    encode_frame(&Frame::Simple("OK".to_string()), &mut buf);

    assert!(matches!(
        parse_frame(&mut buf).unwrap().unwrap(),
        Frame::Array(_)
    ));
    assert_eq!(parse_frame(&mut buf).unwrap().unwrap(), Frame::Integer(7));
    assert_eq!(
        parse_frame(&mut buf).unwrap().unwrap(),
        Frame::Simple("OK".to_string())
    );
    assert_eq!(parse_frame(&mut buf).unwrap(), None);
}

// ---------------------------------------------------------------
// Binary safety
// ---------------------------------------------------------------

#[test]
fn bulk_payload_may_contain_protocol_markers() {
    // A payload full of CRLFs, markers and zero bytes must round-trip.
    let payload = Bytes::from(&b"\r\n+OK\r\n-ERR\r\n*3\r\n$5\r\n\x00\xFF"[..]);
    let frame = Frame::Bulk(Some(payload.clone()));

    let mut buf = BytesMut::new();
    encode_frame(&frame, &mut buf);
    let parsed = parse_frame(&mut buf).unwrap().unwrap();
    assert_eq!(parsed, Frame::Bulk(Some(payload)));
}

#[test]
fn command_with_binary_key_and_payload() {
    let key = Bytes::from(vec![0u8, 1, 2, 13, 10, 255]);
    let payload = Bytes::from(vec![0xDEu8, 0xAD, 0xBE, 0xEF]);
    let frame = Frame::command([
        Bytes::from_static(b"PUT"),
        Bytes::from_static(b"t"),
        Bytes::from_static(b"0"),
        key.clone(),
        payload.clone(),
    ]);

    let mut buf = BytesMut::new();
    encode_frame(&frame, &mut buf);
    match parse_frame(&mut buf).unwrap().unwrap() {
        Frame::Array(Some(items)) => {
            assert_eq!(items[3], Frame::Bulk(Some(key)));
            assert_eq!(items[4], Frame::Bulk(Some(payload)));
        }
        other => panic!("expected array, got {other:?}"),
    }
}

// ---------------------------------------------------------------
// Grammar corners
// ---------------------------------------------------------------

#[test]
fn nil_bulk_inside_array() {
    let mut buf = BytesMut::from(&b"*2\r\n$-1\r\n:3\r\n"[..]);
    assert_eq!(
        parse_frame(&mut buf).unwrap().unwrap(),
        Frame::Array(Some(vec![Frame::Bulk(None), Frame::Integer(3)]))
    );
}

#[test]
fn error_message_may_contain_spaces_and_colons() {
    let mut buf = BytesMut::from(&b"-ERR unknown shard: t/9\r\n"[..]);
    let frame = parse_frame(&mut buf).unwrap().unwrap();
    assert_eq!(frame.error_parts(), Some(("ERR", "unknown shard: t/9")));
}

#[test]
fn status_line_is_not_length_prefixed() {
    let mut buf = BytesMut::from(&b"+A STATUS WITH SPACES\r\n"[..]);
    assert_eq!(
        parse_frame(&mut buf).unwrap().unwrap(),
        Frame::Simple("A STATUS WITH SPACES".to_string())
    );
}

#[test]
fn lone_cr_inside_status_is_kept() {
    // Only the CRLF pair terminates a line.
    let mut buf = BytesMut::from(&b"+a\rb\r\n"[..]);
    assert_eq!(
        parse_frame(&mut buf).unwrap().unwrap(),
        Frame::Simple("a\rb".to_string())
    );
}

#[test]
fn huge_length_prefix_without_data_does_not_allocate_forever() {
    // Claims 400MB; the buffer has 5 bytes. Must report incomplete (or
    // reject), not hang or allocate the announced size.
    let mut buf = BytesMut::from(&b"$400000000\r\nhello"[..]);
    assert_eq!(parse_frame(&mut buf).unwrap(), None);
}

#[test]
fn zero_element_command_array_parses() {
    let mut buf = BytesMut::from(&b"*0\r\n"[..]);
    assert_eq!(
        parse_frame(&mut buf).unwrap().unwrap(),
        Frame::Array(Some(vec![]))
    );
}
