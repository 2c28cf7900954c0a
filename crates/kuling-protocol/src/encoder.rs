//! Frame encoder.

use bytes::{BufMut, Bytes, BytesMut};

use crate::frame::Frame;

/// Line terminator used throughout the protocol.
pub const CRLF: &[u8] = b"\r\n";

/// Encode a frame into `buf`.
pub fn encode_frame(frame: &Frame, buf: &mut BytesMut) {
    match frame {
        Frame::Simple(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Error(s) => {
            buf.put_u8(b'-');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Integer(n) => {
            buf.put_u8(b':');
            buf.put_slice(n.to_string().as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Bulk(None) => {
            buf.put_slice(b"$-1\r\n");
        }
        Frame::Bulk(Some(data)) => {
            buf.put_slice(&bulk_header(data.len() as i64));
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
        Frame::Array(None) => {
            buf.put_slice(b"*-1\r\n");
        }
        Frame::Array(Some(frames)) => {
            buf.put_u8(b'*');
            buf.put_slice(frames.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            for frame in frames {
                encode_frame(frame, buf);
            }
        }
    }
}

/// The `$<len>\r\n` header announcing a bulk payload.
///
/// The GET path writes this itself and then streams the payload straight
/// from the segment file, so the header must be constructable without the
/// payload in hand.
pub fn bulk_header(len: i64) -> Bytes {
    Bytes::from(format!("${len}\r\n"))
}
