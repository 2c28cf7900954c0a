//! Streaming frame parser.
//!
//! `parse_frame` consumes at most one complete frame from the front of a
//! read buffer. When the buffer holds only part of a frame it returns
//! `Ok(None)` and leaves the buffer untouched, so the caller can read more
//! bytes from the socket and retry.
//!
//! Size limits are enforced while parsing, before any payload is copied,
//! so an oversized length prefix cannot make the server allocate.

use std::io::Cursor;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::frame::Frame;

/// Parser limits guarding against hostile length prefixes.
#[derive(Debug, Clone)]
pub struct ParserLimits {
    /// Maximum bulk string payload in bytes.
    pub max_bulk_len: usize,
    /// Maximum number of elements in an array.
    pub max_array_len: usize,
    /// Maximum array nesting depth.
    pub max_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            // Far above any sane message, far below an allocation bomb.
            max_bulk_len: 512 * 1024 * 1024,
            max_array_len: 1024 * 1024,
            max_depth: 32,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not enough buffered data for a complete frame. Not a failure.
    #[error("incomplete frame")]
    Incomplete,

    #[error("invalid protocol data: {0}")]
    Invalid(String),

    #[error("frame too large: {0}")]
    TooLarge(String),
}

/// Parse one frame from the front of `buf` with default limits.
pub fn parse_frame(buf: &mut BytesMut) -> Result<Option<Frame>, ParseError> {
    parse_frame_with_limits(buf, &ParserLimits::default())
}

/// Parse one frame from the front of `buf`.
///
/// Returns `Ok(Some(frame))` and advances `buf` past it, or `Ok(None)` when
/// more data is needed. Anything else is a protocol violation.
pub fn parse_frame_with_limits(
    buf: &mut BytesMut,
    limits: &ParserLimits,
) -> Result<Option<Frame>, ParseError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(&buf[..]);
    match parse_at(&mut cursor, limits, 0) {
        Ok(frame) => {
            let consumed = cursor.position() as usize;
            buf.advance(consumed);
            Ok(Some(frame))
        }
        Err(ParseError::Incomplete) => Ok(None),
        Err(err) => Err(err),
    }
}

fn parse_at(
    cursor: &mut Cursor<&[u8]>,
    limits: &ParserLimits,
    depth: usize,
) -> Result<Frame, ParseError> {
    if depth > limits.max_depth {
        return Err(ParseError::TooLarge(format!(
            "nesting depth exceeds {}",
            limits.max_depth
        )));
    }

    let kind = next_byte(cursor)?;
    match kind {
        b'+' => {
            let line = read_line(cursor)?;
            Ok(Frame::Simple(utf8_line(line)?))
        }
        b'-' => {
            let line = read_line(cursor)?;
            Ok(Frame::Error(utf8_line(line)?))
        }
        b':' => {
            let line = read_line(cursor)?;
            Ok(Frame::Integer(parse_decimal(line)?))
        }
        b'$' => {
            let len = parse_decimal(read_line(cursor)?)?;
            if len < 0 {
                // Any negative length is the nil bulk.
                return Ok(Frame::Bulk(None));
            }
            let len = len as usize;
            if len > limits.max_bulk_len {
                return Err(ParseError::TooLarge(format!(
                    "bulk of {len} bytes exceeds {}",
                    limits.max_bulk_len
                )));
            }
            let data = read_exact(cursor, len)?;
            expect_crlf(cursor)?;
            Ok(Frame::Bulk(Some(data)))
        }
        b'*' => {
            let count = parse_decimal(read_line(cursor)?)?;
            if count < 0 {
                return Ok(Frame::Array(None));
            }
            let count = count as usize;
            if count > limits.max_array_len {
                return Err(ParseError::TooLarge(format!(
                    "array of {count} elements exceeds {}",
                    limits.max_array_len
                )));
            }
            let mut elements = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                elements.push(parse_at(cursor, limits, depth + 1)?);
            }
            Ok(Frame::Array(Some(elements)))
        }
        other => Err(ParseError::Invalid(format!(
            "unexpected frame marker: {:#04x}",
            other
        ))),
    }
}

fn next_byte(cursor: &mut Cursor<&[u8]>) -> Result<u8, ParseError> {
    if !cursor.has_remaining() {
        return Err(ParseError::Incomplete);
    }
    Ok(cursor.get_u8())
}

/// Read up to the next CRLF, consuming it; the line itself is returned.
fn read_line(cursor: &mut Cursor<&[u8]>) -> Result<Bytes, ParseError> {
    let start = cursor.position() as usize;
    let slice = *cursor.get_ref();

    let mut i = start;
    while i + 1 < slice.len() {
        if slice[i] == b'\r' && slice[i + 1] == b'\n' {
            cursor.set_position((i + 2) as u64);
            return Ok(Bytes::copy_from_slice(&slice[start..i]));
        }
        i += 1;
    }
    Err(ParseError::Incomplete)
}

fn read_exact(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, ParseError> {
    if cursor.remaining() < len {
        return Err(ParseError::Incomplete);
    }
    let start = cursor.position() as usize;
    let data = Bytes::copy_from_slice(&cursor.get_ref()[start..start + len]);
    cursor.advance(len);
    Ok(data)
}

fn expect_crlf(cursor: &mut Cursor<&[u8]>) -> Result<(), ParseError> {
    if cursor.remaining() < 2 {
        return Err(ParseError::Incomplete);
    }
    let a = cursor.get_u8();
    let b = cursor.get_u8();
    if a != b'\r' || b != b'\n' {
        return Err(ParseError::Invalid("expected CRLF after bulk".to_string()));
    }
    Ok(())
}

fn utf8_line(line: Bytes) -> Result<String, ParseError> {
    String::from_utf8(line.to_vec())
        .map_err(|_| ParseError::Invalid("non-utf8 status line".to_string()))
}

fn parse_decimal(line: Bytes) -> Result<i64, ParseError> {
    if line.is_empty() {
        return Err(ParseError::Invalid("empty integer".to_string()));
    }
    let (negative, digits) = match line[0] {
        b'-' => (true, &line[1..]),
        _ => (false, &line[..]),
    };
    if digits.is_empty() {
        return Err(ParseError::Invalid("empty integer".to_string()));
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ParseError::Invalid(format!(
                "illegal byte in integer: {b:#04x}"
            )));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i64))
            .ok_or_else(|| ParseError::Invalid("integer overflow".to_string()))?;
    }
    Ok(if negative { -value } else { value })
}
