//! Protocol frame model.

use bytes::Bytes;

/// One protocol value, request or response side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+<text>`, a short status like `OK` or `PONG`.
    Simple(String),

    /// `-<type> <message>`, stored whole, e.g. `"ERR unknown topic: t"`.
    Error(String),

    /// `:<decimal>`
    Integer(i64),

    /// `$<len>` payload; `None` is the nil bulk (`$-1`).
    Bulk(Option<Bytes>),

    /// `*<count>` elements; `None` is the nil array (`*-1`).
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Build an error frame from a type tag and message.
    pub fn error(kind: &str, message: impl AsRef<str>) -> Frame {
        Frame::Error(format!("{kind} {}", message.as_ref()))
    }

    /// Build a request: an array of bulk strings, command name first.
    pub fn command<I, B>(args: I) -> Frame
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Frame::Array(Some(
            args.into_iter()
                .map(|arg| Frame::Bulk(Some(arg.into())))
                .collect(),
        ))
    }

    /// Split an error frame's content into `(type, message)`.
    pub fn error_parts(&self) -> Option<(&str, &str)> {
        match self {
            Frame::Error(raw) => Some(raw.split_once(' ').unwrap_or((raw.as_str(), ""))),
            _ => None,
        }
    }

    /// The bulk payload, if this is a non-nil bulk frame.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// The bulk payload as UTF-8, if this is a non-nil bulk frame.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bulk().and_then(|data| std::str::from_utf8(data).ok())
    }

    /// The integer value, accepting `:n` directly and numeric bulks,
    /// since clients send command arguments as bulk strings.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            Frame::Bulk(Some(data)) => std::str::from_utf8(data).ok()?.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builds_bulk_array() {
        let frame = Frame::command(["PING"]);
        assert_eq!(
            frame,
            Frame::Array(Some(vec![Frame::Bulk(Some(Bytes::from("PING")))]))
        );
    }

    #[test]
    fn test_error_parts() {
        let frame = Frame::error("ERR", "unknown topic: t");
        assert_eq!(frame.error_parts(), Some(("ERR", "unknown topic: t")));

        let bare = Frame::Error("ONLYTYPE".to_string());
        assert_eq!(bare.error_parts(), Some(("ONLYTYPE", "")));

        assert_eq!(Frame::Integer(1).error_parts(), None);
    }

    #[test]
    fn test_as_integer_accepts_numeric_bulk() {
        assert_eq!(Frame::Integer(42).as_integer(), Some(42));
        assert_eq!(Frame::Bulk(Some(Bytes::from("42"))).as_integer(), Some(42));
        assert_eq!(Frame::Bulk(Some(Bytes::from("-7"))).as_integer(), Some(-7));
        assert_eq!(Frame::Bulk(Some(Bytes::from("x"))).as_integer(), None);
        assert_eq!(Frame::Bulk(None).as_integer(), None);
    }

    #[test]
    fn test_as_str() {
        assert_eq!(Frame::Bulk(Some(Bytes::from("abc"))).as_str(), Some("abc"));
        assert_eq!(Frame::Bulk(None).as_str(), None);
        assert_eq!(
            Frame::Bulk(Some(Bytes::from(vec![0xFFu8, 0xFE]))).as_str(),
            None
        );
    }
}
