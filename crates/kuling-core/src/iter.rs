//! Consumer-group iterators.
//!
//! An iterator names a consumer group's position in one shard of a topic.
//! Its canonical wire form is the string `group/topic/shard/offset`; the
//! first three parts form the iterator id, which is also the key the broker
//! persists offsets under. Because `/` is the separator, group, topic and
//! shard names must not contain it.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A consumer-group position in one shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Iter {
    /// Consumer group that owns the position.
    pub group: String,
    /// Topic being consumed.
    pub topic: String,
    /// Shard within the topic.
    pub shard: String,
    /// Current sequence id. 0 means "start from the beginning".
    pub offset: i64,
}

impl Iter {
    pub fn new(
        group: impl Into<String>,
        topic: impl Into<String>,
        shard: impl Into<String>,
        offset: i64,
    ) -> Self {
        Self {
            group: group.into(),
            topic: topic.into(),
            shard: shard.into(),
            offset,
        }
    }

    /// The identity of this iterator: `group/topic/shard`.
    pub fn id(&self) -> String {
        iter_id(&self.group, &self.topic, &self.shard)
    }
}

impl fmt::Display for Iter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.group, self.topic, self.shard, self.offset
        )
    }
}

impl FromStr for Iter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 {
            return Err(Error::InvalidIterator(format!(
                "expected group/topic/shard/offset, got {s:?}"
            )));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidIterator(format!("empty component in {s:?}")));
        }
        let offset: i64 = parts[3]
            .parse()
            .map_err(|_| Error::InvalidIterator(format!("offset not an integer in {s:?}")))?;
        if offset < 0 {
            return Err(Error::InvalidIterator(format!(
                "negative offset in {s:?}"
            )));
        }
        Ok(Iter::new(parts[0], parts[1], parts[2], offset))
    }
}

/// Build an iterator id from its parts: `group/topic/shard`.
pub fn iter_id(group: &str, topic: &str, shard: &str) -> String {
    format!("{group}/{topic}/{shard}")
}

/// Normalize an iterator reference to its id.
///
/// Accepts either the 3-part id or the full 4-part iterator string (in which
/// case the numeric offset part is stripped). Commit requests carry both
/// spellings, depending on whether the client echoes the issued iterator or
/// just its id.
pub fn normalize_iter_id(s: &str) -> Result<String> {
    let parts: Vec<&str> = s.split('/').collect();
    match parts.len() {
        3 if parts.iter().all(|p| !p.is_empty()) => Ok(s.to_string()),
        4 => {
            let iter: Iter = s.parse()?;
            Ok(iter.id())
        }
        _ => Err(Error::InvalidIterator(format!(
            "expected group/topic/shard[/offset], got {s:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let iter = Iter::new("g", "t", "s", 42);
        let encoded = iter.to_string();
        assert_eq!(encoded, "g/t/s/42");
        let decoded: Iter = encoded.parse().unwrap();
        assert_eq!(decoded, iter);
    }

    #[test]
    fn test_id_excludes_offset() {
        let iter = Iter::new("billing", "orders", "3", 100);
        assert_eq!(iter.id(), "billing/orders/3");
    }

    #[test]
    fn test_parse_zero_offset() {
        let iter: Iter = "g/t/0/0".parse().unwrap();
        assert_eq!(iter.shard, "0");
        assert_eq!(iter.offset, 0);
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert!("g/t/s".parse::<Iter>().is_err());
        assert!("g/t/s/1/extra".parse::<Iter>().is_err());
        assert!("".parse::<Iter>().is_err());
    }

    #[test]
    fn test_parse_rejects_bad_offset() {
        assert!("g/t/s/abc".parse::<Iter>().is_err());
        assert!("g/t/s/-1".parse::<Iter>().is_err());
    }

    #[test]
    fn test_parse_rejects_empty_component() {
        assert!("g//s/1".parse::<Iter>().is_err());
    }

    #[test]
    fn test_normalize_accepts_both_spellings() {
        assert_eq!(normalize_iter_id("g/t/0").unwrap(), "g/t/0");
        assert_eq!(normalize_iter_id("g/t/0/17").unwrap(), "g/t/0");
    }

    #[test]
    fn test_normalize_rejects_rubbish() {
        assert!(normalize_iter_id("g/t").is_err());
        assert!(normalize_iter_id("g/t/0/x").is_err());
    }
}
