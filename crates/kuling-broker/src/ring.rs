//! Consistent-hash ring for shard assignment.
//!
//! Members and keys both hash onto a `[0, 2^64)` ring; a key is owned by
//! the member with the smallest clockwise distance from the key's hash.
//! When a member joins or leaves, only the keys hashing near it move.
//! That stability is why the broker uses a ring instead of modulo
//! assignment.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// An ordered set of members sharing a hash ring.
#[derive(Debug, Clone, Default)]
pub struct Ring {
    members: Vec<String>,
}

impl Ring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Returns false if it was already present.
    pub fn insert(&mut self, member: &str) -> bool {
        if self.contains(member) {
            return false;
        }
        self.members.push(member.to_string());
        true
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// The member owning `key`: smallest clockwise distance on the ring.
    pub fn assign(&self, key: &str) -> Option<&str> {
        let key_hash = hash_str(key);

        let mut best: Option<&str> = None;
        let mut best_distance = u64::MAX;

        for member in &self.members {
            let member_hash = hash_str(member);
            let distance = if member_hash >= key_hash {
                member_hash - key_hash
            } else {
                (u64::MAX - key_hash) + member_hash
            };
            if distance < best_distance {
                best_distance = distance;
                best = Some(member);
            }
        }

        best
    }
}

fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring_assigns_nothing() {
        assert_eq!(Ring::new().assign("topic/0"), None);
    }

    #[test]
    fn test_single_member_owns_everything() {
        let mut ring = Ring::new();
        ring.insert("client-a");
        for i in 0..16 {
            assert_eq!(ring.assign(&format!("t/{i}")), Some("client-a"));
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut ring = Ring::new();
        assert!(ring.insert("a"));
        assert!(!ring.insert("a"));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let mut ring = Ring::new();
        ring.insert("a");
        ring.insert("b");
        ring.insert("c");

        for i in 0..32 {
            let key = format!("orders/{i}");
            let first = ring.assign(&key).unwrap().to_string();
            for _ in 0..3 {
                assert_eq!(ring.assign(&key), Some(first.as_str()));
            }
        }
    }

    #[test]
    fn test_every_key_is_owned() {
        let mut ring = Ring::new();
        ring.insert("a");
        ring.insert("b");

        for i in 0..64 {
            assert!(ring.assign(&format!("t/{i}")).is_some());
        }
    }

    #[test]
    fn test_join_only_moves_keys_toward_joiner() {
        let mut ring = Ring::new();
        ring.insert("a");
        ring.insert("b");

        let keys: Vec<String> = (0..64).map(|i| format!("t/{i}")).collect();
        let before: Vec<String> = keys
            .iter()
            .map(|k| ring.assign(k).unwrap().to_string())
            .collect();

        ring.insert("c");

        for (key, old_owner) in keys.iter().zip(&before) {
            let new_owner = ring.assign(key).unwrap();
            // A key either stays put or moves to the new member, never
            // between the existing ones.
            assert!(
                new_owner == old_owner || new_owner == "c",
                "{key} moved from {old_owner} to {new_owner}"
            );
        }
    }
}
