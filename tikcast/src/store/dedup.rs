//! Fingerprint derivation and the bounded seen-set.
//!
//! The upstream delivers events at-least-once and is observed to repeat
//! like/share notifications in rapid bursts. Every event is reduced to a
//! deterministic fingerprint per kind; a bounded insertion-ordered set of
//! fingerprints per (handle, kind) suppresses the repeats.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

/// Maximum fingerprints tracked per (handle, kind).
pub const MAX_TRACKED: usize = 1000;

/// Fingerprints retained (newest first) once the cap is exceeded.
pub const RETAIN_ON_EVICT: usize = 500;

/// Fingerprint for a gift: the upstream's own (actor, gift, timestamp)
/// triple identifies a gift exactly.
pub fn gift_fingerprint(actor_id: &str, gift_id: &str, raw_timestamp: &str) -> String {
    format!("{}_{}_{}", actor_id, gift_id, raw_timestamp)
}

/// Fingerprint for a comment: the upstream message id when present,
/// otherwise actor + leading text + timestamp.
pub fn comment_fingerprint(
    message_id: Option<&str>,
    actor_id: &str,
    text: &str,
    raw_timestamp: &str,
) -> String {
    match message_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let prefix: String = text.chars().take(50).collect();
            format!("{}_{}_{}", actor_id, prefix, raw_timestamp)
        }
    }
}

/// Fingerprint for a like or share: actor + second bucket.
///
/// Deliberately coarse: the upstream emits redundant near-duplicate
/// notifications for these kinds, so repeats from one actor within the same
/// second collapse into one recorded event.
pub fn tap_fingerprint(actor_id: &str, unix_seconds: i64) -> String {
    format!("{}_{}", actor_id, unix_seconds)
}

/// Bounded set of fingerprints with insertion-order eviction.
#[derive(Debug)]
pub struct SeenSet {
    entries: FxHashSet<String>,
    order: VecDeque<String>,
    max: usize,
    retain: usize,
}

impl SeenSet {
    /// Create a seen-set with the default limits.
    pub fn new() -> Self {
        Self::with_limits(MAX_TRACKED, RETAIN_ON_EVICT)
    }

    /// Create a seen-set with custom limits.
    pub fn with_limits(max: usize, retain: usize) -> Self {
        Self {
            entries: FxHashSet::default(),
            order: VecDeque::with_capacity(max.min(1024)),
            max,
            retain,
        }
    }

    /// Insert a fingerprint.
    ///
    /// Returns false (and changes nothing) when the fingerprint is already
    /// tracked. Once the set grows past its cap it is truncated to the most
    /// recently inserted entries, oldest dropped first.
    pub fn insert(&mut self, fingerprint: &str) -> bool {
        if self.entries.contains(fingerprint) {
            return false;
        }

        self.entries.insert(fingerprint.to_string());
        self.order.push_back(fingerprint.to_string());

        if self.order.len() > self.max {
            while self.order.len() > self.retain {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }

        true
    }

    /// Whether a fingerprint is currently tracked.
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.contains(fingerprint)
    }

    /// Number of tracked fingerprints.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut seen = SeenSet::new();

        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut seen = SeenSet::new();

        for i in 0..=MAX_TRACKED {
            assert!(seen.insert(&format!("fp-{}", i)));
        }

        // 1001 inserts trip the cap: only the newest 500 survive.
        assert_eq!(seen.len(), RETAIN_ON_EVICT);
        assert!(!seen.contains("fp-0"));
        assert!(!seen.contains(&format!("fp-{}", MAX_TRACKED - RETAIN_ON_EVICT)));
        assert!(seen.contains(&format!("fp-{}", MAX_TRACKED - RETAIN_ON_EVICT + 1)));
        assert!(seen.contains(&format!("fp-{}", MAX_TRACKED)));
    }

    #[test]
    fn test_evicted_fingerprint_can_reappear() {
        let mut seen = SeenSet::with_limits(4, 2);

        assert!(seen.insert("a"));
        for fp in ["b", "c", "d", "e"] {
            seen.insert(fp);
        }

        // "a" was evicted, so the same fingerprint records again.
        assert!(!seen.contains("a"));
        assert!(seen.insert("a"));
    }

    #[test]
    fn test_gift_fingerprint() {
        assert_eq!(gift_fingerprint("7", "5655", "1700000000123"), "7_5655_1700000000123");
    }

    #[test]
    fn test_comment_fingerprint_prefers_message_id() {
        assert_eq!(
            comment_fingerprint(Some("msg-9"), "7", "hello", "123"),
            "msg-9"
        );

        let long_text = "x".repeat(80);
        let fp = comment_fingerprint(None, "7", &long_text, "123");
        assert_eq!(fp, format!("7_{}_123", "x".repeat(50)));
    }

    #[test]
    fn test_tap_fingerprint_buckets_by_second() {
        assert_eq!(tap_fingerprint("7", 1700000000), tap_fingerprint("7", 1700000000));
        assert_ne!(tap_fingerprint("7", 1700000000), tap_fingerprint("7", 1700000001));
        assert_ne!(tap_fingerprint("7", 1700000000), tap_fingerprint("8", 1700000000));
    }
}
