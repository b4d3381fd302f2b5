//! Per-streamer event store and deduplicator.
//!
//! One entry per handle, each holding four most-recent-first buffers (gifts,
//! comments, likes, shares), one seen-set per kind, and the activity
//! timestamp the cleanup sweeper keys off. Buffers are written only by the
//! ingestion loop; the polling API reads snapshots.

pub mod buffer;
pub mod dedup;
pub mod events;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;

use buffer::EventBuffer;
use dedup::SeenSet;
pub use events::{
    AudienceEvent, CommentEvent, EventKind, GiftEvent, LikeEvent, ShareEvent, clock_time,
};

/// Snapshot of one handle's buffers, most recent first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventSnapshot {
    pub gifts: Vec<GiftEvent>,
    pub comments: Vec<CommentEvent>,
    pub likes: Vec<LikeEvent>,
    pub shares: Vec<ShareEvent>,
}

impl EventSnapshot {
    /// Total number of events across all kinds.
    pub fn total(&self) -> usize {
        self.gifts.len() + self.comments.len() + self.likes.len() + self.shares.len()
    }
}

/// Buffered state for one handle.
struct HandleState {
    gifts: EventBuffer<GiftEvent>,
    comments: EventBuffer<CommentEvent>,
    likes: EventBuffer<LikeEvent>,
    shares: EventBuffer<ShareEvent>,
    seen_gifts: SeenSet,
    seen_comments: SeenSet,
    seen_likes: SeenSet,
    seen_shares: SeenSet,
    last_activity: DateTime<Utc>,
}

impl HandleState {
    fn new(capacity: usize) -> Self {
        Self {
            gifts: EventBuffer::new(capacity),
            comments: EventBuffer::new(capacity),
            likes: EventBuffer::new(capacity),
            shares: EventBuffer::new(capacity),
            seen_gifts: SeenSet::new(),
            seen_comments: SeenSet::new(),
            seen_likes: SeenSet::new(),
            seen_shares: SeenSet::new(),
            last_activity: Utc::now(),
        }
    }

    fn seen_mut(&mut self, kind: EventKind) -> &mut SeenSet {
        match kind {
            EventKind::Gift => &mut self.seen_gifts,
            EventKind::Comment => &mut self.seen_comments,
            EventKind::Like => &mut self.seen_likes,
            EventKind::Share => &mut self.seen_shares,
        }
    }
}

/// Event store keyed by streamer handle.
pub struct EventStore {
    handles: DashMap<String, HandleState>,
    buffer_capacity: usize,
}

impl EventStore {
    /// Create a store with the default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(buffer::DEFAULT_CAPACITY)
    }

    /// Create a store with a custom per-kind buffer capacity.
    pub fn with_capacity(buffer_capacity: usize) -> Self {
        Self {
            handles: DashMap::new(),
            buffer_capacity,
        }
    }

    /// Record one event under its fingerprint.
    ///
    /// Returns false without touching the buffer when the fingerprint is
    /// already tracked for this (handle, kind). An accepted event lands at
    /// the front of its buffer and refreshes the handle's activity
    /// timestamp.
    pub fn record(&self, handle: &str, event: AudienceEvent, fingerprint: &str) -> bool {
        let mut state = self
            .handles
            .entry(handle.to_string())
            .or_insert_with(|| HandleState::new(self.buffer_capacity));

        if !state.seen_mut(event.kind()).insert(fingerprint) {
            return false;
        }

        match event {
            AudienceEvent::Gift(e) => state.gifts.push(e),
            AudienceEvent::Comment(e) => state.comments.push(e),
            AudienceEvent::Like(e) => state.likes.push(e),
            AudienceEvent::Share(e) => state.shares.push(e),
        }
        state.last_activity = Utc::now();
        true
    }

    /// Snapshot all four buffers for a handle. Unknown handles yield the
    /// empty snapshot.
    pub fn snapshot(&self, handle: &str) -> EventSnapshot {
        match self.handles.get(handle) {
            Some(state) => EventSnapshot {
                gifts: state.gifts.snapshot(),
                comments: state.comments.snapshot(),
                likes: state.likes.snapshot(),
                shares: state.shares.snapshot(),
            },
            None => EventSnapshot::default(),
        }
    }

    /// Refresh a handle's activity timestamp, creating its entry if needed.
    /// Called on every poll so an actively watched handle is never swept.
    pub fn touch(&self, handle: &str) {
        let mut state = self
            .handles
            .entry(handle.to_string())
            .or_insert_with(|| HandleState::new(self.buffer_capacity));
        state.last_activity = Utc::now();
    }

    /// Last activity timestamp for a handle.
    pub fn last_activity(&self, handle: &str) -> Option<DateTime<Utc>> {
        self.handles.get(handle).map(|state| state.last_activity)
    }

    /// Handles whose last activity is older than the threshold.
    pub fn stale_handles(&self, threshold: Duration) -> Vec<String> {
        let threshold = TimeDelta::from_std(threshold).unwrap_or(TimeDelta::MAX);
        let now = Utc::now();
        self.handles
            .iter()
            .filter(|entry| now.signed_duration_since(entry.last_activity) > threshold)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Drop all buffered state for a handle.
    pub fn remove(&self, handle: &str) -> bool {
        self.handles.remove(handle).is_some()
    }

    /// Number of handles with buffered state.
    pub fn tracked_handles(&self) -> usize {
        self.handles.len()
    }

    /// Backdate a handle's activity timestamp (test hook for the sweeper).
    #[cfg(test)]
    pub fn set_last_activity(&self, handle: &str, at: DateTime<Utc>) {
        if let Some(mut state) = self.handles.get_mut(handle) {
            state.last_activity = at;
        }
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::dedup::{gift_fingerprint, tap_fingerprint};

    fn gift(name: &str) -> AudienceEvent {
        AudienceEvent::Gift(GiftEvent::new("Viewer", name, 1, "7", Utc::now()))
    }

    #[test]
    fn test_record_is_idempotent_per_fingerprint() {
        let store = EventStore::new();
        let fp = gift_fingerprint("7", "5655", "1700000000123");

        assert!(store.record("streamer", gift("Rose"), &fp));
        assert!(!store.record("streamer", gift("Rose"), &fp));
        assert!(!store.record("streamer", gift("Rose"), &fp));

        // Three deliveries of the same raw gift leave exactly one event.
        assert_eq!(store.snapshot("streamer").gifts.len(), 1);
    }

    #[test]
    fn test_like_dedup_is_coarse_by_second() {
        let store = EventStore::new();
        let now = Utc::now();
        let like = || AudienceEvent::Like(LikeEvent::new("Viewer", "7", now));

        let same_second = tap_fingerprint("7", 1700000000);
        assert!(store.record("streamer", like(), &same_second));
        assert!(!store.record("streamer", like(), &same_second));

        let next_second = tap_fingerprint("7", 1700000001);
        assert!(store.record("streamer", like(), &next_second));

        assert_eq!(store.snapshot("streamer").likes.len(), 2);
    }

    #[test]
    fn test_seen_sets_are_per_kind() {
        let store = EventStore::new();
        let fp = "7_1700000000";

        let like = AudienceEvent::Like(LikeEvent::new("Viewer", "7", Utc::now()));
        let share = AudienceEvent::Share(ShareEvent::new("Viewer", "7", Utc::now()));

        // The identical fingerprint in different kinds does not collide.
        assert!(store.record("streamer", like, fp));
        assert!(store.record("streamer", share, fp));
    }

    #[test]
    fn test_buffers_are_per_handle() {
        let store = EventStore::new();
        let fp = gift_fingerprint("7", "1", "1");

        assert!(store.record("alice", gift("Rose"), &fp));
        assert!(store.record("bob", gift("Rose"), &fp));

        assert_eq!(store.snapshot("alice").gifts.len(), 1);
        assert_eq!(store.snapshot("bob").gifts.len(), 1);
        assert_eq!(store.snapshot("carol").total(), 0);
    }

    #[test]
    fn test_snapshot_is_most_recent_first() {
        let store = EventStore::new();
        for i in 0..3 {
            let fp = gift_fingerprint("7", &i.to_string(), "1");
            store.record("streamer", gift(&format!("gift-{}", i)), &fp);
        }

        let gifts = store.snapshot("streamer").gifts;
        assert_eq!(gifts[0].gift, "gift-2");
        assert_eq!(gifts[2].gift, "gift-0");
    }

    #[test]
    fn test_buffer_capacity_bounds_retention() {
        let store = EventStore::with_capacity(5);
        for i in 0..20 {
            let fp = gift_fingerprint("7", &i.to_string(), "1");
            store.record("streamer", gift(&format!("gift-{}", i)), &fp);
        }

        let gifts = store.snapshot("streamer").gifts;
        assert_eq!(gifts.len(), 5);
        assert_eq!(gifts[0].gift, "gift-19");
        assert_eq!(gifts[4].gift, "gift-15");
    }

    #[test]
    fn test_stale_handles_and_removal() {
        let store = EventStore::new();
        store.touch("fresh");
        store.touch("stale");
        store.set_last_activity("stale", Utc::now() - TimeDelta::minutes(15));

        let stale = store.stale_handles(Duration::from_secs(600));
        assert_eq!(stale, vec!["stale".to_string()]);

        assert!(store.remove("stale"));
        assert!(!store.remove("stale"));
        assert_eq!(store.tracked_handles(), 1);
    }
}
