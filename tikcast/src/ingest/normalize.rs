//! Normalization of raw webcast payloads into store events.
//!
//! Each function reduces a payload to the minimal normalized fields plus the
//! deduplication fingerprint for its kind. Identity falls back through the
//! payload's name fields; missing ids degrade to `"unknown"` rather than
//! dropping the event.

use chrono::{DateTime, Utc};
use webcast::{ChatData, GiftData, LikeData, SocialData};

use crate::store::dedup::{comment_fingerprint, gift_fingerprint, tap_fingerprint};
use crate::store::{AudienceEvent, CommentEvent, GiftEvent, LikeEvent, ShareEvent};

/// Timestamps at or above this magnitude are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Normalize a gift payload.
///
/// Gifts are fingerprinted exactly: the upstream's own (actor, gift,
/// timestamp) pairing identifies one gift streak.
pub fn normalize_gift(data: &GiftData, observed_at: DateTime<Utc>) -> (AudienceEvent, String) {
    let actor_id = data.user.actor_id().to_string();
    let raw_timestamp = data
        .timestamp
        .clone()
        .unwrap_or_else(|| observed_at.timestamp_millis().to_string());
    let fingerprint = gift_fingerprint(&actor_id, data.gift_key(), &raw_timestamp);

    let event = GiftEvent::new(
        data.user.display(),
        data.display_name(),
        data.repeat_total(),
        actor_id,
        observed_at,
    );
    (AudienceEvent::Gift(event), fingerprint)
}

/// Normalize a chat payload.
pub fn normalize_chat(data: &ChatData, observed_at: DateTime<Utc>) -> (AudienceEvent, String) {
    let actor_id = data.user.actor_id().to_string();
    let raw_timestamp = data
        .timestamp
        .clone()
        .unwrap_or_else(|| observed_at.timestamp_millis().to_string());
    let text = data.content();
    let fingerprint = comment_fingerprint(data.message_id(), &actor_id, text, &raw_timestamp);

    let event = CommentEvent::new(data.user.display(), text, actor_id, observed_at);
    (AudienceEvent::Comment(event), fingerprint)
}

/// Normalize a like payload.
///
/// Likes are fingerprinted per actor per second: the upstream repeats like
/// notifications in bursts, and one like per viewer-second is what the
/// dashboard wants to show.
pub fn normalize_like(data: &LikeData, observed_at: DateTime<Utc>) -> (AudienceEvent, String) {
    let actor_id = data.user.actor_id().to_string();
    let seconds = bucket_seconds(data.timestamp.as_deref(), observed_at);
    let fingerprint = tap_fingerprint(&actor_id, seconds);

    let event = LikeEvent::new(data.user.display(), actor_id, observed_at);
    (AudienceEvent::Like(event), fingerprint)
}

/// Normalize a share payload (from either the `share` or the `social`
/// signal). Same per-actor-per-second coarsening as likes, so a share
/// reported on both signals still records once.
pub fn normalize_share(data: &SocialData, observed_at: DateTime<Utc>) -> (AudienceEvent, String) {
    let actor_id = data.user.actor_id().to_string();
    let fingerprint = tap_fingerprint(&actor_id, observed_at.timestamp());

    let event = ShareEvent::new(data.user.display(), actor_id, observed_at);
    (AudienceEvent::Share(event), fingerprint)
}

/// Second bucket for a tap event. Upstream timestamps arrive in seconds or
/// milliseconds depending on the signal revision.
fn bucket_seconds(raw: Option<&str>, observed_at: DateTime<Utc>) -> i64 {
    match raw.and_then(|s| s.parse::<i64>().ok()) {
        Some(ts) if ts >= MILLIS_THRESHOLD => ts / 1000,
        Some(ts) if ts > 0 => ts,
        _ => observed_at.timestamp(),
    }
}
