//! Normalized audience events.
//!
//! These are the shapes handed to polling clients: a display name, a
//! localized clock time, and the kind-specific payload. Identity fields used
//! for deduplication stay internal.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Kinds of audience events tracked per streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Gift,
    Comment,
    Like,
    Share,
}

impl EventKind {
    /// Lowercase name, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gift => "gift",
            Self::Comment => "comment",
            Self::Like => "like",
            Self::Share => "share",
        }
    }
}

/// Wall-clock display time for an event, in the server's local timezone.
pub fn clock_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// A gift sent during the broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct GiftEvent {
    pub username: String,
    pub gift: String,
    pub count: u32,
    pub time: String,
    #[serde(skip)]
    pub actor_id: String,
    #[serde(skip)]
    pub observed_at: DateTime<Utc>,
}

/// A chat message posted during the broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct CommentEvent {
    pub username: String,
    pub comment: String,
    pub time: String,
    #[serde(skip)]
    pub actor_id: String,
    #[serde(skip)]
    pub observed_at: DateTime<Utc>,
}

/// A like on the broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct LikeEvent {
    pub username: String,
    pub time: String,
    #[serde(skip)]
    pub actor_id: String,
    #[serde(skip)]
    pub observed_at: DateTime<Utc>,
}

/// A share of the broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct ShareEvent {
    pub username: String,
    pub time: String,
    #[serde(skip)]
    pub actor_id: String,
    #[serde(skip)]
    pub observed_at: DateTime<Utc>,
}

impl GiftEvent {
    pub fn new(
        username: impl Into<String>,
        gift: impl Into<String>,
        count: u32,
        actor_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            gift: gift.into(),
            count,
            time: clock_time(observed_at),
            actor_id: actor_id.into(),
            observed_at,
        }
    }
}

impl CommentEvent {
    pub fn new(
        username: impl Into<String>,
        comment: impl Into<String>,
        actor_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            comment: comment.into(),
            time: clock_time(observed_at),
            actor_id: actor_id.into(),
            observed_at,
        }
    }
}

impl LikeEvent {
    pub fn new(
        username: impl Into<String>,
        actor_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            time: clock_time(observed_at),
            actor_id: actor_id.into(),
            observed_at,
        }
    }
}

impl ShareEvent {
    pub fn new(
        username: impl Into<String>,
        actor_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            time: clock_time(observed_at),
            actor_id: actor_id.into(),
            observed_at,
        }
    }
}

/// An audience event tagged by kind.
#[derive(Debug, Clone)]
pub enum AudienceEvent {
    Gift(GiftEvent),
    Comment(CommentEvent),
    Like(LikeEvent),
    Share(ShareEvent),
}

impl AudienceEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Gift(_) => EventKind::Gift,
            Self::Comment(_) => EventKind::Comment,
            Self::Like(_) => EventKind::Like,
            Self::Share(_) => EventKind::Share,
        }
    }

    /// Display name of the acting viewer.
    pub fn username(&self) -> &str {
        match self {
            Self::Gift(e) => &e.username,
            Self::Comment(e) => &e.username,
            Self::Like(e) => &e.username,
            Self::Share(e) => &e.username,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_event_serialized_shape() {
        let at = Utc::now();
        let event = GiftEvent::new("Viewer", "Rose", 3, "42", at);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["username"], "Viewer");
        assert_eq!(json["gift"], "Rose");
        assert_eq!(json["count"], 3);
        assert!(json["time"].is_string());
        // Dedup identity stays internal.
        assert!(json.get("actor_id").is_none());
        assert!(json.get("observed_at").is_none());
    }

    #[test]
    fn test_event_kind() {
        let at = Utc::now();
        let like = AudienceEvent::Like(LikeEvent::new("Viewer", "1", at));
        assert_eq!(like.kind(), EventKind::Like);
        assert_eq!(like.kind().as_str(), "like");
        assert_eq!(like.username(), "Viewer");
    }
}
