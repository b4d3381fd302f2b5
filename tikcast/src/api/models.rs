//! API response models.

use serde::Serialize;

use crate::store::{CommentEvent, EventSnapshot, GiftEvent, LikeEvent, ShareEvent};

/// Response body for the live snapshot endpoint.
///
/// The four arrays are always present, even on failures, so polling clients
/// never need a shape-dependent branch. `error` appears only for
/// domain-level conditions (streamer offline, upstream unreachable).
#[derive(Debug, Serialize)]
pub struct LiveSnapshotResponse {
    pub gifts: Vec<GiftEvent>,
    pub comments: Vec<CommentEvent>,
    pub likes: Vec<LikeEvent>,
    pub shares: Vec<ShareEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LiveSnapshotResponse {
    /// Response carrying a snapshot and an optional domain error.
    pub fn new(snapshot: EventSnapshot, error: Option<String>) -> Self {
        Self {
            gifts: snapshot.gifts,
            comments: snapshot.comments,
            likes: snapshot.likes,
            shares: snapshot.shares,
            error,
        }
    }

    /// Empty-arrays response carrying only an error message.
    pub fn error_only(message: impl Into<String>) -> Self {
        Self::new(EventSnapshot::default(), Some(message.into()))
    }
}

/// Response body for the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}
