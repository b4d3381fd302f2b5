//! Per-handle session state.

use chrono::{DateTime, Utc};

/// Connection lifecycle states for a streamer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt in flight.
    Idle,
    /// Resolution succeeded, connection being established.
    Connecting,
    /// Upstream acknowledged the connection.
    Connected,
    /// Upstream closed the connection or the stream ended.
    Disconnected,
    /// The connection failed.
    Error,
}

impl ConnectionState {
    /// Lowercase name, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

/// Session for one streamer handle.
///
/// The session is the unit of ownership for one upstream connection and its
/// buffers: exactly one exists per handle, created lazily on the first poll.
/// The resolved room id is cached here and cleared when the connection
/// terminates, so the next poll re-resolves.
#[derive(Debug)]
pub struct Session {
    /// Cleaned streamer handle (no leading `@`).
    pub handle: String,
    /// Live-room id resolved from the profile page, if known.
    pub room_id: Option<String>,
    /// Current connection state.
    pub state: ConnectionState,
    /// When the last event was accepted for this session.
    pub last_event_at: DateTime<Utc>,
}

impl Session {
    /// Create an idle session for a handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            room_id: None,
            state: ConnectionState::Idle,
            last_event_at: Utc::now(),
        }
    }
}
