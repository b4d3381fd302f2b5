//! Webcast connector trait and connection types.
//!
//! Defines the interface the ingestion engine consumes. The wire protocol
//! behind a connector is deliberately opaque: implementations only need to
//! open a connection for a handle and yield [`WebcastEvent`]s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::event::WebcastEvent;

/// Connection handle for an active webcast event stream.
#[derive(Debug)]
pub struct WebcastConnection {
    /// Unique connection ID
    pub id: String,
    /// Streamer handle the connection belongs to
    pub handle: String,
    /// Live-room identifier, when known up front
    pub room_id: Option<String>,
    /// Whether the connection is active
    pub is_connected: bool,
    /// Connection start time
    pub connected_at: DateTime<Utc>,
}

impl WebcastConnection {
    /// Create a new connection handle.
    pub fn new(
        id: impl Into<String>,
        handle: impl Into<String>,
        room_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            room_id,
            is_connected: false,
            connected_at: Utc::now(),
        }
    }

    /// Mark the connection as connected.
    pub fn set_connected(&mut self) {
        self.is_connected = true;
        self.connected_at = Utc::now();
    }

    /// Mark the connection as disconnected.
    pub fn set_disconnected(&mut self) {
        self.is_connected = false;
    }
}

/// Trait for webcast event-stream connectors.
#[async_trait]
pub trait WebcastConnector: Send + Sync {
    /// Human-readable connector name, for logs.
    fn name(&self) -> &str;

    /// Open a live connection for a streamer handle.
    ///
    /// A pre-resolved `room_id` should be passed when available so the
    /// event source does not have to repeat room discovery.
    async fn connect(&self, handle: &str, room_id: Option<&str>) -> Result<WebcastConnection>;

    /// Close the connection and release its resources.
    async fn disconnect(&self, connection: &mut WebcastConnection) -> Result<()>;

    /// Receive the next event.
    /// Returns None when nothing is currently pending.
    async fn receive(&self, connection: &WebcastConnection) -> Result<Option<WebcastEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webcast_connection() {
        let mut conn = WebcastConnection::new("conn1", "streamer", Some("12345".to_string()));

        assert!(!conn.is_connected);
        assert_eq!(conn.handle, "streamer");
        assert_eq!(conn.room_id.as_deref(), Some("12345"));

        conn.set_connected();
        assert!(conn.is_connected);

        conn.set_disconnected();
        assert!(!conn.is_connected);
    }
}
