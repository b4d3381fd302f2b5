//! Webcast: client-side event model and connectors for TikTok live streams.
//!
//! The upstream broadcast protocol is consumed as an opaque event source: a
//! connector opens one connection per streamer handle and yields named
//! signals (gift, chat, like, share, social, plus lifecycle signals) as typed
//! events.
//!
//! ## Core Types
//!
//! - [`WebcastEvent`] - Closed union over the consumed protocol signals
//! - [`WebcastConnector`] - Trait for event-stream implementations
//! - [`WebcastConnection`] - Handle for an active connection
//!
//! ## Connectors
//!
//! - [`BridgeConnector`] - Consumes decoded events from a local webcast
//!   bridge process over WebSocket

pub mod bridge;
pub mod connector;
pub mod error;
pub mod event;

pub use bridge::{BridgeConnector, BridgeConnectorConfig};
pub use connector::{WebcastConnection, WebcastConnector};
pub use error::{Result, WebcastError};
pub use event::{
    ChatData, ConnectedState, GiftData, GiftDetail, LikeData, SOCIAL_SHARE_ACTION, SocialData,
    User, WebcastEvent,
};
