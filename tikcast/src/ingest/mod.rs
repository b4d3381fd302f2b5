//! Live-broadcast ingestion.
//!
//! One upstream connection per streamer handle, started lazily on the first
//! poll and supervised until a terminal protocol signal. Incoming events are
//! normalized, fingerprinted, and recorded into the shared event store.

pub mod normalize;
pub mod service;
pub mod session;

pub use service::{IngestConfig, IngestService, PollOutcome};
pub use session::{ConnectionState, Session};
