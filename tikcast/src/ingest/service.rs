//! Ingestion service.
//!
//! Owns the per-handle session registry and the live-connection registry,
//! multiplexing any number of polling clients onto at most one upstream
//! connection per handle. There is no retry loop: a terminated connection is
//! simply removed from the registry and the next poll runs a fresh
//! resolve-and-connect cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webcast::{WebcastConnection, WebcastConnector, WebcastEvent};

use crate::error::Result;
use crate::ingest::normalize::{normalize_chat, normalize_gift, normalize_like, normalize_share};
use crate::ingest::session::{ConnectionState, Session};
use crate::resolver::{ResolveError, ResolveRoom};
use crate::store::{EventSnapshot, EventStore};

/// Configuration for the ingestion service.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// How often the cleanup sweeper runs.
    pub sweep_interval: Duration,
    /// Handles idle longer than this are evicted by the sweeper.
    pub stale_after: Duration,
    /// Wait after a fresh connect so the first snapshot can carry events.
    pub connect_grace: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(600),
            stale_after: Duration::from_secs(600),
            connect_grace: Duration::from_secs(1),
        }
    }
}

/// Result of one poll: the buffered snapshot plus an optional domain error.
#[derive(Debug)]
pub struct PollOutcome {
    pub snapshot: EventSnapshot,
    pub error: Option<String>,
}

/// Registry entry for an active upstream connection.
struct LiveConnection {
    cancel: CancellationToken,
}

/// The ingestion service.
pub struct IngestService {
    connector: Arc<dyn WebcastConnector>,
    resolver: Arc<dyn ResolveRoom>,
    store: Arc<EventStore>,
    /// One session per handle, created lazily on first poll. The per-session
    /// mutex serializes resolve/connect so concurrent polls for one handle
    /// cannot open two upstream connections.
    sessions: Arc<DashMap<String, Arc<Mutex<Session>>>>,
    /// Live-connection registry; presence of a key is the single-connection
    /// invariant.
    live: Arc<DashMap<String, LiveConnection>>,
    connections_opened: AtomicU64,
    cancel_token: CancellationToken,
    config: IngestConfig,
}

impl IngestService {
    /// Create a service with the default configuration.
    pub fn new(
        connector: Arc<dyn WebcastConnector>,
        resolver: Arc<dyn ResolveRoom>,
        store: Arc<EventStore>,
    ) -> Self {
        Self::with_config(connector, resolver, store, IngestConfig::default())
    }

    /// Create a service with custom configuration.
    pub fn with_config(
        connector: Arc<dyn WebcastConnector>,
        resolver: Arc<dyn ResolveRoom>,
        store: Arc<EventStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            connector,
            resolver,
            store,
            sessions: Arc::new(DashMap::new()),
            live: Arc::new(DashMap::new()),
            connections_opened: AtomicU64::new(0),
            cancel_token: CancellationToken::new(),
            config,
        }
    }

    /// The shared event store.
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Total upstream connections opened since start.
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Whether a live connection currently exists for a handle.
    pub fn is_connected(&self, handle: &str) -> bool {
        self.live.contains_key(handle)
    }

    /// Serve one poll for a handle.
    ///
    /// Ensures a session exists, resolves the live room when unknown,
    /// connects when no live connection exists, and returns the current
    /// snapshot. Domain failures (not live, fetch failed, connect failed)
    /// come back as the outcome's `error` string, never as an `Err`.
    pub async fn poll(&self, handle: &str) -> Result<PollOutcome> {
        let session = self
            .sessions
            .entry(handle.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(handle))))
            .clone();

        self.store.touch(handle);

        let mut domain_error = None;
        {
            let mut session = session.lock().await;
            if !self.live.contains_key(handle) {
                if session.room_id.is_none() {
                    match self.resolver.resolve(handle).await {
                        Ok(room_id) => {
                            debug!(handle, %room_id, "Cached resolved room id");
                            session.room_id = Some(room_id);
                        }
                        Err(ResolveError::NotLive) => {
                            session.state = ConnectionState::Idle;
                            domain_error = Some(format!(
                                "No live stream found. Make sure @{} is currently live.",
                                handle
                            ));
                        }
                        Err(e) => {
                            warn!(handle, error = %e, "Room resolution failed");
                            session.state = ConnectionState::Error;
                            domain_error =
                                Some("Failed to fetch the streamer profile page.".to_string());
                        }
                    }
                }

                if domain_error.is_none() {
                    session.state = ConnectionState::Connecting;
                    let room_id = session.room_id.clone();
                    match self.ensure_connected(handle, room_id.as_deref()).await {
                        Ok(freshly_connected) => {
                            session.state = ConnectionState::Connected;
                            if freshly_connected && !self.config.connect_grace.is_zero() {
                                // Give the new connection a moment to deliver
                                // its first events before the first snapshot.
                                tokio::time::sleep(self.config.connect_grace).await;
                            }
                        }
                        Err(e) => {
                            warn!(handle, error = %e, "Upstream connection failed");
                            session.state = ConnectionState::Error;
                            session.room_id = None;
                            domain_error = Some(format!("Live connection failed: {}", e));
                        }
                    }
                }
            }
        }

        Ok(PollOutcome {
            snapshot: self.store.snapshot(handle),
            error: domain_error,
        })
    }

    /// Ensure a live connection exists for a handle.
    ///
    /// No-op (returns false) when one already does. Otherwise any stale
    /// registry entry is torn down first, a connection is opened with the
    /// pre-resolved room id, and the ingestion loop is spawned. Returns true
    /// when a fresh connection was opened.
    pub async fn ensure_connected(&self, handle: &str, room_id: Option<&str>) -> Result<bool> {
        if self.live.contains_key(handle) {
            return Ok(false);
        }

        // Defensive teardown: the registry must never hold two entries for
        // one handle.
        if let Some((_, previous)) = self.live.remove(handle) {
            previous.cancel.cancel();
        }

        let connection = self.connector.connect(handle, room_id).await?;
        self.connections_opened.fetch_add(1, Ordering::Relaxed);

        let cancel = self.cancel_token.child_token();
        self.live.insert(
            handle.to_string(),
            LiveConnection {
                cancel: cancel.clone(),
            },
        );

        info!(
            handle,
            ?room_id,
            connector = self.connector.name(),
            "Live connection established"
        );

        tokio::spawn(run_ingest(
            handle.to_string(),
            connection,
            self.connector.clone(),
            self.store.clone(),
            self.sessions.clone(),
            self.live.clone(),
            cancel,
        ));

        Ok(true)
    }

    /// Spawn the cleanup sweeper.
    pub fn start(self: Arc<Self>) {
        let cancel = self.cancel_token.clone();
        let service = self;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it.
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Cleanup sweeper shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let evicted = service.sweep_once();
                        if evicted > 0 {
                            info!(evicted, "Swept stale streamer state");
                        }
                    }
                }
            }
        });
    }

    /// Evict every handle whose activity timestamp is older than the
    /// staleness threshold. Returns the number of evicted handles.
    pub fn sweep_once(&self) -> usize {
        let stale = self.store.stale_handles(self.config.stale_after);
        for handle in &stale {
            if let Some((_, connection)) = self.live.remove(handle) {
                connection.cancel.cancel();
            }
            self.sessions.remove(handle);
            self.store.remove(handle);
            info!(%handle, "Evicted stale streamer state");
        }
        stale.len()
    }

    /// Shut down: cancels the sweeper and every ingestion loop.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.live.clear();
        info!("Ingestion service stopped");
    }
}

/// Outcome of dispatching one event.
enum Flow {
    Continue,
    Terminal(ConnectionState),
}

/// Run the ingestion loop for one connection until a terminal signal,
/// a transport error, or cancellation.
async fn run_ingest(
    handle: String,
    mut connection: WebcastConnection,
    connector: Arc<dyn WebcastConnector>,
    store: Arc<EventStore>,
    sessions: Arc<DashMap<String, Arc<Mutex<Session>>>>,
    live: Arc<DashMap<String, LiveConnection>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let _ = connector.disconnect(&mut connection).await;
                break;
            }

            result = connector.receive(&connection) => {
                match result {
                    Ok(Some(event)) => {
                        match dispatch_event(&handle, event, &store, &sessions).await {
                            Flow::Continue => {}
                            Flow::Terminal(state) => {
                                finish_connection(&handle, state, &sessions, &live).await;
                                let _ = connector.disconnect(&mut connection).await;
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        // Nothing pending, back off briefly.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Err(e) => {
                        warn!(%handle, error = %e, "Ingestion receive failed");
                        finish_connection(&handle, ConnectionState::Error, &sessions, &live).await;
                        let _ = connector.disconnect(&mut connection).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Dispatch one protocol event into the store.
async fn dispatch_event(
    handle: &str,
    event: WebcastEvent,
    store: &EventStore,
    sessions: &DashMap<String, Arc<Mutex<Session>>>,
) -> Flow {
    let observed_at = Utc::now();
    match event {
        WebcastEvent::Gift(data) => {
            let (event, fingerprint) = normalize_gift(&data, observed_at);
            if store.record(handle, event, &fingerprint) {
                debug!(
                    handle,
                    user = data.user.display(),
                    gift = data.display_name(),
                    count = data.repeat_total(),
                    "Gift received"
                );
                mark_event(handle, sessions).await;
            }
            Flow::Continue
        }
        WebcastEvent::Chat(data) => {
            let (event, fingerprint) = normalize_chat(&data, observed_at);
            if store.record(handle, event, &fingerprint) {
                debug!(handle, user = data.user.display(), "Comment received");
                mark_event(handle, sessions).await;
            }
            Flow::Continue
        }
        WebcastEvent::Like(data) => {
            let (event, fingerprint) = normalize_like(&data, observed_at);
            if store.record(handle, event, &fingerprint) {
                debug!(handle, user = data.user.display(), "Like received");
                mark_event(handle, sessions).await;
            }
            Flow::Continue
        }
        WebcastEvent::Share(data) => {
            record_share(handle, &data, store, sessions).await;
            Flow::Continue
        }
        WebcastEvent::Social(data) => {
            // The social signal multiplexes interactions; only the share
            // action is consumed.
            if data.is_share() {
                record_share(handle, &data, store, sessions).await;
            }
            Flow::Continue
        }
        WebcastEvent::Connected(state) => {
            info!(handle, room_id = ?state.room_id, "Upstream connected");
            if let Some(session) = session_for(handle, sessions) {
                let mut session = session.lock().await;
                session.state = ConnectionState::Connected;
                if session.room_id.is_none() {
                    session.room_id = state.room_id;
                }
            }
            Flow::Continue
        }
        WebcastEvent::Disconnected { reason } => {
            info!(handle, ?reason, "Upstream disconnected");
            Flow::Terminal(ConnectionState::Disconnected)
        }
        WebcastEvent::StreamEnd => {
            info!(handle, "Stream ended");
            Flow::Terminal(ConnectionState::Disconnected)
        }
        WebcastEvent::Error { message } => {
            error!(handle, %message, "Upstream reported error");
            Flow::Terminal(ConnectionState::Error)
        }
    }
}

async fn record_share(
    handle: &str,
    data: &webcast::SocialData,
    store: &EventStore,
    sessions: &DashMap<String, Arc<Mutex<Session>>>,
) {
    let (event, fingerprint) = normalize_share(data, Utc::now());
    if store.record(handle, event, &fingerprint) {
        debug!(handle, user = data.user.display(), "Share received");
        mark_event(handle, sessions).await;
    }
}

/// Terminal cleanup: drop the registry entry and reset the session so the
/// next poll re-resolves and reconnects.
async fn finish_connection(
    handle: &str,
    state: ConnectionState,
    sessions: &DashMap<String, Arc<Mutex<Session>>>,
    live: &DashMap<String, LiveConnection>,
) {
    live.remove(handle);
    if let Some(session) = session_for(handle, sessions) {
        let mut session = session.lock().await;
        session.state = state;
        // The room id is transient; a future broadcast gets a fresh one.
        session.room_id = None;
    }
}

/// Refresh the session's last-event timestamp.
async fn mark_event(handle: &str, sessions: &DashMap<String, Arc<Mutex<Session>>>) {
    if let Some(session) = session_for(handle, sessions) {
        session.lock().await.last_event_at = Utc::now();
    }
}

/// Clone the session arc out of the registry without holding the map guard
/// across an await.
fn session_for(
    handle: &str,
    sessions: &DashMap<String, Arc<Mutex<Session>>>,
) -> Option<Arc<Mutex<Session>>> {
    sessions.get(handle).map(|entry| entry.value().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use webcast::{Result as WebcastResult, WebcastError};

    /// Connector that replays a scripted event sequence.
    struct MockConnector {
        connects: AtomicU64,
        fail_connect: bool,
        script: parking_lot::Mutex<VecDeque<WebcastEvent>>,
    }

    impl MockConnector {
        fn new(events: Vec<WebcastEvent>) -> Self {
            Self {
                connects: AtomicU64::new(0),
                fail_connect: false,
                script: parking_lot::Mutex::new(events.into()),
            }
        }

        fn failing() -> Self {
            Self {
                connects: AtomicU64::new(0),
                fail_connect: true,
                script: parking_lot::Mutex::new(VecDeque::new()),
            }
        }

        fn connects(&self) -> u64 {
            self.connects.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl WebcastConnector for MockConnector {
        fn name(&self) -> &str {
            "mock"
        }

        async fn connect(
            &self,
            handle: &str,
            room_id: Option<&str>,
        ) -> WebcastResult<WebcastConnection> {
            if self.fail_connect {
                return Err(WebcastError::connection("refused"));
            }
            self.connects.fetch_add(1, Ordering::Relaxed);
            let mut connection =
                WebcastConnection::new("mock-conn", handle, room_id.map(str::to_string));
            connection.set_connected();
            Ok(connection)
        }

        async fn disconnect(&self, connection: &mut WebcastConnection) -> WebcastResult<()> {
            connection.set_disconnected();
            Ok(())
        }

        async fn receive(
            &self,
            _connection: &WebcastConnection,
        ) -> WebcastResult<Option<WebcastEvent>> {
            Ok(self.script.lock().pop_front())
        }
    }

    /// Resolver that answers from a fixed table.
    struct MockResolver {
        room_id: Option<String>,
        calls: AtomicU64,
    }

    impl MockResolver {
        fn live(room_id: &str) -> Self {
            Self {
                room_id: Some(room_id.to_string()),
                calls: AtomicU64::new(0),
            }
        }

        fn offline() -> Self {
            Self {
                room_id: None,
                calls: AtomicU64::new(0),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ResolveRoom for MockResolver {
        async fn resolve(&self, _handle: &str) -> std::result::Result<String, ResolveError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.room_id.clone().ok_or(ResolveError::NotLive)
        }
    }

    fn test_config() -> IngestConfig {
        IngestConfig {
            connect_grace: Duration::ZERO,
            ..IngestConfig::default()
        }
    }

    fn service_with(
        connector: Arc<MockConnector>,
        resolver: Arc<MockResolver>,
    ) -> Arc<IngestService> {
        Arc::new(IngestService::with_config(
            connector,
            resolver,
            Arc::new(EventStore::new()),
            test_config(),
        ))
    }

    fn gift_event(gift_id: u64, timestamp: &str) -> WebcastEvent {
        WebcastEvent::from_signal(
            "gift",
            json!({
                "user": { "userId": 7, "nickname": "Sender" },
                "giftId": gift_id,
                "gift": { "name": "Rose" },
                "repeatCount": 1,
                "timestamp": timestamp,
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_connected_is_idempotent() {
        let connector = Arc::new(MockConnector::new(vec![]));
        let service = service_with(connector.clone(), Arc::new(MockResolver::live("1")));

        assert!(service.ensure_connected("streamer", Some("1")).await.unwrap());
        assert!(!service.ensure_connected("streamer", Some("1")).await.unwrap());
        assert!(!service.ensure_connected("streamer", Some("1")).await.unwrap());

        assert_eq!(connector.connects(), 1);
        assert!(service.is_connected("streamer"));
    }

    #[tokio::test]
    async fn test_concurrent_polls_share_one_connection() {
        let connector = Arc::new(MockConnector::new(vec![]));
        let service = service_with(connector.clone(), Arc::new(MockResolver::live("1")));

        let a = service.clone();
        let b = service.clone();
        let (first, second) = tokio::join!(
            tokio::spawn(async move { a.poll("streamer").await }),
            tokio::spawn(async move { b.poll("streamer").await }),
        );
        assert!(first.unwrap().unwrap().error.is_none());
        assert!(second.unwrap().unwrap().error.is_none());

        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_repeated_gift_payload_records_once() {
        let events = vec![
            gift_event(5655, "1700000000123"),
            gift_event(5655, "1700000000123"),
            gift_event(5655, "1700000000123"),
        ];
        let connector = Arc::new(MockConnector::new(events));
        let service = service_with(connector, Arc::new(MockResolver::live("1")));

        service.poll("streamer").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = service.store().snapshot("streamer");
        assert_eq!(snapshot.gifts.len(), 1);
        assert_eq!(snapshot.gifts[0].gift, "Rose");
    }

    #[tokio::test]
    async fn test_distinct_gifts_all_recorded() {
        let events = vec![
            gift_event(1, "1700000000100"),
            gift_event(2, "1700000000200"),
            gift_event(3, "1700000000300"),
        ];
        let connector = Arc::new(MockConnector::new(events));
        let service = service_with(connector, Arc::new(MockResolver::live("1")));

        service.poll("streamer").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(service.store().snapshot("streamer").gifts.len(), 3);
    }

    #[tokio::test]
    async fn test_social_share_action_records_share() {
        let share = WebcastEvent::from_signal(
            "social",
            json!({ "user": { "userId": 9, "nickname": "Sharer" }, "action": 3 }),
        )
        .unwrap();
        let follow = WebcastEvent::from_signal(
            "social",
            json!({ "user": { "userId": 10 }, "action": 1 }),
        )
        .unwrap();
        let connector = Arc::new(MockConnector::new(vec![share, follow]));
        let service = service_with(connector, Arc::new(MockResolver::live("1")));

        service.poll("streamer").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = service.store().snapshot("streamer");
        assert_eq!(snapshot.shares.len(), 1);
        assert_eq!(snapshot.shares[0].username, "Sharer");
    }

    #[tokio::test]
    async fn test_not_live_is_a_domain_error() {
        let connector = Arc::new(MockConnector::new(vec![]));
        let service = service_with(connector.clone(), Arc::new(MockResolver::offline()));

        let outcome = service.poll("streamer").await.unwrap();

        assert!(outcome.error.as_deref().unwrap().contains("No live stream"));
        assert_eq!(outcome.snapshot.total(), 0);
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_a_domain_error() {
        let connector = Arc::new(MockConnector::failing());
        let service = service_with(connector, Arc::new(MockResolver::live("1")));

        let outcome = service.poll("streamer").await.unwrap();

        let message = outcome.error.unwrap();
        assert!(message.starts_with("Live connection failed"));
        assert!(!service.is_connected("streamer"));
    }

    #[tokio::test]
    async fn test_stream_end_triggers_reconnect_on_next_poll() {
        let events = vec![
            WebcastEvent::from_signal("connected", json!({ "roomId": "1" })).unwrap(),
            WebcastEvent::StreamEnd,
        ];
        let connector = Arc::new(MockConnector::new(events));
        let resolver = Arc::new(MockResolver::live("1"));
        let service = service_with(connector.clone(), resolver.clone());

        service.poll("streamer").await.unwrap();
        assert_eq!(connector.connects(), 1);

        // Let the loop consume the terminal signal and drop the registry
        // entry.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!service.is_connected("streamer"));

        // The room id was cleared, so the next poll resolves again and opens
        // a fresh connection.
        service.poll("streamer").await.unwrap();
        assert_eq!(connector.connects(), 2);
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_only_stale_handles() {
        let connector = Arc::new(MockConnector::new(vec![]));
        let service = service_with(connector, Arc::new(MockResolver::live("1")));

        service.poll("fresh").await.unwrap();
        service.poll("stale").await.unwrap();
        service
            .store()
            .set_last_activity("stale", Utc::now() - chrono::TimeDelta::minutes(30));

        assert_eq!(service.sweep_once(), 1);

        assert!(!service.is_connected("stale"));
        assert!(service.is_connected("fresh"));
        assert_eq!(service.store().tracked_handles(), 1);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_poll_after_sweep_starts_clean() {
        let connector = Arc::new(MockConnector::new(vec![gift_event(1, "100")]));
        let service = service_with(connector.clone(), Arc::new(MockResolver::live("1")));

        service.poll("streamer").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(service.store().snapshot("streamer").gifts.len(), 1);

        service
            .store()
            .set_last_activity("streamer", Utc::now() - chrono::TimeDelta::minutes(30));
        service.sweep_once();

        let outcome = service.poll("streamer").await.unwrap();
        assert_eq!(outcome.snapshot.total(), 0);
        assert_eq!(connector.connects(), 2);
    }
}
