//! Bridge connector.
//!
//! Production [`WebcastConnector`] that consumes an already-decoded event
//! feed from a local webcast bridge process over WebSocket. The bridge owns
//! the undocumented upstream wire protocol and re-emits its named signals as
//! `{"event": "...", "data": {...}}` JSON frames; this connector only maps
//! those frames into [`WebcastEvent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::connector::{WebcastConnection, WebcastConnector};
use crate::error::{Result, WebcastError};
use crate::event::WebcastEvent;

/// Default bridge endpoint.
const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8695/ws";

/// Capacity of the per-connection event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the bridge connector.
#[derive(Debug, Clone)]
pub struct BridgeConnectorConfig {
    /// WebSocket endpoint of the bridge process.
    pub endpoint: String,
    /// Timeout for establishing the WebSocket connection.
    pub connect_timeout: Duration,
    /// How long `receive` waits before reporting "nothing pending".
    pub receive_timeout: Duration,
}

impl Default for BridgeConnectorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(1),
        }
    }
}

/// One frame on the bridge socket.
#[derive(Debug, Deserialize)]
struct BridgeFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Per-connection state held by the connector.
struct BridgeConnectionState {
    event_rx: mpsc::Receiver<WebcastEvent>,
    is_connected: Arc<AtomicBool>,
    read_handle: Option<JoinHandle<()>>,
}

/// Connector backed by a local webcast bridge process.
pub struct BridgeConnector {
    config: BridgeConnectorConfig,
    connections: RwLock<FxHashMap<String, Arc<Mutex<BridgeConnectionState>>>>,
}

impl BridgeConnector {
    /// Create a connector against the default local endpoint.
    pub fn new() -> Self {
        Self::with_config(BridgeConnectorConfig::default())
    }

    /// Create a connector with custom configuration.
    pub fn with_config(config: BridgeConnectorConfig) -> Self {
        Self {
            config,
            connections: RwLock::new(FxHashMap::default()),
        }
    }

    /// Build the per-stream subscription URL.
    fn subscription_url(&self, handle: &str, room_id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| WebcastError::connection(format!("Invalid bridge endpoint: {}", e)))?;
        url.query_pairs_mut().append_pair("unique_id", handle);
        if let Some(room_id) = room_id {
            url.query_pairs_mut().append_pair("room_id", room_id);
        }
        Ok(url)
    }
}

impl Default for BridgeConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebcastConnector for BridgeConnector {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn connect(&self, handle: &str, room_id: Option<&str>) -> Result<WebcastConnection> {
        let url = self.subscription_url(handle, room_id)?;

        let (ws_stream, _) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| WebcastError::connection("Bridge connection timed out"))?
                .map_err(|e| WebcastError::connection(format!("Bridge handshake failed: {}", e)))?;

        info!(handle, ?room_id, "Subscribed to webcast bridge");

        let (mut write, mut read) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let is_connected = Arc::new(AtomicBool::new(true));

        let flag = is_connected.clone();
        let task_handle = handle.to_string();
        let read_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let Some(event) = parse_frame(&text) else {
                            continue;
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = event_tx.send(WebcastEvent::Disconnected { reason }).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(handle = %task_handle, error = %e, "Bridge socket error");
                        let _ = event_tx
                            .send(WebcastEvent::Disconnected {
                                reason: Some(e.to_string()),
                            })
                            .await;
                        break;
                    }
                }
            }
            flag.store(false, Ordering::SeqCst);
            debug!(handle = %task_handle, "Bridge reader stopped");
        });

        let connection_id = format!("webcast-{}-{}", handle, uuid::Uuid::new_v4());
        let state = BridgeConnectionState {
            event_rx,
            is_connected,
            read_handle: Some(read_handle),
        };

        {
            let mut connections = self.connections.write().await;
            connections.insert(connection_id.clone(), Arc::new(Mutex::new(state)));
        }

        let mut connection =
            WebcastConnection::new(connection_id, handle, room_id.map(str::to_string));
        connection.set_connected();
        Ok(connection)
    }

    async fn disconnect(&self, connection: &mut WebcastConnection) -> Result<()> {
        let mut connections = self.connections.write().await;

        if let Some(state) = connections.remove(&connection.id) {
            let mut state = state.lock().await;
            state.is_connected.store(false, Ordering::SeqCst);
            if let Some(handle) = state.read_handle.take() {
                handle.abort();
            }
            info!(handle = %connection.handle, "Disconnected from webcast bridge");
        }

        connection.set_disconnected();
        Ok(())
    }

    async fn receive(&self, connection: &WebcastConnection) -> Result<Option<WebcastEvent>> {
        if !connection.is_connected {
            return Err(WebcastError::connection("Connection is not active"));
        }

        let state = {
            let connections = self.connections.read().await;
            connections.get(&connection.id).cloned().ok_or_else(|| {
                WebcastError::connection(format!("Connection {} not found", connection.id))
            })?
        };

        let mut state = state.lock().await;
        match tokio::time::timeout(self.config.receive_timeout, state.event_rx.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            // Channel closed: the reader is gone and everything buffered has
            // been drained.
            Ok(None) => Ok(Some(WebcastEvent::Disconnected { reason: None })),
            // Timeout, nothing pending.
            Err(_) => Ok(None),
        }
    }
}

/// Parse one bridge frame into a typed event.
fn parse_frame(text: &str) -> Option<WebcastEvent> {
    let frame: BridgeFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "Skipping malformed bridge frame");
            return None;
        }
    };
    WebcastEvent::from_signal(&frame.event, frame.data)
}
