//! Live-room resolution.
//!
//! A handle is resolved to its transient live-room id by fetching the
//! streamer's public profile page and scraping the id out of the markup.
//! The page format is not a contract, so extraction is layered: direct
//! key/value patterns first, then the hydration-data script block, and
//! finally a live-marker scan that only sharpens the not-live diagnosis.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Base URL for streamer profile pages.
const PROFILE_URL_BASE: &str = "https://www.tiktok.com/@";

/// Browser user-agent sent with profile fetches; the page serves a reduced
/// shell to unknown clients.
const PROFILE_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Default timeout for a profile fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Direct key/value shapes the room id has been observed under.
static ROOM_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""roomId"\s*:\s*"([^"]+)""#,
        r#""liveRoomId"\s*:\s*"([^"]+)""#,
        r#""room_id"\s*:\s*"([^"]+)""#,
        r#"room_id['"]:\s*['"]([^'"]+)['"]"#,
        r#"roomId['"]:\s*['"]([^'"]+)['"]"#,
        r#"liveRoomId['"]:\s*['"]([^'"]+)['"]"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Shapes of the hydration-data script block.
static SCRIPT_DATA_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?s)window\.__UNIVERSAL_DATA_FOR_REHYDRATION__\s*=\s*(\{.+?\});",
        r"(?s)<script[^>]*>window\.__UNIVERSAL_DATA_FOR_REHYDRATION__\s*=\s*(\{.+?\})</script>",
        r"(?s)window\.__UNIVERSAL_DATA_FOR_REHYDRATION__\s*=\s*(\{[^;]+\});",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Nested paths the room id has been observed under inside the hydration
/// data.
const SCRIPT_DATA_PATHS: &[&[&str]] = &[
    &["defaultScope", "webapp", "user", "liveRoom", "roomId"],
    &["defaultScope", "webapp", "user", "roomId"],
    &["webapp", "user", "liveRoom", "roomId"],
    &["defaultScope", "liveRoom", "roomId"],
];

/// Markers that indicate the profile belongs to a currently-live streamer.
static LIVE_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""isLive"\s*:\s*true"#,
        r#""liveStatus"\s*:\s*1"#,
        r#""status"\s*:\s*2"#,
        r"(?i)\bLIVE\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Errors from room resolution.
///
/// `NotLive` is a domain condition, not a fault: the polling client is
/// expected to retry on its own cadence.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No room id and the streamer does not appear to be broadcasting.
    #[error("streamer is not currently live")]
    NotLive,
    /// The profile fetch itself failed (network, DNS, timeout).
    #[error("profile fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    /// The profile page answered with a non-success status.
    #[error("profile fetch returned HTTP {0}")]
    Status(u16),
}

/// Resolves streamer handles to live-room ids.
pub struct RoomResolver {
    client: Client,
}

impl RoomResolver {
    /// Create a resolver with its own HTTP client and the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a resolver with a custom fetch timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client)
    }

    /// Create a resolver around an existing HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Resolve a handle to its current live-room id.
    pub async fn resolve(&self, handle: &str) -> Result<String, ResolveError> {
        let url = format!("{}{}", PROFILE_URL_BASE, handle);
        debug!(handle, %url, "Fetching profile page");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, PROFILE_UA)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(handle, status = status.as_u16(), "Profile fetch rejected");
            return Err(ResolveError::Status(status.as_u16()));
        }

        let html = response.text().await?;
        match extract_room_id(&html) {
            Some(room_id) => {
                debug!(handle, %room_id, "Resolved live room");
                Ok(room_id)
            }
            None => {
                if has_live_markers(&html) {
                    // Live markers without a room id: the page layout likely
                    // shifted under the extraction patterns.
                    warn!(handle, "Live markers present but no room id found");
                } else {
                    debug!(handle, "No live markers found");
                }
                Err(ResolveError::NotLive)
            }
        }
    }
}

impl Default for RoomResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Room resolution as a seam, so the ingestion service can be exercised
/// without touching the network.
#[async_trait]
pub trait ResolveRoom: Send + Sync {
    /// Resolve a handle to its current live-room id.
    async fn resolve(&self, handle: &str) -> Result<String, ResolveError>;
}

#[async_trait]
impl ResolveRoom for RoomResolver {
    async fn resolve(&self, handle: &str) -> Result<String, ResolveError> {
        RoomResolver::resolve(self, handle).await
    }
}

/// Extract a live-room id from profile markup, trying the direct patterns
/// first and the hydration-data block second.
pub fn extract_room_id(html: &str) -> Option<String> {
    for pattern in ROOM_ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(html)
            && let Some(id) = captures.get(1).map(|m| m.as_str())
            && is_valid_room_id(id)
        {
            return Some(id.to_string());
        }
    }

    extract_from_script_data(html)
}

/// Parse the hydration-data script block and walk the known nested paths.
fn extract_from_script_data(html: &str) -> Option<String> {
    for pattern in SCRIPT_DATA_PATTERNS.iter() {
        let Some(captures) = pattern.captures(html) else {
            continue;
        };
        let Some(json) = captures.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let data: Value = match serde_json::from_str(json) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Hydration data block is not valid JSON");
                continue;
            }
        };

        for path in SCRIPT_DATA_PATHS {
            if let Some(id) = lookup_path(&data, path)
                && is_valid_room_id(&id)
            {
                return Some(id);
            }
        }
    }
    None
}

/// Walk a nested path through a JSON value, stringifying a terminal string
/// or number.
fn lookup_path(data: &Value, path: &[&str]) -> Option<String> {
    let mut current = data;
    for key in path {
        current = current.get(key)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_valid_room_id(id: &str) -> bool {
    !id.is_empty() && id != "null" && id != "undefined"
}

/// Whether the markup carries any currently-live indicator.
pub fn has_live_markers(html: &str) -> bool {
    LIVE_MARKERS.iter().any(|pattern| pattern.is_match(html))
}
