//! Typed events emitted by a webcast connection.
//!
//! The upstream protocol surfaces everything as named signals with loosely
//! shaped JSON payloads. This module pins the signals the engine consumes to
//! a closed enum, with serde payload types that tolerate the upstream's habit
//! of sending ids and timestamps as either strings or numbers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Action code carried by a `social` signal when the interaction is a share.
pub const SOCIAL_SHARE_ACTION: u64 = 3;

/// Deserialize a field that may arrive as a JSON string or number.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Deserialize a numeric code that may arrive as a JSON number or string.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}

/// Identity of the viewer that triggered an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    /// Stable numeric id, stringified.
    #[serde(deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    /// The public @handle of the viewer.
    #[serde(deserialize_with = "lenient_string")]
    pub unique_id: Option<String>,
    /// Display name as shown in the live chat.
    pub nickname: Option<String>,
    /// Alternate display-name field seen on some payloads.
    pub display_name: Option<String>,
}

impl User {
    /// Human-readable identity, falling back through the known name fields.
    pub fn display(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.display_name.as_deref().filter(|s| !s.is_empty()))
            .or(self.unique_id.as_deref().filter(|s| !s.is_empty()))
            .or(self.user_id.as_deref())
            .unwrap_or("unknown")
    }

    /// Stable identity used for fingerprinting, preferring the numeric id.
    pub fn actor_id(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.unique_id.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("unknown")
    }
}

/// Nested gift descriptor on gift payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GiftDetail {
    pub name: Option<String>,
}

/// Payload of a `gift` signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GiftData {
    pub user: User,
    #[serde(deserialize_with = "lenient_string")]
    pub gift_id: Option<String>,
    /// Generic id field some payload revisions use instead of `giftId`.
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    pub gift: Option<GiftDetail>,
    pub gift_name: Option<String>,
    pub repeat_count: Option<u32>,
    pub repeat_end: Option<u32>,
    pub count: Option<u32>,
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

impl GiftData {
    /// Gift name, falling back through the known fields.
    pub fn display_name(&self) -> &str {
        self.gift
            .as_ref()
            .and_then(|g| g.name.as_deref())
            .or(self.gift_name.as_deref())
            .unwrap_or("Gift")
    }

    /// Repeat count of the gift streak, defaulting to one.
    pub fn repeat_total(&self) -> u32 {
        self.repeat_count
            .or(self.repeat_end)
            .or(self.count)
            .unwrap_or(1)
    }

    /// Upstream gift identifier used for fingerprinting.
    pub fn gift_key(&self) -> &str {
        self.gift_id
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("unknown")
    }
}

/// Payload of a `chat` signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatData {
    pub user: User,
    pub text: Option<String>,
    /// Alternate content field seen on some payloads.
    pub comment: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub msg_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

impl ChatData {
    /// Message text, trimmed.
    pub fn content(&self) -> &str {
        self.text
            .as_deref()
            .or(self.comment.as_deref())
            .unwrap_or("")
            .trim()
    }

    /// Upstream message id, if the payload carried one.
    pub fn message_id(&self) -> Option<&str> {
        self.msg_id.as_deref().or(self.id.as_deref())
    }
}

/// Payload of a `like` signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LikeData {
    pub user: User,
    pub like_count: Option<u32>,
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

/// Payload of a `share` or `social` signal.
///
/// The `social` signal is a grab bag of interactions; a share is flagged by
/// an action code of [`SOCIAL_SHARE_ACTION`] in either `action` or `type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialData {
    pub user: User,
    #[serde(deserialize_with = "lenient_u64")]
    pub action: Option<u64>,
    #[serde(rename = "type", deserialize_with = "lenient_u64")]
    pub kind: Option<u64>,
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

impl SocialData {
    /// Whether this social interaction encodes a share.
    pub fn is_share(&self) -> bool {
        self.action == Some(SOCIAL_SHARE_ACTION) || self.kind == Some(SOCIAL_SHARE_ACTION)
    }
}

/// State payload of a `connected` signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectedState {
    #[serde(deserialize_with = "lenient_string")]
    pub room_id: Option<String>,
}

/// A single event on a webcast connection.
///
/// Closed union over the named signals the engine consumes. Unknown signals
/// are dropped at the parsing boundary rather than surfaced as a catch-all.
#[derive(Debug, Clone, PartialEq)]
pub enum WebcastEvent {
    /// A gift was sent.
    Gift(GiftData),
    /// A chat message was posted.
    Chat(ChatData),
    /// The stream was liked.
    Like(LikeData),
    /// The stream was shared.
    Share(SocialData),
    /// Generic social interaction; may encode a share via its action code.
    Social(SocialData),
    /// The upstream acknowledged the connection.
    Connected(ConnectedState),
    /// The connection was closed.
    Disconnected { reason: Option<String> },
    /// The broadcast itself ended.
    StreamEnd,
    /// The upstream reported an error.
    Error { message: String },
}

impl WebcastEvent {
    /// Map a named protocol signal and its JSON payload to a typed event.
    ///
    /// Returns `None` for signals the engine does not consume. Payloads that
    /// fail to decode degrade to their default shape instead of erroring;
    /// the dedup layer treats missing identity fields as `"unknown"`.
    pub fn from_signal(name: &str, payload: Value) -> Option<Self> {
        match name {
            "gift" => Some(Self::Gift(from_value_lossy(payload))),
            "chat" => Some(Self::Chat(from_value_lossy(payload))),
            "like" => Some(Self::Like(from_value_lossy(payload))),
            "share" => Some(Self::Share(from_value_lossy(payload))),
            "social" => Some(Self::Social(from_value_lossy(payload))),
            "connected" => Some(Self::Connected(from_value_lossy(payload))),
            "disconnected" => Some(Self::Disconnected {
                reason: message_field(&payload),
            }),
            "streamEnd" => Some(Self::StreamEnd),
            "error" => Some(Self::Error {
                message: message_field(&payload).unwrap_or_else(|| "upstream error".to_string()),
            }),
            _ => None,
        }
    }

    /// The protocol signal name this event maps back to.
    pub fn signal_name(&self) -> &'static str {
        match self {
            Self::Gift(_) => "gift",
            Self::Chat(_) => "chat",
            Self::Like(_) => "like",
            Self::Share(_) => "share",
            Self::Social(_) => "social",
            Self::Connected(_) => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::StreamEnd => "streamEnd",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event terminates the connection it arrived on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::StreamEnd | Self::Error { .. }
        )
    }
}

fn from_value_lossy<T: Default + serde::de::DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).unwrap_or_default()
}

/// Extract a human-readable message from a lifecycle payload, which may be a
/// bare string or an object with a `message`/`reason` field.
fn message_field(payload: &Value) -> Option<String> {
    match payload {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("reason"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_display_fallback_chain() {
        let user: User = serde_json::from_value(json!({
            "userId": 12345,
            "uniqueId": "cooluser",
        }))
        .unwrap();

        assert_eq!(user.display(), "cooluser");
        assert_eq!(user.actor_id(), "12345");

        let named: User = serde_json::from_value(json!({
            "userId": "99",
            "nickname": "Cool User",
        }))
        .unwrap();
        assert_eq!(named.display(), "Cool User");

        let empty = User::default();
        assert_eq!(empty.display(), "unknown");
        assert_eq!(empty.actor_id(), "unknown");
    }

    #[test]
    fn test_gift_signal_parsing() {
        let event = WebcastEvent::from_signal(
            "gift",
            json!({
                "user": { "userId": 7, "nickname": "Sender" },
                "giftId": 5655,
                "gift": { "name": "Rose" },
                "repeatCount": 3,
                "timestamp": 1700000000123u64,
            }),
        )
        .unwrap();

        let WebcastEvent::Gift(data) = event else {
            panic!("expected gift event");
        };
        assert_eq!(data.user.display(), "Sender");
        assert_eq!(data.gift_key(), "5655");
        assert_eq!(data.display_name(), "Rose");
        assert_eq!(data.repeat_total(), 3);
        assert_eq!(data.timestamp.as_deref(), Some("1700000000123"));
    }

    #[test]
    fn test_gift_name_and_count_fallbacks() {
        let data: GiftData = serde_json::from_value(json!({
            "giftName": "Lion",
            "count": 2,
        }))
        .unwrap();
        assert_eq!(data.display_name(), "Lion");
        assert_eq!(data.repeat_total(), 2);

        let bare = GiftData::default();
        assert_eq!(bare.display_name(), "Gift");
        assert_eq!(bare.repeat_total(), 1);
        assert_eq!(bare.gift_key(), "unknown");
    }

    #[test]
    fn test_chat_content_trimmed() {
        let data: ChatData = serde_json::from_value(json!({
            "user": { "uniqueId": "talker" },
            "comment": "  hello stream  ",
            "msgId": "abc-1",
        }))
        .unwrap();
        assert_eq!(data.content(), "hello stream");
        assert_eq!(data.message_id(), Some("abc-1"));
    }

    #[test]
    fn test_social_share_action_discriminant() {
        let share: SocialData =
            serde_json::from_value(json!({ "action": 3, "user": {} })).unwrap();
        assert!(share.is_share());

        let typed: SocialData = serde_json::from_value(json!({ "type": "3" })).unwrap();
        assert!(typed.is_share());

        let follow: SocialData = serde_json::from_value(json!({ "action": 1 })).unwrap();
        assert!(!follow.is_share());
    }

    #[test]
    fn test_lifecycle_signals() {
        let connected =
            WebcastEvent::from_signal("connected", json!({ "roomId": 42 })).unwrap();
        assert_eq!(
            connected,
            WebcastEvent::Connected(ConnectedState {
                room_id: Some("42".to_string())
            })
        );
        assert!(!connected.is_terminal());

        let ended = WebcastEvent::from_signal("streamEnd", json!({})).unwrap();
        assert!(ended.is_terminal());

        let error = WebcastEvent::from_signal("error", json!("socket reset")).unwrap();
        assert_eq!(
            error,
            WebcastEvent::Error {
                message: "socket reset".to_string()
            }
        );
        assert!(error.is_terminal());
    }

    #[test]
    fn test_unknown_signal_dropped() {
        assert!(WebcastEvent::from_signal("envelope", json!({})).is_none());
        assert!(WebcastEvent::from_signal("member", json!({})).is_none());
    }

    #[test]
    fn test_malformed_payload_degrades_to_default() {
        let event = WebcastEvent::from_signal("gift", json!("not an object")).unwrap();
        let WebcastEvent::Gift(data) = event else {
            panic!("expected gift event");
        };
        assert_eq!(data, GiftData::default());
    }
}
