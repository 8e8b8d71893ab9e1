//! Data models for Parley
//!
//! Defines messages, the partial updates applied to them, and the
//! conversation summaries shown in a conversation list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Direction of a message relative to the local user
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    /// Activity entries, notes and anything else the server tags differently
    #[default]
    #[serde(other)]
    Other,
}

/// Who can see a message
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Delivery lifecycle of a message
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Correspondence addresses attached to a message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageMeta {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique within its conversation
    pub uuid: Uuid,
    /// Conversation this message belongs to
    pub conversation_uuid: Uuid,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub status: MessageStatus,
    /// Message body, absent for attachment-only or activity messages
    #[serde(default)]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: MessageMeta,
}

impl Message {
    /// Create an outgoing message in the given conversation, timestamped now
    pub fn new(conversation_uuid: Uuid, content: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            conversation_uuid,
            direction: Direction::Outgoing,
            visibility: Visibility::Public,
            status: MessageStatus::Pending,
            content: Some(content.into()),
            created_at: Utc::now(),
            meta: MessageMeta::default(),
        }
    }

    /// Whether only agents can see this message
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// One-line preview of the content for conversation lists
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.content.as_deref().unwrap_or_default();
        let line = text.lines().next().unwrap_or_default();
        if line.chars().count() > max_chars {
            let truncated: String = line.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", truncated)
        } else {
            line.to_string()
        }
    }
}

/// A partial update to a message
///
/// Every field is optional; only present fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MessageMeta>,
}

/// Errors building a patch from a single named field
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("Unknown message field '{0}'")]
    UnknownField(String),

    #[error("Invalid value for message field '{field}': {source}")]
    InvalidValue {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MessagePatch {
    /// Fields a patch can touch
    pub const FIELDS: &'static [&'static str] = &["status", "content", "visibility", "meta"];

    /// Patch that only changes the status
    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Build a patch that sets one field from a JSON value
    pub fn field(name: &str, value: Value) -> Result<Self, PatchError> {
        if !Self::FIELDS.contains(&name) {
            return Err(PatchError::UnknownField(name.to_string()));
        }

        let mut object = serde_json::Map::new();
        object.insert(name.to_string(), value);
        serde_json::from_value(Value::Object(object)).map_err(|source| PatchError::InvalidValue {
            field: name.to_string(),
            source,
        })
    }

    /// True if the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.content.is_none()
            && self.visibility.is_none()
            && self.meta.is_none()
    }

    /// Merge the patch into a message
    pub fn apply(&self, message: &mut Message) {
        if let Some(status) = self.status {
            message.status = status;
        }
        if let Some(ref content) = self.content {
            message.content = Some(content.clone());
        }
        if let Some(visibility) = self.visibility {
            message.visibility = visibility;
        }
        if let Some(ref meta) = self.meta {
            message.meta = meta.clone();
        }
    }
}

/// One page of messages as returned by the paged fetch endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: u32,
    pub total_pages: u32,
}

/// A conversation participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Workflow status of a conversation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Resolved,
    Snoozed,
}

/// Conversation priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Conversation list entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub uuid: Uuid,
    /// Preview of the newest message
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ConversationSummary {
    /// Create an empty, open conversation summary
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            last_message: None,
            last_message_at: None,
            unread_count: 0,
            status: ConversationStatus::Open,
            priority: None,
            labels: Vec::new(),
        }
    }
}

/// A partial update to a conversation
///
/// `priority` is doubly optional so a patch can clear it: `Some(None)`
/// removes the priority, `None` leaves it alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Option<Priority>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl ConversationPatch {
    pub fn status(status: ConversationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn priority(priority: Option<Priority>) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn labels(labels: Vec<String>) -> Self {
        Self {
            labels: Some(labels),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.labels.is_none()
    }

    /// Apply the patch and return its inverse
    ///
    /// The inverse touches exactly the fields this patch touched, holding
    /// their previous values, so applying it undoes this patch.
    pub fn apply(&self, summary: &mut ConversationSummary) -> ConversationPatch {
        let mut previous = ConversationPatch::default();

        if let Some(status) = self.status {
            previous.status = Some(summary.status);
            summary.status = status;
        }
        if let Some(priority) = self.priority {
            previous.priority = Some(summary.priority);
            summary.priority = priority;
        }
        if let Some(ref labels) = self.labels {
            previous.labels = Some(std::mem::replace(&mut summary.labels, labels.clone()));
        }

        previous
    }
}

/// Distinguish an explicit `null` from an absent field
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_deserialize_defaults() {
        let conv = Uuid::new_v4();
        let id = Uuid::new_v4();
        let msg: Message = serde_json::from_value(json!({
            "uuid": id,
            "conversation_uuid": conv,
            "created_at": "2024-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(msg.uuid, id);
        assert_eq!(msg.direction, Direction::Other);
        assert_eq!(msg.visibility, Visibility::Public);
        assert_eq!(msg.status, MessageStatus::Sent);
        assert!(msg.meta.to.is_empty());
    }

    #[test]
    fn test_unknown_direction_is_other() {
        let dir: Direction = serde_json::from_value(json!("activity")).unwrap();
        assert_eq!(dir, Direction::Other);

        let dir: Direction = serde_json::from_value(json!("incoming")).unwrap();
        assert_eq!(dir, Direction::Incoming);
    }

    #[test]
    fn test_message_preview() {
        let mut msg = Message::new(Uuid::new_v4(), "Hello there\nsecond line");
        assert_eq!(msg.preview(40), "Hello there");
        assert_eq!(msg.preview(8), "Hello...");

        msg.content = None;
        assert_eq!(msg.preview(40), "");
    }

    #[test]
    fn test_patch_field() {
        let patch = MessagePatch::field("status", json!("read")).unwrap();
        assert_eq!(patch.status, Some(MessageStatus::Read));
        assert!(patch.content.is_none());

        let err = MessagePatch::field("uuid", json!("x")).unwrap_err();
        assert!(matches!(err, PatchError::UnknownField(_)));

        let err = MessagePatch::field("status", json!(42)).unwrap_err();
        assert!(matches!(err, PatchError::InvalidValue { .. }));
    }

    #[test]
    fn test_patch_apply() {
        let mut msg = Message::new(Uuid::new_v4(), "draft");
        let patch = MessagePatch {
            status: Some(MessageStatus::Delivered),
            content: Some("final".to_string()),
            ..Default::default()
        };
        patch.apply(&mut msg);

        assert_eq!(msg.status, MessageStatus::Delivered);
        assert_eq!(msg.content.as_deref(), Some("final"));
        assert_eq!(msg.visibility, Visibility::Public);
        assert!(MessagePatch::default().is_empty());
    }

    #[test]
    fn test_conversation_patch_inverse() {
        let mut summary = ConversationSummary::new(Uuid::new_v4());
        summary.labels = vec!["billing".to_string()];

        let patch = ConversationPatch {
            priority: Some(Some(Priority::High)),
            labels: Some(vec!["vip".to_string()]),
            ..Default::default()
        };
        let inverse = patch.apply(&mut summary);

        assert_eq!(summary.priority, Some(Priority::High));
        assert_eq!(summary.labels, vec!["vip"]);
        assert!(inverse.status.is_none());

        inverse.apply(&mut summary);
        assert_eq!(summary.priority, None);
        assert_eq!(summary.labels, vec!["billing"]);
        assert_eq!(summary.status, ConversationStatus::Open);
    }

    #[test]
    fn test_conversation_patch_null_priority() {
        let patch: ConversationPatch = serde_json::from_value(json!({ "priority": null })).unwrap();
        assert_eq!(patch.priority, Some(None));

        let patch: ConversationPatch = serde_json::from_value(json!({ "status": "resolved" })).unwrap();
        assert_eq!(patch.priority, None);
        assert_eq!(patch.status, Some(ConversationStatus::Resolved));
    }
}
