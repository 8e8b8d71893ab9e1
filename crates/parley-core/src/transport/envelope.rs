//! Socket envelope framing
//!
//! Every frame on the socket is a JSON text envelope `{ "type", "data" }`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Outbound action: subscribe to a conversation list
pub const SUBSCRIBE: &str = "subscribe";
/// Outbound action: tell the server which conversation is open
pub const SET_CURRENT_CONVERSATION: &str = "set_current_conversation";
/// Outbound action: no conversation is open
pub const UNSET_CURRENT_CONVERSATION: &str = "unset_current_conversation";

/// A typed JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Actions the client sends to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Receive pushes for a conversation list (e.g. "inbox", "mentions")
    Subscribe { list: String },
    SetCurrentConversation { uuid: Uuid },
    UnsetCurrentConversation,
}

impl OutboundAction {
    pub fn to_envelope(&self) -> Envelope {
        match self {
            OutboundAction::Subscribe { list } => Envelope::new(SUBSCRIBE, json!({ "list": list })),
            OutboundAction::SetCurrentConversation { uuid } => {
                Envelope::new(SET_CURRENT_CONVERSATION, json!({ "uuid": uuid }))
            }
            OutboundAction::UnsetCurrentConversation => {
                Envelope::new(UNSET_CURRENT_CONVERSATION, json!({}))
            }
        }
    }
}
