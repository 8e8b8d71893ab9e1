//! Push event decoding
//!
//! Turns inbound envelopes into typed events. Unknown types are reported
//! separately so callers can drop them quietly.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ConversationPatch, ConversationSummary, Message, MessagePatch};
use crate::transport::Envelope;

pub const MESSAGE_CREATED: &str = "message.created";
pub const MESSAGE_UPDATED: &str = "message.updated";
pub const CONVERSATION_CREATED: &str = "conversation.created";
pub const CONVERSATION_UPDATED: &str = "conversation.updated";

/// A decoded push event
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    MessageCreated(Message),
    MessageUpdated {
        conversation_uuid: Uuid,
        uuid: Uuid,
        changes: MessagePatch,
    },
    ConversationCreated(ConversationSummary),
    ConversationUpdated {
        uuid: Uuid,
        changes: ConversationPatch,
    },
}

#[derive(Error, Debug)]
pub enum PushEventError {
    #[error("Unknown push event type '{0}'")]
    UnknownType(String),

    #[error("Malformed '{kind}' payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct MessageUpdate {
    conversation_uuid: Uuid,
    uuid: Uuid,
    #[serde(default)]
    changes: MessagePatch,
}

#[derive(Deserialize)]
struct ConversationUpdate {
    uuid: Uuid,
    #[serde(default)]
    changes: ConversationPatch,
}

impl PushEvent {
    pub fn from_envelope(envelope: Envelope) -> Result<Self, PushEventError> {
        let Envelope { kind, data } = envelope;

        let decoded = match kind.as_str() {
            MESSAGE_CREATED => serde_json::from_value(data).map(PushEvent::MessageCreated),
            MESSAGE_UPDATED => serde_json::from_value::<MessageUpdate>(data).map(|u| {
                PushEvent::MessageUpdated {
                    conversation_uuid: u.conversation_uuid,
                    uuid: u.uuid,
                    changes: u.changes,
                }
            }),
            CONVERSATION_CREATED => {
                serde_json::from_value(data).map(PushEvent::ConversationCreated)
            }
            CONVERSATION_UPDATED => serde_json::from_value::<ConversationUpdate>(data).map(|u| {
                PushEvent::ConversationUpdated {
                    uuid: u.uuid,
                    changes: u.changes,
                }
            }),
            _ => return Err(PushEventError::UnknownType(kind.clone())),
        };

        decoded.map_err(|source| PushEventError::Payload { kind, source })
    }
}
