//! Pull-side collaborator
//!
//! The coordinator never builds requests itself; it calls a [`MessageApi`]
//! implementation supplied by the embedding application.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ConversationPatch, Message, MessagePage, Participant};

/// Errors returned by a [`MessageApi`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never got a response
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with an error status
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the same request may succeed if retried
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request(_) => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Decode(_) => false,
        }
    }
}

/// Message and conversation endpoints
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// One page of a conversation's messages
    async fn fetch_page(&self, conversation: Uuid, page: u32) -> Result<MessagePage, ApiError>;

    /// A single message by ID
    ///
    /// Normally zero or one message; callers tolerate more.
    async fn fetch_message(&self, message: Uuid) -> Result<Vec<Message>, ApiError>;

    async fn fetch_participants(&self, conversation: Uuid) -> Result<Vec<Participant>, ApiError>;

    /// Record that the user has seen the conversation up to now
    async fn mark_last_seen(&self, conversation: Uuid) -> Result<(), ApiError>;

    async fn update_conversation(
        &self,
        conversation: Uuid,
        patch: &ConversationPatch,
    ) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Request("timed out".to_string()).is_transient());
        assert!(ApiError::Status { status: 503, message: "unavailable".to_string() }.is_transient());
        assert!(ApiError::Status { status: 429, message: "slow down".to_string() }.is_transient());
        assert!(!ApiError::Status { status: 404, message: "missing".to_string() }.is_transient());
        assert!(!ApiError::Decode("eof".to_string()).is_transient());
    }
}
