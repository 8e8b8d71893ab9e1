//! Sync error handling

use thiserror::Error;
use uuid::Uuid;

use super::api::ApiError;

/// Errors returned by coordinator operations
///
/// Every failure is also reported as a [`Notice`] on the event channel, so
/// callers that only render notices can ignore the returned error.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Conversation {0} is not in the conversation list")]
    UnknownConversation(Uuid),
}

impl SyncError {
    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Api(e) if e.is_transient() => Some("The server is unreachable or busy. Try again shortly."),
            SyncError::UnknownConversation(_) => Some("Refresh the conversation list and try again."),
            _ => None,
        }
    }
}

/// What kind of failure a notice reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// A fetch failed; cached data is unchanged
    FetchFailed,
    /// An optimistic edit failed and was rolled back
    UpdateReverted,
    /// An outbound action was not delivered
    SendFailed,
}

/// A transient, user-facing failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display_is_transparent() {
        let err = SyncError::from(ApiError::Request("connection reset".to_string()));
        assert_eq!(err.to_string(), "Request failed: connection reset");
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_unknown_conversation() {
        let uuid = Uuid::new_v4();
        let err = SyncError::UnknownConversation(uuid);
        assert!(err.to_string().contains(&uuid.to_string()));
    }
}
