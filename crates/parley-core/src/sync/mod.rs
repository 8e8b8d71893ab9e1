//! Live sync
//!
//! The [`SyncCoordinator`] sits between the push transport, the HTTP message
//! API and the [`MessageCache`](crate::cache::MessageCache):
//!
//! ```text
//! Transport --TransportEvent--> SyncCoordinator --add_message--> MessageCache
//!                                     |
//! MessageApi <--fetch_page/...--------+---SyncEvent--> presentation layer
//! ```
//!
//! Network failures stop here. They are reported as [`Notice`]s and leave
//! the cache unchanged.

mod api;
mod conversations;
mod coordinator;
mod error;
mod events;

pub use api::{ApiError, MessageApi};
pub use conversations::ConversationList;
pub use coordinator::{SyncCoordinator, SyncEvent};
pub use error::{Notice, NoticeKind, SyncError};
pub use events::{
    PushEvent, PushEventError, CONVERSATION_CREATED, CONVERSATION_UPDATED, MESSAGE_CREATED,
    MESSAGE_UPDATED,
};
