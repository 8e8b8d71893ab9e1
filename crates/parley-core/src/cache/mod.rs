//! In-memory message cache
//!
//! Stores fetched message pages per conversation and bounds memory by
//! evicting whole conversations once a count cap is exceeded.
//!
//! ## Invariants
//!
//! - A message UUID appears at most once across all pages of a conversation
//! - The recency list holds exactly the cached conversation IDs
//!
//! Every operation is synchronous and does no I/O. Unknown conversations and
//! messages are no-ops, never errors.

mod entry;
mod recency;

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::models::{Direction, Message, MessagePatch};

pub use entry::ConversationCacheEntry;
pub use recency::{RecencyList, RecencyPolicy};

/// Default number of conversations kept before eviction
pub const DEFAULT_MAX_CONVERSATIONS: usize = 100;

/// Bounded, paginated message cache
#[derive(Debug)]
pub struct MessageCache {
    entries: HashMap<Uuid, ConversationCacheEntry>,
    recency: RecencyList,
    max_conversations: usize,
    policy: RecencyPolicy,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONVERSATIONS, RecencyPolicy::default())
    }
}

impl MessageCache {
    /// Create a cache holding at most `max_conversations` conversations
    pub fn new(max_conversations: usize, policy: RecencyPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            recency: RecencyList::new(),
            max_conversations: max_conversations.max(1),
            policy,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_conversations, config.recency)
    }

    pub fn max_conversations(&self) -> usize {
        self.max_conversations
    }

    pub fn policy(&self) -> RecencyPolicy {
        self.policy
    }

    // ==================== Mutations ====================

    /// Merge a fetched page into a conversation
    ///
    /// Messages already cached anywhere in the conversation are skipped. The
    /// first merge for a conversation creates its entry and may evict the
    /// least recent conversation. Returns the number of messages inserted.
    pub fn add_messages(
        &mut self,
        conversation: Uuid,
        messages: Vec<Message>,
        page: u32,
        total_pages: u32,
    ) -> usize {
        if page == 0 {
            warn!(%conversation, "Ignoring merge for page 0; pages start at 1");
            return 0;
        }

        let inserted = match self.entries.get_mut(&conversation) {
            Some(entry) => {
                let inserted = entry.merge_page(page, messages, total_pages);
                if self.policy == RecencyPolicy::Access {
                    self.recency.touch(conversation);
                }
                inserted
            }
            None => {
                let mut entry = ConversationCacheEntry::new();
                let inserted = entry.merge_page(page, messages, total_pages);
                self.entries.insert(conversation, entry);
                self.enroll(conversation);
                inserted
            }
        };

        debug!(%conversation, page, total_pages, inserted, "Merged message page");
        inserted
    }

    /// Insert a single live message into page 1
    ///
    /// No-op if the conversation is not cached or the message already is.
    pub fn add_message(&mut self, conversation: Uuid, message: Message) -> bool {
        match self.entries.get_mut(&conversation) {
            Some(entry) => entry.push_recent(message),
            None => false,
        }
    }

    /// Merge a patch into a cached message
    pub fn update_message(&mut self, conversation: Uuid, uuid: Uuid, patch: &MessagePatch) -> bool {
        let Some(message) = self
            .entries
            .get_mut(&conversation)
            .and_then(|entry| entry.find_mut(uuid))
        else {
            return false;
        };

        patch.apply(message);
        true
    }

    /// Set one named field of a cached message
    ///
    /// Unknown field names and ill-typed values are logged and ignored.
    pub fn update_message_field(
        &mut self,
        conversation: Uuid,
        uuid: Uuid,
        field: &str,
        value: Value,
    ) -> bool {
        match MessagePatch::field(field, value) {
            Ok(patch) => self.update_message(conversation, uuid, &patch),
            Err(e) => {
                warn!(%conversation, message = %uuid, "Ignoring field update: {}", e);
                false
            }
        }
    }

    /// Drop one conversation
    pub fn remove(&mut self, conversation: Uuid) -> bool {
        self.recency.remove(conversation);
        self.entries.remove(&conversation).is_some()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    // ==================== Queries ====================

    pub fn entry(&self, conversation: Uuid) -> Option<&ConversationCacheEntry> {
        self.entries.get(&conversation)
    }

    pub fn contains(&self, conversation: Uuid) -> bool {
        self.entries.contains_key(&conversation)
    }

    /// True if any page of the conversation holds the message
    pub fn has_message(&self, conversation: Uuid, uuid: Uuid) -> bool {
        self.entries
            .get(&conversation)
            .is_some_and(|entry| entry.contains(uuid))
    }

    /// Every cached message of a conversation, oldest first
    ///
    /// The sort is stable, so messages with equal timestamps keep page
    /// order. Unknown conversations yield an empty list.
    pub fn get_all_pages_messages(&self, conversation: Uuid) -> Vec<Message> {
        let Some(entry) = self.entries.get(&conversation) else {
            return Vec::new();
        };

        let mut messages: Vec<Message> = entry.messages().cloned().collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    /// Newest cached message matching the filters
    ///
    /// Picks by creation time rather than page position. On equal
    /// timestamps the message found first in page order wins.
    pub fn get_latest_message(
        &self,
        conversation: Uuid,
        direction: Option<Direction>,
        exclude_private: bool,
    ) -> Option<&Message> {
        self.entries
            .get(&conversation)?
            .messages()
            .filter(|m| direction.map_or(true, |d| m.direction == d))
            .filter(|m| !(exclude_private && m.is_private()))
            .fold(None, |latest: Option<&Message>, m| match latest {
                Some(current) if current.created_at >= m.created_at => Some(current),
                _ => Some(m),
            })
    }

    pub fn has_more(&self, conversation: Uuid) -> bool {
        self.entries
            .get(&conversation)
            .is_some_and(ConversationCacheEntry::has_more)
    }

    pub fn last_fetched_page(&self, conversation: Uuid) -> u32 {
        self.entries
            .get(&conversation)
            .map_or(0, ConversationCacheEntry::last_fetched_page)
    }

    pub fn total_pages(&self, conversation: Uuid) -> u32 {
        self.entries
            .get(&conversation)
            .map_or(0, ConversationCacheEntry::total_pages)
    }

    pub fn message_count(&self, conversation: Uuid) -> usize {
        self.entries
            .get(&conversation)
            .map_or(0, ConversationCacheEntry::message_count)
    }

    /// Cached conversation IDs, most recent first
    pub fn conversation_ids(&self) -> Vec<Uuid> {
        self.recency.iter().copied().collect()
    }

    /// Number of cached conversations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enroll a new conversation and evict past the cap
    fn enroll(&mut self, conversation: Uuid) {
        self.recency.touch(conversation);

        while self.recency.len() > self.max_conversations {
            let Some(evicted) = self.recency.pop_oldest() else {
                break;
            };
            self.entries.remove(&evicted);
            debug!(conversation = %evicted, "Evicted conversation from message cache");
        }
    }
}
