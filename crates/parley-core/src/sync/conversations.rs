//! Conversation list view state
//!
//! Summaries derived from pushes and local edits: preview text, unread
//! counts and the workflow fields that can be edited optimistically.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::models::{ConversationPatch, ConversationSummary, Message};

/// Characters kept for a last-message preview
const PREVIEW_CHARS: usize = 80;

/// Message UUIDs remembered per conversation for duplicate detection
const SEEN_PER_CONVERSATION: usize = 64;

/// Conversation summaries keyed by conversation UUID
#[derive(Debug, Clone, Default)]
pub struct ConversationList {
    conversations: HashMap<Uuid, ConversationSummary>,
    /// Recently recorded message UUIDs, newest at the back
    seen: HashMap<Uuid, VecDeque<Uuid>>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a conversation; returns false if it was already listed
    pub fn insert(&mut self, summary: ConversationSummary) -> bool {
        if self.conversations.contains_key(&summary.uuid) {
            return false;
        }
        self.conversations.insert(summary.uuid, summary);
        true
    }

    pub fn get(&self, uuid: Uuid) -> Option<&ConversationSummary> {
        self.conversations.get(&uuid)
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.conversations.contains_key(&uuid)
    }

    /// Update the summary for a newly arrived message
    ///
    /// Conversations not yet listed are added. The preview only moves
    /// forward in time, so a late push of an older message leaves it alone.
    /// A message already recorded recently is a redelivery: nothing changes
    /// and false is returned.
    pub fn record_message(&mut self, message: &Message, count_unread: bool) -> bool {
        let seen = self.seen.entry(message.conversation_uuid).or_default();
        if seen.contains(&message.uuid) {
            return false;
        }
        if seen.len() == SEEN_PER_CONVERSATION {
            seen.pop_front();
        }
        seen.push_back(message.uuid);

        let summary = self
            .conversations
            .entry(message.conversation_uuid)
            .or_insert_with(|| ConversationSummary::new(message.conversation_uuid));

        let newer = summary
            .last_message_at
            .map_or(true, |at| message.created_at >= at);
        if newer {
            summary.last_message = Some(message.preview(PREVIEW_CHARS));
            summary.last_message_at = Some(message.created_at);
        }

        if count_unread {
            summary.unread_count += 1;
        }
        true
    }

    /// Reset the unread counter
    pub fn mark_read(&mut self, uuid: Uuid) {
        if let Some(summary) = self.conversations.get_mut(&uuid) {
            summary.unread_count = 0;
        }
    }

    /// Apply a patch, returning its inverse, or `None` if not listed
    pub fn apply_patch(&mut self, uuid: Uuid, patch: &ConversationPatch) -> Option<ConversationPatch> {
        self.conversations
            .get_mut(&uuid)
            .map(|summary| patch.apply(summary))
    }

    /// Undo an optimistic patch
    ///
    /// Restores `previous` only for fields still holding the value `applied`
    /// set, so a push that changed a field in the meantime is kept.
    pub fn rollback(&mut self, uuid: Uuid, applied: &ConversationPatch, previous: &ConversationPatch) {
        let Some(summary) = self.conversations.get_mut(&uuid) else {
            return;
        };

        let mut restore = ConversationPatch::default();
        if applied.status.is_some() && applied.status == Some(summary.status) {
            restore.status = previous.status;
        }
        if applied.priority.is_some() && Some(summary.priority) == applied.priority {
            restore.priority = previous.priority;
        }
        if applied.labels.as_ref() == Some(&summary.labels) {
            restore.labels = previous.labels.clone();
        }

        restore.apply(summary);
    }

    /// Summaries, most recent activity first
    pub fn sorted(&self) -> Vec<ConversationSummary> {
        let mut list: Vec<ConversationSummary> = self.conversations.values().cloned().collect();
        list.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at).then(a.uuid.cmp(&b.uuid)));
        list
    }

    pub fn unread_total(&self) -> u32 {
        self.conversations.values().map(|c| c.unread_count).sum()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
