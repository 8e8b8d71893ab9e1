//! Per-conversation cache entry
//!
//! Holds the page buckets fetched for one conversation along with the
//! pagination bookkeeping needed to decide whether more pages exist.

use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::models::Message;

/// Cached pages for a single conversation
///
/// A message UUID appears in at most one page bucket.
#[derive(Debug, Clone, Default)]
pub struct ConversationCacheEntry {
    /// Page number to messages, in the order the server delivered them
    pages: BTreeMap<u32, Vec<Message>>,
    /// Last known total page count
    total_pages: u32,
    /// Highest page number ever merged
    last_fetched_page: u32,
}

impl ConversationCacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn last_fetched_page(&self) -> u32 {
        self.last_fetched_page
    }

    /// True if the server reported pages beyond the highest merged one
    pub fn has_more(&self) -> bool {
        self.total_pages > self.last_fetched_page
    }

    /// Messages of one page bucket
    pub fn page(&self, page: u32) -> Option<&[Message]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    /// Page numbers with a bucket, ascending
    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// All messages, page 1 first, each bucket in delivery order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.pages.values().flatten()
    }

    pub fn message_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.messages().any(|m| m.uuid == uuid)
    }

    /// Merge a fetched page
    ///
    /// Messages already present in any bucket, or repeated within the batch,
    /// are dropped. Survivors are appended to the page's bucket. Returns the
    /// number of messages inserted.
    pub(crate) fn merge_page(&mut self, page: u32, messages: Vec<Message>, total_pages: u32) -> usize {
        let mut seen: HashSet<Uuid> = self.messages().map(|m| m.uuid).collect();
        let fresh: Vec<Message> = messages
            .into_iter()
            .filter(|m| seen.insert(m.uuid))
            .collect();
        let inserted = fresh.len();

        self.pages.entry(page).or_default().extend(fresh);
        self.last_fetched_page = self.last_fetched_page.max(page);
        self.total_pages = total_pages;

        inserted
    }

    /// Append a live message to page 1
    ///
    /// Page 1 is treated as the most recent page. Returns false if the
    /// message is already cached.
    pub(crate) fn push_recent(&mut self, message: Message) -> bool {
        if self.contains(message.uuid) {
            return false;
        }
        self.pages.entry(1).or_default().push(message);
        true
    }

    pub(crate) fn find_mut(&mut self, uuid: Uuid) -> Option<&mut Message> {
        self.pages
            .values_mut()
            .flat_map(|bucket| bucket.iter_mut())
            .find(|m| m.uuid == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(conv: Uuid) -> Message {
        Message::new(conv, "hi")
    }

    #[test]
    fn test_merge_drops_duplicates_within_batch() {
        let conv = Uuid::new_v4();
        let m = message(conv);
        let mut entry = ConversationCacheEntry::new();

        let inserted = entry.merge_page(1, vec![m.clone(), m.clone()], 1);

        assert_eq!(inserted, 1);
        assert_eq!(entry.message_count(), 1);
    }

    #[test]
    fn test_merge_drops_messages_cached_on_other_pages() {
        let conv = Uuid::new_v4();
        let shared = message(conv);
        let mut entry = ConversationCacheEntry::new();

        entry.merge_page(1, vec![shared.clone()], 2);
        let inserted = entry.merge_page(2, vec![shared, message(conv)], 2);

        assert_eq!(inserted, 1);
        assert_eq!(entry.page(2).unwrap().len(), 1);
        assert_eq!(entry.message_count(), 2);
        assert!(!entry.has_more());
    }

    #[test]
    fn test_push_recent_creates_page_one() {
        let conv = Uuid::new_v4();
        let mut entry = ConversationCacheEntry::new();
        entry.merge_page(2, vec![message(conv)], 3);

        let live = message(conv);
        assert!(entry.push_recent(live.clone()));
        assert!(!entry.push_recent(live.clone()));
        assert_eq!(entry.page(1).unwrap()[0].uuid, live.uuid);
        assert_eq!(entry.page_numbers().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_last_fetched_page_never_decreases() {
        let conv = Uuid::new_v4();
        let mut entry = ConversationCacheEntry::new();
        entry.merge_page(3, vec![message(conv)], 5);
        entry.merge_page(1, vec![message(conv)], 5);

        assert_eq!(entry.last_fetched_page(), 3);
        assert!(entry.has_more());
    }
}
