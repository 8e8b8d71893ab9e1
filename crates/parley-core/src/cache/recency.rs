//! Conversation recency tracking for eviction

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When a cached conversation counts as recently used
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecencyPolicy {
    /// Only the first merge enrolls a conversation; later merges do not
    /// refresh it, so eviction follows insertion order
    #[default]
    Insertion,
    /// Every page merge moves the conversation to the front
    Access,
}

/// Conversation IDs, most recent first
#[derive(Debug, Clone, Default)]
pub struct RecencyList {
    order: VecDeque<Uuid>,
}

impl RecencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `id` to the front, inserting it if absent
    ///
    /// Linear in the list length: any existing occurrence is found by scan.
    /// The list is bounded by the cache's conversation cap.
    pub fn touch(&mut self, id: Uuid) {
        self.remove(id);
        self.order.push_front(id);
    }

    /// Remove and return the least recent ID
    pub fn pop_oldest(&mut self) -> Option<Uuid> {
        self.order.pop_back()
    }

    /// Remove `id` if present; linear scan
    pub fn remove(&mut self, id: Uuid) -> bool {
        match self.order.iter().position(|existing| *existing == id) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.order.iter()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}
