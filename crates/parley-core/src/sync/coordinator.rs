//! Sync coordinator
//!
//! Turns transport pushes and paged fetches into cache and view-state
//! updates. Every cache mutation is a single synchronous call made after all
//! awaited data is in hand, so no lock is held across network I/O.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::api::MessageApi;
use super::conversations::ConversationList;
use super::error::{Notice, NoticeKind, SyncError};
use super::events::{PushEvent, PushEventError};
use crate::cache::MessageCache;
use crate::models::{
    ConversationPatch, ConversationStatus, ConversationSummary, Message, MessagePatch,
    Participant, Priority,
};
use crate::transport::{ConnectionState, Envelope, OutboundAction, TransportEvent, TransportSender};

/// Change notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The conversation list or a summary changed
    ConversationsChanged,
    /// Cached messages of a conversation changed
    MessagesChanged(Uuid),
    /// A failure worth showing to the user
    Notice(Notice),
}

/// View state owned by the coordinator
#[derive(Debug, Default)]
struct ViewState {
    conversations: ConversationList,
    participants: HashMap<Uuid, Vec<Participant>>,
    current: Option<Uuid>,
    /// List subscriptions, re-sent after every reconnect
    subscriptions: Vec<String>,
    /// Push-triggered message fetches in progress
    in_flight: HashSet<(Uuid, Uuid)>,
    /// Whether the transport has been open before
    has_connected: bool,
}

/// Coordinates pushes, fetches and the message cache
pub struct SyncCoordinator {
    api: Arc<dyn MessageApi>,
    cache: Arc<Mutex<MessageCache>>,
    view: Arc<Mutex<ViewState>>,
    sender: Option<TransportSender>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
}

impl SyncCoordinator {
    /// Create a coordinator without a transport
    ///
    /// Outbound actions are dropped until [`with_transport`](Self::with_transport)
    /// attaches one.
    pub fn new(api: Arc<dyn MessageApi>, cache: MessageCache) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            api,
            cache: Arc::new(Mutex::new(cache)),
            view: Arc::new(Mutex::new(ViewState::default())),
            sender: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    pub fn with_transport(mut self, sender: TransportSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Take the change notification channel
    ///
    /// Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx.take()
    }

    pub fn cache(&self) -> Arc<Mutex<MessageCache>> {
        Arc::clone(&self.cache)
    }

    // ==================== View queries ====================

    /// Conversation summaries, most recent activity first
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.view.lock().await.conversations.sorted()
    }

    pub async fn conversation(&self, uuid: Uuid) -> Option<ConversationSummary> {
        self.view.lock().await.conversations.get(uuid).cloned()
    }

    pub async fn current_conversation(&self) -> Option<Uuid> {
        self.view.lock().await.current
    }

    pub async fn participants(&self, conversation: Uuid) -> Vec<Participant> {
        self.view
            .lock()
            .await
            .participants
            .get(&conversation)
            .cloned()
            .unwrap_or_default()
    }

    /// Cached messages of a conversation, oldest first
    pub async fn messages(&self, conversation: Uuid) -> Vec<Message> {
        self.cache.lock().await.get_all_pages_messages(conversation)
    }

    /// Add a conversation to the list; returns false if already listed
    pub async fn add_conversation(&self, summary: ConversationSummary) -> bool {
        let added = self.view.lock().await.conversations.insert(summary);
        if added {
            self.emit(SyncEvent::ConversationsChanged);
        }
        added
    }

    // ==================== Pull operations ====================

    /// Fetch one page and merge it into the cache
    ///
    /// On failure the cache is left untouched and a notice is emitted.
    /// Returns the number of new messages.
    pub async fn load_page(&self, conversation: Uuid, page: u32) -> Result<usize, SyncError> {
        let fetched = match self.api.fetch_page(conversation, page).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(%conversation, page, "Failed to fetch page: {}", e);
                self.notice(NoticeKind::FetchFailed, format!("Could not load messages: {}", e));
                return Err(e.into());
            }
        };

        let (inserted, latest) = {
            let mut cache = self.cache.lock().await;
            let inserted = cache.add_messages(conversation, fetched.messages, page, fetched.total_pages);
            let latest = cache.get_latest_message(conversation, None, false).cloned();
            (inserted, latest)
        };

        if let Some(latest) = latest {
            if self.view.lock().await.conversations.record_message(&latest, false) {
                self.emit(SyncEvent::ConversationsChanged);
            }
        }
        self.emit(SyncEvent::MessagesChanged(conversation));

        Ok(inserted)
    }

    /// Load the next page of a conversation
    ///
    /// Loads page 1 when nothing is cached yet. Returns false when every
    /// page has already been fetched.
    pub async fn load_more(&self, conversation: Uuid) -> Result<bool, SyncError> {
        let next = {
            let cache = self.cache.lock().await;
            if !cache.contains(conversation) {
                Some(1)
            } else if cache.has_more(conversation) {
                Some(cache.last_fetched_page(conversation) + 1)
            } else {
                None
            }
        };

        match next {
            Some(page) => {
                self.load_page(conversation, page).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== Navigation ====================

    /// Make a conversation the open one and load its first page
    pub async fn open_conversation(&self, conversation: Uuid) -> Result<(), SyncError> {
        {
            let mut view = self.view.lock().await;
            view.current = Some(conversation);
            view.conversations.mark_read(conversation);
        }
        self.emit(SyncEvent::ConversationsChanged);
        info!(%conversation, "Opened conversation");

        self.send_action(OutboundAction::SetCurrentConversation { uuid: conversation });
        self.load_page(conversation, 1).await.map(|_| ())
    }

    pub async fn close_conversation(&self) {
        let closed = self.view.lock().await.current.take();
        if let Some(conversation) = closed {
            info!(%conversation, "Closed conversation");
            self.send_action(OutboundAction::UnsetCurrentConversation);
        }
    }

    /// Receive pushes for a conversation list
    pub async fn subscribe(&self, list: &str) {
        {
            let mut view = self.view.lock().await;
            if !view.subscriptions.iter().any(|s| s == list) {
                view.subscriptions.push(list.to_string());
            }
        }
        self.send_action(OutboundAction::Subscribe {
            list: list.to_string(),
        });
    }

    // ==================== Optimistic updates ====================

    /// Apply a conversation change locally, then remotely
    ///
    /// If the remote call fails the touched fields are restored, unless a
    /// push changed them in the meantime, and a notice is emitted.
    pub async fn update_conversation(
        &self,
        conversation: Uuid,
        patch: ConversationPatch,
    ) -> Result<(), SyncError> {
        if patch.is_empty() {
            return Ok(());
        }

        let previous = self
            .view
            .lock()
            .await
            .conversations
            .apply_patch(conversation, &patch)
            .ok_or(SyncError::UnknownConversation(conversation))?;
        self.emit(SyncEvent::ConversationsChanged);

        if let Err(e) = self.api.update_conversation(conversation, &patch).await {
            warn!(%conversation, "Conversation update failed, reverting: {}", e);
            self.view
                .lock()
                .await
                .conversations
                .rollback(conversation, &patch, &previous);
            self.emit(SyncEvent::ConversationsChanged);
            self.notice(NoticeKind::UpdateReverted, format!("Change was not saved: {}", e));
            return Err(e.into());
        }

        Ok(())
    }

    pub async fn set_status(&self, conversation: Uuid, status: ConversationStatus) -> Result<(), SyncError> {
        self.update_conversation(conversation, ConversationPatch::status(status)).await
    }

    pub async fn set_priority(&self, conversation: Uuid, priority: Option<Priority>) -> Result<(), SyncError> {
        self.update_conversation(conversation, ConversationPatch::priority(priority)).await
    }

    pub async fn set_labels(&self, conversation: Uuid, labels: Vec<String>) -> Result<(), SyncError> {
        self.update_conversation(conversation, ConversationPatch::labels(labels)).await
    }

    // ==================== Push handling ====================

    /// Consume transport events until the channel closes
    ///
    /// Each event is handled to completion before the next is read.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_transport_event(event).await;
        }
        debug!("Transport event channel closed");
    }

    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(ConnectionState::Open) => {
                let reconnected = {
                    let mut view = self.view.lock().await;
                    std::mem::replace(&mut view.has_connected, true)
                };
                if reconnected {
                    self.reconcile().await;
                }
            }
            TransportEvent::StateChanged(state) => debug!(?state, "Transport state changed"),
            TransportEvent::Envelope(envelope) => self.handle_envelope(envelope).await,
            TransportEvent::ReconnectScheduled(delay) => debug!(?delay, "Reconnect scheduled"),
            TransportEvent::Error(e) => debug!("Transport error: {}", e),
        }
    }

    /// Decode and apply one inbound envelope
    pub async fn handle_envelope(&self, envelope: Envelope) {
        match PushEvent::from_envelope(envelope) {
            Ok(event) => self.handle_push(event).await,
            Err(PushEventError::UnknownType(kind)) => debug!(%kind, "Ignoring push of unknown type"),
            Err(e) => warn!("Dropping push: {}", e),
        }
    }

    pub async fn handle_push(&self, event: PushEvent) {
        match event {
            PushEvent::MessageCreated(message) => self.handle_new_message(message).await,
            PushEvent::MessageUpdated {
                conversation_uuid,
                uuid,
                changes,
            } => self.handle_message_update(conversation_uuid, uuid, &changes).await,
            PushEvent::ConversationCreated(summary) => {
                self.add_conversation(summary).await;
            }
            PushEvent::ConversationUpdated { uuid, changes } => {
                let applied = self.view.lock().await.conversations.apply_patch(uuid, &changes);
                match applied {
                    Some(_) => self.emit(SyncEvent::ConversationsChanged),
                    None => debug!(conversation = %uuid, "Update for unlisted conversation"),
                }
            }
        }
    }

    async fn handle_new_message(&self, message: Message) {
        let conversation = message.conversation_uuid;
        let (is_current, recorded) = {
            let mut view = self.view.lock().await;
            let is_current = view.current == Some(conversation);
            let recorded = view.conversations.record_message(&message, !is_current);
            (is_current, recorded)
        };
        if recorded {
            self.emit(SyncEvent::ConversationsChanged);
        } else {
            debug!(%conversation, message = %message.uuid, "Duplicate push delivery");
        }

        if !is_current {
            return;
        }
        if self.cache.lock().await.has_message(conversation, message.uuid) {
            return;
        }

        let key = (conversation, message.uuid);
        if !self.view.lock().await.in_flight.insert(key) {
            debug!(%conversation, message = %message.uuid, "Message fetch already in flight");
            return;
        }

        self.fetch_pushed_message(conversation, message.uuid).await;

        self.view.lock().await.in_flight.remove(&key);
    }

    /// Participants, then the message itself, then last-seen
    ///
    /// Each step runs even if an earlier one failed.
    async fn fetch_pushed_message(&self, conversation: Uuid, uuid: Uuid) {
        match self.api.fetch_participants(conversation).await {
            Ok(participants) => {
                self.view
                    .lock()
                    .await
                    .participants
                    .insert(conversation, participants);
            }
            Err(e) => {
                warn!(%conversation, "Failed to fetch participants: {}", e);
                self.notice(NoticeKind::FetchFailed, format!("Could not load participants: {}", e));
            }
        }

        match self.api.fetch_message(uuid).await {
            Ok(messages) => {
                let (owned, foreign): (Vec<Message>, Vec<Message>) = messages
                    .into_iter()
                    .partition(|m| m.conversation_uuid == conversation);
                for m in &foreign {
                    warn!(
                        %conversation,
                        message = %m.uuid,
                        belongs_to = %m.conversation_uuid,
                        "Dropping fetched message from another conversation"
                    );
                }

                let inserted = {
                    let mut cache = self.cache.lock().await;
                    owned
                        .into_iter()
                        .filter(|m| cache.add_message(conversation, m.clone()))
                        .count()
                };
                if inserted > 0 {
                    self.emit(SyncEvent::MessagesChanged(conversation));
                }
            }
            Err(e) => {
                warn!(%conversation, message = %uuid, "Failed to fetch message: {}", e);
                self.notice(NoticeKind::FetchFailed, format!("Could not load new message: {}", e));
            }
        }

        if let Err(e) = self.api.mark_last_seen(conversation).await {
            warn!(%conversation, "Failed to mark conversation seen: {}", e);
        }
    }

    async fn handle_message_update(&self, conversation: Uuid, uuid: Uuid, changes: &MessagePatch) {
        let updated = self.cache.lock().await.update_message(conversation, uuid, changes);
        if updated {
            self.emit(SyncEvent::MessagesChanged(conversation));
        } else {
            debug!(%conversation, message = %uuid, "Update for uncached message");
        }
    }

    /// Restore server-side state after a reconnect
    async fn reconcile(&self) {
        let (subscriptions, current) = {
            let view = self.view.lock().await;
            (view.subscriptions.clone(), view.current)
        };
        info!(subscriptions = subscriptions.len(), "Reconnected, restoring session");

        for list in subscriptions {
            self.send_action(OutboundAction::Subscribe { list });
        }

        if let Some(conversation) = current {
            self.send_action(OutboundAction::SetCurrentConversation { uuid: conversation });
            // Failure already reported as a notice
            let _ = self.load_page(conversation, 1).await;
        }
    }

    // ==================== Helpers ====================

    /// Queue an action and report a failed delivery in the background
    fn send_action(&self, action: OutboundAction) {
        let Some(sender) = &self.sender else {
            debug!(?action, "No transport attached, dropping action");
            return;
        };

        let event_tx = self.event_tx.clone();
        match sender.queue(&action.to_envelope()) {
            Ok(delivery) => {
                tokio::spawn(async move {
                    if let Err(e) = delivery.wait().await {
                        warn!(?action, "Action not delivered: {}", e);
                        let _ = event_tx.send(SyncEvent::Notice(Notice::new(
                            NoticeKind::SendFailed,
                            format!("Could not reach the server: {}", e),
                        )));
                    }
                });
            }
            Err(e) => {
                warn!(?action, "Action not queued: {}", e);
                self.notice(NoticeKind::SendFailed, format!("Could not reach the server: {}", e));
            }
        }
    }

    fn notice(&self, kind: NoticeKind, message: String) {
        self.emit(SyncEvent::Notice(Notice::new(kind, message)));
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }
}
