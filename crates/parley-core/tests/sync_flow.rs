//! End-to-end sync tests over the in-memory transport

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_core::models::{ConversationPatch, Message, MessagePage, Participant};
use parley_core::sync::{ApiError, MessageApi, NoticeKind, SyncCoordinator, SyncEvent, MESSAGE_CREATED};
use parley_core::transport::{memory, Envelope, OutboundAction, Transport, TransportConfig};
use parley_core::MessageCache;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Serves one page per conversation and remembers what was asked
#[derive(Default)]
struct FakeApi {
    pages: Mutex<HashMap<Uuid, Vec<Message>>>,
    messages: Mutex<HashMap<Uuid, Message>>,
    page_fetches: AtomicUsize,
}

impl FakeApi {
    fn serve_message(&self, message: &Message) {
        self.messages.lock().unwrap().insert(message.uuid, message.clone());
    }
}

#[async_trait]
impl MessageApi for FakeApi {
    async fn fetch_page(&self, conversation: Uuid, page: u32) -> Result<MessagePage, ApiError> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        let messages = self
            .pages
            .lock()
            .unwrap()
            .get(&conversation)
            .cloned()
            .unwrap_or_default();
        Ok(MessagePage {
            messages,
            page,
            total_pages: 1,
        })
    }

    async fn fetch_message(&self, message: Uuid) -> Result<Vec<Message>, ApiError> {
        Ok(self.messages.lock().unwrap().get(&message).cloned().into_iter().collect())
    }

    async fn fetch_participants(&self, _conversation: Uuid) -> Result<Vec<Participant>, ApiError> {
        Ok(Vec::new())
    }

    async fn mark_last_seen(&self, _conversation: Uuid) -> Result<(), ApiError> {
        Ok(())
    }

    async fn update_conversation(
        &self,
        _conversation: Uuid,
        _patch: &ConversationPatch,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Poll until `check` holds, letting paused time advance
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_restores_session() {
    let conv = Uuid::new_v4();
    let api = Arc::new(FakeApi::default());
    api.pages
        .lock()
        .unwrap()
        .insert(conv, vec![Message::new(conv, "first page")]);

    let (connector, mut server) = memory::pair();
    let mut transport = Transport::new(TransportConfig::default(), connector);
    let coordinator = Arc::new(
        SyncCoordinator::new(api.clone(), MessageCache::default()).with_transport(transport.sender()),
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    transport.init(events_tx).unwrap();
    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run(events_rx).await })
    };

    coordinator.subscribe("inbox").await;
    coordinator.open_conversation(conv).await.unwrap();

    let subscribe = OutboundAction::Subscribe {
        list: "inbox".to_string(),
    }
    .to_envelope();
    let set_current = OutboundAction::SetCurrentConversation { uuid: conv }.to_envelope();

    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.recv_envelope().await.unwrap(), subscribe);
    assert_eq!(peer.recv_envelope().await.unwrap(), set_current);
    assert_eq!(api.page_fetches.load(Ordering::SeqCst), 1);

    // A push for the open conversation lands in the cache
    let pushed = Message::new(conv, "live reply");
    api.serve_message(&pushed);
    assert!(peer.push(&Envelope::new(MESSAGE_CREATED, serde_json::to_value(&pushed).unwrap())));
    eventually(|| {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.messages(conv).await.len() == 2 }
    })
    .await;

    // Drop the connection; the transport reconnects and the session is restored
    drop(peer);
    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.recv_envelope().await.unwrap(), subscribe);
    assert_eq!(peer.recv_envelope().await.unwrap(), set_current);
    eventually(|| {
        let api = Arc::clone(&api);
        async move { api.page_fetches.load(Ordering::SeqCst) == 2 }
    })
    .await;

    // Refetching page 1 did not duplicate anything
    assert_eq!(coordinator.messages(conv).await.len(), 2);

    transport.teardown().await;
    drop(transport);
    runner.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_do_not_stop_processing() {
    let background = Uuid::new_v4();
    let api = Arc::new(FakeApi::default());

    let (connector, mut server) = memory::pair();
    let mut transport = Transport::new(TransportConfig::default(), connector);
    let mut coordinator =
        SyncCoordinator::new(api, MessageCache::default()).with_transport(transport.sender());
    let mut sync_events = coordinator.take_events().unwrap();
    let coordinator = Arc::new(coordinator);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    transport.init(events_tx).unwrap();
    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run(events_rx).await })
    };

    let peer = server.accept().await.unwrap();
    assert!(peer.push_text("not an envelope"));
    assert!(peer.push(&Envelope::new("typing.on", json!({ "user": 7 }))));
    assert!(peer.push(&Envelope::new(
        MESSAGE_CREATED,
        serde_json::to_value(Message::new(background, "are you there?")).unwrap(),
    )));

    assert_eq!(sync_events.recv().await, Some(SyncEvent::ConversationsChanged));
    let summary = coordinator.conversation(background).await.unwrap();
    assert_eq!(summary.unread_count, 1);
    assert_eq!(summary.last_message.as_deref(), Some("are you there?"));

    transport.teardown().await;
    drop(transport);
    runner.await.unwrap();
}

#[tokio::test]
async fn test_actions_after_teardown_raise_notice() {
    let api = Arc::new(FakeApi::default());
    let (connector, _server) = memory::pair();
    let mut transport = Transport::new(TransportConfig::default(), connector);
    let mut coordinator =
        SyncCoordinator::new(api, MessageCache::default()).with_transport(transport.sender());
    let mut sync_events = coordinator.take_events().unwrap();

    transport.teardown().await;
    coordinator.subscribe("mentions").await;

    match sync_events.recv().await {
        Some(SyncEvent::Notice(notice)) => assert_eq!(notice.kind, NoticeKind::SendFailed),
        other => panic!("expected a notice, got {:?}", other),
    }
}
