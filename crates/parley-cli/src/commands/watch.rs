//! Watch command handler
//!
//! Connects the push transport and prints messages as they arrive until
//! interrupted.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use parley_core::{Config, MessageCache, SyncCoordinator, SyncEvent, Transport, TransportConfig};

use crate::http::HttpMessageApi;
use crate::output::Output;

/// Default list to subscribe to
const DEFAULT_LIST: &str = "inbox";

/// Stream live updates
pub async fn run(
    config: &Config,
    conversation: Option<Uuid>,
    lists: Vec<String>,
    output: &Output,
) -> Result<()> {
    let Some(ref socket_url) = config.socket_url else {
        bail!(
            "Socket URL not configured. Set it with:\n  \
             parley config set socket_url wss://chat.example.com/cable"
        );
    };

    let api = Arc::new(HttpMessageApi::from_config(config)?);
    let mut transport = Transport::websocket(socket_url, TransportConfig::from_config(config));
    let mut coordinator = SyncCoordinator::new(api, MessageCache::from_config(&config.cache))
        .with_transport(transport.sender());
    let Some(mut events) = coordinator.take_events() else {
        bail!("Sync events already taken");
    };
    let coordinator = Arc::new(coordinator);

    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    transport.init(transport_tx).context("Failed to start transport")?;
    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run(transport_rx).await })
    };

    let lists = if lists.is_empty() {
        vec![DEFAULT_LIST.to_string()]
    } else {
        lists
    };
    for list in &lists {
        coordinator.subscribe(list).await;
    }

    if let Some(conversation) = conversation {
        // A failed first page is reported through the event stream
        if let Err(e) = coordinator.open_conversation(conversation).await {
            debug!("Initial load failed: {}", e);
        }
    }

    output.message(&format!(
        "Watching {} for updates. Press Ctrl-C to stop.",
        lists.join(", ")
    ));

    let mut printed: HashSet<Uuid> = HashSet::new();
    let mut unread = 0;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(SyncEvent::MessagesChanged(conversation)) => {
                        for message in coordinator.messages(conversation).await {
                            if printed.insert(message.uuid) {
                                output.print_message(&message);
                            }
                        }
                    }
                    Some(SyncEvent::ConversationsChanged) => {
                        let total: u32 = coordinator
                            .conversations()
                            .await
                            .iter()
                            .map(|c| c.unread_count)
                            .sum();
                        if total != unread {
                            unread = total;
                            output.message(&format!("{} unread", unread));
                        }
                    }
                    Some(SyncEvent::Notice(notice)) => output.notice(&notice),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }

    transport.teardown().await;
    drop(transport);
    runner.await.context("Sync task failed")?;

    Ok(())
}
