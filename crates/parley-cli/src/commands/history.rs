//! History command handler

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use parley_core::{Config, MessageCache, SyncCoordinator};

use crate::http::HttpMessageApi;
use crate::output::Output;

/// Print the most recent pages of a conversation
pub async fn show(config: &Config, conversation: Uuid, pages: u32, output: &Output) -> Result<()> {
    let api = Arc::new(HttpMessageApi::from_config(config)?);
    let coordinator = SyncCoordinator::new(api, MessageCache::from_config(&config.cache));

    for _ in 0..pages.max(1) {
        let loaded = coordinator
            .load_more(conversation)
            .await
            .with_context(|| format!("Failed to load messages for {}", conversation))?;
        if !loaded {
            break;
        }
    }

    let messages = coordinator.messages(conversation).await;
    output.print_messages(&messages);

    let has_more = coordinator.cache().lock().await.has_more(conversation);
    if has_more {
        output.message(&format!(
            "Older messages available. Use --pages {} to load more.",
            pages.max(1) + 1
        ));
    }

    Ok(())
}
