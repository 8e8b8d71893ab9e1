//! Parley Core Library
//!
//! This crate provides the core of Parley, a conversation client that keeps
//! a bounded, paginated message cache in step with a live push connection.
//!
//! # Architecture
//!
//! - **MessageCache**: per-conversation page buckets, deduplicated across
//!   pages, with least-recent eviction past a conversation cap
//! - **Transport**: one reconnecting duplex connection carrying JSON
//!   envelopes, with exponential backoff and an ordered outbound queue
//! - **SyncCoordinator**: applies pushes and fetched pages to the cache and
//!   to the conversation list
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut transport = Transport::websocket(&url, TransportConfig::from_config(&config));
//! let mut coordinator = SyncCoordinator::new(api, MessageCache::from_config(&config.cache))
//!     .with_transport(transport.sender());
//!
//! let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//! transport.init(events_tx)?;
//! coordinator.subscribe("inbox").await;
//! coordinator.run(events_rx).await;
//! ```
//!
//! # Modules
//!
//! - `cache`: Paginated message cache
//! - `transport`: Reconnecting push transport
//! - `sync`: Coordinator, push decoding and the message API seam
//! - `models`: Messages, conversations and their patches
//! - `config`: Application configuration

pub mod cache;
pub mod config;
pub mod models;
pub mod sync;
pub mod transport;

pub use cache::{MessageCache, RecencyPolicy};
pub use config::Config;
pub use models::{
    ConversationPatch, ConversationStatus, ConversationSummary, Message, MessagePage,
    MessagePatch, Participant, Priority,
};
pub use sync::{ApiError, MessageApi, Notice, SyncCoordinator, SyncError, SyncEvent};
pub use transport::{ConnectionState, Transport, TransportConfig, TransportError};
