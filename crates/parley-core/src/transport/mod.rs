//! Push transport
//!
//! A single reconnecting duplex connection carrying JSON text envelopes.
//!
//! ## Behavior
//!
//! - Reconnects after any non-manual close, with a 1s delay doubling up to 30s
//! - The delay resets once a connection opens, or on a network-online signal
//! - Sends made while disconnected are queued and delivered in order on open
//! - Malformed inbound frames are logged and dropped
//!
//! ## Usage
//!
//! ```ignore
//! let mut transport = Transport::websocket("wss://chat.example.com/cable", TransportConfig::default());
//! let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//! transport.init(events_tx)?;
//! transport.sender().send_action(&OutboundAction::Subscribe { list: "inbox".into() }).await?;
//! ```

mod backoff;
mod client;
mod connector;
mod envelope;
mod error;
pub mod memory;

pub use backoff::ReconnectBackoff;
pub use client::{
    ConnectionState, Delivery, Transport, TransportConfig, TransportEvent, TransportSender,
};
pub use connector::{Connection, Connector, FrameSink, FrameStream, WsConnector};
pub use envelope::{
    Envelope, OutboundAction, SET_CURRENT_CONVERSATION, SUBSCRIBE, UNSET_CURRENT_CONVERSATION,
};
pub use error::TransportError;
