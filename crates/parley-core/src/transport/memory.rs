//! In-memory connector
//!
//! Pairs a [`MemoryConnector`] with a [`MemoryServer`] so a transport can be
//! driven without a network. The server side accepts each connection as a
//! [`MemoryPeer`] that can push frames to the client and read what the
//! client sent. Dropping a peer closes that connection. The server can also
//! hold connection attempts open to keep the client in `Connecting`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{sink, stream};
use tokio::sync::{mpsc, watch};

use super::connector::{Connection, Connector};
use super::envelope::Envelope;
use super::error::TransportError;

/// Create a connected connector/server pair
pub fn pair() -> (MemoryConnector, MemoryServer) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let refusals = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));
    let (hold_tx, hold_rx) = watch::channel(false);

    let connector = MemoryConnector {
        accepted_tx,
        refusals: Arc::clone(&refusals),
        attempts: Arc::clone(&attempts),
        hold: hold_rx,
    };
    let server = MemoryServer {
        accepted_rx,
        refusals,
        attempts,
        hold: hold_tx,
    };

    (connector, server)
}

/// Client side of an in-memory endpoint
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepted_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
    hold: watch::Receiver<bool>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        // A dropped server counts as released
        let mut hold = self.hold.clone();
        loop {
            let held = *hold.borrow_and_update();
            if !held || hold.changed().await.is_err() {
                break;
            }
        }

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("memory server refused connection".to_string()));
        }

        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel::<String>();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel::<String>();

        let peer = MemoryPeer {
            to_client: to_client_tx,
            from_client: from_client_rx,
        };
        self.accepted_tx
            .send(peer)
            .map_err(|_| TransportError::Connect("memory server is gone".to_string()))?;

        let inbound = stream::unfold(to_client_rx, |mut rx| async move {
            rx.recv().await.map(|text| (Ok::<_, TransportError>(text), rx))
        });
        let outbound = sink::unfold(from_client_tx, |tx, text: String| async move {
            tx.send(text).map_err(|_| TransportError::Disconnected)?;
            Ok::<_, TransportError>(tx)
        });

        Ok(Connection {
            sink: Box::pin(outbound),
            stream: Box::pin(inbound),
        })
    }
}

/// Server side of an in-memory endpoint
#[derive(Debug)]
pub struct MemoryServer {
    accepted_rx: mpsc::UnboundedReceiver<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
    hold: watch::Sender<bool>,
}

impl MemoryServer {
    /// Refuse the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Keep new connection attempts pending until released
    pub fn hold_connects(&self) {
        self.hold.send_replace(true);
    }

    /// Let held and future connection attempts proceed
    pub fn release_connects(&self) {
        self.hold.send_replace(false);
    }

    /// Connection attempts seen so far, refused and held ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted_rx.recv().await
    }
}

/// One accepted in-memory connection
#[derive(Debug)]
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Push a raw text frame to the client
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(text.into()).is_ok()
    }

    /// Push an envelope to the client
    pub fn push(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(text) => self.push_text(text),
            Err(_) => false,
        }
    }

    /// Next frame the client sent, `None` once the client hung up
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame the client sent, decoded
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        let text = self.recv().await?;
        Envelope::decode(&text).ok()
    }
}
