//! Reconnecting push transport
//!
//! Owns one logical duplex connection. A background task connects,
//! forwards inbound envelopes to the dispatcher, drains the outbound queue
//! while the connection is open, and reconnects with exponential backoff
//! whenever the connection drops.
//!
//! ## States
//!
//! ```text
//! Idle -> Connecting -> Open
//!            ^            |
//!            |            v
//!            +---- ReconnectPending      (any non-manual close)
//!
//! teardown() -> ClosedManual             (terminal)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::ReconnectBackoff;
use super::connector::{Connection, Connector, FrameSink, WsConnector};
use super::envelope::{Envelope, OutboundAction};
use super::error::TransportError;
use crate::config::Config;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, not started
    Idle,
    /// Attempting to connect
    Connecting,
    /// Connected; sends are delivered immediately
    Open,
    /// Waiting out the backoff delay before the next attempt
    ReconnectPending,
    /// Torn down; never reconnects
    ClosedManual,
}

/// Events delivered to the dispatcher
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection state changed
    StateChanged(ConnectionState),
    /// An inbound envelope arrived
    Envelope(Envelope),
    /// The next connection attempt is due after this delay
    ReconnectScheduled(Duration),
    /// A connection attempt or an open connection failed
    Error(String),
}

/// Configuration for the transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Initial reconnect delay
    pub initial_reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
    /// How long a send waits for delivery
    pub send_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_reconnect_delay: config.reconnect.initial_delay(),
            max_reconnect_delay: config.reconnect.max_delay(),
            send_timeout: config.send_timeout(),
        }
    }
}

/// Commands sent to the connection task
enum Command {
    Send(Outbound),
    NetworkOnline,
    Close,
}

/// A queued outbound frame and the caller waiting on it
struct Outbound {
    payload: String,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// Cloneable handle for sending envelopes
#[derive(Clone)]
pub struct TransportSender {
    command_tx: mpsc::UnboundedSender<Command>,
    send_timeout: Duration,
}

impl TransportSender {
    /// Send an envelope, waiting until it is written to an open connection
    ///
    /// Sends issued while disconnected are queued and delivered in order once
    /// the connection opens. Fails with [`TransportError::SendTimeout`] if that
    /// does not happen in time, and with [`TransportError::Closed`] after
    /// teardown.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.queue(envelope)?.wait().await
    }

    pub async fn send_action(&self, action: &OutboundAction) -> Result<(), TransportError> {
        self.send(&action.to_envelope()).await
    }

    /// Enqueue an envelope without waiting for delivery
    ///
    /// The frame keeps its place in the outbound order from this call on.
    /// Dropping the returned [`Delivery`] before the frame is written
    /// abandons it.
    pub fn queue(&self, envelope: &Envelope) -> Result<Delivery, TransportError> {
        let payload = envelope.encode()?;
        let (ack, delivered) = oneshot::channel();

        self.command_tx
            .send(Command::Send(Outbound { payload, ack }))
            .map_err(|_| TransportError::Closed)?;

        Ok(Delivery {
            delivered,
            timeout: self.send_timeout,
        })
    }
}

/// Pending delivery of a queued envelope
#[must_use = "dropping a Delivery abandons the queued frame"]
pub struct Delivery {
    delivered: oneshot::Receiver<Result<(), TransportError>>,
    timeout: Duration,
}

impl Delivery {
    /// Wait for the frame to be written, up to the send timeout
    pub async fn wait(self) -> Result<(), TransportError> {
        match tokio::time::timeout(self.timeout, self.delivered).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::SendTimeout(self.timeout)),
        }
    }
}

/// Reconnecting duplex transport
pub struct Transport {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    command_tx: mpsc::UnboundedSender<Command>,
    /// Taken by the connection task on `init`
    command_rx: Option<mpsc::UnboundedReceiver<Command>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl Transport {
    /// Create an idle transport
    pub fn new(config: TransportConfig, connector: impl Connector) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        Self {
            config,
            connector: Arc::new(connector),
            command_tx,
            command_rx: Some(command_rx),
            state_tx: Arc::new(state_tx),
            state_rx,
            task: None,
        }
    }

    /// Create an idle WebSocket transport
    pub fn websocket(url: &str, config: TransportConfig) -> Self {
        Self::new(config, WsConnector::new(url))
    }

    /// Start connecting, delivering events to `dispatcher`
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running is a no-op; after teardown it fails with `Closed`.
    pub fn init(
        &mut self,
        dispatcher: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        if self.task.is_some() {
            debug!("Transport already running");
            return Ok(());
        }

        let Some(command_rx) = self.command_rx.take() else {
            return Err(TransportError::Closed);
        };

        let task = ConnectionTask {
            backoff: ReconnectBackoff::new(
                self.config.initial_reconnect_delay,
                self.config.max_reconnect_delay,
            ),
            connector: Arc::clone(&self.connector),
            command_rx,
            dispatcher,
            state_tx: Arc::clone(&self.state_tx),
            queue: VecDeque::new(),
        };

        self.task = Some(tokio::spawn(task.run()));
        Ok(())
    }

    /// Close the connection and stop reconnecting
    ///
    /// Pending sends fail with `Closed`.
    pub async fn teardown(&mut self) {
        let _ = self.command_tx.send(Command::Close);

        match self.task.take() {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!("Transport task ended abnormally: {}", e);
                }
            }
            None => {
                // Never started: nothing will consume the queue
                self.command_rx = None;
                self.state_tx.send_replace(ConnectionState::ClosedManual);
            }
        }
    }

    /// Signal that the network became available
    ///
    /// Skips a pending backoff timer and reconnects at once with the delay
    /// reset. Ignored while a connection attempt is in flight or open.
    pub fn network_online(&self) {
        let _ = self.command_tx.send(Command::NetworkOnline);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn sender(&self) -> TransportSender {
        TransportSender {
            command_tx: self.command_tx.clone(),
            send_timeout: self.config.send_timeout,
        }
    }

    /// Send an envelope; see [`TransportSender::send`]
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.sender().send(envelope).await
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Outstanding senders keep the command channel alive, so ask the
        // task to stop explicitly
        if self.task.is_some() {
            let _ = self.command_tx.send(Command::Close);
        }
    }
}

/// Whether the task keeps going after a phase ends
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Outcome of a connection attempt
enum Attempt {
    Connected(Connection),
    Failed(TransportError),
    Shutdown,
}

/// State owned by the background connection task
struct ConnectionTask {
    backoff: ReconnectBackoff,
    connector: Arc<dyn Connector>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    dispatcher: mpsc::UnboundedSender<TransportEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    queue: VecDeque<Outbound>,
}

impl ConnectionTask {
    /// Main loop with reconnection
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);

            match self.connect().await {
                Attempt::Shutdown => break,
                Attempt::Failed(e) => {
                    warn!("Connection attempt failed: {}", e);
                    self.emit(TransportEvent::Error(e.to_string()));
                }
                Attempt::Connected(connection) => {
                    info!("Connection open");
                    self.backoff.reset();
                    self.set_state(ConnectionState::Open);

                    if self.serve(connection).await == Flow::Shutdown {
                        break;
                    }
                }
            }

            if self.wait_for_retry().await == Flow::Shutdown {
                break;
            }
        }

        self.shutdown();
    }

    /// Attempt to connect while still accepting commands
    async fn connect(&mut self) -> Attempt {
        let connector = Arc::clone(&self.connector);
        let mut attempt = connector.connect();

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return match result {
                        Ok(connection) => Attempt::Connected(connection),
                        Err(e) => Attempt::Failed(e),
                    };
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Send(outbound)) => self.queue.push_back(outbound),
                        Some(Command::NetworkOnline) => {
                            debug!("Connection attempt already in flight, ignoring online signal");
                        }
                        Some(Command::Close) | None => return Attempt::Shutdown,
                    }
                }
            }
        }
    }

    /// Run an open connection until it drops or the transport is closed
    async fn serve(&mut self, connection: Connection) -> Flow {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        // Deliver what was queued while disconnected
        if !self.flush(&mut sink).await {
            return Flow::Continue;
        }

        loop {
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(text)) => self.dispatch(&text),
                        Some(Err(e)) => {
                            warn!("Connection error: {}", e);
                            self.emit(TransportEvent::Error(e.to_string()));
                            return Flow::Continue;
                        }
                        None => {
                            info!("Connection closed by server");
                            return Flow::Continue;
                        }
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Send(outbound)) => {
                            self.queue.push_back(outbound);
                            if !self.flush(&mut sink).await {
                                return Flow::Continue;
                            }
                        }
                        Some(Command::NetworkOnline) => {
                            debug!("Already connected, ignoring online signal");
                        }
                        Some(Command::Close) | None => {
                            sink.close().await.ok();
                            return Flow::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Write queued frames in order
    ///
    /// Returns false if the connection failed; the frame being written goes
    /// back to the front of the queue.
    async fn flush(&mut self, sink: &mut FrameSink) -> bool {
        while let Some(outbound) = self.queue.pop_front() {
            if outbound.ack.is_closed() {
                debug!("Dropping send abandoned by its caller");
                continue;
            }

            match sink.send(outbound.payload.clone()).await {
                Ok(()) => {
                    let _ = outbound.ack.send(Ok(()));
                }
                Err(e) => {
                    warn!("Send failed, will retry after reconnect: {}", e);
                    self.queue.push_front(outbound);
                    return false;
                }
            }
        }
        true
    }

    /// Sleep out the backoff delay, unless told to reconnect now or stop
    async fn wait_for_retry(&mut self) -> Flow {
        self.set_state(ConnectionState::ReconnectPending);

        let delay = self.backoff.next_delay();
        info!("Reconnecting in {:?}", delay);
        self.emit(TransportEvent::ReconnectScheduled(delay));

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Flow::Continue,
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Send(outbound)) => self.queue.push_back(outbound),
                        Some(Command::NetworkOnline) => {
                            info!("Network available, reconnecting now");
                            self.backoff.reset();
                            return Flow::Continue;
                        }
                        Some(Command::Close) | None => return Flow::Shutdown,
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => self.emit(TransportEvent::Envelope(envelope)),
            Err(e) => warn!("Dropping malformed envelope: {}", e),
        }
    }

    /// Fail everything still queued and enter the terminal state
    fn shutdown(&mut self) {
        self.command_rx.close();
        while let Ok(cmd) = self.command_rx.try_recv() {
            if let Command::Send(outbound) = cmd {
                self.queue.push_back(outbound);
            }
        }
        for outbound in self.queue.drain(..) {
            let _ = outbound.ack.send(Err(TransportError::Closed));
        }

        info!("Transport closed");
        self.set_state(ConnectionState::ClosedManual);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
        self.emit(TransportEvent::StateChanged(state));
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.dispatcher.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;
    use serde_json::json;
    use tokio::time::Instant;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    async fn next_matching(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
        pred: impl Fn(&TransportEvent) -> bool,
    ) -> TransportEvent {
        loop {
            let event = rx.recv().await.expect("dispatcher closed");
            if pred(&event) {
                return event;
            }
        }
    }

    async fn next_delay(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Duration {
        match next_matching(rx, |e| matches!(e, TransportEvent::ReconnectScheduled(_))).await {
            TransportEvent::ReconnectScheduled(delay) => delay,
            _ => unreachable!(),
        }
    }

    async fn wait_for_state(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
        state: ConnectionState,
    ) {
        next_matching(rx, |e| matches!(e, TransportEvent::StateChanged(s) if *s == state)).await;
    }

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.initial_reconnect_delay, secs(1));
        assert_eq!(config.max_reconnect_delay, secs(30));
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let (connector, _server) = memory::pair();
        let transport = Transport::new(TransportConfig::default(), connector);
        assert_eq!(transport.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_and_reset_on_open() {
        let (connector, mut server) = memory::pair();
        server.refuse_next(4);

        let mut transport = Transport::new(TransportConfig::default(), connector);
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        let mut delays = Vec::new();
        for _ in 0..4 {
            delays.push(next_delay(&mut rx).await);
        }
        assert_eq!(delays, vec![secs(1), secs(2), secs(4), secs(8)]);

        // Fifth attempt succeeds
        let peer = server.accept().await.unwrap();
        wait_for_state(&mut rx, ConnectionState::Open).await;
        assert_eq!(transport.state(), ConnectionState::Open);
        assert_eq!(server.attempts(), 5);

        // Losing the connection starts over at the initial delay
        drop(peer);
        assert_eq!(next_delay(&mut rx).await, secs(1));

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_online_skips_pending_timer() {
        let (connector, server) = memory::pair();
        server.refuse_next(3);

        let mut transport = Transport::new(TransportConfig::default(), connector);
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        assert_eq!(next_delay(&mut rx).await, secs(1));
        assert_eq!(next_delay(&mut rx).await, secs(2));

        let start = Instant::now();
        transport.network_online();

        // The attempt happens at once and the delay starts over
        assert_eq!(next_delay(&mut rx).await, secs(1));
        assert_eq!(server.attempts(), 3);
        assert!(start.elapsed() < secs(1));

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_online_ignored_while_open() {
        let (connector, mut server) = memory::pair();
        let mut transport = Transport::new(TransportConfig::default(), connector);
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        let _peer = server.accept().await.unwrap();
        wait_for_state(&mut rx, ConnectionState::Open).await;

        transport.network_online();
        tokio::time::sleep(secs(5)).await;

        assert_eq!(transport.state(), ConnectionState::Open);
        assert_eq!(server.attempts(), 1);

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_online_ignored_while_connecting() {
        let (connector, mut server) = memory::pair();
        server.hold_connects();

        let mut transport = Transport::new(TransportConfig::default(), connector);
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        wait_for_state(&mut rx, ConnectionState::Connecting).await;
        tokio::time::sleep(secs(1)).await;
        assert_eq!(server.attempts(), 1);

        transport.network_online();
        tokio::time::sleep(secs(5)).await;
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert_eq!(server.attempts(), 1);

        server.release_connects();
        let _peer = server.accept().await.unwrap();

        let mut events = Vec::new();
        loop {
            let event = rx.recv().await.expect("dispatcher closed");
            let open = matches!(event, TransportEvent::StateChanged(ConnectionState::Open));
            events.push(event);
            if open {
                break;
            }
        }
        assert!(!events
            .iter()
            .any(|e| matches!(e, TransportEvent::ReconnectScheduled(_))));
        assert_eq!(server.attempts(), 1);

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_queued_until_open_in_order() {
        let (connector, mut server) = memory::pair();
        server.refuse_next(1);

        let mut transport = Transport::new(TransportConfig::default(), connector);
        let sender = transport.sender();
        let (tx, _rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        let first = Envelope::new("first", json!({ "n": 1 }));
        let second = Envelope::new("second", json!({ "n": 2 }));
        let (r1, r2, peer) = tokio::join!(sender.send(&first), sender.send(&second), server.accept());

        r1.unwrap();
        r2.unwrap();
        let mut peer = peer.unwrap();
        assert_eq!(peer.recv_envelope().await.unwrap(), first);
        assert_eq!(peer.recv_envelope().await.unwrap(), second);

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_keeps_call_order() {
        let (connector, mut server) = memory::pair();
        let mut transport = Transport::new(TransportConfig::default(), connector);
        let sender = transport.sender();
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = sender.queue(&Envelope::new("first", json!({}))).unwrap();
        let second = sender.queue(&Envelope::new("second", json!({}))).unwrap();
        transport.init(tx).unwrap();

        let mut peer = server.accept().await.unwrap();
        second.wait().await.unwrap();
        first.wait().await.unwrap();
        assert_eq!(peer.recv_envelope().await.unwrap().kind, "first");
        assert_eq!(peer.recv_envelope().await.unwrap().kind, "second");

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_when_never_open() {
        let (connector, server) = memory::pair();
        server.refuse_next(usize::MAX);

        let config = TransportConfig {
            send_timeout: secs(3),
            ..Default::default()
        };
        let mut transport = Transport::new(config, connector);
        let (tx, _rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        let result = transport.send(&Envelope::new("ping", json!({}))).await;
        assert!(matches!(result, Err(TransportError::SendTimeout(d)) if d == secs(3)));

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_envelopes_are_dropped() {
        let (connector, mut server) = memory::pair();
        let mut transport = Transport::new(TransportConfig::default(), connector);
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        let peer = server.accept().await.unwrap();
        assert!(peer.push_text("{not json"));
        assert!(peer.push(&Envelope::new("message.created", json!({ "id": 1 }))));

        let event = next_matching(&mut rx, |e| matches!(e, TransportEvent::Envelope(_))).await;
        match event {
            TransportEvent::Envelope(envelope) => assert_eq!(envelope.kind, "message.created"),
            _ => unreachable!(),
        }
        assert_eq!(transport.state(), ConnectionState::Open);

        transport.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_is_terminal() {
        let (connector, mut server) = memory::pair();
        let mut transport = Transport::new(TransportConfig::default(), connector);
        let sender = transport.sender();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.init(tx).unwrap();

        let _peer = server.accept().await.unwrap();
        wait_for_state(&mut rx, ConnectionState::Open).await;

        transport.teardown().await;
        assert_eq!(transport.state(), ConnectionState::ClosedManual);

        tokio::time::sleep(secs(60)).await;
        assert_eq!(server.attempts(), 1);

        let result = sender.send(&Envelope::new("late", json!({}))).await;
        assert!(matches!(result, Err(TransportError::Closed)));

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(transport.init(tx), Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_teardown_without_init() {
        let (connector, _server) = memory::pair();
        let mut transport = Transport::new(TransportConfig::default(), connector);

        transport.teardown().await;
        assert_eq!(transport.state(), ConnectionState::ClosedManual);
    }
}
