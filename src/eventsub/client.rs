//! EventSub WebSocket client
//!
//! A single session loop owns the session state and two connection slots.
//! Each WebSocket runs in its own task and forwards decoded frames to the
//! loop tagged with its connection id, so frames are dispatched one at a
//! time no matter how many sockets are open.
//!
//! When the server sends `session_reconnect` the loop waits the configured
//! delay, opens a second socket to the supplied URL and moves the old one
//! to the "previous" slot. The old socket keeps delivering frames until the
//! new socket's welcome arrives, at which point it is closed. Any other
//! disconnect is reported and not retried.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::alert::AlertRequest;
use crate::config::EventSubSettings;
use crate::error::{Error, Result};
use crate::protocol::{EventSubMessage, Frame, SubscribeRequest};
use crate::subscription::Subscriber;

use super::{Action, ConnectionOrigin, Dispatcher, Session};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the EventSub client
#[derive(Debug, Clone)]
pub struct EventSubClientConfig {
    /// WebSocket URL of the first connection
    pub url: String,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Slack past the server's keepalive timeout before warning
    pub keepalive_grace: Duration,

    /// How often the keepalive watchdog runs
    pub watchdog_interval: Duration,

    /// How long shutdown waits for sockets to close
    pub close_timeout: Duration,

    /// Channel capacity
    pub message_queue_size: usize,
}

impl Default for EventSubClientConfig {
    fn default() -> Self {
        Self {
            url: "wss://eventsub-beta.wss.twitch.tv/ws".to_string(),
            connect_timeout: Duration::from_secs(30),
            keepalive_grace: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(1),
            close_timeout: Duration::from_secs(2),
            message_queue_size: 100,
        }
    }
}

impl EventSubClientConfig {
    pub fn from_settings(settings: &EventSubSettings) -> Self {
        Self {
            url: settings.initial_url().to_string(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            keepalive_grace: Duration::from_secs(settings.keepalive_grace_secs),
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────

/// State of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No live connection
    #[default]
    Disconnected,
    /// Socket is being opened
    Connecting,
    /// Socket open, waiting for the welcome
    Connected,
    /// Welcome received
    Welcomed,
    /// Waiting to move to a reconnect URL
    Reconnecting,
    /// Shutting down
    ShuttingDown,
}

/// State shared with the client handle
#[derive(Debug, Default)]
struct ClientState {
    connection_state: ConnectionState,
    session: Session,
}

// ─────────────────────────────────────────────────────────────────
// Connection Slots
// ─────────────────────────────────────────────────────────────────

/// Handle to one connection task
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    url: String,
    origin: ConnectionOrigin,
    close_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionHandle {
    fn new(id: u64, url: String, origin: ConnectionOrigin) -> (Self, oneshot::Receiver<()>) {
        let (close_tx, close_rx) = oneshot::channel();
        let handle = Self {
            id,
            url,
            origin,
            close_tx: Some(close_tx),
        };
        (handle, close_rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn origin(&self) -> ConnectionOrigin {
        self.origin
    }

    /// Ask the connection task to send a close frame and exit
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// The current connection and the one it is replacing
#[derive(Debug, Default)]
pub struct ConnectionSlots {
    current: Option<ConnectionHandle>,
    previous: Option<ConnectionHandle>,
}

impl ConnectionSlots {
    /// Make `next` current and move the current connection to previous
    ///
    /// Returns a connection that was still waiting in the previous slot, if
    /// any; it has now been superseded twice and should be closed.
    pub fn promote(&mut self, next: ConnectionHandle) -> Option<ConnectionHandle> {
        let displaced = self.previous.take();
        self.previous = self.current.replace(next);
        displaced
    }

    /// Take the superseded connection out of its slot
    pub fn retire_previous(&mut self) -> Option<ConnectionHandle> {
        self.previous.take()
    }

    pub fn current(&self) -> Option<&ConnectionHandle> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&ConnectionHandle> {
        self.previous.as_ref()
    }

    pub fn get(&self, id: u64) -> Option<&ConnectionHandle> {
        self.current
            .iter()
            .chain(self.previous.iter())
            .find(|handle| handle.id == id)
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.current.as_ref().map(|h| h.id) == Some(id)
    }

    /// Forget a connection that has ended
    pub fn remove(&mut self, id: u64) -> Option<ConnectionHandle> {
        if self.current.as_ref().map(|h| h.id) == Some(id) {
            return self.current.take();
        }
        if self.previous.as_ref().map(|h| h.id) == Some(id) {
            return self.previous.take();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.previous.is_none()
    }

    /// Close every connection; returns how many were open
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for slot in [&mut self.current, &mut self.previous] {
            if let Some(handle) = slot.as_mut() {
                handle.close();
                closed += 1;
            }
        }
        closed
    }
}

// ─────────────────────────────────────────────────────────────────
// Command Channel
// ─────────────────────────────────────────────────────────────────

/// Commands that can be sent to the client
#[derive(Debug)]
pub enum ClientCommand {
    /// Close every connection and stop
    Shutdown,
}

// ─────────────────────────────────────────────────────────────────
// Event Channel
// ─────────────────────────────────────────────────────────────────

/// Events emitted by the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A socket finished its handshake
    Connected {
        connection_id: u64,
        url: String,
        reconnect: bool,
    },

    /// Session welcome received
    Welcome { session_id: String, reconnect: bool },

    /// Subscribe endpoint answered
    Subscribed { session_id: String, status: u16 },

    /// Server asked us to move; a new socket opens after `delay`
    Reconnecting { url: String, delay: Duration },

    /// The connection replaced by a reconnect was closed
    SupersededClosed { connection_id: u64 },

    /// A notification should be shown
    Alert(AlertRequest),

    /// A socket ended
    Disconnected { connection_id: u64, reason: String },

    /// Nothing heard for longer than the keepalive timeout
    KeepaliveOverdue { silent_for: Duration },

    /// Error occurred
    Error { message: String, fatal: bool },
}

/// Messages from connection tasks to the session loop
#[derive(Debug)]
enum Inbound {
    Opened { connection_id: u64 },
    Frame { connection_id: u64, frame: Frame },
    Closed { connection_id: u64, reason: String },
}

// ─────────────────────────────────────────────────────────────────
// EventSub Client
// ─────────────────────────────────────────────────────────────────

/// WebSocket client for an EventSub session
pub struct EventSubClient {
    config: EventSubClientConfig,
    dispatcher: Dispatcher,
    subscriber: Arc<dyn Subscriber>,
    state: Arc<RwLock<ClientState>>,
    command_tx: Option<mpsc::Sender<ClientCommand>>,
}

impl EventSubClient {
    pub fn new(
        config: EventSubClientConfig,
        dispatcher: Dispatcher,
        subscriber: Arc<dyn Subscriber>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            subscriber,
            state: Arc::new(RwLock::new(ClientState::default())),
            command_tx: None,
        }
    }

    /// Start the session loop and return the event receiver
    pub fn start(&mut self) -> Result<mpsc::Receiver<ClientEvent>> {
        let url = Url::parse(&self.config.url)
            .map_err(|e| Error::connection_failed(&self.config.url, format!("invalid URL: {}", e)))?;

        let (event_tx, event_rx) = mpsc::channel(self.config.message_queue_size);
        let (command_tx, command_rx) = mpsc::channel(self.config.message_queue_size);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.message_queue_size);
        self.command_tx = Some(command_tx);

        let session_loop = SessionLoop {
            config: self.config.clone(),
            dispatcher: self.dispatcher.clone(),
            subscriber: self.subscriber.clone(),
            state: self.state.clone(),
            event_tx,
            inbound_tx,
            slots: ConnectionSlots::default(),
            session: Session::default(),
            next_connection_id: 0,
            last_frame_at: Instant::now(),
            keepalive_warned: false,
        };

        tokio::spawn(session_loop.run(url, command_rx, inbound_rx));

        Ok(event_rx)
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().connection_state
    }

    /// Snapshot of the session
    pub fn session(&self) -> Session {
        self.state.read().session.clone()
    }

    /// Request graceful shutdown
    pub async fn shutdown(&self) -> Result<()> {
        match self.command_tx {
            Some(ref tx) => tx
                .send(ClientCommand::Shutdown)
                .await
                .map_err(|_| Error::Connection("Client channel closed".to_string())),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Loop
// ─────────────────────────────────────────────────────────────────

struct SessionLoop {
    config: EventSubClientConfig,
    dispatcher: Dispatcher,
    subscriber: Arc<dyn Subscriber>,
    state: Arc<RwLock<ClientState>>,
    event_tx: mpsc::Sender<ClientEvent>,
    inbound_tx: mpsc::Sender<Inbound>,
    slots: ConnectionSlots,
    session: Session,
    next_connection_id: u64,
    last_frame_at: Instant,
    keepalive_warned: bool,
}

impl SessionLoop {
    async fn run(
        mut self,
        url: Url,
        mut command_rx: mpsc::Receiver<ClientCommand>,
        mut inbound_rx: mpsc::Receiver<Inbound>,
    ) {
        info!(url = %url, "Connecting to EventSub");
        self.open(url.to_string(), ConnectionOrigin::Initial, Duration::ZERO);

        let mut watchdog = tokio::time::interval(self.config.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                inbound = inbound_rx.recv() => {
                    match inbound {
                        Some(Inbound::Opened { connection_id }) => self.on_opened(connection_id).await,
                        Some(Inbound::Frame { connection_id, frame }) => self.on_frame(connection_id, frame).await,
                        Some(Inbound::Closed { connection_id, reason }) => self.on_closed(connection_id, reason).await,
                        None => break,
                    }
                }

                _ = watchdog.tick() => {
                    self.check_keepalive().await;
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Shutdown) => info!("Shutdown command received"),
                        None => info!("Command channel closed"),
                    }
                    self.shutdown(&mut inbound_rx).await;
                    break;
                }
            }

            if self.slots.is_empty() {
                info!("No EventSub connections left");
                self.set_connection_state(ConnectionState::Disconnected);
                break;
            }
        }

        info!("Session loop terminated");
    }

    /// Spawn a connection task and make it current
    fn open(&mut self, url: String, origin: ConnectionOrigin, delay: Duration) {
        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;

        let (handle, close_rx) = ConnectionHandle::new(connection_id, url.clone(), origin);
        tokio::spawn(run_connection(
            connection_id,
            url,
            delay,
            self.config.connect_timeout,
            self.inbound_tx.clone(),
            close_rx,
        ));

        if let Some(mut stale) = self.slots.promote(handle) {
            info!(connection_id = stale.id(), "Closing connection that never finished its handoff");
            stale.close();
        }

        if origin == ConnectionOrigin::Initial {
            self.set_connection_state(ConnectionState::Connecting);
        }
    }

    async fn on_opened(&mut self, connection_id: u64) {
        let (url, origin) = match self.slots.get(connection_id) {
            Some(handle) => (handle.url().to_string(), handle.origin()),
            None => return,
        };

        info!(connection_id, url = %url, reconnect = origin.is_reconnect(), "WebSocket connection established");
        if self.slots.is_current(connection_id) {
            self.set_connection_state(ConnectionState::Connected);
        }

        self.emit(ClientEvent::Connected {
            connection_id,
            url,
            reconnect: origin.is_reconnect(),
        })
        .await;
    }

    async fn on_frame(&mut self, connection_id: u64, frame: Frame) {
        let origin = match self.slots.get(connection_id) {
            Some(handle) => handle.origin(),
            None => {
                debug!(connection_id, "Frame from a retired connection");
                return;
            }
        };

        debug!(
            connection_id,
            message_id = ?frame.metadata.message_id,
            message_type = %frame.message.type_name(),
            "Received frame"
        );

        self.last_frame_at = Instant::now();
        self.keepalive_warned = false;

        let session = std::mem::take(&mut self.session);
        let (session, actions) = self.dispatcher.dispatch(session, origin, &frame);
        self.session = session;
        self.state.write().session = self.session.clone();

        if let EventSubMessage::Welcome(ref payload) = frame.message {
            self.set_connection_state(ConnectionState::Welcomed);
            self.emit(ClientEvent::Welcome {
                session_id: payload.session.id.clone(),
                reconnect: origin.is_reconnect(),
            })
            .await;
        }

        for action in actions {
            self.apply(action).await;
        }
    }

    async fn apply(&mut self, action: Action) {
        match action {
            Action::Subscribe(request) => self.spawn_subscribe(request),

            Action::CloseSuperseded => match self.slots.retire_previous() {
                Some(mut previous) => {
                    info!(connection_id = previous.id(), "Closing superseded connection");
                    previous.close();
                    self.emit(ClientEvent::SupersededClosed {
                        connection_id: previous.id(),
                    })
                    .await;
                }
                None => debug!("No superseded connection to close"),
            },

            Action::ScheduleReconnect { url, delay } => {
                self.set_connection_state(ConnectionState::Reconnecting);
                self.emit(ClientEvent::Reconnecting {
                    url: url.clone(),
                    delay,
                })
                .await;
                self.open(url, ConnectionOrigin::Reconnect, delay);
            }

            Action::ShowAlert(request) => self.emit(ClientEvent::Alert(request)).await,
        }
    }

    fn spawn_subscribe(&self, request: SubscribeRequest) {
        let subscriber = self.subscriber.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let event = match subscriber.subscribe(&request).await {
                Ok(outcome) => ClientEvent::Subscribed {
                    session_id: request.session_id,
                    status: outcome.status,
                },
                Err(e) => {
                    error!(session_id = %request.session_id, error = %e, "Subscribe request failed");
                    ClientEvent::Error {
                        message: e.to_string(),
                        fatal: false,
                    }
                }
            };
            let _ = event_tx.send(event).await;
        });
    }

    async fn on_closed(&mut self, connection_id: u64, reason: String) {
        let was_current = self.slots.is_current(connection_id);
        if self.slots.remove(connection_id).is_none() {
            debug!(connection_id, reason = %reason, "Retired connection ended");
            return;
        }

        if was_current {
            warn!(connection_id, reason = %reason, "EventSub connection lost");
            self.set_connection_state(ConnectionState::Disconnected);
        } else {
            warn!(connection_id, reason = %reason, "Superseded connection ended before handoff");
        }

        self.emit(ClientEvent::Disconnected {
            connection_id,
            reason,
        })
        .await;
    }

    async fn check_keepalive(&mut self) {
        let timeout = match self.session.keepalive_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => return,
        };
        if self.keepalive_warned {
            return;
        }

        let silent_for = self.last_frame_at.elapsed();
        if keepalive_overdue(timeout, self.config.keepalive_grace, silent_for) {
            warn!(
                silent_secs = silent_for.as_secs(),
                keepalive_timeout_secs = timeout.as_secs(),
                "No keepalive from EventSub"
            );
            self.keepalive_warned = true;
            self.emit(ClientEvent::KeepaliveOverdue { silent_for }).await;
        }
    }

    async fn shutdown(&mut self, inbound_rx: &mut mpsc::Receiver<Inbound>) {
        self.set_connection_state(ConnectionState::ShuttingDown);
        let mut open = self.slots.close_all();

        let deadline = tokio::time::sleep(self.config.close_timeout);
        tokio::pin!(deadline);

        while open > 0 {
            tokio::select! {
                inbound = inbound_rx.recv() => match inbound {
                    Some(Inbound::Closed { connection_id, .. }) => {
                        if self.slots.remove(connection_id).is_some() {
                            open -= 1;
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(open, "Timed out waiting for connections to close");
                    break;
                }
            }
        }
    }

    fn set_connection_state(&self, connection_state: ConnectionState) {
        self.state.write().connection_state = connection_state;
    }

    async fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event).await;
    }
}

/// Silence longer than the advertised timeout plus grace
fn keepalive_overdue(timeout: Duration, grace: Duration, silent_for: Duration) -> bool {
    silent_for > timeout.saturating_add(grace)
}

// ─────────────────────────────────────────────────────────────────
// Connection Task
// ─────────────────────────────────────────────────────────────────

/// Open one socket and pump its frames into the session loop
async fn run_connection(
    connection_id: u64,
    url: String,
    delay: Duration,
    connect_timeout: Duration,
    inbound_tx: mpsc::Sender<Inbound>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let reason = match connect_and_read(connection_id, &url, delay, connect_timeout, &inbound_tx, &mut close_rx).await {
        Ok(reason) => reason,
        Err(e) => {
            error!(connection_id, url = %url, error = %e, "EventSub connection failed");
            e.to_string()
        }
    };

    let _ = inbound_tx
        .send(Inbound::Closed {
            connection_id,
            reason,
        })
        .await;
}

/// Returns why the connection ended
async fn connect_and_read(
    connection_id: u64,
    url: &str,
    delay: Duration,
    connect_timeout: Duration,
    inbound_tx: &mpsc::Sender<Inbound>,
    close_rx: &mut oneshot::Receiver<()>,
) -> Result<String> {
    if !delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut *close_rx => return Ok("cancelled before connecting".to_string()),
        }
    }

    debug!(connection_id, url = %url, "Opening WebSocket");
    let ws_stream = tokio::select! {
        result = tokio::time::timeout(connect_timeout, connect_async(url)) => match result {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => return Err(Error::connection_failed(url, e.to_string())),
            Err(_) => {
                return Err(Error::ConnectionTimeout {
                    url: url.to_string(),
                    timeout_secs: connect_timeout.as_secs(),
                })
            }
        },
        _ = &mut *close_rx => return Ok("cancelled while connecting".to_string()),
    };

    if inbound_tx.send(Inbound::Opened { connection_id }).await.is_err() {
        return Ok("session loop ended".to_string());
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut *close_rx => {
                let _ = write.send(WsMessage::Close(None)).await;
                return Ok("closed by client".to_string());
            }

            msg = read.next() => {
                let frame = match msg {
                    Some(Ok(WsMessage::Text(text))) => Frame::from_json(&text),
                    Some(Ok(WsMessage::Binary(data))) => Frame::from_json_bytes(&data),
                    Some(Ok(WsMessage::Ping(data))) => {
                        write.send(WsMessage::Pong(data)).await?;
                        continue;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(connection_id, frame = ?frame, "Received close frame");
                        return Ok(match frame {
                            Some(frame) => format!("server closed ({}): {}", u16::from(frame.code), frame.reason),
                            None => "server closed".to_string(),
                        });
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        return Err(Error::ConnectionLost {
                            message: e.to_string(),
                        })
                    }
                    None => return Ok("stream ended".to_string()),
                };

                match frame {
                    Ok(frame) => {
                        if inbound_tx.send(Inbound::Frame { connection_id, frame }).await.is_err() {
                            return Ok("session loop ended".to_string());
                        }
                    }
                    Err(e) => warn!(connection_id, error = %e, "Failed to parse frame"),
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "../../tests/common/eventsub_server.rs"]
mod test_server;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::subscription::SubscribeOutcome;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::net::TcpListener;

    use super::test_server::{notification, reconnect, welcome, MockEventSub, ServerEvent, WAIT};

    #[derive(Default)]
    struct RecordingSubscriber {
        requests: Mutex<Vec<SubscribeRequest>>,
    }

    #[async_trait]
    impl Subscriber for RecordingSubscriber {
        async fn subscribe(&self, request: &SubscribeRequest) -> Result<SubscribeOutcome> {
            self.requests.lock().push(request.clone());
            Ok(SubscribeOutcome {
                status: 202,
                body: "{}".to_string(),
            })
        }
    }

    fn client(url: &str, reconnect_delay_ms: u64) -> (EventSubClient, Arc<RecordingSubscriber>) {
        let mut overlay = OverlayConfig::default();
        overlay.eventsub.reconnect_delay_ms = reconnect_delay_ms;

        let config = EventSubClientConfig {
            url: url.to_string(),
            ..EventSubClientConfig::default()
        };
        let subscriber = Arc::new(RecordingSubscriber::default());
        let client = EventSubClient::new(config, Dispatcher::from_config(&overlay), subscriber.clone());
        (client, subscriber)
    }

    async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    /// Skip events until one matches
    async fn wait_for<F>(events: &mut mpsc::Receiver<ClientEvent>, mut pred: F) -> (ClientEvent, Vec<ClientEvent>)
    where
        F: FnMut(&ClientEvent) -> bool,
    {
        let mut skipped = Vec::new();
        loop {
            let event = next_event(events).await;
            if pred(&event) {
                return (event, skipped);
            }
            skipped.push(event);
        }
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = EventSubSettings::default();
        settings.environment = crate::config::Environment::Dev;
        let config = EventSubClientConfig::from_settings(&settings);
        assert_eq!(config.url, "ws://localhost:8080/eventsub");
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.keepalive_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_slots_handoff() {
        let mut slots = ConnectionSlots::default();
        let (first, _rx1) = ConnectionHandle::new(0, "ws://a".to_string(), ConnectionOrigin::Initial);
        let (second, mut rx2) = ConnectionHandle::new(1, "ws://b".to_string(), ConnectionOrigin::Reconnect);

        assert!(slots.promote(first).is_none());
        assert!(slots.is_current(0));

        assert!(slots.promote(second).is_none());
        assert!(slots.is_current(1));
        assert_eq!(slots.previous().map(|h| h.id()), Some(0));
        assert_eq!(slots.get(0).map(|h| h.origin()), Some(ConnectionOrigin::Initial));

        let retired = slots.retire_previous().unwrap();
        assert_eq!(retired.id(), 0);
        assert!(slots.previous().is_none());
        assert!(slots.get(0).is_none());

        assert_eq!(slots.close_all(), 1);
        assert!(rx2.try_recv().is_ok());

        assert!(slots.remove(1).is_some());
        assert!(slots.is_empty());
    }

    #[test]
    fn test_slots_double_promote_displaces_previous() {
        let mut slots = ConnectionSlots::default();
        for id in 0..2 {
            let (handle, _) = ConnectionHandle::new(id, format!("ws://{}", id), ConnectionOrigin::Reconnect);
            assert!(slots.promote(handle).is_none());
        }
        let (third, _) = ConnectionHandle::new(2, "ws://2".to_string(), ConnectionOrigin::Reconnect);
        assert_eq!(slots.promote(third).map(|h| h.id()), Some(0));
        assert_eq!(slots.current().map(|h| h.id()), Some(2));
        assert_eq!(slots.previous().map(|h| h.id()), Some(1));
    }

    #[test]
    fn test_keepalive_overdue() {
        let grace = Duration::from_secs(5);
        assert!(!keepalive_overdue(Duration::from_secs(10), grace, Duration::from_secs(14)));
        assert!(keepalive_overdue(Duration::from_secs(10), grace, Duration::from_secs(16)));

        // A huge advertised timeout never overflows
        assert!(!keepalive_overdue(Duration::from_secs(u64::MAX), grace, Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_to_start() {
        let (mut client, _) = client("not a url", 1000);
        assert!(client.start().is_err());
    }

    #[tokio::test]
    async fn test_welcome_subscribes_and_notification_alerts() {
        let mut server = MockEventSub::start().await;
        let (mut client, subscriber) = client(&server.url, 1000);
        let mut events = client.start().unwrap();

        server.expect(ServerEvent::Accepted).await;
        let (connected, _) = wait_for(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;
        assert!(matches!(connected, ClientEvent::Connected { reconnect: false, .. }));

        server.send(welcome("s1"));
        let (welcomed, _) = wait_for(&mut events, |e| matches!(e, ClientEvent::Welcome { .. })).await;
        assert_eq!(
            welcomed,
            ClientEvent::Welcome {
                session_id: "s1".to_string(),
                reconnect: false
            }
        );

        let (subscribed, _) = wait_for(&mut events, |e| matches!(e, ClientEvent::Subscribed { .. })).await;
        assert_eq!(
            subscribed,
            ClientEvent::Subscribed {
                session_id: "s1".to_string(),
                status: 202
            }
        );
        assert_eq!(subscriber.requests.lock().len(), 1);
        assert_eq!(client.session().session_id.as_deref(), Some("s1"));
        assert_eq!(client.connection_state(), ConnectionState::Welcomed);

        server.send(notification("channel.follow", "HNDR"));
        let (alert, _) = wait_for(&mut events, |e| matches!(e, ClientEvent::Alert(_))).await;
        match alert {
            ClientEvent::Alert(request) => {
                assert_eq!(request.username, "HNDR");
                assert_eq!(request.image_id, "twitch-new-follower-img");
                assert_eq!(request.text_color, "#6441a4");
            }
            other => panic!("Expected alert, got {:?}", other),
        }

        client.shutdown().await.unwrap();
        server.expect(ServerEvent::Closed).await;
    }

    #[tokio::test]
    async fn test_reconnect_hands_off_after_new_welcome() {
        let mut old = MockEventSub::start().await;
        let mut new = MockEventSub::start().await;
        let (mut client, subscriber) = client(&old.url, 50);
        let mut events = client.start().unwrap();

        old.expect(ServerEvent::Accepted).await;
        old.send(welcome("s1"));
        wait_for(&mut events, |e| matches!(e, ClientEvent::Subscribed { .. })).await;

        old.send(reconnect("s1", &new.url));
        let (reconnecting, _) = wait_for(&mut events, |e| matches!(e, ClientEvent::Reconnecting { .. })).await;
        assert_eq!(
            reconnecting,
            ClientEvent::Reconnecting {
                url: new.url.clone(),
                delay: Duration::from_millis(50)
            }
        );

        new.expect(ServerEvent::Accepted).await;
        let (connected, _) = wait_for(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;
        assert!(matches!(connected, ClientEvent::Connected { reconnect: true, .. }));

        // The old socket stays open and keeps delivering until the handoff
        old.send(notification("channel.follow", "EGriZZ"));
        wait_for(&mut events, |e| matches!(e, ClientEvent::Alert(_))).await;
        assert!(!old.is_closed());

        new.send(welcome("s1"));
        let (superseded, skipped) =
            wait_for(&mut events, |e| matches!(e, ClientEvent::SupersededClosed { .. })).await;
        assert_eq!(superseded, ClientEvent::SupersededClosed { connection_id: 0 });
        assert!(skipped.contains(&ClientEvent::Welcome {
            session_id: "s1".to_string(),
            reconnect: true
        }));
        assert!(!skipped.iter().any(|e| matches!(e, ClientEvent::Subscribed { .. })));

        old.expect(ServerEvent::Closed).await;
        assert_eq!(subscriber.requests.lock().len(), 1);

        client.shutdown().await.unwrap();
        new.expect(ServerEvent::Closed).await;
    }

    #[tokio::test]
    async fn test_reconnect_waits_for_delay() {
        let mut old = MockEventSub::start().await;
        let mut new = MockEventSub::start().await;
        let (mut client, _) = client(&old.url, 1000);
        let mut events = client.start().unwrap();

        old.expect(ServerEvent::Accepted).await;
        old.send(welcome("s1"));
        wait_for(&mut events, |e| matches!(e, ClientEvent::Subscribed { .. })).await;

        let sent_at = Instant::now();
        old.send(reconnect("s1", &new.url));

        // Nothing dials the new server before the delay has passed
        tokio::time::sleep(Duration::from_millis(800)).await;
        let (_, skipped) = wait_for(&mut events, |e| matches!(e, ClientEvent::Reconnecting { .. })).await;
        assert!(!skipped.iter().any(|e| matches!(e, ClientEvent::Connected { .. })));
        assert!(tokio::time::timeout(Duration::from_millis(1), new.expect(ServerEvent::Accepted))
            .await
            .is_err());

        new.expect(ServerEvent::Accepted).await;
        let waited = sent_at.elapsed();
        assert!(waited >= Duration::from_millis(1000), "reconnected after {:?}", waited);
        assert!(waited < Duration::from_millis(3000), "reconnected after {:?}", waited);

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_ends_session() {
        let mut server = MockEventSub::start().await;
        let (mut client, _) = client(&server.url, 1000);
        let mut events = client.start().unwrap();

        server.expect(ServerEvent::Accepted).await;
        server.close();

        let (disconnected, _) = wait_for(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. })).await;
        assert!(matches!(disconnected, ClientEvent::Disconnected { connection_id: 0, .. }));

        // Nothing is retried, so the loop ends and the channel closes
        let closed = tokio::time::timeout(WAIT, async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);

        let (mut client, _) = client(&url, 1000);
        let mut events = client.start().unwrap();

        let (event, skipped) = wait_for(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. })).await;
        assert!(matches!(event, ClientEvent::Disconnected { connection_id: 0, .. }));
        assert!(!skipped.iter().any(|e| matches!(e, ClientEvent::Connected { .. })));
    }
}
