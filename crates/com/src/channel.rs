use {
    crate::{
        ComError,
        engineio::{Handshake, MAX_MESSAGE_SIZE, Packet, TRANSPORT_QUERY},
        wire::{self, PREDICTION_EVENT, Prediction, WireSchema},
    },
    futures_util::{SinkExt, StreamExt},
    serde_json::Value,
    std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    },
    tokio::{
        net::TcpStream,
        sync::{mpsc, watch},
        task::JoinHandle,
        time::{Instant, sleep_until, timeout},
    },
    tokio_websockets::{ClientBuilder, MaybeTlsStream, Message, WebSocketStream},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 16;
const OUTBOUND_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
pub enum ChannelEvent {
    /// Sent once per connection, after the Socket.IO handshake.
    Connected,
    Prediction(Prediction),
    Error(ComError),
    /// Always the last event of a channel.
    Disconnected,
}

/// What `send_frame` did with a frame. Skips are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    SkippedDisconnected,
    SkippedInFlight,
    SkippedClosed,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    endpoint: String,
    path: String,
    schema: WireSchema,
    connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:3000".to_string(),
            path: "/socket.io/".to_string(),
            schema: WireSchema::default(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ChannelConfig {
    /// `ws://host:port`; `http://` and `https://` are accepted too.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_schema(mut self, schema: WireSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn schema(&self) -> WireSchema {
        self.schema
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Full WebSocket URL of the Socket.IO endpoint.
    pub fn url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        let endpoint = if let Some(rest) = endpoint.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = endpoint.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            endpoint.to_string()
        };
        let path = self.path.trim_matches('/');
        format!("{endpoint}/{path}/?{TRANSPORT_QUERY}")
    }
}

/// A Socket.IO connection to the classification service.
///
/// A background task owns the socket. The channel carries at most one frame
/// at a time: `send_frame` marks the channel in flight and the task clears
/// that mark before it reports the matching prediction, an error, or the
/// end of the connection.
pub struct PredictionChannel {
    state: watch::Receiver<ChannelState>,
    outbound: mpsc::Sender<String>,
    in_flight: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    schema: WireSchema,
}

impl PredictionChannel {
    /// Start connecting. Events arrive on the returned receiver, ending
    /// with `ChannelEvent::Disconnected`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: ChannelConfig) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (state_tx, state) = watch::channel(ChannelState::Connecting);
        let (events_tx, events) = mpsc::channel(EVENT_CAPACITY);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let in_flight = Arc::new(AtomicBool::new(false));
        let schema = config.schema();

        let io = ChannelIo {
            config,
            state: state_tx,
            events: events_tx,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            in_flight: Arc::clone(&in_flight),
        };
        let task = tokio::spawn(io.run());

        let channel = Self {
            state,
            outbound,
            in_flight,
            shutdown,
            task: Mutex::new(Some(task)),
            schema,
        };
        (channel, events)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn states(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn schema(&self) -> WireSchema {
        self.schema
    }

    /// Queue one encoded frame.
    ///
    /// Skipped when the channel is closed, not connected, or already has a
    /// frame in flight.
    pub fn send_frame(&self, jpeg: &[u8]) -> SendOutcome {
        if *self.shutdown.borrow() {
            return SendOutcome::SkippedClosed;
        }
        if self.state() != ChannelState::Connected {
            log::debug!("send skipped: channel not connected");
            return SendOutcome::SkippedDisconnected;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("send skipped: frame already in flight");
            return SendOutcome::SkippedInFlight;
        }
        // the connection may have dropped between the two checks
        if self.state() != ChannelState::Connected {
            self.in_flight.store(false, Ordering::Release);
            return SendOutcome::SkippedDisconnected;
        }

        let text = wire::encode_frame(self.schema, jpeg).encode();
        match self.outbound.try_send(text) {
            Ok(()) => SendOutcome::Sent,
            Err(_) => {
                self.in_flight.store(false, Ordering::Release);
                log::debug!("send skipped: connection task gone");
                SendOutcome::SkippedDisconnected
            }
        }
    }

    /// Disconnect and wait for the connection task to finish. Safe to call
    /// more than once.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut task) = task {
            if timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                log::warn!("channel task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for PredictionChannel {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

// a binary event waiting for its attachments
struct PendingEvent {
    name: String,
    data: Value,
    expected: usize,
    attachments: Vec<Vec<u8>>,
}

struct ChannelIo {
    config: ChannelConfig,
    state: watch::Sender<ChannelState>,
    events: mpsc::Sender<ChannelEvent>,
    outbound: mpsc::Receiver<String>,
    shutdown: watch::Receiver<bool>,
    in_flight: Arc<AtomicBool>,
}

impl ChannelIo {
    async fn run(mut self) {
        let url = self.config.url();
        log::info!("connecting to {}", url);

        let mut shutdown = self.shutdown.clone();
        let connected = tokio::select! {
            result = connect(&url, self.config.connect_timeout) => Some(result),
            _ = shutdown.changed() => None,
        };

        let result = match connected {
            Some(Ok((ws, handshake))) => {
                log::info!("connected to {} (sid {})", url, handshake.sid);
                self.state.send_replace(ChannelState::Connected);
                if self.events.send(ChannelEvent::Connected).await.is_ok() {
                    self.serve(ws, &handshake).await
                } else {
                    Ok(())
                }
            }
            Some(Err(error)) => Err(error),
            None => Ok(()),
        };

        self.state.send_replace(ChannelState::Disconnected);
        self.in_flight.store(false, Ordering::Release);
        match result {
            Ok(()) => log::info!("disconnected from {}", url),
            Err(error) => {
                log::warn!("channel to {} failed: {}", url, error);
                let _ = self.events.send(ChannelEvent::Error(error)).await;
            }
        }
        let _ = self.events.send(ChannelEvent::Disconnected).await;
    }

    async fn serve(&mut self, mut ws: WsStream, handshake: &Handshake) -> Result<(), ComError> {
        let ping_deadline = handshake.ping_deadline();
        let mut deadline = Instant::now() + ping_deadline;
        let mut pending: Option<PendingEvent> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    let _ = ws.send(Message::text(Packet::Disconnect.encode())).await;
                    let _ = SinkExt::close(&mut ws).await;
                    return Ok(());
                }
                text = self.outbound.recv() => {
                    let Some(text) = text else {
                        return Ok(());
                    };
                    ws.send(Message::text(text)).await?;
                }
                _ = sleep_until(deadline) => {
                    return Err(ComError::Timeout("heartbeat"));
                }
                message = ws.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(error)) => return Err(error.into()),
                        None => return Ok(()),
                    };
                    deadline = Instant::now() + ping_deadline;

                    if message.is_close() {
                        return Ok(());
                    }
                    if message.is_binary() {
                        let payload = message.into_payload();
                        if payload.len() > MAX_MESSAGE_SIZE {
                            return Err(ComError::MessageTooLarge(payload.len()));
                        }
                        if let Some(event) = pending.as_mut() {
                            event.attachments.push(payload.to_vec());
                            if event.attachments.len() == event.expected {
                                if let Some(event) = pending.take() {
                                    if !self.dispatch(&event.name, &event.data, &event.attachments).await {
                                        return Ok(());
                                    }
                                }
                            }
                        } else {
                            log::debug!("ignoring unexpected binary frame");
                        }
                        continue;
                    }
                    let Some(text) = message.as_text() else {
                        continue;
                    };

                    let packet = match Packet::parse(text) {
                        Ok(packet) => packet,
                        Err(error) => {
                            log::warn!("ignoring malformed packet: {}", error);
                            continue;
                        }
                    };
                    match packet {
                        Packet::Ping => ws.send(Message::text(Packet::Pong.encode())).await?,
                        Packet::Close | Packet::Disconnect => return Ok(()),
                        Packet::ConnectError(data) => {
                            return Err(ComError::Protocol(format!("server rejected namespace: {data}")));
                        }
                        Packet::Event { name, data, attachments: 0 } => {
                            if !self.dispatch(&name, &data, &[]).await {
                                return Ok(());
                            }
                        }
                        Packet::Event { name, data, attachments } => {
                            if let Some(dropped) = pending.take() {
                                log::warn!(
                                    "event {:?} replaced after {} of {} attachments",
                                    dropped.name,
                                    dropped.attachments.len(),
                                    dropped.expected
                                );
                            }
                            pending = Some(PendingEvent {
                                name,
                                data,
                                expected: attachments,
                                attachments: Vec::new(),
                            });
                        }
                        Packet::Open(_) | Packet::Pong | Packet::Connect(_) | Packet::Noop => {}
                    }
                }
            }
        }
    }

    // false once nobody listens for events anymore
    async fn dispatch(&self, name: &str, data: &Value, attachments: &[Vec<u8>]) -> bool {
        if name != PREDICTION_EVENT {
            log::debug!("ignoring event {:?}", name);
            return true;
        }
        self.in_flight.store(false, Ordering::Release);
        let event = match wire::decode_prediction(self.config.schema, data, attachments) {
            Ok(prediction) => ChannelEvent::Prediction(prediction),
            Err(error) => {
                log::warn!("malformed prediction: {}", error);
                ChannelEvent::Error(error)
            }
        };
        self.events.send(event).await.is_ok()
    }
}

/// Open the WebSocket and run the Engine.IO and Socket.IO handshakes.
async fn connect(url: &str, connect_timeout: Duration) -> Result<(WsStream, Handshake), ComError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e| ComError::Protocol(format!("invalid endpoint {url}: {e}")))?;

    let (mut ws, _response) = timeout(connect_timeout, ClientBuilder::from_uri(uri).connect())
        .await
        .map_err(|_| ComError::Timeout("connect"))??;

    let handshake = timeout(connect_timeout, socketio_handshake(&mut ws))
        .await
        .map_err(|_| ComError::Timeout("handshake"))??;

    Ok((ws, handshake))
}

async fn socketio_handshake(ws: &mut WsStream) -> Result<Handshake, ComError> {
    let handshake = loop {
        match next_packet(ws).await? {
            Packet::Open(handshake) => break handshake,
            other => log::debug!("ignoring {:?} before open", other),
        }
    };
    ws.send(Message::text(Packet::Connect(None).encode())).await?;
    loop {
        match next_packet(ws).await? {
            Packet::Connect(_) => return Ok(handshake),
            Packet::ConnectError(data) => {
                return Err(ComError::Protocol(format!("server rejected namespace: {data}")));
            }
            Packet::Ping => ws.send(Message::text(Packet::Pong.encode())).await?,
            Packet::Close | Packet::Disconnect => return Err(ComError::ConnectionClosed),
            other => log::debug!("ignoring {:?} before connect", other),
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> Result<Packet, ComError> {
    loop {
        match ws.next().await {
            Some(Ok(message)) => {
                if message.is_close() {
                    return Err(ComError::ConnectionClosed);
                }
                if let Some(text) = message.as_text() {
                    return Packet::parse(text);
                }
            }
            Some(Err(error)) => return Err(error.into()),
            None => return Err(ComError::ConnectionClosed),
        }
    }
}
