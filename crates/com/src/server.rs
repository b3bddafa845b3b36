use {
    crate::{
        ComError,
        engineio::{Handshake, MAX_MESSAGE_SIZE, Packet},
        wire::{self, Prediction, WireSchema},
    },
    futures_util::{SinkExt, StreamExt},
    serde_json::json,
    std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    },
    tokio::{
        net::{TcpListener, TcpStream, ToSocketAddrs},
        sync::{RwLock, watch},
        task::{JoinHandle, spawn_blocking},
        time::{Instant, sleep_until},
    },
    tokio_websockets::{Message, ServerBuilder},
};

/// Turns one JPEG frame into a prediction. `None` means nothing was found,
/// which is answered with `Prediction::no_hand()`.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, jpeg: &[u8]) -> Option<Prediction>;
}

impl<F> Classifier for F
where
    F: Fn(&[u8]) -> Option<Prediction> + Send + Sync + 'static,
{
    fn classify(&self, jpeg: &[u8]) -> Option<Prediction> {
        self(jpeg)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    schema: WireSchema,
    path: String,
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            schema: WireSchema::default(),
            path: "/socket.io/".to_string(),
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(20),
        }
    }
}

impl ServerConfig {
    pub fn with_schema(mut self, schema: WireSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn schema(&self) -> WireSchema {
        self.schema
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }
}

struct Shared {
    config: ServerConfig,
    classifier: Arc<dyn Classifier>,
    clients: RwLock<HashMap<SocketAddr, String>>,
    frames_received: AtomicU64,
    next_sid: AtomicU64,
}

/// A classification service speaking the same Socket.IO protocol as the
/// real one.
///
/// Every client gets its own task. Frames are classified on the blocking
/// pool, one at a time per client. Dropping the server disconnects all
/// clients.
pub struct ClassifierServer {
    shared: Arc<Shared>,
    _shutdown: watch::Sender<()>,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ClassifierServer {
    /// Bind a TCP listener and start accepting Socket.IO clients.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        config: ServerConfig,
        classifier: impl Classifier,
    ) -> Result<Self, ComError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            config,
            classifier: Arc::new(classifier),
            clients: RwLock::new(HashMap::new()),
            frames_received: AtomicU64::new(0),
            next_sid: AtomicU64::new(1),
        });
        let (shutdown, shutdown_rx) = watch::channel(());

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((tcp_stream, addr)) => {
                        let shared = Arc::clone(&accept_shared);
                        let shutdown = shutdown_rx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_client(&shared, tcp_stream, addr, shutdown).await {
                                log::warn!("client {} error: {}", addr, e);
                            }
                            shared.clients.write().await.remove(&addr);
                            log::info!("client {} disconnected", addr);
                        });
                    }
                    Err(e) => {
                        log::warn!("accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        log::info!("classifier server listening on {}", local_addr);
        Ok(Self {
            shared,
            _shutdown: shutdown,
            accept_task,
            local_addr,
        })
    }

    /// Number of clients that completed the Socket.IO handshake.
    pub async fn client_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }

    /// Number of frames received and decoded so far.
    pub fn frames_received(&self) -> u64 {
        self.shared.frames_received.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` endpoint for `ChannelConfig::with_endpoint`.
    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.local_addr)
    }
}

impl Drop for ClassifierServer {
    fn drop(&mut self) {
        // dropping `_shutdown` ends the client tasks
        self.accept_task.abort();
    }
}

async fn serve_client(
    shared: &Shared,
    tcp_stream: TcpStream,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), ComError> {
    let (request, mut ws) = ServerBuilder::new().accept(tcp_stream).await?;
    let path = request.uri().path().trim_matches('/');
    if path != shared.config.path.trim_matches('/') {
        log::warn!("client {} asked for unknown path {:?}", addr, request.uri().path());
        let _ = SinkExt::close(&mut ws).await;
        return Ok(());
    }

    let sid = format!("{:016x}", shared.next_sid.fetch_add(1, Ordering::Relaxed));
    let handshake = Handshake::new(
        sid.clone(),
        shared.config.ping_interval,
        shared.config.ping_timeout,
    );
    ws.send(Message::text(Packet::Open(handshake).encode())).await?;

    let schema = shared.config.schema;
    let mut connected = false;
    let mut ping_at = Instant::now() + shared.config.ping_interval;
    let mut pong_due: Option<Instant> = None;

    loop {
        let wake = pong_due.unwrap_or(ping_at);
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = ws.send(Message::text(Packet::Disconnect.encode())).await;
                let _ = SinkExt::close(&mut ws).await;
                return Ok(());
            }
            _ = sleep_until(wake) => {
                if pong_due.is_some() {
                    return Err(ComError::Timeout("heartbeat"));
                }
                ws.send(Message::text(Packet::Ping.encode())).await?;
                let now = Instant::now();
                pong_due = Some(now + shared.config.ping_timeout);
                ping_at = now + shared.config.ping_interval;
            }
            message = ws.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                };
                if message.is_close() {
                    return Ok(());
                }
                let Some(text) = message.as_text() else {
                    continue;
                };
                if text.len() > MAX_MESSAGE_SIZE {
                    return Err(ComError::MessageTooLarge(text.len()));
                }
                match Packet::parse(text)? {
                    Packet::Connect(_) => {
                        connected = true;
                        shared.clients.write().await.insert(addr, sid.clone());
                        log::info!("client {} connected (sid {})", addr, sid);
                        ws.send(Message::text(Packet::Connect(Some(json!({ "sid": sid }))).encode())).await?;
                    }
                    Packet::Pong => pong_due = None,
                    Packet::Ping => ws.send(Message::text(Packet::Pong.encode())).await?,
                    Packet::Close | Packet::Disconnect => return Ok(()),
                    Packet::Event { name, data, .. } if connected && name == schema.frame_event() => {
                        let jpeg = match wire::decode_frame(schema, &data) {
                            Ok(jpeg) => jpeg,
                            Err(e) => {
                                log::warn!("client {} sent a bad frame: {}", addr, e);
                                continue;
                            }
                        };
                        shared.frames_received.fetch_add(1, Ordering::Relaxed);

                        let classifier = Arc::clone(&shared.classifier);
                        let prediction = spawn_blocking(move || classifier.classify(&jpeg))
                            .await
                            .map_err(|e| ComError::Protocol(format!("classifier failed: {e}")))?
                            .unwrap_or_else(Prediction::no_hand);

                        let (packet, attachments) = wire::encode_prediction(schema, &prediction);
                        ws.send(Message::text(packet.encode())).await?;
                        for attachment in attachments {
                            ws.send(Message::binary(attachment)).await?;
                        }
                    }
                    Packet::Event { name, .. } => log::debug!("client {} sent unhandled event {:?}", addr, name),
                    Packet::Open(_) | Packet::ConnectError(_) | Packet::Noop => {}
                }
            }
        }
    }
}
