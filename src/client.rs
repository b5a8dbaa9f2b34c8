//! WebSocket client for the BrandMeister last heard feed.
//!
//! This module handles the Socket.IO connection to the BrandMeister API,
//! including the Engine.IO handshake, keep-alive pings, and streaming of
//! event frames. The session controller only sees the [`Transport`] and
//! [`Feed`] traits.

use anyhow::{Context, Result, anyhow, bail};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::error::MonitorError;
use crate::parser::{Frame, PacketKind, parse_frame};

/// Default BrandMeister last heard Socket.IO endpoint.
pub const BM_LASTHEARD_URL: &str =
    "wss://api.brandmeister.network/lh/socket.io/?EIO=4&transport=websocket";

/// How long [`Feed::close`] waits for the socket task before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for the last heard client.
#[derive(Debug, Clone)]
pub struct LastHeardClientConfig {
    /// WebSocket URL of the Socket.IO endpoint.
    pub url: String,

    /// Timeout for the TCP/TLS connect and the Socket.IO handshake.
    pub connect_timeout: Duration,

    /// Maximum silence before the connection is considered dead.
    /// The server pings every 25 seconds, so this only trips on a stale link.
    pub read_timeout: Duration,

    /// How many times to reconnect after the connection drops.
    pub reconnect_attempts: u32,

    /// Delay before reconnecting.
    pub reconnect_delay: Duration,
}

impl Default for LastHeardClientConfig {
    fn default() -> Self {
        Self {
            url: BM_LASTHEARD_URL.to_string(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(90),
            reconnect_attempts: 1,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl LastHeardClientConfig {
    /// Create a new configuration with the given endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set how many reconnects are attempted after a drop.
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }
}

/// Events from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// An event frame was received.
    Message(String),

    /// The Socket.IO session was established.
    Connected,

    /// Connection was lost.
    Disconnected(String),

    /// An error occurred.
    Error(String),
}

/// A live feed handle.
pub trait Feed {
    /// Wait for the next event. `None` means the feed is gone for good.
    fn next_event(&mut self) -> impl Future<Output = Option<FeedEvent>>;

    /// Shut the connection down and release the socket.
    fn close(self) -> impl Future<Output = ()>
    where
        Self: Sized;
}

/// Something that can open a [`Feed`].
pub trait Transport {
    type Feed: Feed;

    /// Open the feed. Fails with [`MonitorError::Connection`] if unreachable.
    fn connect(&self) -> impl Future<Output = Result<Self::Feed, MonitorError>>;
}

/// Async BrandMeister last heard client.
pub struct LastHeardClient {
    config: LastHeardClientConfig,
}

impl LastHeardClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LastHeardClientConfig) -> Self {
        Self { config }
    }
}

impl Transport for LastHeardClient {
    type Feed = FeedConnection;

    /// Connect and complete the handshake, then stream in a background task.
    async fn connect(&self) -> Result<FeedConnection, MonitorError> {
        let ws = open(&self.config)
            .await
            .map_err(|e| MonitorError::connection(format!("{:#}", e)))?;

        let (tx, rx) = mpsc::channel(1000);
        let (stop_tx, stop_rx) = oneshot::channel();
        let config = self.config.clone();
        let task = tokio::spawn(async move {
            run_connection_loop(config, ws, tx, stop_rx).await;
        });

        Ok(FeedConnection {
            events: rx,
            stop: Some(stop_tx),
            task,
        })
    }
}

/// A connected feed. Owns the background socket task.
pub struct FeedConnection {
    events: mpsc::Receiver<FeedEvent>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Feed for FeedConnection {
    async fn next_event(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        // Unblocks the task if it is waiting on a full channel
        self.events.close();

        match timeout(CLOSE_TIMEOUT, &mut self.task).await {
            Ok(_) => debug!("Feed connection closed"),
            Err(_) => {
                warn!("Feed connection did not close in time, aborting");
                self.task.abort();
            }
        }
    }
}

/// What to do with an inbound text frame.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Reply(&'static str),
    Forward,
    Connected,
    Refused(String),
    Closed,
    Ignore,
}

fn classify(text: &str) -> Action {
    match parse_frame(text) {
        // Engine.IO open: join the default namespace
        Ok(Frame::Open(_)) => Action::Reply("40"),
        Ok(Frame::Ping) => Action::Reply("3"),
        Ok(Frame::Close) => Action::Closed,
        Ok(Frame::Message(packet)) => match packet.kind {
            PacketKind::Connect => Action::Connected,
            PacketKind::ConnectError => Action::Refused(packet.data.to_string()),
            PacketKind::Disconnect => Action::Closed,
            PacketKind::Event | PacketKind::BinaryEvent => Action::Forward,
            PacketKind::Ack | PacketKind::BinaryAck => Action::Ignore,
        },
        Ok(_) => Action::Ignore,
        // Let the session report it
        Err(_) => Action::Forward,
    }
}

/// Open the WebSocket and complete the Socket.IO handshake.
async fn open(config: &LastHeardClientConfig) -> Result<WsStream> {
    info!("Connecting to {}...", config.url);

    let (mut ws, _response) = timeout(config.connect_timeout, connect_async(config.url.as_str()))
        .await
        .context("Connection timeout")?
        .context("Failed to connect")?;

    timeout(config.connect_timeout, handshake(&mut ws))
        .await
        .context("Handshake timeout")??;

    info!("Connected to {}", config.url);
    Ok(ws)
}

async fn handshake(ws: &mut WsStream) -> Result<()> {
    while let Some(message) = ws.next().await {
        let Message::Text(text) = message.context("Read error")? else {
            continue;
        };
        match classify(text.as_str()) {
            Action::Reply(reply) => ws
                .send(Message::Text(reply.into()))
                .await
                .context("Failed to send handshake")?,
            Action::Connected => return Ok(()),
            Action::Refused(reason) => bail!("Server refused connection: {}", reason),
            Action::Closed => bail!("Server closed connection during handshake"),
            Action::Forward | Action::Ignore => {
                debug!("Ignoring frame during handshake: {}", text.as_str());
            }
        }
    }
    bail!("Connection closed during handshake")
}

/// Why a connection stopped streaming.
enum StreamEnd {
    /// [`Feed::close`] was called or the handle was dropped.
    Stopped,
    /// The server closed the connection.
    Closed,
}

/// Run the connection, reconnecting up to `reconnect_attempts` times.
///
/// Dropping `tx` on return closes the feed.
async fn run_connection_loop(
    config: LastHeardClientConfig,
    ws: WsStream,
    tx: mpsc::Sender<FeedEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ws = Some(ws);
    let mut reconnects_left = config.reconnect_attempts;

    while let Some(stream) = ws.take() {
        let _ = tx.send(FeedEvent::Connected).await;

        match stream_frames(stream, &config, &tx, &mut stop_rx).await {
            Ok(StreamEnd::Stopped) => return,
            Ok(StreamEnd::Closed) => {
                info!("Connection closed by server");
            }
            Err(e) => {
                error!("Connection error: {:#}", e);
                let _ = tx.send(FeedEvent::Error(format!("{:#}", e))).await;
            }
        }

        let _ = tx
            .send(FeedEvent::Disconnected("Connection lost".to_string()))
            .await;

        if reconnects_left == 0 {
            break;
        }
        reconnects_left -= 1;

        info!(
            "Reconnecting in {} seconds...",
            config.reconnect_delay.as_secs()
        );
        tokio::select! {
            _ = &mut stop_rx => return,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }

        tokio::select! {
            _ = &mut stop_rx => return,
            result = open(&config) => match result {
                Ok(stream) => ws = Some(stream),
                Err(e) => {
                    error!("Reconnect failed: {:#}", e);
                    let _ = tx.send(FeedEvent::Error(format!("{:#}", e))).await;
                }
            }
        }
    }

    info!("Giving up on the feed");
}

/// Forward event frames until the connection ends or a stop is requested.
async fn stream_frames(
    mut ws: WsStream,
    config: &LastHeardClientConfig,
    tx: &mpsc::Sender<FeedEvent>,
    stop_rx: &mut oneshot::Receiver<()>,
) -> Result<StreamEnd> {
    loop {
        tokio::select! {
            _ = &mut *stop_rx => {
                if let Err(e) = ws.close(None).await {
                    debug!("Error closing socket: {}", e);
                }
                return Ok(StreamEnd::Stopped);
            }

            read = timeout(config.read_timeout, ws.next()) => {
                let message = match read {
                    Err(_) => {
                        warn!("Read timeout, connection may be stale");
                        return Err(anyhow!("Read timeout"));
                    }
                    Ok(None) => return Ok(StreamEnd::Closed),
                    Ok(Some(message)) => message.context("Read error")?,
                };

                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => return Ok(StreamEnd::Closed),
                    // WebSocket-level pings are answered by tungstenite
                    _ => continue,
                };

                match classify(text.as_str()) {
                    Action::Reply(reply) => {
                        ws.send(Message::Text(reply.into()))
                            .await
                            .context("Failed to send reply")?;
                    }
                    Action::Forward => {
                        if tx.send(FeedEvent::Message(text.to_string())).await.is_err() {
                            // Receiver closed
                            return Ok(StreamEnd::Stopped);
                        }
                    }
                    Action::Closed => return Ok(StreamEnd::Closed),
                    Action::Refused(reason) => bail!("Server refused connection: {}", reason),
                    Action::Connected | Action::Ignore => {
                        debug!("Received: {}", text.as_str());
                    }
                }
            }
        }
    }
}
