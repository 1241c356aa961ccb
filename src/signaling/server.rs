use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message};
use tracing::{debug, error, info, warn};

use super::actor::RoomManagerHandle;
use super::router::MessageRouter;
use super::types::{ConnectionId, OutboundMessage};
use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy)]
struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
}

pub struct SignalingServer {
    listener: TcpListener,
    handle: RoomManagerHandle,
    keepalive: Keepalive,
}

impl SignalingServer {
    /// Bind the listener and start the room manager.
    pub async fn bind(config: &ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!("Signaling server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle: RoomManagerHandle::spawn(),
            keepalive: Keepalive {
                ping_interval: config.ping_interval,
                pong_timeout: config.pong_timeout,
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the room manager, for inspecting live rooms.
    pub fn handle(&self) -> RoomManagerHandle {
        self.handle.clone()
    }

    /// Accept connections until the listener fails.
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            let keepalive = self.keepalive;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, keepalive).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

/// Ping/pong bookkeeping for one connection.
struct Heartbeat {
    ticks: Interval,
    pong_timeout: Duration,
    pong_deadline: Option<Instant>,
}

enum Beat {
    /// A ping is due.
    Ping,
    /// The last ping went unanswered.
    Expired,
}

impl Heartbeat {
    async fn start(keepalive: Keepalive) -> Self {
        let mut ticks = tokio::time::interval(keepalive.ping_interval);
        // the first tick completes immediately
        ticks.tick().await;
        Self {
            ticks,
            pong_timeout: keepalive.pong_timeout,
            pong_deadline: None,
        }
    }

    async fn next(&mut self) -> Beat {
        let deadline = self.pong_deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.ticks.tick() => {
                if self.pong_deadline.is_some() {
                    return Beat::Expired;
                }
                self.pong_deadline = Some(Instant::now() + self.pong_timeout);
                Beat::Ping
            }
            _ = expired => Beat::Expired,
        }
    }

    fn pong_received(&mut self) {
        self.pong_deadline = None;
    }
}

enum Event {
    Beat(Beat),
    Frame(Option<Result<Message, WsError>>),
}

/// Drains the connection's outbound queues into the socket.
fn spawn_writer(
    mut ws_tx: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut ctrl_rx: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(msg) = rx.recv() => Message::Text(msg.into_inner()),
                Some(ctrl) = ctrl_rx.recv() => ctrl,
                else => break,
            };
            if ws_tx.send(frame).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RoomManagerHandle,
    keepalive: Keepalive,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<Message>();
    let writer = spawn_writer(ws_tx, rx, ctrl_rx);

    let router = MessageRouter::new(ConnectionId::generate(), tx, handle);
    info!("WebSocket connection from {} as {}", addr, router.id());

    let mut heartbeat = Heartbeat::start(keepalive).await;

    loop {
        let event = tokio::select! {
            beat = heartbeat.next() => Event::Beat(beat),
            frame = ws_rx.next() => Event::Frame(frame),
        };

        match event {
            Event::Beat(Beat::Ping) => {
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                debug!("Ping sent to {}", addr);
            }
            Event::Beat(Beat::Expired) => {
                warn!("No Pong from {}, disconnecting", addr);
                break;
            }
            Event::Frame(None) => break,
            Event::Frame(Some(Err(e))) => {
                warn!("WebSocket error from {}: {}", addr, e);
                break;
            }
            Event::Frame(Some(Ok(msg))) => match msg {
                Message::Text(text) => router.route(&text).await,
                Message::Binary(_) => {
                    warn!("Ignoring binary frame from {}", router.id());
                }
                Message::Pong(_) => {
                    heartbeat.pong_received();
                    debug!("Pong received from {}", addr);
                }
                Message::Close(_) => {
                    info!("Close received from {}", addr);
                    break;
                }
                _ => {}
            },
        }
    }

    router.disconnect().await;
    writer.abort();
    info!("WebSocket disconnected: {} ({})", addr, router.id());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keepalive() -> Keepalive {
        Keepalive {
            ping_interval: Duration::from_millis(20),
            pong_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn heartbeat_expires_without_pong() {
        let mut heartbeat = Heartbeat::start(keepalive()).await;
        assert!(matches!(heartbeat.next().await, Beat::Ping));
        assert!(matches!(heartbeat.next().await, Beat::Expired));
    }

    #[tokio::test]
    async fn heartbeat_keeps_pinging_while_answered() {
        let mut heartbeat = Heartbeat::start(keepalive()).await;
        for _ in 0..3 {
            assert!(matches!(heartbeat.next().await, Beat::Ping));
            heartbeat.pong_received();
        }
    }
}
