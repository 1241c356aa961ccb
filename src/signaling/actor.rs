use tokio::sync::{mpsc, oneshot};
use tracing::info;

use super::lifecycle::RoomManager;
use super::messages::RelayMessage;
use super::registry::RoomSnapshot;
use super::types::{ConnectionId, OutboundMessage, RoomCode, SignalingError};

/// Commands sent to the room manager actor
pub(crate) enum RoomCommand {
    Create {
        conn: ConnectionId,
        conn_tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<RoomCode>,
    },
    Join {
        conn: ConnectionId,
        code: String,
        conn_tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<Result<RoomCode, SignalingError>>,
    },
    Leave {
        conn: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Relay {
        conn: ConnectionId,
        message: RelayMessage,
    },
    Inspect {
        code: RoomCode,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Sole owner of room state. Commands are applied one at a time, so every
/// check-then-act sequence on a room runs without interleaving.
pub(crate) async fn room_manager_actor(mut rx: mpsc::Receiver<RoomCommand>) {
    let mut rooms = RoomManager::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RoomCommand::Create {
                conn,
                conn_tx,
                reply,
            } => {
                let code = rooms.create(conn, conn_tx);
                let _ = reply.send(code);
            }

            RoomCommand::Join {
                conn,
                code,
                conn_tx,
                reply,
            } => {
                let result = rooms.join(conn, conn_tx, &code);
                let _ = reply.send(result);
            }

            RoomCommand::Leave { conn, reply } => {
                let _ = reply.send(rooms.leave(conn));
            }

            RoomCommand::Relay { conn, message } => {
                rooms.relay(conn, message);
            }

            RoomCommand::Inspect { code, reply } => {
                let _ = reply.send(rooms.room(&code));
            }

            RoomCommand::Count { reply } => {
                let _ = reply.send(rooms.room_count());
            }
        }
    }

    info!("Room manager stopped");
}

/// Handle to communicate with the room manager actor
#[derive(Clone)]
pub struct RoomManagerHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
}

impl RoomManagerHandle {
    /// Spawn the actor on the current runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<RoomCommand>(1024);
        tokio::spawn(room_manager_actor(rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        cmd: RoomCommand,
        reply_rx: oneshot::Receiver<T>,
    ) -> Result<T, SignalingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor dropped reply".to_string()))
    }

    /// Create a new room hosted by `conn`. The `room-created` reply is queued on `conn_tx`.
    pub async fn create_room(
        &self,
        conn: ConnectionId,
        conn_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<RoomCode, SignalingError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(
            RoomCommand::Create {
                conn,
                conn_tx,
                reply,
            },
            reply_rx,
        )
        .await
    }

    /// Join an existing room as its peer. The outcome is also queued on `conn_tx`.
    pub async fn join_room(
        &self,
        conn: ConnectionId,
        code: String,
        conn_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<RoomCode, SignalingError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(
            RoomCommand::Join {
                conn,
                code,
                conn_tx,
                reply,
            },
            reply_rx,
        )
        .await?
    }

    /// Leave the current room, if any. Returns whether the connection was in one.
    pub async fn leave_room(&self, conn: ConnectionId) -> Result<bool, SignalingError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(RoomCommand::Leave { conn, reply }, reply_rx)
            .await
    }

    /// Forward a negotiation message to the other member. Fire and forget.
    pub async fn relay(&self, conn: ConnectionId, message: RelayMessage) {
        let _ = self.tx.send(RoomCommand::Relay { conn, message }).await;
    }

    /// Snapshot of a live room.
    pub async fn room(&self, code: RoomCode) -> Result<Option<RoomSnapshot>, SignalingError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(RoomCommand::Inspect { code, reply }, reply_rx)
            .await
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> Result<usize, SignalingError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(RoomCommand::Count { reply }, reply_rx).await
    }
}
