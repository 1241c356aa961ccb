use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::actor::RoomManagerHandle;
use super::messages::{ClientMessage, Payload, RelayKind, RelayMessage};
use super::types::{ConnectionId, OutboundMessage, SignalingError};

/// Dispatches the text frames of one connection.
///
/// Lifecycle requests go to the room manager; negotiation messages are relayed to
/// the other member. Nothing a client sends can fail the connection: bad frames are
/// logged and dropped.
pub(crate) struct MessageRouter {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<OutboundMessage>,
    handle: RoomManagerHandle,
}

impl MessageRouter {
    pub fn new(
        id: ConnectionId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
        handle: RoomManagerHandle,
    ) -> Self {
        Self { id, tx, handle }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn route(&self, text: &str) {
        let msg = match ClientMessage::decode(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Ignoring message from {}: {}", self.id, e);
                return;
            }
        };

        match self.dispatch(msg).await {
            Ok(()) => {}
            // already answered with an error envelope
            Err(e) if e.is_user_facing() => debug!("{}: {}", self.id, e),
            Err(e) => warn!("Message handling error for {}: {}", self.id, e),
        }
    }

    async fn dispatch(&self, msg: ClientMessage) -> Result<(), SignalingError> {
        match msg {
            ClientMessage::CreateRoom => {
                self.handle.create_room(self.id, self.tx.clone()).await?;
            }
            ClientMessage::JoinRoom { room_code } => {
                self.handle
                    .join_room(self.id, room_code, self.tx.clone())
                    .await?;
            }
            ClientMessage::LeaveRoom => {
                self.handle.leave_room(self.id).await?;
            }
            ClientMessage::Offer(payload) => self.relay(RelayKind::Offer, payload).await,
            ClientMessage::Answer(payload) => self.relay(RelayKind::Answer, payload).await,
            ClientMessage::IceCandidate(payload) => {
                self.relay(RelayKind::IceCandidate, payload).await
            }
        }
        Ok(())
    }

    async fn relay(&self, kind: RelayKind, payload: Payload) {
        self.handle
            .relay(self.id, RelayMessage::new(kind, payload))
            .await;
    }

    /// Transport closed: same as an explicit `leave-room`.
    pub async fn disconnect(&self) {
        if let Err(e) = self.handle.leave_room(self.id).await {
            warn!("Failed to release {}: {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::signaling::types::RoomCode;

    struct TestConn {
        router: MessageRouter,
        rx: mpsc::UnboundedReceiver<OutboundMessage>,
    }

    impl TestConn {
        fn new(handle: &RoomManagerHandle) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                router: MessageRouter::new(ConnectionId::generate(), tx, handle.clone()),
                rx,
            }
        }

        async fn recv(&mut self) -> Value {
            let msg = self.rx.recv().await.unwrap();
            serde_json::from_str(msg.as_str()).unwrap()
        }
    }

    #[tokio::test]
    async fn create_join_and_relay() {
        let handle = RoomManagerHandle::spawn();
        let mut a = TestConn::new(&handle);
        let mut b = TestConn::new(&handle);

        a.router.route(r#"{"type":"create-room"}"#).await;
        let created = a.recv().await;
        assert_eq!(created["type"], "room-created");
        assert_eq!(created["role"], "host");
        let code = created["roomCode"].as_str().unwrap().to_string();

        b.router
            .route(&format!(r#"{{"type":"join-room","roomCode":"{code}"}}"#))
            .await;
        assert_eq!(b.recv().await["type"], "room-joined");
        assert_eq!(a.recv().await["type"], "peer-joined");

        b.router
            .route(r#"{"type":"answer","sdp":"v=0 answer"}"#)
            .await;
        let answer = a.recv().await;
        assert_eq!(answer["sdp"], "v=0 answer");
        assert_eq!(answer["senderRole"], "peer");

        b.router.disconnect().await;
        assert_eq!(a.recv().await["type"], "peer-left");
        let code: RoomCode = code.parse().unwrap();
        assert_eq!(handle.room(code).await.unwrap().unwrap().peer, None);
    }

    #[tokio::test]
    async fn bad_frames_are_ignored() {
        let handle = RoomManagerHandle::spawn();
        let mut a = TestConn::new(&handle);

        a.router.route("{{{").await;
        a.router.route(r#"{"type":"dance"}"#).await;
        a.router.route(r#"{"type":"join-room"}"#).await;
        a.router.route(r#"{"type":"offer","sdp":"early"}"#).await;
        assert!(a.rx.try_recv().is_err());
        assert_eq!(handle.room_count().await.unwrap(), 0);

        // still usable afterwards
        a.router.route(r#"{"type":"create-room"}"#).await;
        assert_eq!(a.recv().await["type"], "room-created");
    }

    #[tokio::test]
    async fn explicit_leave_matches_disconnect() {
        let handle = RoomManagerHandle::spawn();
        let mut a = TestConn::new(&handle);

        a.router.route(r#"{"type":"create-room"}"#).await;
        a.recv().await;
        a.router.route(r#"{"type":"leave-room"}"#).await;
        assert_eq!(handle.room_count().await.unwrap(), 0);

        // leaving twice is harmless
        a.router.route(r#"{"type":"leave-room"}"#).await;
        a.router.disconnect().await;
        assert!(a.rx.try_recv().is_err());
    }
}
