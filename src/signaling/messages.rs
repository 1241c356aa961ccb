use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{OutboundMessage, Role, RoomCode, SignalingError};

/// Opaque body of a relayed negotiation message (everything except `type`).
pub type Payload = Map<String, Value>;

/// Every `type` tag the server understands. Anything else is rejected at the decode
/// boundary as `UnknownMessageType` instead of as a malformed message.
const KNOWN_TYPES: &[&str] = &[
    "create-room",
    "join-room",
    "leave-room",
    "offer",
    "answer",
    "ice-candidate",
];

const HOST_LEFT_MESSAGE: &str = "Host has left the room";

/// Messages sent from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Create a new room and become its host
    CreateRoom,

    /// Join an existing room by code
    JoinRoom {
        #[serde(rename = "roomCode")]
        room_code: String,
    },

    /// Leave the current room
    LeaveRoom,

    /// SDP offer, relayed to the other member
    Offer(Payload),

    /// SDP answer, relayed to the other member
    Answer(Payload),

    /// ICE candidate, relayed to the other member
    IceCandidate(Payload),
}

impl ClientMessage {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, SignalingError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SignalingError::MalformedMessage(e.to_string()))?;

        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            _ => {
                return Err(SignalingError::MalformedMessage(
                    "missing string `type` field".to_string(),
                ));
            }
        };
        if !KNOWN_TYPES.contains(&kind) {
            return Err(SignalingError::UnknownMessageType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|e| SignalingError::MalformedMessage(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
}

impl RelayKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayKind::Offer => "offer",
            RelayKind::Answer => "answer",
            RelayKind::IceCandidate => "ice-candidate",
        }
    }
}

/// A negotiation message on its way to the other member of a room.
#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub kind: RelayKind,
    pub payload: Payload,
}

impl RelayMessage {
    pub fn new(kind: RelayKind, payload: Payload) -> Self {
        Self { kind, payload }
    }

    /// Wire form for the recipient: the original fields, the original `type`, and
    /// `senderRole`. A client-supplied `senderRole` is overwritten.
    pub fn annotate(mut self, sender: Role) -> Result<OutboundMessage, serde_json::Error> {
        self.payload
            .insert("type".to_string(), Value::from(self.kind.as_str()));
        self.payload
            .insert("senderRole".to_string(), Value::from(sender.as_str()));
        serde_json::to_string(&self.payload).map(OutboundMessage::from)
    }
}

/// Messages sent from server to client
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Room created, the requester is its host
    RoomCreated {
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
        role: Role,
    },

    /// Joined a room as its peer
    RoomJoined {
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
        role: Role,
    },

    /// Error response (room not found / room full)
    Error { message: String },

    /// Sent to the host; `role` is the recipient's own role
    PeerJoined { role: Role },

    /// Sent to the host; the room stays open for another peer
    PeerLeft { role: Role },

    /// Sent to the peer right before the room is removed
    HostLeft { message: String },
}

impl ServerMessage {
    pub fn error(err: &SignalingError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    pub fn host_left() -> Self {
        ServerMessage::HostLeft {
            message: HOST_LEFT_MESSAGE.to_string(),
        }
    }

    pub fn to_outbound(&self) -> Result<OutboundMessage, serde_json::Error> {
        serde_json::to_string(self).map(OutboundMessage::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> RoomCode {
        s.parse().unwrap()
    }

    #[test]
    fn parse_create_room() {
        let msg = ClientMessage::decode(r#"{"type": "create-room"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreateRoom));
    }

    #[test]
    fn parse_create_room_ignores_extra_fields() {
        let msg = ClientMessage::decode(r#"{"type": "create-room", "name": "x"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreateRoom));
    }

    #[test]
    fn parse_join_room() {
        let msg = ClientMessage::decode(r#"{"type": "join-room", "roomCode": "abc123"}"#).unwrap();
        if let ClientMessage::JoinRoom { room_code } = msg {
            assert_eq!(room_code, "abc123");
        } else {
            panic!("Expected JoinRoom");
        }
    }

    #[test]
    fn parse_leave_room() {
        let msg = ClientMessage::decode(r#"{"type": "leave-room"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::LeaveRoom));
    }

    #[test]
    fn parse_relay_messages_keep_payload() {
        let msg = ClientMessage::decode(r#"{"type": "offer", "sdp": "v=0"}"#).unwrap();
        match msg {
            ClientMessage::Offer(payload) => {
                assert_eq!(payload.get("sdp"), Some(&Value::from("v=0")));
                assert!(!payload.contains_key("type"));
            }
            other => panic!("Expected Offer, got {other:?}"),
        }

        let msg = ClientMessage::decode(
            r#"{"type": "ice-candidate", "candidate": {"candidate": "a=1", "sdpMid": "0"}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::IceCandidate(_)));

        let msg = ClientMessage::decode(r#"{"type": "answer"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Answer(p) if p.is_empty()));
    }

    #[test]
    fn unknown_type_is_reported_separately() {
        let err = ClientMessage::decode(r#"{"type": "renegotiate"}"#).unwrap_err();
        assert!(matches!(err, SignalingError::UnknownMessageType(t) if t == "renegotiate"));
    }

    #[test]
    fn malformed_messages() {
        for text in [
            "not json",
            "[1, 2, 3]",
            r#"{"roomCode": "ABC123"}"#,
            r#"{"type": 7}"#,
            r#"{"type": "join-room"}"#,
            r#"{"type": "join-room", "roomCode": 12}"#,
        ] {
            let err = ClientMessage::decode(text).unwrap_err();
            assert!(
                matches!(err, SignalingError::MalformedMessage(_)),
                "{text}: {err:?}"
            );
        }
    }

    #[test]
    fn annotate_adds_sender_role() {
        let mut payload = Payload::new();
        payload.insert("sdp".into(), Value::from("v=0"));
        payload.insert("senderRole".into(), Value::from("host"));

        let out = RelayMessage::new(RelayKind::Answer, payload)
            .annotate(Role::Peer)
            .unwrap();
        let value: Value = serde_json::from_str(out.as_str()).unwrap();
        assert_eq!(value["type"], "answer");
        assert_eq!(value["sdp"], "v=0");
        assert_eq!(value["senderRole"], "peer");
    }

    #[test]
    fn serialize_room_created() {
        let msg = ServerMessage::RoomCreated {
            room_code: code("TEST12"),
            role: Role::Host,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"room-created","roomCode":"TEST12","role":"host"}"#
        );
    }

    #[test]
    fn serialize_room_joined() {
        let msg = ServerMessage::RoomJoined {
            room_code: code("TEST12"),
            role: Role::Peer,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"room-joined","roomCode":"TEST12","role":"peer"}"#
        );
    }

    #[test]
    fn serialize_notifications() {
        let json = serde_json::to_string(&ServerMessage::PeerJoined { role: Role::Host }).unwrap();
        assert_eq!(json, r#"{"type":"peer-joined","role":"host"}"#);

        let json = serde_json::to_string(&ServerMessage::PeerLeft { role: Role::Host }).unwrap();
        assert_eq!(json, r#"{"type":"peer-left","role":"host"}"#);

        let json = serde_json::to_string(&ServerMessage::host_left()).unwrap();
        assert!(json.starts_with(r#"{"type":"host-left","message":"#));
    }

    #[test]
    fn serialize_error() {
        let msg = ServerMessage::error(&SignalingError::RoomNotFound("ZZZZZZ".into()));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"Room not found"}"#);
    }
}
