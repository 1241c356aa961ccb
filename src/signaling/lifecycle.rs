use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{RelayMessage, ServerMessage};
use super::registry::{Member, Registry, Room, RoomSnapshot};
use super::types::{ConnectionId, OutboundMessage, Role, RoomCode, SignalingError};

/// Which room a connection is in, and on which side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Affiliation {
    pub code: RoomCode,
    pub role: Role,
}

/// Room lifecycle state machine.
///
/// A connection with no affiliation is unaffiliated; `create` moves it to hosting,
/// a successful `join` to joined, and `leave` back to unaffiliated. All replies and
/// notifications are queued from here so that, per connection, they are ordered
/// with the relayed traffic.
#[derive(Debug)]
pub(crate) struct RoomManager {
    registry: Registry,
    affiliations: HashMap<ConnectionId, Affiliation>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            affiliations: HashMap::new(),
        }
    }

    /// Open a new room hosted by `conn`. A connection already in a room leaves it first.
    pub fn create(
        &mut self,
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> RoomCode {
        self.leave(conn);

        let host = Member::new(conn, tx);
        let code = self.registry.allocate();
        host.notify(&ServerMessage::RoomCreated {
            room_code: code,
            role: Role::Host,
        });

        self.registry.put(code, Room::new(code, host));
        self.affiliations.insert(
            conn,
            Affiliation {
                code,
                role: Role::Host,
            },
        );

        info!("Room created: {} by {}", code, conn);
        code
    }

    /// Attach `conn` as the peer of the room named by `requested`.
    ///
    /// The joiner gets `room-joined` (or an `error` envelope), and on success the
    /// host separately gets `peer-joined`.
    pub fn join(
        &mut self,
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
        requested: &str,
    ) -> Result<RoomCode, SignalingError> {
        let requester = Member::new(conn, tx);

        let result = requested
            .parse::<RoomCode>()
            .and_then(|code| self.attach_peer(requester.clone(), code));

        match &result {
            Ok(code) => {
                requester.notify(&ServerMessage::RoomJoined {
                    room_code: *code,
                    role: Role::Peer,
                });
                if let Some(host) = self.registry.get(code).and_then(|room| room.host.as_ref()) {
                    host.notify(&ServerMessage::PeerJoined { role: Role::Host });
                }
                info!("{} joined room {}", conn, code);
            }
            Err(e) => {
                requester.notify(&ServerMessage::error(e));
                info!("{} failed to join {:?}: {}", conn, requested, e);
            }
        }

        result
    }

    fn attach_peer(&mut self, requester: Member, code: RoomCode) -> Result<RoomCode, SignalingError> {
        match self.registry.get(&code) {
            None => return Err(SignalingError::RoomNotFound(code.to_string())),
            Some(room) if room.peer.is_some() => return Err(SignalingError::RoomFull(code)),
            Some(_) => {}
        }
        // A host cannot also take its own room's peer slot.
        if self.affiliations.get(&requester.id).is_some_and(|a| a.code == code) {
            return Err(SignalingError::RoomFull(code));
        }

        self.leave(requester.id);

        let room = self
            .registry
            .get_mut(&code)
            .ok_or_else(|| SignalingError::RoomNotFound(code.to_string()))?;
        room.members.insert(requester.id);
        self.affiliations.insert(
            requester.id,
            Affiliation {
                code,
                role: Role::Peer,
            },
        );
        room.peer = Some(requester);

        Ok(code)
    }

    /// Detach `conn` from its room. Returns false if it was not in one.
    ///
    /// A departing peer leaves the room open for a replacement; a departing host
    /// always closes it.
    pub fn leave(&mut self, conn: ConnectionId) -> bool {
        let Some(Affiliation { code, role }) = self.affiliations.remove(&conn) else {
            return false;
        };
        let Some(room) = self.registry.get_mut(&code) else {
            warn!("{} was affiliated with missing room {}", conn, code);
            return true;
        };

        room.members.remove(&conn);

        match role {
            Role::Peer => {
                room.peer = None;
                if let Some(host) = room.host.as_ref() {
                    host.notify(&ServerMessage::PeerLeft { role: Role::Host });
                }
                info!("Peer {} left room {}", conn, code);
            }
            Role::Host => {
                room.host = None;
                if let Some(peer) = room.peer.take() {
                    peer.notify(&ServerMessage::host_left());
                    room.members.remove(&peer.id);
                    self.affiliations.remove(&peer.id);
                }
                self.registry.remove(&code);
                info!("Room {} closed: host {} left", code, conn);
                return true;
            }
        }

        if room.members.is_empty() {
            self.registry.remove(&code);
            info!("Room {} removed (empty)", code);
        }
        true
    }

    /// Forward a negotiation message to the other member of the sender's room.
    /// Returns whether it was handed to a live connection.
    pub fn relay(&self, conn: ConnectionId, message: RelayMessage) -> bool {
        let kind = message.kind;
        let Some(Affiliation { code, role }) = self.affiliations.get(&conn).copied() else {
            debug!("Dropping {} from unaffiliated {}", kind.as_str(), conn);
            return false;
        };
        let Some(target) = self
            .registry
            .get(&code)
            .and_then(|room| room.counterpart(role))
        else {
            debug!("Dropping {} in room {}: no counterpart for {}", kind.as_str(), code, role);
            return false;
        };

        let out = match message.annotate(role) {
            Ok(out) => out,
            Err(e) => {
                warn!("Failed to encode {} from {}: {}", kind.as_str(), conn, e);
                return false;
            }
        };

        let delivered = target.deliver(out);
        if delivered {
            debug!("Relayed {} in room {}: {} -> {}", kind.as_str(), code, conn, target.id);
        } else {
            debug!("Dropping {} in room {}: {} is gone", kind.as_str(), code, target.id);
        }
        delivered
    }

    #[cfg(test)]
    pub fn affiliation(&self, conn: &ConnectionId) -> Option<Affiliation> {
        self.affiliations.get(conn).copied()
    }

    pub fn room(&self, code: &RoomCode) -> Option<RoomSnapshot> {
        self.registry.get(code).map(Room::snapshot)
    }

    pub fn room_count(&self) -> usize {
        self.registry.len()
    }
}
