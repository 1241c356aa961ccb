use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::messages::ServerMessage;
use super::types::{ConnectionId, OutboundMessage, Role, RoomCode};

/// Delivery handle for one connection. The socket itself is owned by the
/// connection task; dropping it closes `tx`, which is how liveness is observed.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub id: ConnectionId,
    /// Outbound channel to this connection's writer task.
    pub tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Member {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { id, tx }
    }

    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Hand a message to a live member. Returns false if it was skipped.
    pub fn deliver(&self, msg: OutboundMessage) -> bool {
        self.is_live() && self.tx.send(msg).is_ok()
    }

    pub fn notify(&self, msg: &ServerMessage) -> bool {
        match msg.to_outbound() {
            Ok(out) => self.deliver(out),
            Err(e) => {
                warn!("Failed to encode {:?} for {}: {}", msg, self.id, e);
                false
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct Room {
    pub code: RoomCode,
    pub host: Option<Member>,
    pub peer: Option<Member>,
    /// Everyone attributed to the room; the room is removed when this empties.
    pub members: HashSet<ConnectionId>,
}

impl Room {
    pub fn new(code: RoomCode, host: Member) -> Self {
        Self {
            code,
            members: HashSet::from([host.id]),
            host: Some(host),
            peer: None,
        }
    }

    /// The member a message from `sender` is routed to.
    pub fn counterpart(&self, sender: Role) -> Option<&Member> {
        match sender {
            Role::Host => self.peer.as_ref(),
            Role::Peer => self.host.as_ref(),
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code,
            host: self.host.as_ref().map(|m| m.id),
            peer: self.peer.as_ref().map(|m| m.id),
            members: self.members.len(),
        }
    }
}

/// Point-in-time view of a live room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub host: Option<ConnectionId>,
    pub peer: Option<ConnectionId>,
    pub members: usize,
}

/// Code → room map. Owned by exactly one task, so it carries no locks.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    rooms: HashMap<RoomCode, Room>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A random code that no live room uses.
    pub fn allocate(&self) -> RoomCode {
        self.allocate_with(RoomCode::generate)
    }

    pub fn allocate_with(&self, mut generate: impl FnMut() -> RoomCode) -> RoomCode {
        loop {
            let code = generate();
            if !self.rooms.contains_key(&code) {
                return code;
            }
            debug!("Room code {} already in use, regenerating", code);
        }
    }

    pub fn put(&mut self, code: RoomCode, room: Room) -> Option<Room> {
        self.rooms.insert(code, room)
    }

    pub fn get(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &RoomCode) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn remove(&mut self, code: &RoomCode) -> Option<Room> {
        self.rooms.remove(code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}
