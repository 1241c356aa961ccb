//! WebSocket signaling server pairing a host and a peer by room code

mod actor;
mod lifecycle;
mod messages;
mod registry;
mod router;
mod server;
mod types;

pub use actor::RoomManagerHandle;
pub use messages::{ClientMessage, Payload, RelayKind, RelayMessage, ServerMessage};
pub use registry::RoomSnapshot;
pub use server::SignalingServer;
pub use types::{ConnectionId, OutboundMessage, Role, RoomCode, SignalingError};
