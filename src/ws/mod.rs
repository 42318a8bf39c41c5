//! WebSocket layer: connection lifecycle, wire frames, routing, reconnect.
//!
//! The session talks to the dice authority over one persistent WebSocket
//! connection carrying JSON text frames discriminated by `kind`.

pub mod connection;
pub mod messages;
pub mod protocol;
pub mod reconnect;

pub use connection::{ConnectionEvent, ConnectionEventKind, ConnectionManager, LinkCommand};
pub use messages::{Decoded, InboundFrame, OutboundFrame};
pub use protocol::{FrameHandler, FrameSink, SessionProtocol, route};
pub use reconnect::ReconnectPolicy;
