//! Frame send/receive path and kind-based routing.
//!
//! [`SessionProtocol`] pairs the connection with the frame log so that
//! every frame is captured at the point it crosses the wire, before any
//! business logic looks at it. Decoded frames are routed to exactly one
//! [`FrameHandler`] method by [`route`].

use super::connection::ConnectionManager;
use super::messages::{self, Decoded, InboundFrame, OutboundFrame};
use crate::domain::{ConnectionState, Direction, FrameLog, RollOutcome, SessionId};
use crate::error::{ProtocolDecodeError, SessionError};

/// Capability to send frames, injected into components that issue requests.
pub trait FrameSink {
    /// State of the underlying connection.
    fn connection_state(&self) -> ConnectionState;

    /// Encodes and transmits `frame`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if encoding fails or the connection is
    /// not open.
    fn send_frame(&mut self, frame: &OutboundFrame) -> Result<(), SessionError>;
}

/// Receiver of decoded inbound frames, one method per kind.
pub trait FrameHandler {
    /// `AUTH` reply.
    fn on_auth(&mut self, session_id: SessionId);
    /// `WALLET` push.
    fn on_wallet(&mut self, wallet: i64);
    /// `STARTPLAY` acknowledgement.
    fn on_start_play(&mut self);
    /// `ROLL` outcome.
    fn on_roll(&mut self, outcome: RollOutcome);
    /// `ENDPLAY` settlement.
    fn on_end_play(&mut self, wallet: i64, profit: i64);
    /// `ERROR` notice.
    fn on_server_error(&mut self, message: String, code: Option<i64>);
    /// `UNKNOWN_KIND` notice.
    fn on_unknown_kind_notice(&mut self);
}

/// Dispatches `frame` to the single matching handler method.
pub fn route<H: FrameHandler + ?Sized>(frame: InboundFrame, handler: &mut H) {
    match frame {
        InboundFrame::Auth { session_id } => handler.on_auth(session_id),
        InboundFrame::Wallet { wallet } => handler.on_wallet(wallet),
        InboundFrame::StartPlay => handler.on_start_play(),
        InboundFrame::Roll(outcome) => handler.on_roll(outcome),
        InboundFrame::EndPlay { wallet, profit } => handler.on_end_play(wallet, profit),
        InboundFrame::Error { message, code } => handler.on_server_error(message, code),
        InboundFrame::UnknownKindNotice => handler.on_unknown_kind_notice(),
    }
}

/// Connection plus frame log: the only path frames take in and out.
#[derive(Debug)]
pub struct SessionProtocol {
    connection: ConnectionManager,
    frame_log: FrameLog,
}

impl SessionProtocol {
    /// Wraps a connection and the log that captures its traffic.
    #[must_use]
    pub const fn new(connection: ConnectionManager, frame_log: FrameLog) -> Self {
        Self {
            connection,
            frame_log,
        }
    }

    /// Records an inbound frame, then decodes it.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolDecodeError`] for malformed or schema-invalid
    /// frames. The frame stays in the log either way.
    pub fn receive(&mut self, text: &str) -> Result<Decoded, ProtocolDecodeError> {
        self.frame_log.record(Direction::Received, text);
        messages::decode(text)
    }

    /// The connection.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// The connection, mutably. Used by the owner to connect, close and
    /// feed lifecycle events.
    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connection
    }

    /// The frame log.
    #[must_use]
    pub const fn frame_log(&self) -> &FrameLog {
        &self.frame_log
    }

    /// Empties the frame log.
    pub fn clear_frame_log(&mut self) {
        self.frame_log.clear();
    }
}

impl FrameSink for SessionProtocol {
    fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    fn send_frame(&mut self, frame: &OutboundFrame) -> Result<(), SessionError> {
        let text = frame.encode()?;
        self.connection.send(text.clone())?;
        self.frame_log.record(Direction::Sent, text);
        Ok(())
    }
}
