//! Session error types with numeric code mapping.
//!
//! [`SessionError`] is the central error type for the client. Each variant
//! belongs to one category with its own numeric code range so that a
//! presentation layer can map failures without matching on every variant.

use crate::domain::ConnectionState;

/// Reason a bet or session intent was refused by a local guard.
///
/// These are rejected synchronously at the call site. No frame is sent and
/// no state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BetRejection {
    /// A round is already awaiting its result.
    #[error("a bet is already pending")]
    BetPending,

    /// Bet amount must be at least 1.
    #[error("bet amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// Bet amount exceeds the current wallet balance.
    #[error("bet of {amount} exceeds balance of {balance}")]
    InsufficientBalance {
        /// Requested amount.
        amount: i64,
        /// Balance at the time of the request.
        balance: i64,
    },

    /// No authenticated session exists.
    #[error("no active session")]
    NoSession,

    /// An end-of-session request is outstanding.
    #[error("session end already requested")]
    SessionEnding,

    /// A timed-out round has not been settled by the server yet.
    #[error("waiting for the server to settle a timed-out round")]
    RoundUnsettled,
}

/// Failure to decode an inbound frame. The frame is discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolDecodeError {
    /// Payload is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Payload is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Object has no string `kind` field.
    #[error("frame has no kind discriminator")]
    MissingKind,

    /// Required fields for the declared kind are missing or mistyped.
    #[error("invalid {kind} frame: {reason}")]
    InvalidFields {
        /// Declared kind.
        kind: String,
        /// Decoder message.
        reason: String,
    },

    /// `ROLL` carried a value outside 1..=6.
    #[error("roll value {0} out of range 1..=6")]
    RollOutOfRange(i64),

    /// `AUTH` carried an empty session identifier.
    #[error("empty session id")]
    EmptySessionId,
}

/// Client-side error enum with numeric code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category   |
/// |-----------|------------|
/// | 1000–1999 | Invariant  |
/// | 2000–2999 | Connection |
/// | 3000–3999 | Protocol   |
/// | 4000–4999 | Server     |
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A local guard refused the intent.
    #[error("rejected: {0}")]
    Invariant(#[from] BetRejection),

    /// Send attempted while the connection is not open.
    #[error("not connected (state: {state})")]
    NotConnected {
        /// Connection state at the time of the attempt.
        state: ConnectionState,
    },

    /// The connection was explicitly closed and cannot be reused.
    #[error("connection closed")]
    ConnectionClosed,

    /// `connect` called while a connection is already open or opening.
    #[error("connection already {0}")]
    AlreadyConnected(ConnectionState),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection dropped and no reconnect is scheduled.
    #[error("connection lost")]
    ConnectionLost,

    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] ProtocolDecodeError),

    /// An outbound frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A frame arrived that the current state does not expect.
    #[error("unexpected {kind} frame: {reason}")]
    UnexpectedFrame {
        /// Frame kind.
        kind: &'static str,
        /// Why it was not expected.
        reason: String,
    },

    /// The server answered with an `ERROR` frame.
    #[error("server error: {message}")]
    Server {
        /// Server-provided message, verbatim.
        message: String,
        /// Optional server error code.
        code: Option<i64>,
    },

    /// The session event loop is no longer running.
    #[error("session client stopped")]
    ClientStopped,
}

impl SessionError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Invariant(rejection) => match rejection {
                BetRejection::BetPending => 1001,
                BetRejection::NonPositiveAmount(_) => 1002,
                BetRejection::InsufficientBalance { .. } => 1003,
                BetRejection::NoSession => 1004,
                BetRejection::SessionEnding => 1005,
                BetRejection::RoundUnsettled => 1006,
            },
            Self::NotConnected { .. } => 2001,
            Self::ConnectionClosed => 2002,
            Self::AlreadyConnected(_) => 2003,
            Self::ConnectionFailed(_) => 2004,
            Self::ConnectionLost => 2005,
            Self::ClientStopped => 2006,
            Self::Decode(_) => 3001,
            Self::Encode(_) => 3002,
            Self::UnexpectedFrame { .. } => 3003,
            Self::Server { .. } => 4000,
        }
    }

    /// Returns `true` for errors caused by connection state.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self.error_code(), 2000..=2999)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn invariant_codes_in_range() {
        let err = SessionError::from(BetRejection::InsufficientBalance {
            amount: 10,
            balance: 5,
        });
        assert_eq!(err.error_code(), 1003);
        assert!(!err.is_connection_error());
        assert_eq!(err.to_string(), "rejected: bet of 10 exceeds balance of 5");
    }

    #[test]
    fn connection_errors_flagged() {
        let err = SessionError::NotConnected {
            state: ConnectionState::Connecting,
        };
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "not connected (state: connecting)");
    }

    #[test]
    fn decode_error_wraps() {
        let err = SessionError::from(ProtocolDecodeError::RollOutOfRange(9));
        assert_eq!(err.error_code(), 3001);
        assert!(err.to_string().contains("out of range"));
    }
}
