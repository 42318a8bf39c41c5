//! Wire frames: outbound requests, inbound replies and the decoder.
//!
//! Every frame is one JSON object discriminated by its `kind` field.
//! Inbound text is decoded in two steps: a private serde shape checks that
//! the fields required by the declared kind are present, then values are
//! validated into the closed [`InboundFrame`] type. Nothing downstream ever
//! sees an unvalidated frame.

use serde::{Deserialize, Serialize};

use crate::domain::{Choice, RollOutcome, RoundResult, SessionId};
use crate::error::{ProtocolDecodeError, SessionError};

/// Kinds the client knows how to handle when received.
pub const INBOUND_KINDS: [&str; 7] = [
    "AUTH",
    "WALLET",
    "STARTPLAY",
    "ROLL",
    "ENDPLAY",
    "ERROR",
    "UNKNOWN_KIND",
];

/// Client → server request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum OutboundFrame {
    /// Ask the server for a session.
    #[serde(rename = "AUTH")]
    Auth,

    /// Ask for the authoritative wallet balance.
    #[serde(rename = "WALLET")]
    Wallet {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Open a round-play session on the server.
    #[serde(rename = "STARTPLAY")]
    StartPlay {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Place a bet.
    #[serde(rename = "PLAY")]
    Play {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Amount at stake.
        bet: i64,
        /// Side chosen.
        choice: Choice,
    },

    /// Close the round-play session and settle.
    #[serde(rename = "ENDPLAY")]
    EndPlay {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
}

impl OutboundFrame {
    /// Returns the `kind` discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::Wallet { .. } => "WALLET",
            Self::StartPlay { .. } => "STARTPLAY",
            Self::Play { .. } => "PLAY",
            Self::EndPlay { .. } => "ENDPLAY",
        }
    }

    /// Serializes the frame to its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Encode(e.to_string()))
    }
}

/// Validated server → client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Session granted.
    Auth {
        /// Issued id.
        session_id: SessionId,
    },
    /// Authoritative balance.
    Wallet {
        /// Balance.
        wallet: i64,
    },
    /// Round-play session opened.
    StartPlay,
    /// Outcome of the pending bet.
    Roll(RollOutcome),
    /// Session settled.
    EndPlay {
        /// Final balance.
        wallet: i64,
        /// Server-computed net profit.
        profit: i64,
    },
    /// Request refused.
    Error {
        /// Message, verbatim.
        message: String,
        /// Optional error code.
        code: Option<i64>,
    },
    /// Server did not recognize a request kind.
    UnknownKindNotice,
}

impl InboundFrame {
    /// Returns the `kind` discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "AUTH",
            Self::Wallet { .. } => "WALLET",
            Self::StartPlay => "STARTPLAY",
            Self::Roll(_) => "ROLL",
            Self::EndPlay { .. } => "ENDPLAY",
            Self::Error { .. } => "ERROR",
            Self::UnknownKindNotice => "UNKNOWN_KIND",
        }
    }
}

/// Result of decoding a well-formed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A recognized, validated frame.
    Frame(InboundFrame),
    /// A well-formed frame whose kind the client does not handle.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum WireInbound {
    #[serde(rename = "AUTH")]
    Auth {
        #[serde(rename = "sessionId", alias = "clientId")]
        session_id: String,
    },
    #[serde(rename = "WALLET")]
    Wallet { wallet: i64 },
    #[serde(rename = "STARTPLAY")]
    StartPlay {},
    #[serde(rename = "ROLL")]
    Roll { roll: i64, result: RoundResult },
    #[serde(rename = "ENDPLAY")]
    EndPlay { wallet: i64, result: i64 },
    #[serde(rename = "ERROR")]
    Error {
        message: String,
        #[serde(default)]
        code: Option<i64>,
    },
    #[serde(rename = "UNKNOWN_KIND")]
    UnknownKind {},
}

impl TryFrom<WireInbound> for InboundFrame {
    type Error = ProtocolDecodeError;

    fn try_from(wire: WireInbound) -> Result<Self, ProtocolDecodeError> {
        Ok(match wire {
            WireInbound::Auth { session_id } => Self::Auth {
                session_id: SessionId::new(session_id)?,
            },
            WireInbound::Wallet { wallet } => Self::Wallet { wallet },
            WireInbound::StartPlay {} => Self::StartPlay,
            WireInbound::Roll { roll, result } => Self::Roll(RollOutcome::new(roll, result)?),
            WireInbound::EndPlay { wallet, result } => Self::EndPlay {
                wallet,
                profit: result,
            },
            WireInbound::Error { message, code } => Self::Error { message, code },
            WireInbound::UnknownKind {} => Self::UnknownKindNotice,
        })
    }
}

/// Decodes one inbound text frame.
///
/// # Errors
///
/// Returns a [`ProtocolDecodeError`] if the text is not a JSON object, has
/// no string `kind`, or lacks valid fields for a recognized kind.
/// Unrecognized kinds are not an error; they yield [`Decoded::Unknown`].
pub fn decode(text: &str) -> Result<Decoded, ProtocolDecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolDecodeError::Malformed(e.to_string()))?;

    let Some(object) = value.as_object() else {
        return Err(ProtocolDecodeError::NotAnObject);
    };
    let Some(kind) = object.get("kind").and_then(serde_json::Value::as_str) else {
        return Err(ProtocolDecodeError::MissingKind);
    };
    if !INBOUND_KINDS.contains(&kind) {
        return Ok(Decoded::Unknown(kind.to_owned()));
    }
    let kind = kind.to_owned();

    let wire: WireInbound =
        serde_json::from_value(value).map_err(|e| ProtocolDecodeError::InvalidFields {
            kind,
            reason: e.to_string(),
        })?;
    InboundFrame::try_from(wire).map(Decoded::Frame)
}
