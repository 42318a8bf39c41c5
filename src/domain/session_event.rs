//! Events published to the presentation layer.
//!
//! Every observable state change emits a [`SessionEvent`] through the
//! [`super::EventBus`]. Each variant corresponds to one callback of the
//! presentation surface (`onBalanceChange`, `onHistoryAppend`, ...).

use serde::Serialize;

use super::bet::{Choice, RoundResult};
use super::history_log::HistoryEntry;
use super::session::ConnectionState;
use super::session_id::SessionId;

/// Where a balance value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    /// Pushed by the server (`WALLET`, `ENDPLAY`). Overrides local values.
    Authoritative,
    /// Computed locally from a `ROLL`. Superseded by the next push.
    Optimistic,
}

/// Why a pending round was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// Connection closed before `ROLL` arrived.
    ConnectionClosed,
    /// No `ROLL` within the round timeout.
    TimedOut,
    /// A new `AUTH` replaced the session the round belonged to.
    SessionReplaced,
}

/// Observable change of client state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Connection state moved.
    ConnectionStateChanged {
        /// New state.
        state: ConnectionState,
    },

    /// Server accepted `AUTH`.
    SessionStarted {
        /// Issued session id.
        session_id: SessionId,
    },

    /// Wallet balance changed.
    BalanceChanged {
        /// New balance.
        balance: i64,
        /// Whether the value is authoritative or optimistic.
        source: BalanceSource,
    },

    /// `PLAY` was sent.
    BetPlaced {
        /// Amount at stake.
        amount: i64,
        /// Side chosen.
        choice: Choice,
    },

    /// `ROLL` resolved the pending round.
    RoundResolved {
        /// Die face.
        roll: u8,
        /// Verdict.
        result: RoundResult,
        /// Signed balance delta applied.
        delta: i64,
    },

    /// A round was added to history.
    HistoryAppended {
        /// The new entry (front of history).
        entry: HistoryEntry,
    },

    /// A pending round was dropped without resolution.
    RoundAbandoned {
        /// Amount that was at stake.
        amount: i64,
        /// Side that was chosen.
        choice: Choice,
        /// Why.
        reason: AbandonReason,
    },

    /// Server confirmed `ENDPLAY`; the session is torn down.
    SessionEnded {
        /// `final_balance - initial_balance`.
        net_profit: i64,
        /// Balance reported by the server.
        final_balance: i64,
    },

    /// Server sent an `ERROR` frame.
    ServerError {
        /// Message, verbatim.
        message: String,
        /// Optional server error code.
        code: Option<i64>,
    },
}

impl SessionEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::SessionStarted { .. } => "session_started",
            Self::BalanceChanged { .. } => "balance_changed",
            Self::BetPlaced { .. } => "bet_placed",
            Self::RoundResolved { .. } => "round_resolved",
            Self::HistoryAppended { .. } => "history_appended",
            Self::RoundAbandoned { .. } => "round_abandoned",
            Self::SessionEnded { .. } => "session_ended",
            Self::ServerError { .. } => "server_error",
        }
    }
}
