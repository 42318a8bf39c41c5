//! Session identity, connection state and the read-only session snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::bet::{Bet, BetState, clamp_bet};
use super::history_log::HistoryEntry;
use super::session_id::SessionId;

/// Lifecycle of the persistent connection.
///
/// `Disconnected → Connecting → Connected → Disconnected`; an explicit
/// close moves to the terminal `Closed` state from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection, may connect.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Open and able to send.
    Connected,
    /// Explicitly closed. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// An authenticated session.
///
/// Created when the server answers `AUTH`; destroyed on teardown or when
/// the connection closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Starts a session with the server-issued id.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            started_at: Utc::now(),
        }
    }

    /// Server-issued identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// When the `AUTH` reply arrived.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Point-in-time view of the whole client state for readers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Current session id, if authenticated.
    pub session_id: Option<SessionId>,
    /// Local copy of the wallet balance.
    pub wallet_balance: i64,
    /// Balance the current session's profit is measured from.
    pub initial_balance: Option<i64>,
    /// Connection state.
    pub connection_state: ConnectionState,
    /// Round state.
    pub bet_state: BetState,
    /// Bet awaiting its result.
    pub pending_bet: Option<Bet>,
    /// Whether an `ENDPLAY` request is outstanding.
    pub ending: bool,
    /// Timed-out rounds the server has not settled yet.
    pub unsettled_rounds: u32,
    /// Recent rounds, newest first.
    pub history: Vec<HistoryEntry>,
    /// Number of captured frames.
    pub frame_count: usize,
}

impl SessionSnapshot {
    /// Clamps a requested bet into `1..=wallet_balance`.
    #[must_use]
    pub fn clamp_amount(&self, requested: i64) -> Option<i64> {
        clamp_bet(requested, self.wallet_balance)
    }
}
