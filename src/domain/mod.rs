//! Domain layer: session types, round history, frame capture and events.
//!
//! This module contains the client-side domain model: identifiers, bets
//! and roll outcomes, the bounded round history, the always-on frame log,
//! and the event bus that carries state changes to the presentation layer.

pub mod bet;
pub mod event_bus;
pub mod frame_log;
pub mod history_log;
pub mod session;
pub mod session_event;
pub mod session_id;

pub use bet::{Bet, BetState, BetStatus, Choice, RollOutcome, RoundResult, clamp_bet};
pub use event_bus::{EventBus, EventStream};
pub use frame_log::{Direction, FrameLog, FrameLogEntry, FrameLogEvent, FrameTap};
pub use history_log::{DEFAULT_HISTORY_CAPACITY, HistoryEntry, HistoryLog};
pub use session::{ConnectionState, Session, SessionSnapshot};
pub use session_event::{AbandonReason, BalanceSource, SessionEvent};
pub use session_id::{ConnectionId, SessionId};
