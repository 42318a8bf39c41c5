//! Betting state machine.
//!
//! [`BetController`] is the only writer of the local wallet balance. It
//! enforces the single-in-flight-bet discipline (`Idle → AwaitingResult →
//! Idle`), applies `ROLL` outcomes as optimistic balance updates, takes
//! `WALLET`/`ENDPLAY` values as authoritative, and keeps the round history.
//! Frames go out through an injected [`FrameSink`].

use crate::domain::{
    Bet, BetState, BetStatus, Choice, HistoryEntry, HistoryLog, RollOutcome, SessionId, clamp_bet,
};
use crate::error::{BetRejection, SessionError};
use crate::ws::{FrameSink, OutboundFrame};

/// Effect of a resolved round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    /// The bet, now resolved.
    pub bet: Bet,
    /// Server outcome.
    pub outcome: RollOutcome,
    /// Signed delta applied to the balance.
    pub delta: i64,
    /// Balance after the delta.
    pub balance: i64,
    /// Entry prepended to history.
    pub entry: HistoryEntry,
}

/// Settlement reported when the server confirms `ENDPLAY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Balance reported by the server.
    pub final_balance: i64,
    /// `final_balance - initial_balance`.
    pub net_profit: i64,
}

/// Round state machine and wallet owner.
#[derive(Debug, Clone)]
pub struct BetController {
    state: BetState,
    balance: i64,
    initial_balance: Option<i64>,
    pending: Option<Bet>,
    ending: bool,
    unsettled: u32,
    history: HistoryLog,
}

impl BetController {
    /// Creates an idle controller with zero balance.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: BetState::Idle,
            balance: 0,
            initial_balance: None,
            pending: None,
            ending: false,
            unsettled: 0,
            history: HistoryLog::new(history_capacity),
        }
    }

    /// Round state.
    #[must_use]
    pub const fn state(&self) -> BetState {
        self.state
    }

    /// Local wallet balance.
    #[must_use]
    pub const fn balance(&self) -> i64 {
        self.balance
    }

    /// Balance the session's profit is measured from.
    #[must_use]
    pub const fn initial_balance(&self) -> Option<i64> {
        self.initial_balance
    }

    /// Bet awaiting its result.
    #[must_use]
    pub const fn pending(&self) -> Option<&Bet> {
        self.pending.as_ref()
    }

    /// Whether an `ENDPLAY` request is outstanding.
    #[must_use]
    pub const fn is_ending(&self) -> bool {
        self.ending
    }

    /// Timed-out rounds whose `ROLL` has not arrived yet.
    #[must_use]
    pub const fn unsettled(&self) -> u32 {
        self.unsettled
    }

    /// Recent rounds.
    #[must_use]
    pub const fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Clamps a requested amount into `1..=balance`.
    ///
    /// Returns `None` when the balance cannot cover any bet.
    #[must_use]
    pub fn clamp_amount(&self, requested: i64) -> Option<i64> {
        clamp_bet(requested, self.balance)
    }

    /// Sends `PLAY` and moves to `AwaitingResult`.
    ///
    /// # Errors
    ///
    /// Returns [`BetRejection`] (as [`SessionError::Invariant`]) when a bet
    /// is pending, a timed-out round is unsettled, an end request is
    /// outstanding, or the amount is outside
    /// `1..=balance`; [`SessionError::NotConnected`] when the connection is
    /// not open; or the sink's error if sending fails. No frame is sent and
    /// no state changes in any error case.
    pub fn place_bet<S: FrameSink + ?Sized>(
        &mut self,
        amount: i64,
        choice: Choice,
        session_id: &SessionId,
        sink: &mut S,
    ) -> Result<Bet, SessionError> {
        if self.state != BetState::Idle {
            return Err(BetRejection::BetPending.into());
        }
        if self.unsettled > 0 {
            return Err(BetRejection::RoundUnsettled.into());
        }
        if self.ending {
            return Err(BetRejection::SessionEnding.into());
        }
        let state = sink.connection_state();
        if state != crate::domain::ConnectionState::Connected {
            return Err(SessionError::NotConnected { state });
        }
        if amount < 1 {
            return Err(BetRejection::NonPositiveAmount(amount).into());
        }
        if amount > self.balance {
            return Err(BetRejection::InsufficientBalance {
                amount,
                balance: self.balance,
            }
            .into());
        }

        sink.send_frame(&OutboundFrame::Play {
            session_id: session_id.clone(),
            bet: amount,
            choice,
        })?;

        let bet = Bet::pending(amount, choice);
        self.pending = Some(bet.clone());
        self.state = BetState::AwaitingResult;
        tracing::info!(amount, %choice, "bet placed");
        Ok(bet)
    }

    /// Applies the outcome of the pending round.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnexpectedFrame`] if no round is pending.
    /// Balance and history are untouched in that case.
    pub fn resolve(&mut self, outcome: RollOutcome) -> Result<RoundResolution, SessionError> {
        let (BetState::AwaitingResult, Some(mut bet)) = (self.state, self.pending.take()) else {
            return Err(SessionError::UnexpectedFrame {
                kind: "ROLL",
                reason: format!("no bet pending (state: {})", self.state),
            });
        };

        let delta = outcome.result().delta(bet.amount);
        self.balance = self.balance.saturating_add(delta);
        let entry = HistoryEntry::new(outcome, bet.amount);
        self.history.push(entry);
        self.state = BetState::Idle;
        bet.status = BetStatus::Resolved;

        tracing::info!(
            roll = outcome.roll(),
            result = %outcome.result(),
            delta,
            balance = self.balance,
            "round resolved"
        );
        Ok(RoundResolution {
            bet,
            outcome,
            delta,
            balance: self.balance,
            entry,
        })
    }

    /// Overwrites the balance with an authoritative server value.
    ///
    /// The first value seen in a session becomes the profit baseline.
    pub fn apply_wallet(&mut self, wallet: i64) {
        if self.balance != wallet {
            tracing::debug!(local = self.balance, server = wallet, "balance overwritten");
        }
        self.balance = wallet;
        if self.initial_balance.is_none() {
            self.initial_balance = Some(wallet);
        }
    }

    /// Forgets the profit baseline; the next `WALLET` sets a new one.
    pub fn restart_baseline(&mut self) {
        self.initial_balance = None;
    }

    /// Sends `ENDPLAY` and marks the end request.
    ///
    /// # Errors
    ///
    /// Returns [`BetRejection::BetPending`] while a round is unresolved,
    /// [`BetRejection::RoundUnsettled`] while a timed-out round awaits its
    /// `ROLL`, [`BetRejection::SessionEnding`] if already requested, or the
    /// sink's error if sending fails.
    pub fn end_session<S: FrameSink + ?Sized>(
        &mut self,
        session_id: &SessionId,
        sink: &mut S,
    ) -> Result<(), SessionError> {
        if self.state != BetState::Idle {
            return Err(BetRejection::BetPending.into());
        }
        if self.unsettled > 0 {
            return Err(BetRejection::RoundUnsettled.into());
        }
        if self.ending {
            return Err(BetRejection::SessionEnding.into());
        }
        sink.send_frame(&OutboundFrame::EndPlay {
            session_id: session_id.clone(),
        })?;
        self.ending = true;
        tracing::info!(%session_id, "session end requested");
        Ok(())
    }

    /// Withdraws an outstanding end request, e.g. after the server refused
    /// it.
    pub fn cancel_end(&mut self) -> bool {
        std::mem::replace(&mut self.ending, false)
    }

    /// Settles the session on the server's `ENDPLAY` reply.
    ///
    /// Net profit is measured from the session baseline; the server's own
    /// figure is used only when no baseline is known.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnexpectedFrame`] if no end was requested.
    pub fn complete_session(
        &mut self,
        wallet: i64,
        server_profit: i64,
    ) -> Result<SessionSummary, SessionError> {
        if !self.ending {
            return Err(SessionError::UnexpectedFrame {
                kind: "ENDPLAY",
                reason: "no end requested".to_string(),
            });
        }
        self.balance = wallet;
        let net_profit = self
            .initial_balance
            .map_or(server_profit, |initial| wallet.saturating_sub(initial));
        if net_profit != server_profit {
            tracing::warn!(
                local = net_profit,
                server = server_profit,
                "net profit differs from server figure"
            );
        }
        self.reset();
        Ok(SessionSummary {
            final_balance: wallet,
            net_profit,
        })
    }

    /// Drops the pending round without resolution and returns to `Idle`.
    pub fn abandon(&mut self) -> Option<Bet> {
        self.state = BetState::Idle;
        let mut bet = self.pending.take()?;
        bet.status = BetStatus::Abandoned;
        tracing::warn!(amount = bet.amount, choice = %bet.choice, "round abandoned");
        Some(bet)
    }

    /// Gives up waiting for the pending round's `ROLL`.
    ///
    /// The server still owns the round, so it is counted as unsettled: new
    /// bets are refused until its `ROLL` is consumed by
    /// [`BetController::settle_timed_out`].
    pub fn time_out(&mut self) -> Option<Bet> {
        let bet = self.abandon()?;
        self.unsettled += 1;
        Some(bet)
    }

    /// Consumes a `ROLL` that belongs to a timed-out round.
    ///
    /// Returns `false` when the roll must be resolved normally. The outcome
    /// of a settled round is not applied locally; the caller resyncs the
    /// wallet instead.
    pub fn settle_timed_out(&mut self) -> bool {
        if self.state != BetState::Idle || self.unsettled == 0 {
            return false;
        }
        self.unsettled -= 1;
        tracing::info!(remaining = self.unsettled, "late roll for timed-out round discarded");
        true
    }

    /// Clears all round state for a new session. Keeps the balance.
    pub fn reset(&mut self) {
        self.state = BetState::Idle;
        self.pending = None;
        self.ending = false;
        self.unsettled = 0;
        self.initial_balance = None;
        self.history.clear();
    }
}

impl Default for BetController {
    fn default() -> Self {
        Self::new(crate::domain::DEFAULT_HISTORY_CAPACITY)
    }
}
