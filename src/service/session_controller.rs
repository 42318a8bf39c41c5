//! Top-level session controller.
//!
//! [`SessionController`] owns the session, the protocol (and through it the
//! only connection handle), the bet controller and the event bus. It is a
//! synchronous state machine: connection events and user intents go in,
//! frames and [`SessionEvent`]s come out. The async loop that feeds it
//! lives in [`super::session_client`].

use tokio::sync::mpsc;

use crate::domain::{
    AbandonReason, BalanceSource, BetState, Choice, ConnectionId, ConnectionState, EventBus,
    FrameLog, RollOutcome, Session, SessionEvent, SessionId, SessionSnapshot,
};
use crate::error::{BetRejection, SessionError};
use crate::service::bet_controller::BetController;
use crate::ws::{
    ConnectionEvent, ConnectionEventKind, ConnectionManager, Decoded, FrameHandler, FrameSink,
    LinkCommand, OutboundFrame, SessionProtocol, route,
};

/// Owner of all client-side session state.
#[derive(Debug)]
pub struct SessionController {
    protocol: SessionProtocol,
    bets: BetController,
    session: Option<Session>,
    events: EventBus,
}

impl SessionController {
    /// Assembles a controller around an unconnected manager.
    #[must_use]
    pub fn new(
        connection: ConnectionManager,
        frame_log: FrameLog,
        history_capacity: usize,
        events: EventBus,
    ) -> Self {
        Self {
            protocol: SessionProtocol::new(connection, frame_log),
            bets: BetController::new(history_capacity),
            session: None,
            events,
        }
    }

    /// Event bus the controller publishes to.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Current session, if authenticated.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Bet controller (read-only).
    #[must_use]
    pub const fn bets(&self) -> &BetController {
        &self.bets
    }

    /// Frame log (read-only).
    #[must_use]
    pub const fn frame_log(&self) -> &FrameLog {
        self.protocol.frame_log()
    }

    /// Connection state.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.protocol.connection().state()
    }

    /// Starts connecting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the manager's error if a connection is open or the manager
    /// was closed.
    pub fn connect(&mut self, endpoint: &str) -> Result<ConnectionId, SessionError> {
        let id = self.protocol.connection_mut().connect(endpoint)?;
        self.publish_connection_state();
        Ok(id)
    }

    /// Attaches an in-process link instead of a socket.
    ///
    /// # Errors
    ///
    /// Same as [`SessionController::connect`].
    pub fn attach(
        &mut self,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<LinkCommand>), SessionError> {
        let attached = self.protocol.connection_mut().attach()?;
        self.publish_connection_state();
        Ok(attached)
    }

    /// Closes the connection for good, abandoning any pending round.
    pub fn close(&mut self) {
        self.protocol.connection_mut().close();
        self.teardown(AbandonReason::ConnectionClosed);
        self.publish_connection_state();
    }

    /// Feeds one connection lifecycle event.
    pub fn handle_connection_event(&mut self, event: ConnectionEvent) {
        if !self.protocol.connection_mut().observe(&event) {
            return;
        }
        match event.kind {
            ConnectionEventKind::Opened => {
                self.publish_connection_state();
                if let Err(err) = self.protocol.send_frame(&OutboundFrame::Auth) {
                    tracing::warn!(error = %err, "failed to send AUTH");
                }
            }
            ConnectionEventKind::Received(text) => self.handle_inbound(&text),
            ConnectionEventKind::Closed { .. } => {
                self.teardown(AbandonReason::ConnectionClosed);
                self.publish_connection_state();
            }
            ConnectionEventKind::Failed(_) => {}
        }
    }

    /// Records, decodes and dispatches one inbound text frame.
    pub fn handle_inbound(&mut self, text: &str) {
        match self.protocol.receive(text) {
            Ok(Decoded::Frame(frame)) => {
                tracing::debug!(kind = frame.kind(), "dispatching frame");
                route(frame, self);
            }
            Ok(Decoded::Unknown(kind)) => {
                tracing::warn!(kind = %kind, "ignoring frame of unknown kind");
            }
            Err(err) => {
                tracing::warn!(error = %err, "discarding undecodable frame");
            }
        }
    }

    /// Re-sends `AUTH`, e.g. to obtain a new session after teardown.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the connection is not open.
    pub fn authenticate(&mut self) -> Result<(), SessionError> {
        self.protocol.send_frame(&OutboundFrame::Auth)
    }

    /// Refreshes the wallet and opens a round-play session on the server.
    ///
    /// The next `WALLET` push becomes the profit baseline.
    ///
    /// # Errors
    ///
    /// Returns [`BetRejection::NoSession`] before `AUTH`,
    /// [`BetRejection::BetPending`] mid-round, or a connection error.
    pub fn start_session(&mut self) -> Result<(), SessionError> {
        let session_id = self.require_session()?;
        if self.bets.state() != BetState::Idle {
            return Err(BetRejection::BetPending.into());
        }
        self.protocol.send_frame(&OutboundFrame::Wallet {
            session_id: session_id.clone(),
        })?;
        self.bets.restart_baseline();
        self.protocol
            .send_frame(&OutboundFrame::StartPlay { session_id })?;
        Ok(())
    }

    /// Places a bet.
    ///
    /// # Errors
    ///
    /// Returns [`BetRejection::NoSession`] before `AUTH`, otherwise see
    /// [`BetController::place_bet`].
    pub fn place_bet(&mut self, amount: i64, choice: Choice) -> Result<(), SessionError> {
        let session_id = self.require_session()?;
        let bet = self
            .bets
            .place_bet(amount, choice, &session_id, &mut self.protocol)?;
        self.events.publish(SessionEvent::BetPlaced {
            amount: bet.amount,
            choice: bet.choice,
        });
        Ok(())
    }

    /// Requests the end of the session.
    ///
    /// # Errors
    ///
    /// Returns [`BetRejection::NoSession`] before `AUTH`, otherwise see
    /// [`BetController::end_session`].
    pub fn end_session(&mut self) -> Result<(), SessionError> {
        let session_id = self.require_session()?;
        self.bets.end_session(&session_id, &mut self.protocol)
    }

    /// Abandons the pending round, if any.
    ///
    /// A timed-out round stays unsettled until its late `ROLL` arrives.
    pub fn abandon_round(&mut self, reason: AbandonReason) {
        let dropped = match reason {
            AbandonReason::TimedOut => self.bets.time_out(),
            AbandonReason::ConnectionClosed | AbandonReason::SessionReplaced => self.bets.abandon(),
        };
        if let Some(bet) = dropped {
            self.events.publish(SessionEvent::RoundAbandoned {
                amount: bet.amount,
                choice: bet.choice,
                reason,
            });
        }
    }

    /// Empties the frame log.
    pub fn clear_frame_log(&mut self) {
        self.protocol.clear_frame_log();
    }

    /// Point-in-time view of all client state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session.as_ref().map(|s| s.id().clone()),
            wallet_balance: self.bets.balance(),
            initial_balance: self.bets.initial_balance(),
            connection_state: self.connection_state(),
            bet_state: self.bets.state(),
            pending_bet: self.bets.pending().cloned(),
            ending: self.bets.is_ending(),
            unsettled_rounds: self.bets.unsettled(),
            history: self.bets.history().entries().copied().collect(),
            frame_count: self.frame_log().len(),
        }
    }

    fn require_session(&self) -> Result<SessionId, SessionError> {
        self.session
            .as_ref()
            .map(|s| s.id().clone())
            .ok_or_else(|| BetRejection::NoSession.into())
    }

    fn teardown(&mut self, reason: AbandonReason) {
        self.abandon_round(reason);
        if let Some(session) = self.session.take() {
            tracing::info!(session_id = %session.id(), "session torn down");
        }
        self.bets.reset();
    }

    fn publish_connection_state(&self) {
        self.events.publish(SessionEvent::ConnectionStateChanged {
            state: self.connection_state(),
        });
    }

    fn publish_balance(&self, source: BalanceSource) {
        self.events.publish(SessionEvent::BalanceChanged {
            balance: self.bets.balance(),
            source,
        });
    }
}

impl FrameHandler for SessionController {
    fn on_auth(&mut self, session_id: SessionId) {
        if let Some(previous) = &self.session {
            tracing::warn!(previous = %previous.id(), "replacing existing session");
            self.abandon_round(AbandonReason::SessionReplaced);
        }
        self.bets.reset();
        self.session = Some(Session::new(session_id.clone()));
        tracing::info!(session_id = %session_id, "authenticated");
        self.events.publish(SessionEvent::SessionStarted {
            session_id: session_id.clone(),
        });
        if let Err(err) = self.protocol.send_frame(&OutboundFrame::Wallet { session_id }) {
            tracing::warn!(error = %err, "failed to request wallet");
        }
    }

    fn on_wallet(&mut self, wallet: i64) {
        self.bets.apply_wallet(wallet);
        self.publish_balance(BalanceSource::Authoritative);
    }

    fn on_start_play(&mut self) {
        tracing::info!("server opened round play");
    }

    fn on_roll(&mut self, outcome: RollOutcome) {
        if self.bets.settle_timed_out() {
            tracing::warn!(roll = outcome.roll(), result = %outcome.result(), "roll for timed-out round, resyncing wallet");
            if let Some(session) = &self.session {
                let resync = OutboundFrame::Wallet {
                    session_id: session.id().clone(),
                };
                if let Err(err) = self.protocol.send_frame(&resync) {
                    tracing::warn!(error = %err, "failed to request wallet");
                }
            }
            return;
        }
        match self.bets.resolve(outcome) {
            Ok(resolution) => {
                self.publish_balance(BalanceSource::Optimistic);
                self.events.publish(SessionEvent::RoundResolved {
                    roll: resolution.outcome.roll(),
                    result: resolution.outcome.result(),
                    delta: resolution.delta,
                });
                self.events.publish(SessionEvent::HistoryAppended {
                    entry: resolution.entry,
                });
            }
            Err(err) => tracing::warn!(error = %err, "protocol anomaly"),
        }
    }

    fn on_end_play(&mut self, wallet: i64, profit: i64) {
        match self.bets.complete_session(wallet, profit) {
            Ok(summary) => {
                self.publish_balance(BalanceSource::Authoritative);
                self.events.publish(SessionEvent::SessionEnded {
                    net_profit: summary.net_profit,
                    final_balance: summary.final_balance,
                });
                if let Some(session) = self.session.take() {
                    tracing::info!(
                        session_id = %session.id(),
                        net_profit = summary.net_profit,
                        "session ended"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "protocol anomaly");
                self.on_wallet(wallet);
            }
        }
    }

    fn on_server_error(&mut self, message: String, code: Option<i64>) {
        let err = SessionError::Server {
            message: message.clone(),
            code,
        };
        tracing::warn!(error = %err, error_code = err.error_code(), server_code = ?code, "server refused request");
        if self.bets.cancel_end() {
            tracing::info!("end request withdrawn after server error");
        }
        self.events
            .publish(SessionEvent::ServerError { message, code });
    }

    fn on_unknown_kind_notice(&mut self) {
        tracing::warn!("server did not recognize a request kind");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Direction, RoundResult};
    use tokio::sync::broadcast;

    struct Harness {
        controller: SessionController,
        link: ConnectionId,
        commands: mpsc::UnboundedReceiver<LinkCommand>,
        events: broadcast::Receiver<SessionEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let (connection, _events_rx) = ConnectionManager::new();
            let bus = EventBus::new(64);
            let events = bus.subscribe();
            let mut controller = SessionController::new(connection, FrameLog::new(64), 20, bus);
            let Ok((link, commands)) = controller.attach() else {
                panic!("attach failed");
            };
            Self {
                controller,
                link,
                commands,
                events,
            }
        }

        fn feed(&mut self, kind: ConnectionEventKind) {
            self.controller
                .handle_connection_event(ConnectionEvent::new(self.link, kind));
        }

        fn receive(&mut self, text: &str) {
            self.feed(ConnectionEventKind::Received(text.to_string()));
        }

        fn sent(&mut self) -> Vec<serde_json::Value> {
            let mut out = Vec::new();
            while let Ok(command) = self.commands.try_recv() {
                if let LinkCommand::Text(text) = command {
                    let Ok(value) = serde_json::from_str(&text) else {
                        panic!("outbound frame is not json: {text}");
                    };
                    out.push(value);
                }
            }
            out
        }

        fn drain_events(&mut self) -> Vec<SessionEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        /// Opens the link and completes AUTH + WALLET with balance 500.
        fn authenticated() -> Self {
            let mut h = Self::new();
            h.feed(ConnectionEventKind::Opened);
            h.receive(r#"{"kind":"AUTH","sessionId":"abc"}"#);
            h.receive(r#"{"kind":"WALLET","wallet":500}"#);
            let _ = h.sent();
            let _ = h.drain_events();
            h
        }
    }

    #[test]
    fn end_to_end_round_and_settlement() {
        let mut h = Harness::new();
        h.feed(ConnectionEventKind::Opened);
        assert_eq!(h.sent(), vec![serde_json::json!({"kind": "AUTH"})]);

        h.receive(r#"{"kind":"AUTH","sessionId":"abc"}"#);
        assert_eq!(
            h.sent(),
            vec![serde_json::json!({"kind": "WALLET", "sessionId": "abc"})]
        );

        h.receive(r#"{"kind":"WALLET","wallet":500}"#);
        assert_eq!(h.controller.bets().balance(), 500);

        assert!(h.controller.place_bet(50, Choice::Odd).is_ok());
        assert_eq!(
            h.sent(),
            vec![serde_json::json!({"kind": "PLAY", "sessionId": "abc", "bet": 50, "choice": "ODD"})]
        );
        assert_eq!(h.controller.bets().state(), BetState::AwaitingResult);

        h.receive(r#"{"kind":"ROLL","roll":3,"result":"WIN"}"#);
        assert_eq!(h.controller.bets().balance(), 550);
        assert_eq!(h.controller.bets().state(), BetState::Idle);

        assert!(h.controller.end_session().is_ok());
        assert_eq!(
            h.sent(),
            vec![serde_json::json!({"kind": "ENDPLAY", "sessionId": "abc"})]
        );

        let _ = h.drain_events();
        h.receive(r#"{"kind":"ENDPLAY","wallet":550,"result":50}"#);
        let events = h.drain_events();
        assert!(events.contains(&SessionEvent::SessionEnded {
            net_profit: 50,
            final_balance: 550
        }));
        assert!(h.controller.session().is_none());
        assert!(matches!(
            h.controller.place_bet(1, Choice::Odd),
            Err(SessionError::Invariant(BetRejection::NoSession))
        ));
    }

    #[test]
    fn roll_publishes_balance_history_and_resolution() {
        let mut h = Harness::authenticated();
        assert!(h.controller.place_bet(50, Choice::Odd).is_ok());
        h.receive(r#"{"kind":"ROLL","roll":3,"result":"WIN"}"#);

        let events = h.drain_events();
        let Some(entry) = h.controller.bets().history().latest().copied() else {
            panic!("history entry expected");
        };
        assert_eq!(
            events,
            vec![
                SessionEvent::BetPlaced {
                    amount: 50,
                    choice: Choice::Odd
                },
                SessionEvent::BalanceChanged {
                    balance: 550,
                    source: BalanceSource::Optimistic
                },
                SessionEvent::RoundResolved {
                    roll: 3,
                    result: RoundResult::Win,
                    delta: 50
                },
                SessionEvent::HistoryAppended { entry },
            ]
        );
        assert_eq!(entry.magnitude(), 50);
    }

    #[test]
    fn wallet_push_is_authoritative() {
        let mut h = Harness::authenticated();
        h.receive(r#"{"kind":"WALLET","wallet":42}"#);
        assert_eq!(h.controller.bets().balance(), 42);
        assert_eq!(
            h.drain_events(),
            vec![SessionEvent::BalanceChanged {
                balance: 42,
                source: BalanceSource::Authoritative
            }]
        );
    }

    #[test]
    fn bet_while_awaiting_sends_nothing() {
        let mut h = Harness::authenticated();
        assert!(h.controller.place_bet(10, Choice::Even).is_ok());
        assert_eq!(h.sent().len(), 1);
        assert!(h.controller.place_bet(10, Choice::Even).is_err());
        assert!(h.sent().is_empty());
        assert!(h.controller.end_session().is_err());
        assert!(h.sent().is_empty());
    }

    #[test]
    fn bad_frames_leave_state_untouched_but_are_logged() {
        let mut h = Harness::authenticated();
        let before = h.controller.frame_log().len();
        h.receive("not json at all");
        h.receive(r#"{"kind":"ROLL","roll":12,"result":"WIN"}"#);
        h.receive(r#"{"kind":"MYSTERY"}"#);
        h.receive(r#"{"kind":"ROLL","roll":3,"result":"WIN"}"#);

        assert_eq!(h.controller.bets().balance(), 500);
        assert!(h.controller.bets().history().is_empty());
        assert!(h.drain_events().is_empty());
        assert_eq!(h.controller.frame_log().len(), before + 4);
        assert_eq!(
            h.controller
                .frame_log()
                .in_direction(Direction::Received)
                .count(),
            6
        );
    }

    #[test]
    fn server_error_surfaces_without_state_change() {
        let mut h = Harness::authenticated();
        assert!(h.controller.place_bet(10, Choice::Odd).is_ok());
        let _ = h.drain_events();
        h.receive(r#"{"kind":"ERROR","message":"Insufficient points","code":1}"#);
        assert_eq!(
            h.drain_events(),
            vec![SessionEvent::ServerError {
                message: "Insufficient points".to_string(),
                code: Some(1)
            }]
        );
        assert_eq!(h.controller.bets().state(), BetState::AwaitingResult);
        assert_eq!(h.controller.bets().balance(), 500);
    }

    #[test]
    fn server_error_withdraws_end_request() {
        let mut h = Harness::authenticated();
        assert!(h.controller.end_session().is_ok());
        h.receive(r#"{"kind":"ERROR","message":"Not playing"}"#);
        assert!(!h.controller.bets().is_ending());
        assert!(h.controller.end_session().is_ok());
    }

    #[test]
    fn close_mid_round_abandons_and_tears_down() {
        let mut h = Harness::authenticated();
        assert!(h.controller.place_bet(25, Choice::Even).is_ok());
        let _ = h.drain_events();

        h.feed(ConnectionEventKind::Closed {
            code: None,
            reason: String::new(),
        });
        assert_eq!(h.controller.bets().state(), BetState::Idle);
        assert_eq!(h.controller.bets().balance(), 500);
        assert!(h.controller.session().is_none());
        assert_eq!(
            h.drain_events(),
            vec![
                SessionEvent::RoundAbandoned {
                    amount: 25,
                    choice: Choice::Even,
                    reason: AbandonReason::ConnectionClosed
                },
                SessionEvent::ConnectionStateChanged {
                    state: ConnectionState::Disconnected
                },
            ]
        );
        assert!(matches!(
            h.controller.place_bet(1, Choice::Odd),
            Err(SessionError::Invariant(BetRejection::NoSession))
        ));
    }

    #[test]
    fn start_session_refreshes_wallet_and_rebases_profit() {
        let mut h = Harness::authenticated();
        assert!(h.controller.start_session().is_ok());
        assert_eq!(
            h.sent(),
            vec![
                serde_json::json!({"kind": "WALLET", "sessionId": "abc"}),
                serde_json::json!({"kind": "STARTPLAY", "sessionId": "abc"}),
            ]
        );
        assert_eq!(h.controller.bets().initial_balance(), None);
        h.receive(r#"{"kind":"WALLET","wallet":700}"#);
        h.receive(r#"{"kind":"STARTPLAY"}"#);
        assert_eq!(h.controller.bets().initial_balance(), Some(700));
    }

    #[test]
    fn intents_before_auth_rejected() {
        let mut h = Harness::new();
        h.feed(ConnectionEventKind::Opened);
        let _ = h.sent();
        assert!(matches!(
            h.controller.start_session(),
            Err(SessionError::Invariant(BetRejection::NoSession))
        ));
        assert!(matches!(
            h.controller.end_session(),
            Err(SessionError::Invariant(BetRejection::NoSession))
        ));
        assert!(h.sent().is_empty());
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut h = Harness::authenticated();
        assert!(h.controller.place_bet(50, Choice::Odd).is_ok());
        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.session_id.map(|id| id.to_string()), Some("abc".to_string()));
        assert_eq!(snapshot.wallet_balance, 500);
        assert_eq!(snapshot.connection_state, ConnectionState::Connected);
        assert_eq!(snapshot.bet_state, BetState::AwaitingResult);
        assert_eq!(snapshot.pending_bet.map(|b| b.amount), Some(50));
        assert_eq!(snapshot.frame_count, 5);
    }

    #[test]
    fn explicit_close_is_terminal() {
        let mut h = Harness::authenticated();
        h.controller.close();
        assert_eq!(h.controller.connection_state(), ConnectionState::Closed);
        assert!(matches!(
            h.controller.connect("ws://127.0.0.1:1/"),
            Err(SessionError::ConnectionClosed)
        ));
    }

    #[test]
    fn late_roll_after_timeout_resyncs_instead_of_resolving() {
        let mut h = Harness::authenticated();
        h.receive(r#"{"kind":"WALLET","wallet":1000}"#);
        assert!(h.controller.place_bet(100, Choice::Odd).is_ok());
        let _ = h.sent();
        let _ = h.drain_events();

        h.controller.abandon_round(AbandonReason::TimedOut);
        assert_eq!(
            h.drain_events(),
            vec![SessionEvent::RoundAbandoned {
                amount: 100,
                choice: Choice::Odd,
                reason: AbandonReason::TimedOut,
            }]
        );
        assert!(matches!(
            h.controller.place_bet(7, Choice::Even),
            Err(SessionError::Invariant(BetRejection::RoundUnsettled))
        ));
        assert_eq!(h.controller.snapshot().unsettled_rounds, 1);

        h.receive(r#"{"kind":"ROLL","roll":3,"result":"WIN"}"#);
        assert_eq!(
            h.sent(),
            vec![serde_json::json!({"kind": "WALLET", "sessionId": "abc"})]
        );
        assert!(h.drain_events().is_empty());
        assert_eq!(h.controller.bets().balance(), 1000);
        assert!(h.controller.bets().history().is_empty());

        h.receive(r#"{"kind":"WALLET","wallet":1100}"#);
        assert_eq!(h.controller.bets().balance(), 1100);
        assert!(h.controller.place_bet(7, Choice::Even).is_ok());
        h.receive(r#"{"kind":"ROLL","roll":3,"result":"LOSE"}"#);
        assert_eq!(h.controller.bets().balance(), 1093);
        assert_eq!(
            h.controller.bets().history().latest().map(|e| e.magnitude()),
            Some(7)
        );
    }

    #[test]
    fn second_auth_abandons_round_as_replaced() {
        let mut h = Harness::authenticated();
        assert!(h.controller.place_bet(20, Choice::Even).is_ok());
        let _ = h.drain_events();

        h.receive(r#"{"kind":"AUTH","sessionId":"def"}"#);
        let events = h.drain_events();
        assert_eq!(
            events.first(),
            Some(&SessionEvent::RoundAbandoned {
                amount: 20,
                choice: Choice::Even,
                reason: AbandonReason::SessionReplaced,
            })
        );
        assert_eq!(h.controller.connection_state(), ConnectionState::Connected);
        assert_eq!(h.controller.bets().state(), BetState::Idle);
    }
}
