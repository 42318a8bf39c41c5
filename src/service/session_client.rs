//! Async driver for the session controller.
//!
//! [`SessionClient::run`] is the single task all session work happens on.
//! It selects over connection events, user intents from any number of
//! [`SessionHandle`]s, the round-timeout timer and the reconnect timer, and
//! feeds each into the [`SessionController`] in arrival order.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::domain::{
    AbandonReason, BetState, Choice, ConnectionState, EventBus, FrameLog, FrameLogEvent,
    FrameTap, SessionEvent, SessionSnapshot,
};
use crate::error::SessionError;
use crate::service::session_controller::SessionController;
use crate::ws::{ConnectionEvent, ConnectionEventKind, ConnectionManager, ReconnectPolicy};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// User intent carried from a [`SessionHandle`] to the event loop.
#[derive(Debug)]
pub enum Intent {
    /// Re-send `AUTH`.
    Authenticate(Reply<()>),
    /// Refresh the wallet and open round play.
    StartSession(Reply<()>),
    /// Place a bet.
    PlaceBet {
        /// Amount at stake.
        amount: i64,
        /// Side chosen.
        choice: Choice,
        /// Outcome of the local guards and the send.
        reply: Reply<()>,
    },
    /// Request the end of the session.
    EndSession(Reply<()>),
    /// Empty the frame log.
    ClearFrameLog(Reply<()>),
    /// Read the current state.
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Close the connection and stop the loop.
    Disconnect(Reply<()>),
}

/// Cloneable handle the presentation layer drives the session with.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<Intent>,
    events: EventBus,
    frames: FrameTap,
}

impl SessionHandle {
    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Subscribes to frame log changes.
    #[must_use]
    pub fn subscribe_frames(&self) -> broadcast::Receiver<FrameLogEvent> {
        self.frames.subscribe()
    }

    /// Re-sends `AUTH` to obtain a new session.
    ///
    /// # Errors
    ///
    /// Returns the controller's error, or [`SessionError::ClientStopped`].
    pub async fn authenticate(&self) -> Result<(), SessionError> {
        self.request(Intent::Authenticate).await
    }

    /// Refreshes the wallet and opens round play.
    ///
    /// # Errors
    ///
    /// Returns the controller's error, or [`SessionError::ClientStopped`].
    pub async fn start_session(&self) -> Result<(), SessionError> {
        self.request(Intent::StartSession).await
    }

    /// Places a bet. Resolves once `PLAY` is sent or refused, not when the
    /// round resolves.
    ///
    /// # Errors
    ///
    /// Returns the guard rejection or connection error, or
    /// [`SessionError::ClientStopped`].
    pub async fn place_bet(&self, amount: i64, choice: Choice) -> Result<(), SessionError> {
        self.request(|reply| Intent::PlaceBet {
            amount,
            choice,
            reply,
        })
        .await
    }

    /// Requests the end of the session.
    ///
    /// # Errors
    ///
    /// Returns the guard rejection or connection error, or
    /// [`SessionError::ClientStopped`].
    pub async fn end_session(&self) -> Result<(), SessionError> {
        self.request(Intent::EndSession).await
    }

    /// Empties the frame log.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ClientStopped`] if the loop has exited.
    pub async fn clear_frame_log(&self) -> Result<(), SessionError> {
        self.request(Intent::ClearFrameLog).await
    }

    /// Reads the current state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ClientStopped`] if the loop has exited.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.intents
            .send(Intent::Snapshot(tx))
            .map_err(|_| SessionError::ClientStopped)?;
        rx.await.map_err(|_| SessionError::ClientStopped)
    }

    /// Closes the connection and stops the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ClientStopped`] if the loop has already
    /// exited.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(Intent::Disconnect).await
    }

    async fn request<F>(&self, make: F) -> Result<(), SessionError>
    where
        F: FnOnce(Reply<()>) -> Intent,
    {
        let (tx, rx) = oneshot::channel();
        self.intents
            .send(make(tx))
            .map_err(|_| SessionError::ClientStopped)?;
        rx.await.map_err(|_| SessionError::ClientStopped)?
    }
}

/// The session event loop.
#[derive(Debug)]
pub struct SessionClient {
    controller: SessionController,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    intents: mpsc::UnboundedReceiver<Intent>,
    endpoint: String,
    reconnect: ReconnectPolicy,
    round_timeout: Option<Duration>,
}

impl SessionClient {
    /// Builds the loop and its first handle from configuration.
    #[must_use]
    pub fn new(config: &ClientConfig) -> (Self, SessionHandle) {
        let (connection, connection_events) = ConnectionManager::new();
        let frame_log = FrameLog::new(config.frame_log_channel_capacity);
        let frames = frame_log.tap();
        let events = EventBus::new(config.event_bus_capacity);
        let controller =
            SessionController::new(connection, frame_log, config.history_capacity, events.clone());
        let (intents_tx, intents) = mpsc::unbounded_channel();

        let client = Self {
            controller,
            connection_events,
            intents,
            endpoint: config.endpoint.clone(),
            reconnect: config.reconnect,
            round_timeout: config.round_timeout,
        };
        let handle = SessionHandle {
            intents: intents_tx,
            events,
            frames,
        };
        (client, handle)
    }

    /// Connects and processes events until disconnected.
    ///
    /// Returns `Ok(())` after [`SessionHandle::disconnect`] or once every
    /// handle is dropped.
    ///
    /// # Errors
    ///
    /// Once the reconnect policy is exhausted, returns
    /// [`SessionError::ConnectionFailed`] if no connection ever opened and
    /// [`SessionError::ConnectionLost`] otherwise.
    pub async fn run(mut self) -> Result<(), SessionError> {
        self.controller.connect(&self.endpoint)?;

        let mut attempts: u32 = 0;
        let mut connect_failure: Option<String> = None;
        let mut ever_opened = false;
        let mut reconnect_at: Option<Instant> = None;
        let mut round_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                event = self.connection_events.recv() => {
                    let Some(event) = event else { break };
                    let opened = event.kind == ConnectionEventKind::Opened;
                    if let ConnectionEventKind::Failed(message) = &event.kind {
                        if self.controller.connection_state() == ConnectionState::Connecting {
                            connect_failure = Some(message.clone());
                        }
                    }
                    self.controller.handle_connection_event(event);
                    if opened && self.controller.connection_state() == ConnectionState::Connected {
                        attempts = 0;
                        ever_opened = true;
                    }
                    if self.controller.connection_state() == ConnectionState::Disconnected
                        && reconnect_at.is_none()
                    {
                        let Some(delay) = self.reconnect.delay_for(attempts) else {
                            tracing::error!(attempts, "connection lost, not reconnecting");
                            return Err(match connect_failure.take() {
                                Some(message) if !ever_opened => SessionError::ConnectionFailed(message),
                                _ => SessionError::ConnectionLost,
                            });
                        };
                        attempts += 1;
                        tracing::info!(attempt = attempts, delay_ms = delay.as_millis(), "scheduling reconnect");
                        reconnect_at = Some(Instant::now() + delay);
                    }
                }
                intent = self.intents.recv() => {
                    let Some(intent) = intent else {
                        tracing::debug!("all handles dropped");
                        self.controller.close();
                        break;
                    };
                    if self.handle_intent(intent) {
                        break;
                    }
                    if self.controller.bets().state() == BetState::AwaitingResult
                        && round_deadline.is_none()
                    {
                        round_deadline = self.round_timeout.map(|t| Instant::now() + t);
                    }
                }
                () = sleep_until(round_deadline) => {
                    round_deadline = None;
                    tracing::warn!("no ROLL before round timeout");
                    self.controller.abandon_round(AbandonReason::TimedOut);
                }
                () = sleep_until(reconnect_at) => {
                    reconnect_at = None;
                    if let Err(err) = self.controller.connect(&self.endpoint) {
                        tracing::error!(error = %err, "reconnect failed");
                        return Err(err);
                    }
                }
            }

            if self.controller.bets().state() == BetState::Idle {
                round_deadline = None;
            }
        }

        Ok(())
    }

    /// Executes one intent. Returns `true` when the loop must stop.
    fn handle_intent(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::Authenticate(reply) => {
                let _ = reply.send(self.controller.authenticate());
            }
            Intent::StartSession(reply) => {
                let _ = reply.send(self.controller.start_session());
            }
            Intent::PlaceBet {
                amount,
                choice,
                reply,
            } => {
                let result = self.controller.place_bet(amount, choice);
                if let Err(err) = &result {
                    tracing::info!(error = %err, amount, %choice, "bet refused");
                }
                let _ = reply.send(result);
            }
            Intent::EndSession(reply) => {
                let _ = reply.send(self.controller.end_session());
            }
            Intent::ClearFrameLog(reply) => {
                self.controller.clear_frame_log();
                let _ = reply.send(Ok(()));
            }
            Intent::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            Intent::Disconnect(reply) => {
                self.controller.close();
                let _ = reply.send(Ok(()));
                return true;
            }
        }
        false
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
