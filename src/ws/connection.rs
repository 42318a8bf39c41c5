//! Connection lifecycle and the socket I/O task.
//!
//! [`ConnectionManager`] owns the connection state machine and a narrow
//! send surface. Socket reads and writes run in a spawned task that only
//! reports [`ConnectionEvent`]s; the manager's state changes when the owner
//! feeds those events back through [`ConnectionManager::observe`], so the
//! state has exactly one writer.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::{ConnectionId, ConnectionState};
use crate::error::SessionError;

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEventKind {
    /// Handshake completed.
    Opened,
    /// A text frame arrived.
    Received(String),
    /// The connection ended.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// A transport error occurred. A `Closed` event follows.
    Failed(String),
}

/// Event reported by a connection's I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Connection the event belongs to.
    pub connection: ConnectionId,
    /// What happened.
    pub kind: ConnectionEventKind,
}

impl ConnectionEvent {
    /// Creates an event for `connection`.
    #[must_use]
    pub const fn new(connection: ConnectionId, kind: ConnectionEventKind) -> Self {
        Self { connection, kind }
    }
}

/// Instruction for a connection's I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Write a text frame.
    Text(String),
    /// Send a close frame and stop.
    Close,
}

#[derive(Debug)]
struct Link {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

/// Owner of the persistent connection.
///
/// `Disconnected → Connecting → Connected → Disconnected`. [`close`] moves
/// to the terminal `Closed` state from any state. The manager never
/// reconnects on its own.
///
/// [`close`]: ConnectionManager::close
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    link: Option<Link>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Creates a disconnected manager and the receiver its connections
    /// report to.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            state: ConnectionState::Disconnected,
            link: None,
            events,
        };
        (manager, events_rx)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id of the current connection, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.link.as_ref().map(|link| link.id)
    }

    /// Starts connecting to a `ws://` or `wss://` endpoint.
    ///
    /// Must be called inside a tokio runtime. The outcome is reported as
    /// `Opened` or `Failed`/`Closed` events.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionClosed`] after [`close`], or
    /// [`SessionError::AlreadyConnected`] while connecting or connected.
    ///
    /// [`close`]: ConnectionManager::close
    pub fn connect(&mut self, endpoint: &str) -> Result<ConnectionId, SessionError> {
        let (id, commands_rx) = self.open_link()?;
        let events = self.events.clone();
        let endpoint = endpoint.to_owned();
        tracing::info!(connection = %id, endpoint = %endpoint, "connecting");
        tokio::spawn(run_link(id, endpoint, events, commands_rx));
        Ok(id)
    }

    /// Attaches an in-process link in place of a socket.
    ///
    /// The caller receives every [`LinkCommand`] the manager issues and
    /// reports the link's events itself. Used to drive a session without a
    /// network, e.g. in tests or over a custom transport.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionManager::connect`].
    pub fn attach(
        &mut self,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<LinkCommand>), SessionError> {
        self.open_link()
    }

    fn open_link(
        &mut self,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<LinkCommand>), SessionError> {
        match self.state {
            ConnectionState::Closed => return Err(SessionError::ConnectionClosed),
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(SessionError::AlreadyConnected(self.state));
            }
            ConnectionState::Disconnected => {}
        }
        let id = ConnectionId::new();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        self.link = Some(Link { id, commands });
        self.state = ConnectionState::Connecting;
        Ok((id, commands_rx))
    }

    /// Hands a text frame to the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless the state is
    /// `Connected`, or [`SessionError::ConnectionLost`] if the I/O task
    /// has already stopped.
    pub fn send(&self, text: String) -> Result<(), SessionError> {
        let link = match (&self.link, self.state) {
            (Some(link), ConnectionState::Connected) => link,
            _ => return Err(SessionError::NotConnected { state: self.state }),
        };
        link.commands
            .send(LinkCommand::Text(text))
            .map_err(|_| SessionError::ConnectionLost)
    }

    /// Closes the connection for good. Idempotent.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            tracing::info!(connection = %link.id, "closing connection");
            let _ = link.commands.send(LinkCommand::Close);
        }
        self.state = ConnectionState::Closed;
    }

    /// Applies an event reported by a connection.
    ///
    /// Returns `false` if the event belongs to a superseded connection and
    /// must be ignored; such events never change state.
    pub fn observe(&mut self, event: &ConnectionEvent) -> bool {
        let current = self.connection_id() == Some(event.connection);
        if !current {
            tracing::debug!(connection = %event.connection, "ignoring stale connection event");
            return false;
        }
        match &event.kind {
            ConnectionEventKind::Opened => {
                if self.state == ConnectionState::Connecting {
                    self.state = ConnectionState::Connected;
                }
            }
            ConnectionEventKind::Closed { code, reason } => {
                tracing::info!(connection = %event.connection, ?code, reason = %reason, "connection closed");
                self.link = None;
                if self.state != ConnectionState::Closed {
                    self.state = ConnectionState::Disconnected;
                }
            }
            ConnectionEventKind::Failed(message) => {
                tracing::warn!(connection = %event.connection, error = %message, "connection error");
            }
            ConnectionEventKind::Received(_) => {}
        }
        true
    }
}

/// Runs the socket for one connection until it closes.
async fn run_link(
    id: ConnectionId,
    endpoint: String,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
) {
    let emit = |kind| {
        let _ = events.send(ConnectionEvent::new(id, kind));
    };

    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            emit(ConnectionEventKind::Failed(err.to_string()));
            emit(ConnectionEventKind::Closed {
                code: None,
                reason: String::new(),
            });
            return;
        }
    };
    emit(ConnectionEventKind::Opened);

    let (mut sink, mut source) = stream.split();
    let mut close_code = None;
    let mut close_reason = String::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(LinkCommand::Text(text)) => {
                        if let Err(err) = sink.send(Message::text(text)).await {
                            emit(ConnectionEventKind::Failed(err.to_string()));
                            break;
                        }
                    }
                    Some(LinkCommand::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        emit(ConnectionEventKind::Received(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            close_code = Some(u16::from(frame.code));
                            close_reason = frame.reason.as_str().to_owned();
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        emit(ConnectionEventKind::Failed(err.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    emit(ConnectionEventKind::Closed {
        code: close_code,
        reason: close_reason,
    });
    tracing::debug!(connection = %id, "ws link stopped");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn opened(id: ConnectionId) -> ConnectionEvent {
        ConnectionEvent::new(id, ConnectionEventKind::Opened)
    }

    fn closed(id: ConnectionId) -> ConnectionEvent {
        ConnectionEvent::new(
            id,
            ConnectionEventKind::Closed {
                code: Some(1000),
                reason: String::new(),
            },
        )
    }

    #[test]
    fn starts_disconnected_and_refuses_send() {
        let (manager, _events) = ConnectionManager::new();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        let Err(SessionError::NotConnected { state }) = manager.send("x".to_string()) else {
            panic!("send must fail while disconnected");
        };
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn lifecycle_through_events() {
        let (mut manager, _events) = ConnectionManager::new();
        let Ok((id, mut commands)) = manager.attach() else {
            panic!("attach failed");
        };
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(manager.send("early".to_string()).is_err());

        assert!(manager.observe(&opened(id)));
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.send("hello".to_string()).is_ok());
        assert_eq!(
            commands.try_recv().ok(),
            Some(LinkCommand::Text("hello".to_string()))
        );

        assert!(manager.observe(&closed(id)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.connection_id(), None);
    }

    #[test]
    fn connect_while_connecting_fails() {
        let (mut manager, _events) = ConnectionManager::new();
        assert!(manager.attach().is_ok());
        let Err(SessionError::AlreadyConnected(state)) = manager.attach() else {
            panic!("second attach must fail");
        };
        assert_eq!(state, ConnectionState::Connecting);
    }

    #[test]
    fn close_is_terminal() {
        let (mut manager, _events) = ConnectionManager::new();
        let Ok((id, mut commands)) = manager.attach() else {
            panic!("attach failed");
        };
        manager.observe(&opened(id));
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(commands.try_recv().ok(), Some(LinkCommand::Close));

        // The link's trailing close event is stale now.
        assert!(!manager.observe(&closed(id)));
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(matches!(
            manager.attach(),
            Err(SessionError::ConnectionClosed)
        ));
    }

    #[test]
    fn stale_events_ignored_after_reconnect() {
        let (mut manager, _events) = ConnectionManager::new();
        let Ok((first, _c1)) = manager.attach() else {
            panic!("attach failed");
        };
        manager.observe(&closed(first));
        let Ok((second, _c2)) = manager.attach() else {
            panic!("reattach failed");
        };
        assert_ne!(first, second);

        assert!(!manager.observe(&opened(first)));
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(manager.observe(&opened(second)));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_failure_then_close() {
        let (mut manager, mut events) = ConnectionManager::new();
        // Port 9 (discard) on localhost is essentially never a ws server.
        let Ok(id) = manager.connect("ws://127.0.0.1:9/") else {
            panic!("connect must start");
        };
        let Some(first) = events.recv().await else {
            panic!("expected an event");
        };
        assert_eq!(first.connection, id);
        assert!(matches!(first.kind, ConnectionEventKind::Failed(_)));
        let Some(second) = events.recv().await else {
            panic!("expected close");
        };
        manager.observe(&first);
        manager.observe(&second);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
