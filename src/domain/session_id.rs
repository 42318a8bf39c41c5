//! Type-safe session and connection identifiers.
//!
//! [`SessionId`] is the opaque token the server issues on `AUTH`.
//! [`ConnectionId`] is generated locally for every connection attempt so
//! events from a superseded connection can be told apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolDecodeError;

/// Opaque session identifier issued by the server.
///
/// The client never interprets its contents. It is echoed back on every
/// request scoped to the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a server-issued identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolDecodeError::EmptySessionId`] if `raw` is empty
    /// or whitespace only.
    pub fn new(raw: impl Into<String>) -> Result<Self, ProtocolDecodeError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ProtocolDecodeError::EmptySessionId);
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one physical connection attempt (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Creates a new random `ConnectionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn session_id_rejects_empty() {
        assert_eq!(SessionId::new(""), Err(ProtocolDecodeError::EmptySessionId));
        assert_eq!(
            SessionId::new("   "),
            Err(ProtocolDecodeError::EmptySessionId)
        );
    }

    #[test]
    fn session_id_is_transparent_on_the_wire() {
        let Ok(id) = SessionId::new("abc") else {
            panic!("valid id");
        };
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"abc\"");
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::default();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }
}
