use crate::backend::Principal;
use crate::errors::ConnectionErrorKind;
use serde::Serialize;
use std::fmt;

/// Connection state published to the UI
///
/// `Connected` only exists together with a bound request client; the
/// manager never publishes it otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected {
        principal: Principal,
    },
    Error {
        kind: ConnectionErrorKind,
        /// Classified, user-facing message
        message: String,
    },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Connected { principal } => Some(principal),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            SessionState::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Label shown next to the wallet button
    pub fn status_label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting...",
            SessionState::Connected { .. } => "Connected",
            SessionState::Error { .. } => "Connection Error",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Disconnected
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connected { principal } => {
                write!(f, "Connected ({})", principal.to_display_short())
            }
            SessionState::Error { message, .. } => write!(f, "Connection Error: {}", message),
            other => f.write_str(other.status_label()),
        }
    }
}
