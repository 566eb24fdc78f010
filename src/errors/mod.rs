/// Error handling for the Xonora client
///
/// Every failure that reaches the UI is one of these variants. Validation and
/// rate-limit errors are raised locally before any network attempt;
/// connection errors carry a structural kind assigned where they originate.
use thiserror::Error;

// =============================================================================
// CONNECTION ERRORS
// =============================================================================

/// Where a connection failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionErrorKind {
    /// Transport failure reaching the provider or the backend host
    Network,
    /// Identity provider rejected, cancelled or expired the login
    Identity,
    /// Backend canister unreachable or refused the request client
    Backend,
    Unknown,
}

impl ConnectionErrorKind {
    /// Fixed guidance shown to the user for this kind of failure
    pub fn user_message(&self) -> &'static str {
        match self {
            ConnectionErrorKind::Network => {
                "Network issue: unable to reach the Internet Computer. Check your connection and try again."
            }
            ConnectionErrorKind::Identity => {
                "Authentication failed: please log in again with Internet Identity."
            }
            ConnectionErrorKind::Backend => {
                "Backend service error: the staking canister is unavailable. Please try again later."
            }
            ConnectionErrorKind::Unknown => "Connection failed. Please try again.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionErrorKind::Network => "network",
            ConnectionErrorKind::Identity => "identity",
            ConnectionErrorKind::Backend => "backend",
            ConnectionErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} connection error: {detail}", .kind.as_str())]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub detail: String,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::Network, detail)
    }

    pub fn identity(detail: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::Identity, detail)
    }

    pub fn backend(detail: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::Backend, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::Unknown, detail)
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

// =============================================================================
// MAIN ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum XonoraError {
    /// Malformed or policy-violating input, detected before any network call
    #[error("Validation failed: {}", .errors.join(", "))]
    Validation { errors: Vec<String> },

    #[error("Rate limit exceeded for {operation}. Try again in {retry_after_secs} seconds.")]
    RateLimit {
        operation: String,
        retry_after_secs: u64,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The backend answered with its own `err` variant
    #[error("{message}")]
    Remote { operation: String, message: String },

    #[error("Please connect your wallet first")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error in {operation}: {message}")]
    Unexpected { operation: String, message: String },
}

impl XonoraError {
    pub fn validation(errors: Vec<String>) -> Self {
        XonoraError::Validation { errors }
    }

    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        XonoraError::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn unexpected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        XonoraError::Unexpected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            XonoraError::RateLimit { .. } => true,
            XonoraError::Connection(_) => true,
            XonoraError::NotConnected => true,
            XonoraError::Unexpected { .. } => true,
            XonoraError::Validation { .. } => false,
            XonoraError::Remote { .. } => false,
            XonoraError::Config(_) => false,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            XonoraError::RateLimit {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Text suitable for direct display
    pub fn user_message(&self) -> String {
        match self {
            XonoraError::Connection(e) => e.user_message().to_string(),
            XonoraError::Unexpected { .. } => {
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Short category label used as the monitoring key
    pub fn category(&self) -> &'static str {
        match self {
            XonoraError::Validation { .. } => "validation",
            XonoraError::RateLimit { .. } => "rate_limit",
            XonoraError::Connection(_) => "connection",
            XonoraError::Remote { .. } => "remote",
            XonoraError::NotConnected => "not_connected",
            XonoraError::Config(_) => "config",
            XonoraError::Unexpected { .. } => "unexpected",
        }
    }
}

pub type XonoraResult<T> = Result<T, XonoraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_errors() {
        let err = XonoraError::validation(vec![
            "Amount must be greater than 0".to_string(),
            "Pool ID is required".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: Amount must be greater than 0, Pool ID is required"
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_rate_limit_carries_retry_hint() {
        let err = XonoraError::RateLimit {
            operation: "stake".to_string(),
            retry_after_secs: 42,
        };
        assert_eq!(err.retry_after_secs(), Some(42));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("42 seconds"));
    }

    #[test]
    fn test_connection_user_message_follows_kind() {
        let err: XonoraError = ConnectionError::network("fetch failed").into();
        assert!(err.user_message().starts_with("Network issue"));

        let err: XonoraError = ConnectionError::identity("delegation expired").into();
        assert!(err.user_message().starts_with("Authentication failed"));

        let err: XonoraError = ConnectionError::backend("canister stopped").into();
        assert!(err.user_message().starts_with("Backend service error"));
    }

    #[test]
    fn test_remote_error_is_verbatim() {
        let err = XonoraError::remote("stake", "Pool is not active");
        assert_eq!(err.user_message(), "Pool is not active");
    }
}
