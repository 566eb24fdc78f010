use serde::Serialize;
use std::fmt;

/// Health reported by a background service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ServiceHealth {
    Healthy,

    /// Running, but the thing it maintains needs attention
    Degraded(String),

    Unhealthy(String),

    Starting,

    Stopping,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceHealth::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ServiceHealth::Degraded(_))
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ServiceHealth::Unhealthy(_))
    }
}

impl fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceHealth::Healthy => f.write_str("healthy"),
            ServiceHealth::Degraded(reason) => write!(f, "degraded: {}", reason),
            ServiceHealth::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
            ServiceHealth::Starting => f.write_str("starting"),
            ServiceHealth::Stopping => f.write_str("stopping"),
        }
    }
}
