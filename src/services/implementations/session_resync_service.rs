use crate::config::Config;
use crate::services::{Service, ServiceHealth};
use crate::session::{SessionManager, SessionState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Keeps the session in step with the identity provider
pub struct SessionResyncService {
    session: Arc<SessionManager>,
}

impl SessionResyncService {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Service for SessionResyncService {
    fn name(&self) -> &'static str {
        "session_resync"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn is_enabled(&self, config: &Config) -> bool {
        config.session.resync_enabled
    }

    async fn start(&mut self, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>, String> {
        Ok(vec![self.session.spawn_resync(shutdown)])
    }

    async fn health(&self) -> ServiceHealth {
        match self.session.state() {
            SessionState::Error { message, .. } if self.session.retry_exhausted() => {
                ServiceHealth::Unhealthy(message)
            }
            SessionState::Error { message, .. } => ServiceHealth::Degraded(message),
            SessionState::Connecting => ServiceHealth::Starting,
            _ => ServiceHealth::Healthy,
        }
    }
}
