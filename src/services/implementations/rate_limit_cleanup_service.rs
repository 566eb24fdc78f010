use crate::rate_limiter::RateLimiters;
use crate::services::Service;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Drops idle rate limit windows
pub struct RateLimitCleanupService {
    limiters: Arc<RateLimiters>,
}

impl RateLimitCleanupService {
    pub fn new(limiters: Arc<RateLimiters>) -> Self {
        Self { limiters }
    }
}

#[async_trait]
impl Service for RateLimitCleanupService {
    fn name(&self) -> &'static str {
        "rate_limit_cleanup"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn start(&mut self, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>, String> {
        Ok(vec![self.limiters.spawn_cleanup(shutdown)])
    }
}
