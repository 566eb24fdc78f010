//! Client-side rate limiting
//!
//! Early, friendly rejection only: the backend enforces its own limits and
//! nothing here is a security boundary.

mod sliding_window;

pub use sliding_window::{RateLimitDecision, RateLimitInfo, RateLimiter, RateLimiterStats};

use crate::config::RateLimitSettings;
use crate::logger::{self, LogTag};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Operation class selecting which policy applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    Stake,
    Unstake,
    Query,
    Auth,
}

/// One limiter per operation class plus the cross-user ceiling
pub struct RateLimiters {
    pub stake: Arc<RateLimiter>,
    pub unstake: Arc<RateLimiter>,
    pub query: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
    pub global: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            stake: Arc::new(RateLimiter::new("stake", settings.stake.clone())),
            unstake: Arc::new(RateLimiter::new("unstake", settings.unstake.clone())),
            query: Arc::new(RateLimiter::new("query", settings.query.clone())),
            auth: Arc::new(RateLimiter::new("auth", settings.auth.clone())),
            global: Arc::new(RateLimiter::new("global", settings.global.clone())),
        }
    }

    pub fn for_kind(&self, kind: LimitKind) -> &Arc<RateLimiter> {
        match kind {
            LimitKind::Stake => &self.stake,
            LimitKind::Unstake => &self.unstake,
            LimitKind::Query => &self.query,
            LimitKind::Auth => &self.auth,
        }
    }

    pub fn all(&self) -> [&Arc<RateLimiter>; 5] {
        [&self.stake, &self.unstake, &self.query, &self.auth, &self.global]
    }

    pub fn cleanup_all(&self) -> usize {
        self.all().iter().map(|limiter| limiter.cleanup()).sum()
    }

    pub fn clear_all(&self) {
        for limiter in self.all() {
            limiter.clear();
        }
    }

    pub fn stats(&self) -> Vec<RateLimiterStats> {
        self.all().iter().map(|limiter| limiter.stats()).collect()
    }

    /// Drop empty windows once per shortest policy window until cancelled
    pub fn spawn_cleanup(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiters = Arc::clone(self);
        let period = self
            .all()
            .iter()
            .map(|limiter| limiter.window())
            .min()
            .unwrap_or_else(|| std::time::Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        logger::debug(LogTag::RateLimit, "Rate limiter cleanup stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiters.cleanup_all();
                        if removed > 0 {
                            logger::verbose(
                                LogTag::RateLimit,
                                &format!("Dropped {} idle rate limit windows", removed),
                            );
                        }
                    }
                }
            }
        })
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(&RateLimitSettings::default())
    }
}
