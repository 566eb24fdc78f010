//! Sliding window request limiter
//!
//! Checking and recording are separate steps: `is_allowed` only prunes and
//! counts, `record_request` appends. A caller that checks without going on
//! to make the request consumes no budget.

use crate::config::RateLimitPolicy;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Budget snapshot for one key
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    pub limit: usize,
    pub remaining: usize,
    /// When a full budget is guaranteed again
    pub reset_at: Instant,
    /// Whole seconds until the oldest request leaves the window (only when blocked)
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub info: RateLimitInfo,
}

impl RateLimitDecision {
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.info.retry_after_secs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub name: String,
    pub total_keys: usize,
    pub window_secs: u64,
    pub max_requests: usize,
    /// Timestamps currently held per key (including not yet pruned ones)
    pub key_counts: HashMap<String, usize>,
}

pub struct RateLimiter {
    name: &'static str,
    policy: RateLimitPolicy,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: RateLimitPolicy) -> Self {
        let window = Duration::from_secs(policy.window_secs.max(1));
        Self {
            name,
            policy,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `identifier:operation` for per-user policies, `operation` otherwise
    pub fn key_for(&self, identifier: &str, operation: &str) -> String {
        if self.policy.per_user {
            format!("{}:{}", identifier, operation)
        } else {
            operation.to_string()
        }
    }

    /// Check the budget without recording a request
    pub fn is_allowed(&self, identifier: &str, operation: &str) -> RateLimitDecision {
        let key = self.key_for(identifier, operation);
        let now = Instant::now();
        let mut windows = self.windows.lock();

        let count = match windows.get_mut(&key) {
            Some(timestamps) => {
                self.prune(timestamps, now);
                timestamps.len()
            }
            None => 0,
        };
        let allowed = count < self.policy.max_requests;

        let retry_after_secs = if allowed {
            None
        } else {
            windows
                .get(&key)
                .and_then(|timestamps| timestamps.front().copied())
                .map(|oldest| self.retry_after(oldest, now))
        };

        RateLimitDecision {
            allowed,
            info: RateLimitInfo {
                limit: self.policy.max_requests,
                remaining: self.policy.max_requests.saturating_sub(count),
                reset_at: now + self.window,
                retry_after_secs,
            },
        }
    }

    /// Budget info for a key, same as `is_allowed` minus the verdict
    pub fn info(&self, identifier: &str, operation: &str) -> RateLimitInfo {
        self.is_allowed(identifier, operation).info
    }

    /// Count one request against the window unless the policy skips it
    pub fn record_request(&self, identifier: &str, operation: &str, success: bool) {
        if success && self.policy.skip_successful {
            return;
        }
        if !success && self.policy.skip_failed {
            return;
        }

        let key = self.key_for(identifier, operation);
        self.windows
            .lock()
            .entry(key)
            .or_default()
            .push_back(Instant::now());
    }

    pub fn reset(&self, identifier: &str, operation: &str) {
        let key = self.key_for(identifier, operation);
        self.windows.lock().remove(&key);
    }

    pub fn clear(&self) {
        self.windows.lock().clear();
    }

    /// Prune every window and drop keys left empty; returns keys removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, timestamps| {
            self.prune(timestamps, now);
            !timestamps.is_empty()
        });
        before - windows.len()
    }

    pub fn key_count(&self) -> usize {
        self.windows.lock().len()
    }

    pub fn stats(&self) -> RateLimiterStats {
        let windows = self.windows.lock();
        RateLimiterStats {
            name: self.name.to_string(),
            total_keys: windows.len(),
            window_secs: self.window.as_secs(),
            max_requests: self.policy.max_requests,
            key_counts: windows
                .iter()
                .map(|(key, timestamps)| (key.clone(), timestamps.len()))
                .collect(),
        }
    }

    /// Timestamps are appended in order, so stale ones sit at the front
    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn retry_after(&self, oldest: Instant, now: Instant) -> u64 {
        let wait = (oldest + self.window).saturating_duration_since(now);
        let secs = wait.as_millis().div_ceil(1000) as u64;
        secs.max(1)
    }
}
