//! In-memory diagnostics: performance samples and error records
//!
//! Both buffers are bounded; the oldest record is dropped on overflow.
//! Nothing here is consulted for correctness.

mod health;
mod stats;

pub use health::{CheckStatus, HealthCheck, HealthStatus, SystemHealth};
pub use stats::{ErrorStats, OperationStats, PerformanceStats, RECENT_ERRORS};

use crate::config::MonitoringConfig;
use crate::logger::{self, LogLevel, LogTag};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSample {
    pub operation: String,
    pub duration_ms: f64,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    recorded_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub operation: String,
    /// Error category (`XonoraError::category`)
    pub category: String,
    pub user_id: Option<String>,
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    recorded_at: Instant,
}

/// Everything the `health` command prints
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringSummary {
    pub performance: PerformanceStats,
    pub errors: ErrorStats,
    pub health: SystemHealth,
    pub timestamp: DateTime<Utc>,
}

pub struct Monitor {
    config: MonitoringConfig,
    samples: Mutex<VecDeque<PerformanceSample>>,
    errors: Mutex<VecDeque<ErrorRecord>>,
}

impl Monitor {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(config.max_performance_samples.min(1024))),
            errors: Mutex::new(VecDeque::with_capacity(config.max_error_records.min(1024))),
            config,
        }
    }

    pub fn record_performance(
        &self,
        operation: &str,
        duration: Duration,
        success: bool,
        error: Option<String>,
    ) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        logger::verbose(
            LogTag::Monitor,
            &format!(
                "{} {}: {:.0}ms{}",
                if success { "ok" } else { "failed" },
                operation,
                duration_ms,
                error.as_deref().map(|e| format!(" - {}", e)).unwrap_or_default()
            ),
        );

        let sample = PerformanceSample {
            operation: operation.to_string(),
            duration_ms,
            success,
            error,
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        };

        let mut samples = self.samples.lock();
        samples.push_back(sample);
        while samples.len() > self.config.max_performance_samples {
            samples.pop_front();
        }
    }

    pub fn record_error(
        &self,
        message: &str,
        operation: &str,
        category: &str,
        user_id: Option<&str>,
        context: BTreeMap<String, String>,
    ) {
        let line = format!(
            "{} [{}]: {} (user: {}) {:?}",
            operation,
            category,
            message,
            user_id.unwrap_or("-"),
            context
        );
        match log_level_for(category) {
            LogLevel::Error => logger::error(LogTag::Monitor, &line),
            LogLevel::Warning => logger::warning(LogTag::Monitor, &line),
            _ => logger::debug(LogTag::Monitor, &line),
        }

        let record = ErrorRecord {
            message: message.to_string(),
            operation: operation.to_string(),
            category: category.to_string(),
            user_id: user_id.map(str::to_string),
            context,
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        };

        let mut errors = self.errors.lock();
        errors.push_back(record);
        while errors.len() > self.config.max_error_records {
            errors.pop_front();
        }
    }

    pub fn performance_samples(&self) -> Vec<PerformanceSample> {
        self.samples.lock().iter().cloned().collect()
    }

    pub fn error_records(&self) -> Vec<ErrorRecord> {
        self.errors.lock().iter().cloned().collect()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        stats::performance_stats(self.samples.lock().iter())
    }

    pub fn error_stats(&self) -> ErrorStats {
        stats::error_stats(self.errors.lock().iter())
    }

    pub fn check_health(&self) -> SystemHealth {
        let perf = self.performance_stats();
        let errors = self.error_stats();
        health::evaluate(&self.config, &perf, &errors)
    }

    /// Drop samples and records older than `max_age`
    pub fn clear_old_data(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let fresh = |at: Instant| now.saturating_duration_since(at) < max_age;

        let mut samples = self.samples.lock();
        let before = samples.len();
        samples.retain(|s| fresh(s.recorded_at));
        let mut removed = before - samples.len();
        drop(samples);

        let mut errors = self.errors.lock();
        let before = errors.len();
        errors.retain(|e| fresh(e.recorded_at));
        removed += before - errors.len();

        removed
    }

    pub fn summary(&self) -> MonitoringSummary {
        let performance = self.performance_stats();
        let errors = self.error_stats();
        let health = health::evaluate(&self.config, &performance, &errors);
        MonitoringSummary {
            performance,
            errors,
            health,
            timestamp: Utc::now(),
        }
    }

    /// Prune old data on the configured interval until cancelled
    pub fn spawn_pruner(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let interval = Duration::from_secs(self.config.prune_interval_secs.max(1));
        let max_age = Duration::from_secs(self.config.max_record_age_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = monitor.clear_old_data(max_age);
                        if removed > 0 {
                            logger::debug(
                                LogTag::Monitor,
                                &format!("Pruned {} monitoring records", removed),
                            );
                        }
                    }
                }
            }
        })
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(MonitoringConfig::default())
    }
}

/// Routine local rejections stay out of the error log
fn log_level_for(category: &str) -> LogLevel {
    match category {
        "validation" | "rate_limit" | "not_connected" => LogLevel::Debug,
        "remote" => LogLevel::Warning,
        _ => LogLevel::Error,
    }
}
