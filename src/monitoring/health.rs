//! Health checks derived from the monitoring buffers

use super::stats::{ErrorStats, PerformanceStats};
use crate::config::MonitoringConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    /// Measured value the status was derived from
    pub value: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub timestamp: DateTime<Utc>,
}

fn below(value: f64, pass: f64, warn: f64) -> CheckStatus {
    if value < pass {
        CheckStatus::Pass
    } else if value < warn {
        CheckStatus::Warn
    } else {
        CheckStatus::Fail
    }
}

fn above(value: f64, pass: f64, warn: f64) -> CheckStatus {
    if value > pass {
        CheckStatus::Pass
    } else if value > warn {
        CheckStatus::Warn
    } else {
        CheckStatus::Fail
    }
}

pub(super) fn evaluate(
    config: &MonitoringConfig,
    perf: &PerformanceStats,
    errors: &ErrorStats,
) -> SystemHealth {
    let mut checks = Vec::with_capacity(3);

    let avg = perf.average_duration_ms;
    checks.push(HealthCheck {
        name: "Performance",
        status: below(avg, config.latency_pass_ms, config.latency_warn_ms),
        value: avg,
        message: format!("Average response time: {:.2}ms", avg),
    });

    let error_rate = if perf.total_operations > 0 {
        errors.total_errors as f64 / perf.total_operations as f64 * 100.0
    } else {
        0.0
    };
    checks.push(HealthCheck {
        name: "Error Rate",
        status: below(error_rate, config.error_rate_pass_pct, config.error_rate_warn_pct),
        value: error_rate,
        message: format!("Error rate: {:.2}%", error_rate),
    });

    // An idle client has nothing to report against
    let success_rate = if perf.total_operations > 0 {
        perf.success_rate
    } else {
        100.0
    };
    checks.push(HealthCheck {
        name: "Success Rate",
        status: above(
            success_rate,
            config.success_rate_pass_pct,
            config.success_rate_warn_pct,
        ),
        value: success_rate,
        message: format!("Success rate: {:.2}%", success_rate),
    });

    let status = if checks.iter().any(|c| c.status == CheckStatus::Fail) {
        HealthStatus::Unhealthy
    } else if checks.iter().any(|c| c.status == CheckStatus::Warn) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    SystemHealth {
        status,
        checks,
        timestamp: Utc::now(),
    }
}
