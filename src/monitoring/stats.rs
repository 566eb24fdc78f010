use super::{ErrorRecord, PerformanceSample};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// How many error records `ErrorStats::recent` carries
pub const RECENT_ERRORS: usize = 10;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OperationStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
}

/// Aggregates over the performance ring buffer
///
/// Durations only cover successful samples; failures are often fast
/// rejections and would skew latency.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PerformanceStats {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    /// Percentage, 0 when nothing was recorded
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub max_duration_ms: f64,
    pub min_duration_ms: f64,
    pub operations: BTreeMap<String, OperationStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub unique_errors: usize,
    pub error_counts: HashMap<String, usize>,
    pub operation_errors: HashMap<String, usize>,
    pub recent: Vec<ErrorRecord>,
}

pub(super) fn performance_stats<'a>(
    samples: impl Iterator<Item = &'a PerformanceSample>,
) -> PerformanceStats {
    let mut stats = PerformanceStats::default();
    let mut durations: Vec<f64> = Vec::new();
    let mut per_op_durations: HashMap<String, f64> = HashMap::new();

    for sample in samples {
        stats.total_operations += 1;
        let op = stats.operations.entry(sample.operation.clone()).or_default();
        op.total += 1;

        if sample.success {
            stats.successful_operations += 1;
            op.successful += 1;
            durations.push(sample.duration_ms);
            *per_op_durations.entry(sample.operation.clone()).or_insert(0.0) += sample.duration_ms;
        } else {
            stats.failed_operations += 1;
            op.failed += 1;
        }
    }

    if stats.total_operations > 0 {
        stats.success_rate =
            stats.successful_operations as f64 / stats.total_operations as f64 * 100.0;
    }
    if !durations.is_empty() {
        stats.average_duration_ms = durations.iter().sum::<f64>() / durations.len() as f64;
        stats.max_duration_ms = durations.iter().copied().fold(f64::MIN, f64::max);
        stats.min_duration_ms = durations.iter().copied().fold(f64::MAX, f64::min);
    }

    for (name, op) in stats.operations.iter_mut() {
        op.success_rate = op.successful as f64 / op.total as f64 * 100.0;
        if op.successful > 0 {
            let sum = per_op_durations.get(name).copied().unwrap_or(0.0);
            op.average_duration_ms = sum / op.successful as f64;
        }
    }

    stats
}

pub(super) fn error_stats<'a>(
    records: impl DoubleEndedIterator<Item = &'a ErrorRecord> + Clone,
) -> ErrorStats {
    let mut stats = ErrorStats::default();

    for record in records.clone() {
        stats.total_errors += 1;
        *stats.error_counts.entry(record.message.clone()).or_insert(0) += 1;
        *stats
            .operation_errors
            .entry(record.operation.clone())
            .or_insert(0) += 1;
    }
    stats.unique_errors = stats.error_counts.len();

    let mut recent: Vec<ErrorRecord> = records.rev().take(RECENT_ERRORS).cloned().collect();
    recent.reverse();
    stats.recent = recent;

    stats
}
