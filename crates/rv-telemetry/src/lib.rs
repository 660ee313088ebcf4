// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured telemetry for validation jobs.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Metrics captured for one completed job run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    /// Platform the job ran against.
    pub platform: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Products scanned.
    pub scanned: u64,
    /// Scans that matched the database.
    pub matched: u64,
    /// Scans that mismatched the database.
    pub mismatched: u64,
    /// Scans that failed outright.
    pub failed: u64,
    /// Scans that reported the product missing.
    pub not_found: u64,
    /// Number of context rotations triggered (rotation + session recovery).
    pub context_rotations: u64,
}

/// Aggregated statistics across multiple recorded job runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Number of jobs recorded.
    pub count: usize,
    /// Mean duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median (p50) duration in milliseconds.
    pub p50_duration_ms: f64,
    /// 99th-percentile duration in milliseconds.
    pub p99_duration_ms: f64,
    /// Aggregate match rate across all recorded jobs.
    pub overall_match_rate: f64,
    /// Per-platform job counts (deterministic ordering).
    pub platform_counts: BTreeMap<String, usize>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            count: 0,
            mean_duration_ms: 0.0,
            p50_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            overall_match_rate: 0.0,
            platform_counts: BTreeMap::new(),
        }
    }
}

fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac
}

/// Thread-safe collector for job metrics, shared across worker loops.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<JobMetrics>>>,
}

impl MetricsCollector {
    /// Create a new, empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed job's metrics.
    pub fn record(&self, metrics: JobMetrics) {
        self.inner.lock().expect("metrics lock poisoned").push(metrics);
    }

    /// Return all recorded job metrics.
    #[must_use]
    pub fn runs(&self) -> Vec<JobMetrics> {
        self.inner.lock().expect("metrics lock poisoned").clone()
    }

    /// Number of jobs recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("metrics lock poisoned").len()
    }

    /// Whether no jobs have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded jobs.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }

        let count = data.len();
        let mut durations: Vec<u64> = data.iter().map(|r| r.duration_ms).collect();
        durations.sort_unstable();

        let total_duration: u64 = durations.iter().sum();
        let mean_duration_ms = total_duration as f64 / count as f64;

        let total_scanned: u64 = data.iter().map(|r| r.scanned).sum();
        let total_matched: u64 = data.iter().map(|r| r.matched).sum();
        let overall_match_rate = if total_scanned == 0 {
            0.0
        } else {
            total_matched as f64 / total_scanned as f64
        };

        let mut platform_counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in data.iter() {
            *platform_counts.entry(r.platform.clone()).or_insert(0) += 1;
        }

        MetricsSummary {
            count,
            mean_duration_ms,
            p50_duration_ms: percentile(&durations, 50.0),
            p99_duration_ms: percentile(&durations, 99.0),
            overall_match_rate,
            platform_counts,
        }
    }

    /// Clear all recorded metrics.
    pub fn clear(&self) {
        self.inner.lock().expect("metrics lock poisoned").clear();
    }
}

/// A structured span emitted around one notable operation (context
/// rotation, session recovery, job dequeue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySpan {
    /// Operation name.
    pub name: String,
    /// Arbitrary key-value attributes (deterministic ordering).
    pub attributes: BTreeMap<String, String>,
}

impl TelemetrySpan {
    /// Create a new span with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Insert an attribute (builder-style).
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Emit the span via `tracing::info!`.
    pub fn emit(&self) {
        info!(span_name = %self.name, attributes = ?self.attributes, "telemetry_span");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(platform: &str, duration: u64, scanned: u64, matched: u64) -> JobMetrics {
        JobMetrics {
            platform: platform.into(),
            duration_ms: duration,
            scanned,
            matched,
            mismatched: scanned - matched,
            failed: 0,
            not_found: 0,
            context_rotations: 0,
        }
    }

    #[test]
    fn summary_of_empty_collector_is_zeroed() {
        let collector = MetricsCollector::new();
        let summary = collector.summary();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.overall_match_rate, 0.0);
    }

    #[test]
    fn summary_computes_match_rate_and_percentiles() {
        let collector = MetricsCollector::new();
        collector.record(sample("oliveyoung", 100, 10, 10));
        collector.record(sample("oliveyoung", 200, 10, 5));
        let summary = collector.summary();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.overall_match_rate, 0.75);
        assert_eq!(summary.platform_counts.get("oliveyoung"), Some(&2));
    }
}
