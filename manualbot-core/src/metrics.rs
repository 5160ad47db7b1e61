//! Call instrumentation
//!
//! Call sites time themselves and report through a [`MetricsSink`]. The
//! [`CallMonitor`] sink keeps a bounded window of recent samples per call
//! name and summarizes them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use tracing::info;

/// Samples kept per call name
pub const SAMPLE_WINDOW: usize = 100;

/// How an instrumented call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    CacheHit,
    RateLimited,
    Failed,
    Rejected,
}

impl CallOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CallOutcome::RateLimited | CallOutcome::Failed)
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Success => write!(f, "success"),
            CallOutcome::CacheHit => write!(f, "cache_hit"),
            CallOutcome::RateLimited => write!(f, "rate_limited"),
            CallOutcome::Failed => write!(f, "failed"),
            CallOutcome::Rejected => write!(f, "rejected"),
        }
    }
}

/// Receiver for call timings
pub trait MetricsSink: Send + Sync {
    fn record_call(&self, name: &str, duration_ms: u64, outcome: CallOutcome);
}

/// Sink that drops every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_call(&self, _name: &str, _duration_ms: u64, _outcome: CallOutcome) {}
}

#[derive(Debug, Clone, Copy)]
struct CallSample {
    duration_ms: u64,
    outcome: CallOutcome,
}

/// Summary over the retained samples of one call name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub call_count: usize,
    pub failures: usize,
    pub avg_duration_ms: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub last_duration_ms: u64,
    pub last_outcome: CallOutcome,
}

/// In-memory sink keeping the latest [`SAMPLE_WINDOW`] samples per name
#[derive(Debug, Default)]
pub struct CallMonitor {
    samples: Mutex<HashMap<String, VecDeque<CallSample>>>,
}

impl CallMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary for one call name, `None` if nothing was recorded
    pub fn summary(&self, name: &str) -> Option<CallSummary> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        summarize(samples.get(name)?)
    }

    /// Summaries for every recorded call name
    pub fn summaries(&self) -> HashMap<String, CallSummary> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples
            .iter()
            .filter_map(|(name, window)| Some((name.clone(), summarize(window)?)))
            .collect()
    }

    /// Emit the summary for `name` as an info line
    pub fn log_summary(&self, name: &str) {
        if let Some(summary) = self.summary(name) {
            info!(
                call = name,
                count = summary.call_count,
                failures = summary.failures,
                avg_ms = summary.avg_duration_ms,
                max_ms = summary.max_duration_ms,
                "Call statistics"
            );
        }
    }
}

impl MetricsSink for CallMonitor {
    fn record_call(&self, name: &str, duration_ms: u64, outcome: CallOutcome) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let window = samples.entry(name.to_string()).or_default();
        window.push_back(CallSample {
            duration_ms,
            outcome,
        });
        while window.len() > SAMPLE_WINDOW {
            window.pop_front();
        }
    }
}

fn summarize(window: &VecDeque<CallSample>) -> Option<CallSummary> {
    let last = window.back()?;
    let total: u64 = window.iter().map(|s| s.duration_ms).sum();

    Some(CallSummary {
        call_count: window.len(),
        failures: window.iter().filter(|s| s.outcome.is_failure()).count(),
        avg_duration_ms: total as f64 / window.len() as f64,
        min_duration_ms: window.iter().map(|s| s.duration_ms).min().unwrap_or(0),
        max_duration_ms: window.iter().map(|s| s.duration_ms).max().unwrap_or(0),
        last_duration_ms: last.duration_ms,
        last_outcome: last.outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_over_samples() {
        let monitor = CallMonitor::new();
        monitor.record_call("complete", 100, CallOutcome::Success);
        monitor.record_call("complete", 300, CallOutcome::RateLimited);
        monitor.record_call("complete", 200, CallOutcome::Success);

        let summary = monitor.summary("complete").unwrap();
        assert_eq!(summary.call_count, 3);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.avg_duration_ms, 200.0);
        assert_eq!(summary.min_duration_ms, 100);
        assert_eq!(summary.max_duration_ms, 300);
        assert_eq!(summary.last_duration_ms, 200);
        assert_eq!(summary.last_outcome, CallOutcome::Success);
    }

    #[test]
    fn test_unknown_name_has_no_summary() {
        let monitor = CallMonitor::new();
        assert!(monitor.summary("ask").is_none());
        assert!(monitor.summaries().is_empty());
    }

    #[test]
    fn test_window_is_bounded() {
        let monitor = CallMonitor::new();
        for i in 0..(SAMPLE_WINDOW as u64 + 20) {
            monitor.record_call("ask", i, CallOutcome::Success);
        }

        let summary = monitor.summary("ask").unwrap();
        assert_eq!(summary.call_count, SAMPLE_WINDOW);
        assert_eq!(summary.min_duration_ms, 20);
    }

    #[test]
    fn test_names_are_tracked_separately() {
        let monitor = CallMonitor::new();
        monitor.record_call("ask", 5, CallOutcome::CacheHit);
        monitor.record_call("complete", 50, CallOutcome::Failed);

        let all = monitor.summaries();
        assert_eq!(all.len(), 2);
        assert_eq!(all["ask"].failures, 0);
        assert_eq!(all["complete"].failures, 1);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(CallOutcome::CacheHit.to_string(), "cache_hit");
        assert_eq!(CallOutcome::RateLimited.to_string(), "rate_limited");
    }
}
