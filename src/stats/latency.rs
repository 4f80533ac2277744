//! Per-session latency statistics.

use crate::core::{Outcome, SessionSummary};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, OrderStatistics, Statistics};

/// Outcome counts and latencies of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub strong: u64,
    pub weak: u64,
    pub no_change: u64,
    pub failed: u64,
    pub superseded: u64,
    /// Strong latencies in milliseconds, in cycle order
    strong_latencies: Vec<f64>,
    /// Weak fallback latencies in milliseconds
    weak_latencies: Vec<f64>,
}

/// Distribution of a set of latencies, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
}

impl LatencySummary {
    /// Summarise `values`; `None` when empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut data = Data::new(values.to_vec());
        // Sample deviation is undefined for a single value
        let std_dev = if values.len() > 1 {
            values.iter().std_dev()
        } else {
            0.0
        };

        Some(Self {
            count: values.len(),
            mean: values.iter().mean(),
            median: data.median(),
            std_dev,
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
            p95: data.percentile(95),
        })
    }
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every outcome and counter of a finished session.
    pub fn from_summary(summary: &SessionSummary) -> Self {
        let mut stats = Self::new();
        for outcome in &summary.outcomes {
            stats.record(outcome);
        }
        stats.failed = summary.failed_cycles as u64;
        stats.superseded = summary.superseded_clicks;
        stats
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Strong { .. } => {
                self.strong += 1;
                self.strong_latencies.extend(outcome.latency_ms());
            }
            Outcome::WeakFallback { .. } => {
                self.weak += 1;
                self.weak_latencies.extend(outcome.latency_ms());
            }
            Outcome::NoChange { .. } => self.no_change += 1,
        }
    }

    /// Completed plus failed cycles.
    pub fn cycles(&self) -> u64 {
        self.strong + self.weak + self.no_change + self.failed
    }

    pub fn strong_latencies(&self) -> &[f64] {
        &self.strong_latencies
    }

    pub fn weak_latencies(&self) -> &[f64] {
        &self.weak_latencies
    }

    /// Distribution of strong latencies.
    pub fn strong_summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_values(&self.strong_latencies)
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Session Statistics:\n\
             - Cycles: {}\n\
             - Responses: {}\n\
             - Weak fallbacks: {}\n\
             - No change: {}\n\
             - Capture failures: {}\n\
             - Superseded clicks: {}",
            self.cycles(),
            self.strong,
            self.weak,
            self.no_change,
            self.failed,
            self.superseded,
        );

        if let Some(s) = self.strong_summary() {
            out.push_str(&format!(
                "\n\nResponse latency (ms, n={}):\n\
                 - mean {:.2}, median {:.2}, std dev {:.2}\n\
                 - min {:.2}, max {:.2}, p95 {:.2}",
                s.count, s.mean, s.median, s.std_dev, s.min, s.max, s.p95
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Region;
    use crate::core::Mode;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::milliseconds(ms)
    }

    fn strong(latency_ms: i64) -> Outcome {
        Outcome::Strong {
            t1: t(0),
            t2: t(latency_ms),
            ratio: 0.2,
        }
    }

    #[test]
    fn test_counts_by_outcome() {
        let summary = SessionSummary {
            mode: Mode::Continuous,
            region: Region::new(0, 0, 10, 10),
            started_at: t(0),
            ended_at: t(5000),
            outcomes: vec![
                strong(50),
                Outcome::WeakFallback {
                    t1: t(0),
                    t_best: t(30),
                    best_ratio: 0.02,
                },
                Outcome::NoChange { t1: t(0) },
            ],
            failed_cycles: 1,
            superseded_clicks: 2,
        };
        let stats = LatencyStats::from_summary(&summary);

        assert_eq!((stats.strong, stats.weak, stats.no_change, stats.failed), (1, 1, 1, 1));
        assert_eq!(stats.superseded, 2);
        assert_eq!(stats.cycles(), 4);
        assert_eq!(stats.strong_latencies(), &[50.0]);
        assert_eq!(stats.weak_latencies(), &[30.0]);
    }

    #[test]
    fn test_strong_summary() {
        let mut stats = LatencyStats::new();
        for ms in [40, 10, 30, 20] {
            stats.record(&strong(ms));
        }

        let s = stats.strong_summary().unwrap();
        assert_eq!(s.count, 4);
        assert!((s.mean - 25.0).abs() < 1e-9);
        assert!((s.median - 25.0).abs() < 1e-9);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 40.0);
        assert!(s.std_dev > 0.0);
        assert!(s.p95 >= s.median && s.p95 <= s.max);
    }

    #[test]
    fn test_single_sample_has_zero_deviation() {
        let s = LatencySummary::from_values(&[12.5]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.median, 12.5);
        assert!(LatencySummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_summary_text() {
        let mut stats = LatencyStats::new();
        assert!(!stats.summary().contains("Response latency"));

        stats.record(&strong(16));
        let text = stats.summary();
        assert!(text.contains("Responses: 1"));
        assert!(text.contains("Response latency (ms, n=1)"));
    }
}
