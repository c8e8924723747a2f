//! Accuracy and latency metrics.
//!
//! - [`TopkAccuracyEvalMetrics`]: running top-K accuracies, delivered to
//!   observers after every image
//! - [`LatencyMetrics`]: inference latency summary for a shard
//! - [`topk::TopkAccuracyEvalStage`]: accumulates top-K hits

pub mod topk;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use topk::{TopkAccuracyEvalStage, top_k_indices};

/// Top-K accuracies over the images evaluated so far.
///
/// `topk_accuracies[i]` is the fraction of images whose ground-truth label
/// was among the `i + 1` highest-scored outputs, so the values never
/// decrease with `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopkAccuracyEvalMetrics {
    /// Accuracy at ranks 1 through K.
    pub topk_accuracies: Vec<f32>,
}

impl TopkAccuracyEvalMetrics {
    /// Top-1 accuracy.
    #[must_use]
    pub fn top1(&self) -> Option<f32> {
        self.topk_accuracies.first().copied()
    }

    /// Top-`k` accuracy (1-based `k`).
    #[must_use]
    pub fn top(&self, k: usize) -> Option<f32> {
        k.checked_sub(1).and_then(|i| self.topk_accuracies.get(i).copied())
    }
}

/// Inference latency summary, in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Number of timed runs.
    pub num_runs: u64,
    /// Most recent run.
    pub last_us: u64,
    /// Fastest run.
    pub min_us: u64,
    /// Slowest run.
    pub max_us: u64,
    /// Mean.
    pub avg_us: f64,
    /// Population standard deviation.
    pub std_deviation_us: f64,
}

/// Streaming latency accumulator (Welford).
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    count: u64,
    last: u64,
    min: u64,
    max: u64,
    mean: f64,
    m2: f64,
}

impl LatencyStats {
    /// Record one run.
    pub fn record(&mut self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count += 1;
        self.last = us;
        if self.count == 1 {
            self.min = us;
            self.max = us;
        } else {
            self.min = self.min.min(us);
            self.max = self.max.max(us);
        }
        let x = us as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Snapshot.
    #[must_use]
    pub fn metrics(&self) -> LatencyMetrics {
        LatencyMetrics {
            num_runs: self.count,
            last_us: self.last,
            min_us: self.min,
            max_us: self.max,
            avg_us: self.mean,
            std_deviation_us: if self.count == 0 {
                0.0
            } else {
                (self.m2 / self.count as f64).sqrt()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topk_accessors() {
        let m = TopkAccuracyEvalMetrics {
            topk_accuracies: vec![0.5, 0.75, 0.9],
        };
        assert_eq!(m.top1(), Some(0.5));
        assert_eq!(m.top(3), Some(0.9));
        assert_eq!(m.top(0), None);
        assert_eq!(m.top(4), None);
    }

    #[test]
    fn test_latency_stats() {
        let mut stats = LatencyStats::default();
        assert_eq!(stats.metrics().num_runs, 0);

        for us in [100, 300, 200] {
            stats.record(Duration::from_micros(us));
        }
        let m = stats.metrics();
        assert_eq!(m.num_runs, 3);
        assert_eq!(m.last_us, 200);
        assert_eq!(m.min_us, 100);
        assert_eq!(m.max_us, 300);
        assert!((m.avg_us - 200.0).abs() < 1e-9);
        assert!((m.std_deviation_us - (20000.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }
}
