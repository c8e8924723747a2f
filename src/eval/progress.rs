//! Progress logging observer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::eval::evaluator::Observer;
use crate::metrics::TopkAccuracyEvalMetrics;

/// Logs overall progress every `interval` completed images.
#[derive(Debug)]
pub struct ProgressLogger {
    interval: usize,
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ProgressLogger {
    /// Log every `interval` images (0 is treated as 1).
    #[must_use]
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            total: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        }
    }

    /// Images completed so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

impl Observer for ProgressLogger {
    fn on_evaluation_start(&self, shard_id_image_count_map: &HashMap<u64, usize>) {
        let total: usize = shard_id_image_count_map.values().sum();
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        log::info!(
            "Starting evaluation of {} images in {} shards",
            total,
            shard_id_image_count_map.len()
        );
    }

    fn on_single_image_evaluation_complete(
        &self,
        shard_id: u64,
        metrics: &TopkAccuracyEvalMetrics,
        image: &str,
    ) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        if done % self.interval == 0 || done == total {
            log::info!(
                "[{}/{}] shard {} {}: running top-1 {:.4}",
                done,
                total,
                shard_id,
                image,
                metrics.top1().unwrap_or(0.0)
            );
        }
    }
}
