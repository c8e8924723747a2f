//! Accuracy aggregation across shards and report output.
//!
//! [`AccuracyAggregator`] is an [`Observer`] that keeps each shard's latest
//! running metrics and combines them, weighted by images processed, into a
//! dataset-wide [`AccuracyReport`] that can be written as JSON or CSV.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::eval::evaluator::Observer;
use crate::metrics::TopkAccuracyEvalMetrics;

#[derive(Debug, Default)]
struct ShardProgress {
    expected: usize,
    processed: usize,
    latest: TopkAccuracyEvalMetrics,
}

/// Observer that aggregates per-shard running accuracies.
#[derive(Debug, Default)]
pub struct AccuracyAggregator {
    shards: Mutex<HashMap<u64, ShardProgress>>,
}

impl AccuracyAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Images processed so far across all shards.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.with_shards(|shards| shards.values().map(|s| s.processed).sum())
    }

    /// Images expected across all shards.
    #[must_use]
    pub fn expected(&self) -> usize {
        self.with_shards(|shards| shards.values().map(|s| s.expected).sum())
    }

    /// Dataset-wide accuracies: each shard's latest running accuracy weighted
    /// by the images it has processed.
    #[must_use]
    pub fn aggregate(&self) -> TopkAccuracyEvalMetrics {
        self.with_shards(|shards| {
            let num_ranks = shards
                .values()
                .map(|s| s.latest.topk_accuracies.len())
                .max()
                .unwrap_or(0);
            let total: usize = shards.values().map(|s| s.processed).sum();
            if total == 0 {
                return TopkAccuracyEvalMetrics {
                    topk_accuracies: vec![0.0; num_ranks],
                };
            }

            let mut sums = vec![0.0f64; num_ranks];
            for shard in shards.values() {
                for (sum, &acc) in sums.iter_mut().zip(&shard.latest.topk_accuracies) {
                    *sum += f64::from(acc) * shard.processed as f64;
                }
            }
            TopkAccuracyEvalMetrics {
                topk_accuracies: sums.into_iter().map(|s| (s / total as f64) as f32).collect(),
            }
        })
    }

    /// Snapshot as a report.
    #[must_use]
    pub fn report(&self, model: impl Into<String>) -> AccuracyReport {
        AccuracyReport {
            model: model.into(),
            num_images: self.processed(),
            topk_accuracies: self.aggregate().topk_accuracies,
            timestamp: chrono::Utc::now(),
        }
    }

    fn with_shards<T>(&self, f: impl FnOnce(&HashMap<u64, ShardProgress>) -> T) -> T {
        // A panicking observer elsewhere must not hide results already recorded.
        let guard = self.shards.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard)
    }
}

impl Observer for AccuracyAggregator {
    fn on_evaluation_start(&self, shard_id_image_count_map: &HashMap<u64, usize>) {
        let mut shards = self.shards.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        shards.clear();
        for (&id, &expected) in shard_id_image_count_map {
            shards.insert(
                id,
                ShardProgress {
                    expected,
                    ..ShardProgress::default()
                },
            );
        }
    }

    fn on_single_image_evaluation_complete(
        &self,
        shard_id: u64,
        metrics: &TopkAccuracyEvalMetrics,
        _image: &str,
    ) {
        let mut shards = self.shards.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let shard = shards.entry(shard_id).or_default();
        shard.processed += 1;
        shard.latest = metrics.clone();
    }
}

/// Dataset-wide accuracy summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// Model identifier, usually the model file path.
    pub model: String,

    /// Images evaluated.
    pub num_images: usize,

    /// Accuracy at ranks 1 through K.
    pub topk_accuracies: Vec<f32>,

    /// When this report was generated.
    #[serde(with = "chrono_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AccuracyReport {
    /// Write the report, choosing the format from the extension
    /// (`.csv`, anything else is JSON).
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            self.write_csv(path)
        } else {
            self.write_json(path)
        }
    }

    /// Write as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Write `rank,accuracy` rows.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if self.topk_accuracies.is_empty() {
            return Err(Error::Report("No accuracies to write".to_string()));
        }
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["rank", "accuracy"])?;
        for (i, acc) in self.topk_accuracies.iter().enumerate() {
            wtr.write_record([(i + 1).to_string(), format!("{acc:.6}")])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Human-readable lines, one per rank.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        self.topk_accuracies
            .iter()
            .enumerate()
            .map(|(i, acc)| format!("Top-{}: {:.2}%", i + 1, acc * 100.0))
            .collect()
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(values: &[f32]) -> TopkAccuracyEvalMetrics {
        TopkAccuracyEvalMetrics {
            topk_accuracies: values.to_vec(),
        }
    }

    #[test]
    fn test_aggregate_weights_by_processed() {
        let agg = AccuracyAggregator::new();
        agg.on_evaluation_start(&[(0, 3), (1, 1)].into_iter().collect());
        assert_eq!(agg.expected(), 4);

        agg.on_single_image_evaluation_complete(0, &metrics(&[1.0, 1.0]), "a");
        agg.on_single_image_evaluation_complete(0, &metrics(&[0.5, 1.0]), "b");
        agg.on_single_image_evaluation_complete(0, &metrics(&[1.0 / 3.0, 1.0]), "c");
        agg.on_single_image_evaluation_complete(1, &metrics(&[1.0, 1.0]), "d");

        assert_eq!(agg.processed(), 4);
        let result = agg.aggregate();
        assert!((result.topk_accuracies[0] - 0.5).abs() < 1e-6);
        assert!((result.topk_accuracies[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_empty() {
        let agg = AccuracyAggregator::new();
        assert!(agg.aggregate().topk_accuracies.is_empty());
        agg.on_evaluation_start(&[(0, 2)].into_iter().collect());
        assert!(agg.aggregate().topk_accuracies.is_empty());
        assert_eq!(agg.processed(), 0);
    }

    #[test]
    fn test_start_resets() {
        let agg = AccuracyAggregator::new();
        agg.on_evaluation_start(&[(0, 1)].into_iter().collect());
        agg.on_single_image_evaluation_complete(0, &metrics(&[1.0]), "a");
        agg.on_evaluation_start(&[(0, 1)].into_iter().collect());
        assert_eq!(agg.processed(), 0);
    }

    #[test]
    fn test_report_write_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let agg = AccuracyAggregator::new();
        agg.on_evaluation_start(&[(0, 1)].into_iter().collect());
        agg.on_single_image_evaluation_complete(0, &metrics(&[0.0, 1.0]), "a");
        let report = agg.report("model.csv");
        assert_eq!(report.num_images, 1);
        assert_eq!(report.summary_lines(), vec!["Top-1: 0.00%", "Top-2: 100.00%"]);

        let json_path = dir.path().join("out/report.json");
        report.write(&json_path).unwrap();
        let loaded: AccuracyReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(loaded.topk_accuracies, vec![0.0, 1.0]);
        assert_eq!(loaded.model, "model.csv");

        let csv_path = dir.path().join("report.CSV");
        report.write(&csv_path).unwrap();
        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(content, "rank,accuracy\n1,0.000000\n2,1.000000\n");
    }

    #[test]
    fn test_csv_requires_accuracies() {
        let dir = tempfile::tempdir().unwrap();
        let report = AccuracyAggregator::new().report("m");
        assert!(matches!(report.write_csv(&dir.path().join("r.csv")), Err(Error::Report(_))));
    }
}
