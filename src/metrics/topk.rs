//! Top-K accuracy accumulation.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::metrics::TopkAccuracyEvalMetrics;
use crate::runtime::OutputTensor;

/// Accumulates top-K hit counts over a stream of model outputs.
#[derive(Debug, Clone)]
pub struct TopkAccuracyEvalStage {
    num_labels: usize,
    label_index: HashMap<String, usize>,
    accuracy_counts: Vec<u64>,
    num_runs: u64,
}

impl TopkAccuracyEvalStage {
    /// Create a stage over the model output labels.
    ///
    /// `num_ranks` must be between 1 and the number of labels.
    pub fn new(model_labels: &[String], num_ranks: usize) -> Result<Self> {
        if model_labels.is_empty() {
            return Err(Error::InvalidConfig("model output labels are empty".to_string()));
        }
        if num_ranks == 0 || num_ranks > model_labels.len() {
            return Err(Error::InvalidConfig(format!(
                "num_ranks must be in 1..={}, got {}",
                model_labels.len(),
                num_ranks
            )));
        }

        // First occurrence wins for duplicate label text.
        let mut label_index = HashMap::with_capacity(model_labels.len());
        for (i, label) in model_labels.iter().enumerate() {
            label_index.entry(label.clone()).or_insert(i);
        }

        Ok(Self {
            num_labels: model_labels.len(),
            label_index,
            accuracy_counts: vec![0; num_ranks],
            num_runs: 0,
        })
    }

    /// K.
    #[must_use]
    pub fn num_ranks(&self) -> usize {
        self.accuracy_counts.len()
    }

    /// Number of outputs accumulated.
    #[must_use]
    pub fn num_runs(&self) -> u64 {
        self.num_runs
    }

    /// Score one output against its ground-truth label.
    ///
    /// Returns the 0-based rank of the ground truth if it is within the top K.
    pub fn run(
        &mut self,
        output: &OutputTensor,
        ground_truth_label: &str,
    ) -> Result<Option<usize>> {
        if output.len() != self.num_labels {
            return Err(Error::OutputSizeMismatch {
                expected: self.num_labels,
                actual: output.len(),
            });
        }
        let ground_truth = *self
            .label_index
            .get(ground_truth_label)
            .ok_or_else(|| Error::UnknownLabel(ground_truth_label.to_string()))?;

        let top = top_k_indices(&output.to_f32_vec(), self.num_ranks());
        let rank = top.iter().position(|&i| i == ground_truth);

        if let Some(rank) = rank {
            for count in &mut self.accuracy_counts[rank..] {
                *count += 1;
            }
        }
        self.num_runs += 1;
        Ok(rank)
    }

    /// Accuracy at every rank over all runs so far.
    #[must_use]
    pub fn latest_metrics(&self) -> TopkAccuracyEvalMetrics {
        let topk_accuracies = if self.num_runs == 0 {
            vec![0.0; self.accuracy_counts.len()]
        } else {
            self.accuracy_counts
                .iter()
                .map(|&c| (c as f64 / self.num_runs as f64) as f32)
                .collect()
        };
        TopkAccuracyEvalMetrics { topk_accuracies }
    }
}

/// Indices of the `k` highest scores, best first. Ties rank the lower index
/// first; NaN ranks last.
#[must_use]
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    let by_score = |&a: &usize, &b: &usize| compare_desc(scores[a], scores[b]).then(a.cmp(&b));

    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }
    if k < indices.len() {
        indices.select_nth_unstable_by(k - 1, by_score);
        indices.truncate(k);
    }
    indices.sort_by(by_score);
    indices
}

fn compare_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("label{i}")).collect()
    }

    #[test]
    fn test_top_k_indices_order_and_ties() {
        let scores = [0.1, 0.5, 0.3, 0.5, f32::NAN, 0.2];
        assert_eq!(top_k_indices(&scores, 3), vec![1, 3, 2]);
        assert_eq!(top_k_indices(&scores, 10), vec![1, 3, 2, 5, 0, 4]);
        assert!(top_k_indices(&scores, 0).is_empty());
    }

    #[test]
    fn test_stage_counts_ranks() {
        let mut stage = TopkAccuracyEvalStage::new(&labels(4), 3).unwrap();
        let out = OutputTensor::Float32(vec![0.1, 0.6, 0.2, 0.1]);

        // Rank 0
        assert_eq!(stage.run(&out, "label1").unwrap(), Some(0));
        // Rank 1
        assert_eq!(stage.run(&out, "label2").unwrap(), Some(1));
        // label0 and label3 tie at 0.1; label0 wins the tie for rank 2
        assert_eq!(stage.run(&out, "label3").unwrap(), None);
        assert_eq!(stage.run(&out, "label0").unwrap(), Some(2));

        let metrics = stage.latest_metrics();
        assert_eq!(metrics.topk_accuracies, vec![0.25, 0.5, 0.75]);
        assert_eq!(metrics.top1(), Some(0.25));
    }

    #[test]
    fn test_stage_quantized_output() {
        let mut stage = TopkAccuracyEvalStage::new(&labels(3), 1).unwrap();
        let out = OutputTensor::Uint8(vec![3, 250, 7]);
        assert_eq!(stage.run(&out, "label1").unwrap(), Some(0));

        let out = OutputTensor::Int8(vec![-100, -5, -120]);
        assert_eq!(stage.run(&out, "label1").unwrap(), Some(0));
        assert_eq!(stage.latest_metrics().topk_accuracies, vec![1.0]);
    }

    #[test]
    fn test_stage_errors() {
        assert!(TopkAccuracyEvalStage::new(&labels(3), 0).is_err());
        assert!(TopkAccuracyEvalStage::new(&labels(3), 4).is_err());
        assert!(TopkAccuracyEvalStage::new(&[], 1).is_err());

        let mut stage = TopkAccuracyEvalStage::new(&labels(3), 2).unwrap();
        let err = stage.run(&OutputTensor::Float32(vec![1.0, 0.0]), "label0").unwrap_err();
        assert!(matches!(
            err,
            Error::OutputSizeMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let err = stage.run(&OutputTensor::Float32(vec![1.0, 0.0, 0.0]), "zebra").unwrap_err();
        assert!(matches!(err, Error::UnknownLabel(_)));
        assert_eq!(stage.num_runs(), 0);
    }

    #[test]
    fn test_latest_metrics_before_runs() {
        let stage = TopkAccuracyEvalStage::new(&labels(5), 5).unwrap();
        assert_eq!(stage.latest_metrics().topk_accuracies, vec![0.0; 5]);
    }
}
