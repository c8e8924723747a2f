//! Per-shard image classification stage.
//!
//! Owns one interpreter and turns an [`ImageLabel`] into updated top-K
//! metrics: preprocess (when the interpreter consumes pixels), invoke with
//! timing, score.

use std::time::Instant;

use crate::dataset::ImageLabel;
use crate::error::Result;
use crate::metrics::{
    LatencyMetrics, LatencyStats, TopkAccuracyEvalMetrics, TopkAccuracyEvalStage,
};
use crate::preprocess::preprocess_image;
use crate::runtime::{Interpreter, InvokeRequest};

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    /// 0-based rank of the ground truth within the top K, if present.
    pub rank: Option<usize>,
    /// Running metrics including this image.
    pub metrics: TopkAccuracyEvalMetrics,
}

/// Classification pipeline bound to one interpreter.
pub struct ImageClassificationStage {
    interpreter: Box<dyn Interpreter>,
    topk: TopkAccuracyEvalStage,
    latency: LatencyStats,
}

impl ImageClassificationStage {
    /// Create a stage.
    pub fn new(
        interpreter: Box<dyn Interpreter>,
        model_labels: &[String],
        num_ranks: usize,
    ) -> Result<Self> {
        Ok(Self {
            interpreter,
            topk: TopkAccuracyEvalStage::new(model_labels, num_ranks)?,
            latency: LatencyStats::default(),
        })
    }

    /// Classify one image and fold it into the running metrics.
    pub fn run(&mut self, image: &ImageLabel) -> Result<ImageOutcome> {
        let input = match self.interpreter.input_spec() {
            Some(spec) => Some(preprocess_image(&image.image, &spec)?),
            None => None,
        };

        let request = InvokeRequest {
            image_name: image.file_name(),
            input: input.as_ref(),
        };
        let start = Instant::now();
        let output = self.interpreter.invoke(&request)?;
        self.latency.record(start.elapsed());

        let rank = self.topk.run(&output, &image.label)?;
        Ok(ImageOutcome {
            rank,
            metrics: self.topk.latest_metrics(),
        })
    }

    /// Running top-K metrics.
    #[must_use]
    pub fn latest_metrics(&self) -> TopkAccuracyEvalMetrics {
        self.topk.latest_metrics()
    }

    /// Inference latency so far.
    #[must_use]
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency.metrics()
    }
}
