//! # ilsvrc-eval
//!
//! Top-K accuracy evaluation of image classification models on the ILSVRC
//! (ImageNet) validation set.
//!
//! The library handles the dataset (ground-truth discovery, label remapping,
//! blacklist), sharding, preprocessing and top-K scoring. Inference is
//! delegated to an [`InterpreterFactory`] supplied by the caller; results
//! reach the caller through registered [`Observer`]s.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ilsvrc_eval::{AccuracyAggregator, ImagenetModelEvaluator, ReplayRuntime};
//!
//! let mut args: Vec<String> = std::env::args().collect();
//! let aggregator = AccuracyAggregator::new();
//! let runtime = Arc::new(ReplayRuntime::new());
//! let mut evaluator = ImagenetModelEvaluator::create(&mut args, 4, runtime)?;
//! evaluator.add_observer(&aggregator);
//! evaluator.evaluate_model(None)?;
//! for line in aggregator.report("model").summary_lines() {
//!     println!("{line}");
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`params`]: Evaluation parameters and flag parsing
//! - [`dataset`]: Ground-truth loading and sharding
//! - [`delegate`]: Delegate provider registry
//! - [`runtime`]: Interpreter interface and the replay runtime
//! - [`preprocess`]: Image decoding and input preparation
//! - [`metrics`]: Top-K accuracy and latency metrics
//! - [`eval`]: Evaluator, observers and reports

pub mod dataset;
pub mod delegate;
pub mod error;
pub mod eval;
pub mod metrics;
pub mod params;
pub mod preprocess;
pub mod runtime;

// Re-export commonly used types
pub use dataset::{Dataset, ImageLabel};
pub use delegate::{DelegateConfig, DelegateProviders};
pub use error::{Error, Result};
pub use eval::{
    AccuracyAggregator, AccuracyReport, ImageClassificationStage, ImagenetModelEvaluator,
    Observer, ProgressLogger,
};
pub use metrics::{LatencyMetrics, TopkAccuracyEvalMetrics};
pub use params::{Delegate, Params};
pub use runtime::{
    InputSpec, InputType, Interpreter, InterpreterFactory, InterpreterOptions, OutputTensor,
    ReplayRuntime,
};
