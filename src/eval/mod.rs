//! Evaluation driver, classification stage and built-in observers.
//!
//! - [`evaluator::ImagenetModelEvaluator`]: sharded evaluation entry point
//! - [`evaluator::Observer`]: evaluation event callbacks
//! - [`stage::ImageClassificationStage`]: preprocess, invoke, score
//! - [`report::AccuracyAggregator`]: dataset-wide accuracy observer
//! - [`progress::ProgressLogger`]: progress logging observer

pub mod evaluator;
pub mod progress;
pub mod report;
pub mod stage;

pub use evaluator::{ImagenetModelEvaluator, Observer};
pub use progress::ProgressLogger;
pub use report::{AccuracyAggregator, AccuracyReport};
pub use stage::{ImageClassificationStage, ImageOutcome};
