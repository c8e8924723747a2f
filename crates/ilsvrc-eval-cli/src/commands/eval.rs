//! Evaluation command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ilsvrc_eval::{AccuracyAggregator, ImagenetModelEvaluator, ProgressLogger, ReplayRuntime};

use crate::{DelegateArgs, ParamsArgs};

pub fn run(
    params: &ParamsArgs,
    delegates: &DelegateArgs,
    num_threads: usize,
    output: Option<PathBuf>,
    progress_interval: usize,
) -> Result<()> {
    let params = params.to_params().context("Invalid evaluation parameters")?;
    let model = params.model_file_path.display().to_string();
    let providers = delegates.to_providers();

    let aggregator = AccuracyAggregator::new();
    let progress = ProgressLogger::new(progress_interval);

    let runtime = Arc::new(ReplayRuntime::new());
    let mut evaluator = ImagenetModelEvaluator::new(params, num_threads, runtime);
    evaluator.add_observer(&aggregator).add_observer(&progress);
    evaluator
        .evaluate_model(providers.as_ref())
        .with_context(|| format!("Evaluation of {model} failed"))?;

    let report = aggregator.report(model);
    println!("Evaluated {} images", report.num_images);
    for line in report.summary_lines() {
        println!("  {line}");
    }

    if let Some(path) = output {
        report
            .write(&path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Saved report to: {}", path.display());
    }

    Ok(())
}
