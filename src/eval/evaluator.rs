//! ILSVRC top-K accuracy evaluator.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ilsvrc_eval::{AccuracyAggregator, ImagenetModelEvaluator, Params, ReplayRuntime};
//!
//! let params = Params::builder()
//!     .ground_truth_images_path("/data/ILSVRC2012_img_val")
//!     .ground_truth_labels_path("/data/val_labels.txt")
//!     .model_output_labels_path("/data/model_labels.txt")
//!     .model_file_path("/data/outputs.csv")
//!     .build()?;
//!
//! let aggregator = AccuracyAggregator::new();
//! let mut evaluator = ImagenetModelEvaluator::new(params, 4, Arc::new(ReplayRuntime::new()));
//! evaluator.add_observer(&aggregator);
//! evaluator.evaluate_model(None)?;
//! println!("{:?}", aggregator.aggregate());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::dataset::{Dataset, Shard, shard_image_counts, shard_images};
use crate::delegate::{DelegateProviders, resolve_delegates};
use crate::error::{Error, Result};
use crate::eval::stage::ImageClassificationStage;
use crate::metrics::{TopkAccuracyEvalMetrics, TopkAccuracyEvalStage};
use crate::params::Params;
use crate::runtime::{InterpreterFactory, InterpreterOptions};

/// Receives evaluation events.
///
/// Callbacks arrive concurrently from every shard's worker thread.
pub trait Observer: Send + Sync {
    /// Called once before any image is evaluated, with the number of images
    /// assigned to each shard.
    fn on_evaluation_start(&self, shard_id_image_count_map: &HashMap<u64, usize>);

    /// Called after each image with the shard's running metrics.
    fn on_single_image_evaluation_complete(
        &self,
        shard_id: u64,
        metrics: &TopkAccuracyEvalMetrics,
        image: &str,
    );
}

/// Evaluates a model's accuracy on the ILSVRC validation set.
///
/// Observers are borrowed for `'a` and must outlive the evaluator.
pub struct ImagenetModelEvaluator<'a> {
    params: Params,
    num_threads: usize,
    runtime: Arc<dyn InterpreterFactory>,
    observers: Vec<&'a dyn Observer>,
}

impl<'a> ImagenetModelEvaluator<'a> {
    /// Create an evaluator that shards work over `num_threads` workers.
    /// A thread count of 0 is treated as 1.
    #[must_use]
    pub fn new(params: Params, num_threads: usize, runtime: Arc<dyn InterpreterFactory>) -> Self {
        Self {
            params,
            num_threads: num_threads.max(1),
            runtime,
            observers: Vec::new(),
        }
    }

    /// Create an evaluator from command-line arguments.
    ///
    /// Recognized flags are removed from `args`; see [`Params::from_args`].
    pub fn create(
        args: &mut Vec<String>,
        num_threads: usize,
        runtime: Arc<dyn InterpreterFactory>,
    ) -> Result<Self> {
        let params = Params::from_args(args)?;
        Ok(Self::new(params, num_threads, runtime))
    }

    /// Register an observer.
    pub fn add_observer(&mut self, observer: &'a dyn Observer) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// The evaluation params.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Number of shard workers.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Evaluate the model over the dataset, blocking until every shard is
    /// done.
    ///
    /// `delegate_providers` adds externally configured delegates to the one
    /// named in the params.
    pub fn evaluate_model(&self, delegate_providers: Option<&DelegateProviders>) -> Result<()> {
        let dataset = Dataset::load(&self.params)?;
        if dataset.is_empty() {
            return Err(Error::Dataset("No eligible images to evaluate".to_string()));
        }
        // Reject bad K before any observer hears about the run.
        TopkAccuracyEvalStage::new(&dataset.model_labels, self.params.num_ranks)?;

        let options = InterpreterOptions {
            model_path: self.params.model_file_path.clone(),
            num_threads: self.params.num_interpreter_threads,
            delegates: resolve_delegates(&self.params, delegate_providers),
            allow_fp16: self.params.allow_fp16,
        };
        for delegate in &options.delegates {
            log::debug!(
                "Requesting delegate {} ({} threads, fp16: {})",
                delegate.delegate,
                delegate.num_threads,
                delegate.allow_fp16
            );
        }

        let shards = shard_images(&dataset.images, self.num_threads);
        let counts = shard_image_counts(&shards);
        log::info!(
            "Evaluating {} images over {} shards with runtime {}",
            dataset.len(),
            shards.len(),
            self.runtime.name()
        );

        for observer in &self.observers {
            observer.on_evaluation_start(&counts);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(shards.len())
            .thread_name(|i| format!("ilsvrc-shard-{i}"))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build thread pool: {e}")))?;

        let results: Vec<Result<()>> = pool.install(|| {
            shards
                .par_iter()
                .map(|shard| {
                    self.evaluate_shard(shard, &dataset.model_labels, &options)
                        .map_err(|e| Error::Shard {
                            shard_id: shard.id,
                            source: Box::new(e),
                        })
                })
                .collect()
        });

        // Report the lowest failing shard.
        if let Some(err) = results.into_iter().find_map(Result::err) {
            log::error!("{err}");
            return Err(err);
        }

        log::info!("Evaluation complete");
        Ok(())
    }

    fn evaluate_shard(
        &self,
        shard: &Shard<'_>,
        model_labels: &[String],
        options: &InterpreterOptions,
    ) -> Result<()> {
        let interpreter = self.runtime.create(options)?;
        let mut stage =
            ImageClassificationStage::new(interpreter, model_labels, self.params.num_ranks)?;

        for image in shard.images {
            let outcome = stage.run(image)?;
            log::debug!(
                "shard {}: {} ({}) rank {:?}",
                shard.id,
                image.file_name(),
                image.label,
                outcome.rank
            );
            for observer in &self.observers {
                observer.on_single_image_evaluation_complete(
                    shard.id,
                    &outcome.metrics,
                    image.file_name(),
                );
            }
        }

        let latency = stage.latency_metrics();
        log::info!(
            "shard {}: {} images, top-1 {:.4}, mean latency {:.0}us",
            shard.id,
            shard.images.len(),
            stage.latest_metrics().top1().unwrap_or(0.0),
            latency.avg_us
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::DelegateProviders;
    use crate::params::Delegate;
    use crate::runtime::ReplayRuntime;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        starts: Mutex<Vec<HashMap<u64, usize>>>,
        images: Mutex<Vec<(u64, String, TopkAccuracyEvalMetrics)>>,
    }

    impl Observer for RecordingObserver {
        fn on_evaluation_start(&self, shard_id_image_count_map: &HashMap<u64, usize>) {
            self.starts.lock().unwrap().push(shard_id_image_count_map.clone());
        }

        fn on_single_image_evaluation_complete(
            &self,
            shard_id: u64,
            metrics: &TopkAccuracyEvalMetrics,
            image: &str,
        ) {
            self.images.lock().unwrap().push((shard_id, image.to_string(), metrics.clone()));
        }
    }

    const LABELS: [&str; 4] = ["tench", "goldfish", "shark", "hen"];

    /// `count` images; image i has ground truth LABELS[i % 4]. The recorded
    /// output ranks the true label first for even i and second for odd i.
    fn write_fixture(dir: &Path, count: usize) {
        let images = dir.join("images");
        fs::create_dir(&images).unwrap();
        let mut gt = String::new();
        let mut outputs = String::new();
        for i in 0..count {
            let name = format!("ILSVRC2012_val_{:08}.JPEG", i + 1);
            fs::write(images.join(&name), b"").unwrap();
            let truth = i % LABELS.len();
            gt.push_str(LABELS[truth]);
            gt.push('\n');

            let mut scores = vec![0.0f32; LABELS.len()];
            if i % 2 == 0 {
                scores[truth] = 0.9;
            } else {
                scores[truth] = 0.5;
                scores[(truth + 1) % LABELS.len()] = 0.6;
            }
            let row: Vec<String> = scores.iter().map(|s| s.to_string()).collect();
            outputs.push_str(&format!("{},{}\n", name, row.join(",")));
        }
        fs::write(dir.join("gt.txt"), gt).unwrap();
        fs::write(dir.join("outputs.csv"), outputs).unwrap();
        fs::write(dir.join("labels.txt"), LABELS.join("\n")).unwrap();
    }

    fn args(dir: &Path, extra: &[&str]) -> Vec<String> {
        let mut args = vec![
            format!("--ground_truth_images_path={}", dir.join("images").display()),
            format!("--ground_truth_labels={}", dir.join("gt.txt").display()),
            format!("--model_output_labels={}", dir.join("labels.txt").display()),
            format!("--model_file={}", dir.join("outputs.csv").display()),
        ];
        args.extend(extra.iter().map(|s| (*s).to_string()));
        args
    }

    #[test]
    fn test_observers_notified_once_per_image() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 10);

        let mut argv = args(dir.path(), &["--num_ranks=2", "--keep_me"]);
        let first = RecordingObserver::default();
        let second = RecordingObserver::default();
        let mut evaluator =
            ImagenetModelEvaluator::create(&mut argv, 3, Arc::new(ReplayRuntime::new())).unwrap();
        assert_eq!(argv, vec!["--keep_me".to_string()]);
        evaluator.add_observer(&first).add_observer(&second);
        evaluator.evaluate_model(None).unwrap();

        for observer in [&first, &second] {
            let starts = observer.starts.lock().unwrap();
            assert_eq!(starts.len(), 1);
            let expected: HashMap<u64, usize> = [(0, 4), (1, 3), (2, 3)].into_iter().collect();
            assert_eq!(starts[0], expected);

            let images = observer.images.lock().unwrap();
            assert_eq!(images.len(), 10);
            let mut names: Vec<_> = images.iter().map(|(_, name, _)| name.clone()).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), 10);
        }
    }

    #[test]
    fn test_running_metrics_per_shard() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 4);

        let mut argv = args(dir.path(), &["--num_ranks=2"]);
        let observer = RecordingObserver::default();
        let mut evaluator =
            ImagenetModelEvaluator::create(&mut argv, 1, Arc::new(ReplayRuntime::new())).unwrap();
        evaluator.add_observer(&observer);
        evaluator.evaluate_model(None).unwrap();

        let images = observer.images.lock().unwrap();
        let accuracies: Vec<Vec<f32>> =
            images.iter().map(|(_, _, m)| m.topk_accuracies.clone()).collect();
        assert_eq!(
            accuracies,
            vec![vec![1.0, 1.0], vec![0.5, 1.0], vec![2.0 / 3.0, 1.0], vec![0.5, 1.0]]
        );
        assert!(images.iter().all(|(shard, _, _)| *shard == 0));
    }

    #[test]
    fn test_more_threads_than_images() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 2);

        let mut argv = args(dir.path(), &["--num_ranks=1"]);
        let observer = RecordingObserver::default();
        let mut evaluator =
            ImagenetModelEvaluator::create(&mut argv, 8, Arc::new(ReplayRuntime::new())).unwrap();
        evaluator.add_observer(&observer);
        evaluator.evaluate_model(None).unwrap();

        assert_eq!(observer.starts.lock().unwrap()[0].len(), 2);
        assert_eq!(observer.images.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_num_images_cap() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 9);

        let mut argv = args(dir.path(), &["--num_ranks=1", "--num_images=5"]);
        let observer = RecordingObserver::default();
        let mut evaluator =
            ImagenetModelEvaluator::create(&mut argv, 2, Arc::new(ReplayRuntime::new())).unwrap();
        evaluator.add_observer(&observer);
        evaluator.evaluate_model(None).unwrap();
        assert_eq!(observer.images.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_missing_output_fails_shard() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 4);
        fs::write(dir.path().join("images").join("ILSVRC2012_val_00000005.JPEG"), b"").unwrap();
        fs::write(dir.path().join("gt.txt"), "tench\ngoldfish\nshark\nhen\ntench\n").unwrap();

        let mut argv = args(dir.path(), &["--num_ranks=1"]);
        let evaluator =
            ImagenetModelEvaluator::create(&mut argv, 2, Arc::new(ReplayRuntime::new())).unwrap();
        let err = evaluator.evaluate_model(None).unwrap_err();
        assert!(matches!(err, Error::Shard { shard_id: 1, .. }));
    }

    #[test]
    fn test_invalid_ranks_fail_before_start() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 2);

        let mut argv = args(dir.path(), &["--num_ranks=5"]);
        let observer = RecordingObserver::default();
        let mut evaluator =
            ImagenetModelEvaluator::create(&mut argv, 1, Arc::new(ReplayRuntime::new())).unwrap();
        evaluator.add_observer(&observer);
        assert!(matches!(evaluator.evaluate_model(None), Err(Error::InvalidConfig(_))));
        assert!(observer.starts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_delegate_from_providers_reaches_runtime() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 2);

        let mut argv = args(dir.path(), &["--num_ranks=1"]);
        let evaluator =
            ImagenetModelEvaluator::create(&mut argv, 1, Arc::new(ReplayRuntime::new())).unwrap();
        evaluator.evaluate_model(None).unwrap();

        let mut providers = DelegateProviders::new();
        providers.enable(Delegate::Xnnpack);
        let err = evaluator.evaluate_model(Some(&providers)).unwrap_err();
        let Error::Shard { source, .. } = err else {
            panic!("expected shard error");
        };
        assert!(matches!(*source, Error::DelegateUnavailable { .. }));
    }

    #[test]
    fn test_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), 0);
        let mut argv = args(dir.path(), &[]);
        let evaluator =
            ImagenetModelEvaluator::create(&mut argv, 1, Arc::new(ReplayRuntime::new())).unwrap();
        assert!(matches!(evaluator.evaluate_model(None), Err(Error::Dataset(_))));
    }

    #[test]
    fn test_zero_threads_means_one() {
        let params = Params::builder()
            .ground_truth_images_path("/a")
            .ground_truth_labels_path("/b")
            .model_output_labels_path("/c")
            .model_file_path("/d")
            .build()
            .unwrap();
        let evaluator = ImagenetModelEvaluator::new(params, 0, Arc::new(ReplayRuntime::new()));
        assert_eq!(evaluator.num_threads(), 1);
        assert_eq!(evaluator.params().num_ranks, 10);
    }
}
