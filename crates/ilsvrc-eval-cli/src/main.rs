//! ilsvrc-eval CLI - ImageNet top-K accuracy evaluation

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use ilsvrc_eval::delegate::DELEGATE_NUM_THREADS_FLAG;
use ilsvrc_eval::params::{ParamsBuilder, flags};
use ilsvrc_eval::{Delegate, DelegateProviders, Params};

mod commands;

/// Top-K accuracy evaluation of image classifiers on the ILSVRC validation set.
#[derive(Parser)]
#[command(name = "ilsvrc-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a model's top-K accuracy
    Eval {
        #[command(flatten)]
        params: ParamsArgs,

        #[command(flatten)]
        delegates: DelegateArgs,

        /// Number of shard worker threads
        #[arg(long = "num_threads", default_value_t = 4)]
        num_threads: usize,

        /// Write the accuracy report here (.csv for CSV, otherwise JSON)
        #[arg(short, long = "output_file_path")]
        output: Option<PathBuf>,

        /// Log progress every N images
        #[arg(long = "progress_interval", default_value_t = 1000)]
        progress_interval: usize,
    },

    /// Show the eligible image set and shard plan without running inference
    Dataset {
        #[command(flatten)]
        params: ParamsArgs,

        /// Number of shard worker threads
        #[arg(long = "num_threads", default_value_t = 4)]
        num_threads: usize,

        /// List every eligible image with its label
        #[arg(long)]
        list: bool,
    },
}

/// Evaluation parameters. Values given here override `--params`.
#[derive(Args, Debug, Default)]
pub struct ParamsArgs {
    /// JSON params file
    #[arg(long)]
    params: Option<PathBuf>,

    /// Directory of ground-truth validation images
    #[arg(long = flags::GROUND_TRUTH_IMAGES_PATH, env = "ILSVRC_GROUND_TRUTH_IMAGES")]
    ground_truth_images_path: Option<PathBuf>,

    /// Ground-truth label file, one label per image
    #[arg(long = flags::GROUND_TRUTH_LABELS, env = "ILSVRC_GROUND_TRUTH_LABELS")]
    ground_truth_labels: Option<PathBuf>,

    /// Labels in model output order
    #[arg(long = flags::MODEL_OUTPUT_LABELS)]
    model_output_labels: Option<PathBuf>,

    /// Model file (recorded outputs CSV for the replay runtime)
    #[arg(long = flags::MODEL_FILE)]
    model_file: Option<PathBuf>,

    /// File of 1-based image indices to skip
    #[arg(long = flags::BLACKLIST_FILE_PATH, env = "ILSVRC_BLACKLIST")]
    blacklist_file_path: Option<PathBuf>,

    /// Delegate (nnapi, gpu, hexagon, xnnpack)
    #[arg(long = flags::DELEGATE)]
    delegate: Option<String>,

    /// Maximum number of images (0 = all)
    #[arg(long = flags::NUM_IMAGES)]
    num_images: Option<usize>,

    /// Number of ranks, the K in top-K
    #[arg(long = flags::NUM_RANKS)]
    num_ranks: Option<usize>,

    /// Threads per interpreter
    #[arg(long = flags::NUM_INTERPRETER_THREADS)]
    num_interpreter_threads: Option<usize>,

    /// Allow fp16 computation (bare, or true/false/1/0)
    #[arg(
        long = flags::ALLOW_FP16,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    allow_fp16: Option<bool>,
}

impl ParamsArgs {
    /// Build params, starting from `--params` when given.
    pub fn to_params(&self) -> ilsvrc_eval::Result<Params> {
        let mut builder = match &self.params {
            Some(path) => builder_from(Params::load(path)?),
            None => Params::builder(),
        };

        if let Some(p) = &self.ground_truth_images_path {
            builder = builder.ground_truth_images_path(p);
        }
        if let Some(p) = &self.ground_truth_labels {
            builder = builder.ground_truth_labels_path(p);
        }
        if let Some(p) = &self.model_output_labels {
            builder = builder.model_output_labels_path(p);
        }
        if let Some(p) = &self.model_file {
            builder = builder.model_file_path(p);
        }
        if let Some(p) = &self.blacklist_file_path {
            builder = builder.blacklist_file_path(p);
        }
        if let Some(name) = &self.delegate {
            builder = builder.delegate(Delegate::parse_optional(name)?);
        }
        if let Some(n) = self.num_images {
            builder = builder.number_of_images(n);
        }
        if let Some(k) = self.num_ranks {
            builder = builder.num_ranks(k);
        }
        if let Some(t) = self.num_interpreter_threads {
            builder = builder.num_interpreter_threads(t);
        }
        if let Some(allow) = self.allow_fp16 {
            builder = builder.allow_fp16(allow);
        }
        builder.build()
    }
}

fn builder_from(base: Params) -> ParamsBuilder {
    let builder = Params::builder()
        .ground_truth_images_path(base.ground_truth_images_path)
        .ground_truth_labels_path(base.ground_truth_labels_path)
        .model_output_labels_path(base.model_output_labels_path)
        .model_file_path(base.model_file_path)
        .delegate(base.delegate)
        .number_of_images(base.number_of_images)
        .num_ranks(base.num_ranks)
        .num_interpreter_threads(base.num_interpreter_threads)
        .allow_fp16(base.allow_fp16);
    match base.blacklist_file_path {
        Some(path) => builder.blacklist_file_path(path),
        None => builder,
    }
}

/// Externally enabled delegates.
#[derive(Args, Debug, Default)]
pub struct DelegateArgs {
    /// Enable the NNAPI delegate
    #[arg(
        long = "use_nnapi",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    use_nnapi: Option<bool>,

    /// Enable the GPU delegate
    #[arg(
        long = "use_gpu",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    use_gpu: Option<bool>,

    /// Enable the Hexagon delegate
    #[arg(
        long = "use_hexagon",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    use_hexagon: Option<bool>,

    /// Enable the XNNPACK delegate
    #[arg(
        long = "use_xnnpack",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    use_xnnpack: Option<bool>,

    /// Threads for CPU delegates (defaults to --num_interpreter_threads)
    #[arg(long = DELEGATE_NUM_THREADS_FLAG)]
    delegate_num_threads: Option<usize>,
}

impl DelegateArgs {
    /// Registry of enabled delegates, or `None` if nothing was enabled.
    pub fn to_providers(&self) -> Option<DelegateProviders> {
        let switches = [
            (self.use_nnapi, Delegate::Nnapi),
            (self.use_gpu, Delegate::Gpu),
            (self.use_hexagon, Delegate::Hexagon),
            (self.use_xnnpack, Delegate::Xnnpack),
        ];
        let any_enabled = switches.iter().any(|(on, _)| *on == Some(true));
        if !any_enabled && self.delegate_num_threads.is_none() {
            return None;
        }

        let mut providers = DelegateProviders::new();
        for (on, delegate) in switches {
            if on == Some(true) {
                providers.enable(delegate);
            }
        }
        if let Some(threads) = self.delegate_num_threads {
            providers.set_num_threads(threads);
        }
        Some(providers)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Eval {
            params,
            delegates,
            num_threads,
            output,
            progress_interval,
        } => commands::eval::run(&params, &delegates, num_threads, output, progress_interval),
        Commands::Dataset {
            params,
            num_threads,
            list,
        } => commands::dataset::run(&params, num_threads, list, cli.verbose),
    }
}
