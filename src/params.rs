//! Evaluation parameters and command-line flag consumption.
//!
//! [`Params`] can be built three ways: with [`Params::builder`], loaded from a
//! JSON file, or parsed out of process arguments by [`Params::from_args`]. The
//! latter removes every recognized flag from the argument list and leaves the
//! rest in place so callers can hand the remainder to another parser.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Flag names recognized by [`Params::from_args`].
pub mod flags {
    pub const GROUND_TRUTH_IMAGES_PATH: &str = "ground_truth_images_path";
    pub const GROUND_TRUTH_LABELS: &str = "ground_truth_labels";
    pub const MODEL_OUTPUT_LABELS: &str = "model_output_labels";
    pub const BLACKLIST_FILE_PATH: &str = "blacklist_file_path";
    pub const MODEL_FILE: &str = "model_file";
    pub const DELEGATE: &str = "delegate";
    pub const NUM_IMAGES: &str = "num_images";
    pub const NUM_RANKS: &str = "num_ranks";
    pub const NUM_INTERPRETER_THREADS: &str = "num_interpreter_threads";
    pub const ALLOW_FP16: &str = "allow_fp16";
}

/// Hardware delegate used to run inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    /// Android Neural Networks API.
    Nnapi,
    /// GPU delegate.
    Gpu,
    /// Qualcomm Hexagon DSP.
    Hexagon,
    /// XNNPACK CPU kernels.
    Xnnpack,
}

impl Delegate {
    /// All supported delegates.
    pub const ALL: [Delegate; 4] = [Self::Nnapi, Self::Gpu, Self::Hexagon, Self::Xnnpack];

    /// Lowercase delegate name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Nnapi => "nnapi",
            Self::Gpu => "gpu",
            Self::Hexagon => "hexagon",
            Self::Xnnpack => "xnnpack",
        }
    }

    /// Parse an optional delegate name; an empty string means no delegate.
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Delegate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nnapi" => Ok(Self::Nnapi),
            "gpu" => Ok(Self::Gpu),
            "hexagon" => Ok(Self::Hexagon),
            "xnnpack" => Ok(Self::Xnnpack),
            _ => Err(Error::UnknownDelegate(s.to_string())),
        }
    }
}

/// Evaluation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Directory holding the ground-truth validation images.
    pub ground_truth_images_path: PathBuf,

    /// Ground-truth label file, one label per image in sorted file name order.
    pub ground_truth_labels_path: PathBuf,

    /// Labels in the order of the model's output scores. The model's category
    /// indices may differ from the dataset's, so labels are matched by text.
    pub model_output_labels_path: PathBuf,

    /// Model file handed to the interpreter runtime.
    pub model_file_path: PathBuf,

    /// Sorted list of 1-based image indices to exclude. The ILSVRC2014 devkit
    /// ships one covering 1762 validation images.
    #[serde(default)]
    pub blacklist_file_path: Option<PathBuf>,

    /// Delegate used to perform inference, if any.
    #[serde(default)]
    pub delegate: Option<Delegate>,

    /// Maximum number of images to evaluate. 0 means all images.
    #[serde(default)]
    pub number_of_images: usize,

    /// Number of ranks, the K in top-K.
    #[serde(default = "default_num_ranks")]
    pub num_ranks: usize,

    /// Threads used by each interpreter.
    #[serde(default = "default_interpreter_threads")]
    pub num_interpreter_threads: usize,

    /// Allow delegates to compute in reduced fp16 precision.
    #[serde(default)]
    pub allow_fp16: bool,
}

fn default_num_ranks() -> usize {
    10
}

fn default_interpreter_threads() -> usize {
    1
}

impl Params {
    /// Create a new params builder.
    #[must_use]
    pub fn builder() -> ParamsBuilder {
        ParamsBuilder::default()
    }

    /// Parse params from command-line arguments.
    ///
    /// Recognized flags are removed from `args`; anything else is left in
    /// place in its original order.
    pub fn from_args(args: &mut Vec<String>) -> Result<Self> {
        let mut parser = FlagParser::new(args);

        let ground_truth_images_path = parser.take_value(flags::GROUND_TRUTH_IMAGES_PATH)?;
        let ground_truth_labels_path = parser.take_value(flags::GROUND_TRUTH_LABELS)?;
        let model_output_labels_path = parser.take_value(flags::MODEL_OUTPUT_LABELS)?;
        let blacklist_file_path = parser.take_value(flags::BLACKLIST_FILE_PATH)?;
        let model_file_path = parser.take_value(flags::MODEL_FILE)?;
        let delegate = parser.take_value(flags::DELEGATE)?;
        let number_of_images = parser.take_parsed::<usize>(flags::NUM_IMAGES)?;
        let num_ranks = parser.take_parsed::<usize>(flags::NUM_RANKS)?;
        let num_interpreter_threads =
            parser.take_parsed::<usize>(flags::NUM_INTERPRETER_THREADS)?;
        let allow_fp16 = parser.take_switch(flags::ALLOW_FP16)?;

        let ground_truth_images_path = ground_truth_images_path
            .ok_or(Error::MissingFlag(flags::GROUND_TRUTH_IMAGES_PATH))?;
        let ground_truth_labels_path =
            ground_truth_labels_path.ok_or(Error::MissingFlag(flags::GROUND_TRUTH_LABELS))?;
        let model_output_labels_path =
            model_output_labels_path.ok_or(Error::MissingFlag(flags::MODEL_OUTPUT_LABELS))?;
        let model_file_path = model_file_path.ok_or(Error::MissingFlag(flags::MODEL_FILE))?;

        let mut builder = Params::builder()
            .ground_truth_images_path(ground_truth_images_path)
            .ground_truth_labels_path(ground_truth_labels_path)
            .model_output_labels_path(model_output_labels_path)
            .model_file_path(model_file_path);

        if let Some(path) = blacklist_file_path.filter(|p| !p.is_empty()) {
            builder = builder.blacklist_file_path(path);
        }
        if let Some(name) = delegate {
            builder = builder.delegate(Delegate::parse_optional(&name)?);
        }
        if let Some(n) = number_of_images {
            builder = builder.number_of_images(n);
        }
        if let Some(k) = num_ranks {
            builder = builder.num_ranks(k);
        }
        if let Some(t) = num_interpreter_threads {
            builder = builder.num_interpreter_threads(t);
        }
        if let Some(fp16) = allow_fp16 {
            builder = builder.allow_fp16(fp16);
        }

        builder.build()
    }

    /// Load params from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let params: Params = serde_json::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    /// Save params to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check numeric ranges.
    pub fn validate(&self) -> Result<()> {
        if self.num_ranks == 0 {
            return Err(Error::InvalidConfig("num_ranks must be at least 1".to_string()));
        }
        if self.num_interpreter_threads == 0 {
            return Err(Error::InvalidConfig(
                "num_interpreter_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`Params`].
#[derive(Debug, Default)]
pub struct ParamsBuilder {
    ground_truth_images_path: Option<PathBuf>,
    ground_truth_labels_path: Option<PathBuf>,
    model_output_labels_path: Option<PathBuf>,
    model_file_path: Option<PathBuf>,
    blacklist_file_path: Option<PathBuf>,
    delegate: Option<Delegate>,
    number_of_images: Option<usize>,
    num_ranks: Option<usize>,
    num_interpreter_threads: Option<usize>,
    allow_fp16: Option<bool>,
}

impl ParamsBuilder {
    /// Set the ground-truth image directory.
    #[must_use]
    pub fn ground_truth_images_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ground_truth_images_path = Some(path.into());
        self
    }

    /// Set the ground-truth label file.
    #[must_use]
    pub fn ground_truth_labels_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ground_truth_labels_path = Some(path.into());
        self
    }

    /// Set the model output label file.
    #[must_use]
    pub fn model_output_labels_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_output_labels_path = Some(path.into());
        self
    }

    /// Set the model file.
    #[must_use]
    pub fn model_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_file_path = Some(path.into());
        self
    }

    /// Set the blacklist file.
    #[must_use]
    pub fn blacklist_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blacklist_file_path = Some(path.into());
        self
    }

    /// Set the delegate (`None` runs on the default CPU path).
    #[must_use]
    pub fn delegate(mut self, delegate: Option<Delegate>) -> Self {
        self.delegate = delegate;
        self
    }

    /// Cap the number of evaluated images (0 = all).
    #[must_use]
    pub fn number_of_images(mut self, n: usize) -> Self {
        self.number_of_images = Some(n);
        self
    }

    /// Set K.
    #[must_use]
    pub fn num_ranks(mut self, k: usize) -> Self {
        self.num_ranks = Some(k);
        self
    }

    /// Set the per-interpreter thread count.
    #[must_use]
    pub fn num_interpreter_threads(mut self, threads: usize) -> Self {
        self.num_interpreter_threads = Some(threads);
        self
    }

    /// Allow fp16 computation.
    #[must_use]
    pub fn allow_fp16(mut self, allow: bool) -> Self {
        self.allow_fp16 = Some(allow);
        self
    }

    /// Build the params.
    pub fn build(self) -> Result<Params> {
        let params = Params {
            ground_truth_images_path: self
                .ground_truth_images_path
                .ok_or(Error::MissingFlag(flags::GROUND_TRUTH_IMAGES_PATH))?,
            ground_truth_labels_path: self
                .ground_truth_labels_path
                .ok_or(Error::MissingFlag(flags::GROUND_TRUTH_LABELS))?,
            model_output_labels_path: self
                .model_output_labels_path
                .ok_or(Error::MissingFlag(flags::MODEL_OUTPUT_LABELS))?,
            model_file_path: self.model_file_path.ok_or(Error::MissingFlag(flags::MODEL_FILE))?,
            blacklist_file_path: self.blacklist_file_path,
            delegate: self.delegate,
            number_of_images: self.number_of_images.unwrap_or(0),
            num_ranks: self.num_ranks.unwrap_or_else(default_num_ranks),
            num_interpreter_threads: self
                .num_interpreter_threads
                .unwrap_or_else(default_interpreter_threads),
            allow_fp16: self.allow_fp16.unwrap_or(false),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Consumes `--name=value`, `--name value` and bare `--name` switches from an
/// argument list. A single leading dash is accepted too. When a flag repeats,
/// the last occurrence wins and all occurrences are removed.
pub(crate) struct FlagParser<'a> {
    args: &'a mut Vec<String>,
}

impl<'a> FlagParser<'a> {
    pub(crate) fn new(args: &'a mut Vec<String>) -> Self {
        Self { args }
    }

    /// Remove a valued flag, returning its value.
    pub(crate) fn take_value(&mut self, name: &'static str) -> Result<Option<String>> {
        let mut found = None;
        let mut i = 0;
        while i < self.args.len() {
            let matched = match_flag(&self.args[i], name).map(|v| v.map(str::to_owned));
            match matched {
                Some(Some(value)) => {
                    self.args.remove(i);
                    found = Some(value);
                }
                Some(None) => {
                    // A following flag is never taken as the value.
                    if self.args.get(i + 1).is_none_or(|next| next.starts_with('-')) {
                        return Err(Error::InvalidFlag {
                            flag: name,
                            value: String::new(),
                            reason: "missing value".to_string(),
                        });
                    }
                    let value = self.args.remove(i + 1);
                    self.args.remove(i);
                    found = Some(value);
                }
                None => i += 1,
            }
        }
        Ok(found)
    }

    /// Remove a valued flag and parse it.
    pub(crate) fn take_parsed<T>(&mut self, name: &'static str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.take_value(name)? {
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| Error::InvalidFlag {
                flag: name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Remove a boolean switch. A bare switch means `true`; in the space
    /// form the next argument is consumed only if it is a boolean literal.
    pub(crate) fn take_switch(&mut self, name: &'static str) -> Result<Option<bool>> {
        let mut found = None;
        let mut i = 0;
        while i < self.args.len() {
            let matched = match_flag(&self.args[i], name).map(|v| v.map(str::to_owned));
            match matched {
                Some(Some(v)) => {
                    self.args.remove(i);
                    found = Some(parse_bool(&v).ok_or_else(|| Error::InvalidFlag {
                        flag: name,
                        value: v.clone(),
                        reason: "expected true/false/1/0".to_string(),
                    })?);
                }
                Some(None) => {
                    let next = self.args.get(i + 1).and_then(|next| parse_bool(next));
                    if next.is_some() {
                        self.args.remove(i + 1);
                    }
                    self.args.remove(i);
                    found = Some(next.unwrap_or(true));
                }
                None => i += 1,
            }
        }
        Ok(found)
    }
}

/// `Some(None)` for `--name`, `Some(Some(v))` for `--name=v`, `None` otherwise.
fn match_flag<'s>(arg: &'s str, name: &str) -> Option<Option<&'s str>> {
    let rest = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'))?;
    if rest == name {
        return Some(None);
    }
    rest.strip_prefix(name)?.strip_prefix('=').map(Some)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
