//! Interpreter runtime interface.
//!
//! The evaluator does not run models itself. A runtime implements
//! [`InterpreterFactory`], which is asked for one [`Interpreter`] per shard;
//! each interpreter is then driven from a single worker thread.
//!
//! [`replay::ReplayRuntime`] is a runtime backed by recorded model outputs.

pub mod replay;

use std::path::PathBuf;

use crate::delegate::DelegateConfig;
use crate::error::Result;
use crate::preprocess::InputTensor;

pub use replay::ReplayRuntime;

/// Element type expected by the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputType {
    /// Float input computed as `(pixel - mean) * scale`.
    Float32 {
        /// Value subtracted from each 0-255 channel.
        mean: f32,
        /// Multiplier applied after subtraction.
        scale: f32,
    },
    /// Raw 0-255 channels.
    Uint8,
    /// Channels shifted to -128..=127.
    Int8,
}

impl InputType {
    /// Float input normalized to `[-1, 1]`, the MobileNet convention.
    #[must_use]
    pub fn float_symmetric() -> Self {
        Self::Float32 {
            mean: 127.5,
            scale: 1.0 / 127.5,
        }
    }
}

/// Geometry and element type of a model's image input (NHWC, RGB).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSpec {
    /// Input width in pixels.
    pub width: usize,
    /// Input height in pixels.
    pub height: usize,
    /// Element type.
    pub input_type: InputType,
}

/// Model output scores, one per model output label.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTensor {
    /// Float scores.
    Float32(Vec<f32>),
    /// Quantized unsigned scores.
    Uint8(Vec<u8>),
    /// Quantized signed scores.
    Int8(Vec<i8>),
}

impl OutputTensor {
    /// Number of scores.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::Uint8(v) => v.len(),
            Self::Int8(v) => v.len(),
        }
    }

    /// Check if there are no scores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scores widened to f32. Quantized values keep their raw magnitude,
    /// which preserves ordering.
    #[must_use]
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            Self::Float32(v) => v.clone(),
            Self::Uint8(v) => v.iter().map(|&x| f32::from(x)).collect(),
            Self::Int8(v) => v.iter().map(|&x| f32::from(x)).collect(),
        }
    }
}

/// Options used to create an interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterOptions {
    /// Model file.
    pub model_path: PathBuf,
    /// Threads the interpreter may use.
    pub num_threads: usize,
    /// Delegates to apply, in order.
    pub delegates: Vec<DelegateConfig>,
    /// Allow fp16 computation.
    pub allow_fp16: bool,
}

/// A single inference request.
#[derive(Debug, Clone, Copy)]
pub struct InvokeRequest<'a> {
    /// File name of the image being classified.
    pub image_name: &'a str,
    /// Preprocessed input, present when the interpreter declares an
    /// [`InputSpec`].
    pub input: Option<&'a InputTensor>,
}

/// A loaded model bound to one worker.
pub trait Interpreter: Send {
    /// Input the model expects, or `None` if it needs no decoded pixels.
    fn input_spec(&self) -> Option<InputSpec>;

    /// Run the model.
    fn invoke(&mut self, request: &InvokeRequest<'_>) -> Result<OutputTensor>;
}

/// Creates interpreters; shared by every shard.
pub trait InterpreterFactory: Send + Sync {
    /// Runtime name, for logs.
    fn name(&self) -> &str;

    /// Create an interpreter. Fails with
    /// [`Error::DelegateUnavailable`](crate::Error::DelegateUnavailable) when a
    /// requested delegate cannot be applied.
    fn create(&self, options: &InterpreterOptions) -> Result<Box<dyn Interpreter>>;
}
