//! Runtime that replays recorded model outputs.
//!
//! The "model file" is a headerless CSV where each row holds an image file
//! name followed by one score per model output label:
//!
//! ```text
//! ILSVRC2012_val_00000001.JPEG,0.01,0.93,0.06
//! ILSVRC2012_val_00000002.JPEG,0.20,0.10,0.70
//! ```
//!
//! This lets accuracy be recomputed from outputs dumped by another runtime
//! without re-running inference. An optional first row starting with `image`
//! is treated as a header.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::runtime::{
    InputSpec, Interpreter, InterpreterFactory, InterpreterOptions, InvokeRequest, OutputTensor,
};

/// Recorded outputs keyed by image file name.
#[derive(Debug, Default)]
pub struct ScoreTable {
    scores: HashMap<String, Vec<f32>>,
}

impl ScoreTable {
    /// Load a score table from CSV.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut scores = HashMap::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let Some(name) = record.get(0) else {
                continue;
            };
            if name.is_empty() || (row == 0 && name.eq_ignore_ascii_case("image")) {
                continue;
            }

            let values = record
                .iter()
                .skip(1)
                .map(|field| {
                    field.parse::<f32>().map_err(|_| {
                        Error::Interpreter(format!(
                            "{}:{}: invalid score {:?} for {}",
                            path.display(),
                            row + 1,
                            field,
                            name
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            if scores.insert(name.to_string(), values).is_some() {
                return Err(Error::Interpreter(format!(
                    "{}:{}: duplicate recorded output for {}",
                    path.display(),
                    row + 1,
                    name
                )));
            }
        }

        Ok(Self { scores })
    }

    /// Number of recorded images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Check if no image is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Scores for an image.
    #[must_use]
    pub fn get(&self, image_name: &str) -> Option<&[f32]> {
        self.scores.get(image_name).map(Vec::as_slice)
    }
}

/// [`InterpreterFactory`] over recorded outputs.
///
/// Tables are loaded once per model path and shared by all shards.
#[derive(Debug, Default)]
pub struct ReplayRuntime {
    tables: Mutex<HashMap<PathBuf, Arc<ScoreTable>>>,
}

impl ReplayRuntime {
    /// Create a runtime with an empty table cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, path: &Path) -> Result<Arc<ScoreTable>> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| Error::Interpreter("replay table cache poisoned".to_string()))?;
        if let Some(table) = tables.get(path) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(ScoreTable::load(path)?);
        log::debug!("Loaded {} recorded outputs from {}", table.len(), path.display());
        tables.insert(path.to_path_buf(), Arc::clone(&table));
        Ok(table)
    }
}

impl InterpreterFactory for ReplayRuntime {
    fn name(&self) -> &str {
        "replay"
    }

    fn create(&self, options: &InterpreterOptions) -> Result<Box<dyn Interpreter>> {
        if let Some(delegate) = options.delegates.first() {
            return Err(Error::DelegateUnavailable {
                delegate: delegate.delegate.to_string(),
                reason: "recorded outputs cannot be re-run on a delegate".to_string(),
            });
        }
        let table = self.table(&options.model_path)?;
        Ok(Box::new(ReplayInterpreter { table }))
    }
}

struct ReplayInterpreter {
    table: Arc<ScoreTable>,
}

impl Interpreter for ReplayInterpreter {
    fn input_spec(&self) -> Option<InputSpec> {
        None
    }

    fn invoke(&mut self, request: &InvokeRequest<'_>) -> Result<OutputTensor> {
        self.table
            .get(request.image_name)
            .map(|scores| OutputTensor::Float32(scores.to_vec()))
            .ok_or_else(|| {
                Error::Interpreter(format!("No recorded output for {}", request.image_name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::DelegateConfig;
    use crate::params::Delegate;

    fn options(path: &Path) -> InterpreterOptions {
        InterpreterOptions {
            model_path: path.to_path_buf(),
            num_threads: 1,
            delegates: Vec::new(),
            allow_fp16: false,
        }
    }

    #[test]
    fn test_replay_invoke() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.csv");
        std::fs::write(&path, "image,a,b\nimg1.JPEG, 0.1, 0.9\nimg2.JPEG,0.8,0.2\n").unwrap();

        let runtime = ReplayRuntime::new();
        let mut interpreter = runtime.create(&options(&path)).unwrap();
        assert!(interpreter.input_spec().is_none());

        let request = InvokeRequest {
            image_name: "img1.JPEG",
            input: None,
        };
        let out = interpreter.invoke(&request).unwrap();
        assert_eq!(out, OutputTensor::Float32(vec![0.1, 0.9]));

        let request = InvokeRequest {
            image_name: "img3.JPEG",
            input: None,
        };
        let err = interpreter.invoke(&request).unwrap_err();
        assert!(matches!(err, Error::Interpreter(_)));
    }

    #[test]
    fn test_replay_bad_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.csv");
        std::fs::write(&path, "img1.JPEG,0.1,high\n").unwrap();
        assert!(ScoreTable::load(&path).is_err());
    }

    #[test]
    fn test_replay_duplicate_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.csv");
        std::fs::write(&path, "img1.JPEG,0.1,0.9\nimg2.JPEG,0.5,0.5\nimg1.JPEG,0.9,0.1\n").unwrap();

        let err = ScoreTable::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate recorded output for img1.JPEG"));
    }

    #[test]
    fn test_replay_rejects_delegates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.csv");
        std::fs::write(&path, "img1.JPEG,1.0\n").unwrap();

        let mut opts = options(&path);
        opts.delegates.push(DelegateConfig::new(Delegate::Gpu));
        let err = ReplayRuntime::new().create(&opts).err().unwrap();
        assert!(matches!(err, Error::DelegateUnavailable { .. }));
    }

    #[test]
    fn test_replay_table_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.csv");
        std::fs::write(&path, "img1.JPEG,1.0\n").unwrap();

        let runtime = ReplayRuntime::new();
        let a = runtime.table(&path).unwrap();
        let b = runtime.table(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
