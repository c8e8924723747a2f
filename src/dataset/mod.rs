//! ILSVRC ground-truth dataset loading.
//!
//! Builds the eligible image set for an evaluation run: validation images
//! sorted by file name, paired with the ground-truth label on the matching
//! line of the label file, minus blacklisted indices, capped to the requested
//! image count.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ilsvrc_eval::dataset::{Dataset, shard_images};
//!
//! let dataset = Dataset::load(&params)?;
//! for shard in shard_images(&dataset.images, 4) {
//!     println!("shard {}: {} images", shard.id, shard.images.len());
//! }
//! ```

mod discovery;
pub mod shard;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use discovery::{discover_images, read_blacklist, read_lines};
pub use shard::{Shard, shard_image_counts, shard_images, split_ranges};

use crate::error::{Error, Result};
use crate::params::Params;

/// A validation image and its ground-truth label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLabel {
    /// Path to the image file.
    pub image: PathBuf,
    /// Ground-truth label text.
    pub label: String,
}

impl ImageLabel {
    /// Create a new image/label pair.
    #[must_use]
    pub fn new(image: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            label: label.into(),
        }
    }

    /// File name of the image, used as its identifier in reports.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.image
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }
}

/// The eligible image set plus the model's output labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Labels in model output order.
    pub model_labels: Vec<String>,

    /// Eligible images in evaluation order.
    pub images: Vec<ImageLabel>,

    /// Images found in the ground-truth directory.
    pub total_images: usize,

    /// Images removed by the blacklist.
    pub blacklisted: usize,
}

impl Dataset {
    /// Load the dataset described by `params`.
    pub fn load(params: &Params) -> Result<Self> {
        let model_labels = read_lines(&params.model_output_labels_path)?;
        if model_labels.is_empty() {
            return Err(Error::Dataset(format!(
                "No labels in {}",
                params.model_output_labels_path.display()
            )));
        }

        let image_files = discover_images(&params.ground_truth_images_path)?;
        let ground_truth = read_lines(&params.ground_truth_labels_path)?;
        if ground_truth.len() != image_files.len() {
            return Err(Error::LabelCountMismatch {
                labels: ground_truth.len(),
                images: image_files.len(),
            });
        }
        let total_images = image_files.len();

        let mut images: Vec<ImageLabel> = image_files
            .into_iter()
            .zip(ground_truth)
            .map(|(image, label)| ImageLabel { image, label })
            .collect();

        let mut blacklisted = 0;
        if let Some(path) = &params.blacklist_file_path {
            blacklisted = apply_blacklist(&mut images, path)?;
        }

        if params.number_of_images > 0 {
            images.truncate(params.number_of_images);
        }

        log::info!(
            "Dataset: {} images found, {} blacklisted, {} selected",
            total_images,
            blacklisted,
            images.len()
        );

        Ok(Self {
            model_labels,
            images,
            total_images,
            blacklisted,
        })
    }

    /// Number of eligible images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Check if no image is eligible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Drop blacklisted images, returning how many were removed.
fn apply_blacklist(images: &mut Vec<ImageLabel>, path: &Path) -> Result<usize> {
    let blacklist = read_blacklist(path)?;
    let total = images.len();

    if let Some(&max) = blacklist.last()
        && max > total
    {
        log::warn!(
            "Blacklist {} references image {} but only {} images exist",
            path.display(),
            max,
            total
        );
    }

    let mut index = 0;
    images.retain(|_| {
        index += 1;
        !blacklist.contains(&index)
    });
    Ok(total - images.len())
}
