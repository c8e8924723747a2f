//! Ground-truth file discovery and line-oriented file readers.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extensions of the validation images. ILSVRC ships `.JPEG`.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// List the validation images in `dir`, sorted by file name.
///
/// The directory is not searched recursively.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(Error::Dataset(format!("Path does not exist: {}", dir.display())));
    }

    if !dir.is_dir() {
        return Err(Error::Dataset(format!("Path is not a directory: {}", dir.display())));
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        Error::Dataset(format!("Failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Dataset(format!("Failed to read entry in {}: {}", dir.display(), e))
        })?;

        let path = entry.path();
        if path.is_file() && has_supported_extension(&path) {
            images.push(path);
        }
    }

    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Read the non-empty, trimmed lines of a text file.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Dataset(format!("Failed to read {}: {}", path.display(), e))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Read a blacklist file of 1-based image indices, one per line.
pub fn read_blacklist(path: &Path) -> Result<BTreeSet<usize>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Dataset(format!("Failed to read blacklist {}: {}", path.display(), e))
    })?;

    let mut indices = BTreeSet::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let index = line.parse::<usize>().map_err(|_| {
            Error::Dataset(format!(
                "{}:{}: expected an image index, got {:?}",
                path.display(),
                line_no + 1,
                line
            ))
        })?;
        if index == 0 {
            return Err(Error::Dataset(format!(
                "{}:{}: image indices are 1-based",
                path.display(),
                line_no + 1
            )));
        }
        indices.insert(index);
    }

    Ok(indices)
}
