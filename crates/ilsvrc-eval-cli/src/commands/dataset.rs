//! Dataset inspection command.

use anyhow::{Context, Result};
use ilsvrc_eval::dataset::{Dataset, shard_images};

use crate::ParamsArgs;

pub fn run(params: &ParamsArgs, num_threads: usize, list: bool, verbose: bool) -> Result<()> {
    let params = params.to_params().context("Invalid evaluation parameters")?;
    if verbose {
        eprintln!("Loading dataset from: {}", params.ground_truth_images_path.display());
    }

    let dataset = Dataset::load(&params).with_context(|| {
        format!("Failed to load dataset from {}", params.ground_truth_images_path.display())
    })?;

    println!("Images found: {}", dataset.total_images);
    println!("  Blacklisted: {}", dataset.blacklisted);
    println!("  Selected: {}", dataset.len());
    println!("  Model labels: {}", dataset.model_labels.len());

    let unknown: Vec<&str> = dataset
        .images
        .iter()
        .filter(|img| !dataset.model_labels.contains(&img.label))
        .map(|img| img.label.as_str())
        .collect();
    if !unknown.is_empty() {
        println!("  Labels missing from model output labels: {}", unknown.len());
        if verbose {
            for label in &unknown {
                eprintln!("    {label}");
            }
        }
    }

    let shards = shard_images(&dataset.images, num_threads.max(1));
    println!("  Shards:");
    for shard in &shards {
        let first = shard.images.first().map_or("", |i| i.file_name());
        let last = shard.images.last().map_or("", |i| i.file_name());
        println!("    {}: {} images ({} .. {})", shard.id, shard.images.len(), first, last);
    }

    if list {
        for img in &dataset.images {
            println!("{}\t{}", img.image.display(), img.label);
        }
    }

    Ok(())
}
