//! Partitioning of the eligible image set into shards.

use std::collections::HashMap;
use std::ops::Range;

use crate::dataset::ImageLabel;

/// A contiguous slice of the image set processed by one worker.
#[derive(Debug, Clone, Copy)]
pub struct Shard<'a> {
    /// Shard identifier, `0..shard_count`.
    pub id: u64,
    /// Images in this shard.
    pub images: &'a [ImageLabel],
}

/// Split `len` items into at most `num_shards` contiguous ranges whose sizes
/// differ by at most one. Earlier ranges take the remainder. Empty ranges are
/// never produced.
#[must_use]
pub fn split_ranges(len: usize, num_shards: usize) -> Vec<Range<usize>> {
    let count = num_shards.max(1).min(len);
    if count == 0 {
        return Vec::new();
    }

    let base = len / count;
    let remainder = len % count;
    let mut ranges = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let size = base + usize::from(i < remainder);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Shard `images` over `num_shards` workers.
#[must_use]
pub fn shard_images(images: &[ImageLabel], num_shards: usize) -> Vec<Shard<'_>> {
    split_ranges(images.len(), num_shards)
        .into_iter()
        .enumerate()
        .map(|(id, range)| Shard {
            id: id as u64,
            images: &images[range],
        })
        .collect()
}

/// Map from shard id to image count, as handed to observers.
#[must_use]
pub fn shard_image_counts(shards: &[Shard<'_>]) -> HashMap<u64, usize> {
    shards.iter().map(|s| (s.id, s.images.len())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_even() {
        assert_eq!(split_ranges(9, 3), vec![0..3, 3..6, 6..9]);
    }

    #[test]
    fn test_split_remainder_goes_first() {
        assert_eq!(split_ranges(10, 4), vec![0..3, 3..6, 6..8, 8..10]);
    }

    #[test]
    fn test_split_more_shards_than_items() {
        assert_eq!(split_ranges(2, 8), vec![0..1, 1..2]);
        assert!(split_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_split_zero_shards_means_one() {
        assert_eq!(split_ranges(5, 0), vec![0..5]);
    }

    #[test]
    fn test_shard_counts_cover_everything() {
        let images: Vec<ImageLabel> = (0..1003)
            .map(|i| ImageLabel::new(format!("img{i}.JPEG"), "tench"))
            .collect();
        let shards = shard_images(&images, 7);
        let counts = shard_image_counts(&shards);
        assert_eq!(counts.len(), 7);
        assert_eq!(counts.values().sum::<usize>(), 1003);
        let max = counts.values().max().unwrap();
        let min = counts.values().min().unwrap();
        assert!(max - min <= 1);
        assert_eq!(shards[0].images[0].file_name(), "img0.JPEG");
    }
}
