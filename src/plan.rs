//! Partitioning of a resource into contiguous byte ranges.
//!
//! A [`PartitionPlan`] always covers `[0, total_size - 1]` exactly once,
//! in index order, with no empty ranges.
use crate::error::{DownloadError, Result};
use std::ops::Index;

/// An inclusive range of bytes within the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Position of this range within its plan.
    pub index: usize,
    /// The first byte (0-based).
    pub start: u64,
    /// The last byte, inclusive.
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered. Never zero for ranges built by [`partition`].
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Ordered ranges indexed `0..N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    ranges: Vec<ByteRange>,
    total_size: u64,
}

impl PartitionPlan {
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ByteRange> {
        self.ranges.iter()
    }
}

impl Index<usize> for PartitionPlan {
    type Output = ByteRange;

    fn index(&self, index: usize) -> &ByteRange {
        &self.ranges[index]
    }
}

impl<'a> IntoIterator for &'a PartitionPlan {
    type Item = &'a ByteRange;
    type IntoIter = std::slice::Iter<'a, ByteRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Divides `total_size` bytes into `sections` contiguous ranges.
///
/// `sections` is clamped to `total_size` so every range holds at least one
/// byte. Each range but the last spans `total_size / sections + 1` bytes,
/// shrunk only when the ranges after it would otherwise be left empty; the
/// last range absorbs whatever remains.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidRequest`] when either argument is zero.
pub fn partition(total_size: u64, sections: u64) -> Result<PartitionPlan> {
    if total_size == 0 {
        return Err(DownloadError::InvalidRequest(
            "cannot partition an empty resource".into(),
        ));
    }
    if sections == 0 {
        return Err(DownloadError::InvalidRequest(
            "number of sections must be greater than 0".into(),
        ));
    }

    let sections = sections.min(total_size);
    let each_size = total_size / sections;
    let mut ranges = Vec::with_capacity(sections as usize);
    let mut start = 0;

    for i in 0..sections {
        let end = if i == sections - 1 {
            total_size - 1
        } else {
            // Leave at least one byte for each of the ranges still to come.
            let remaining = total_size - start;
            let len = (each_size + 1).min(remaining - (sections - 1 - i));
            start + len - 1
        };

        ranges.push(ByteRange {
            index: i as usize,
            start,
            end,
        });
        start = end + 1;
    }

    Ok(PartitionPlan { ranges, total_size })
}

/// A plan made of a single range covering the whole resource.
pub fn whole(total_size: u64) -> Result<PartitionPlan> {
    partition(total_size, 1)
}
