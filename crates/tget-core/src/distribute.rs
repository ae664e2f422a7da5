//! Task distribution: balanced contiguous partition of the task list.
//!
//! Chunk `i` of `n` covers `[i*len/n, (i+1)*len/n)`, so sizes never differ by
//! more than one and concatenating the chunks in order rebuilds the input.

use std::ops::Range;

/// Contiguous slice of the task list assigned to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    /// Channel index this chunk belongs to.
    pub index: usize,
    pub items: Vec<T>,
}

impl<T> Chunk<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Index ranges of the `n` chunks for a list of `len` items (`n = 0` counts as 1).
pub fn chunk_bounds(len: usize, n: usize) -> Vec<Range<usize>> {
    let n = n.max(1);
    let bound = |i: usize| ((i as u128 * len as u128) / n as u128) as usize;
    (0..n).map(|i| bound(i)..bound(i + 1)).collect()
}

/// Splits `items` into exactly `n` chunks (`n = 0` counts as 1). Some chunks
/// are empty when there are fewer items than channels.
pub fn distribute<T>(items: Vec<T>, n: usize) -> Vec<Chunk<T>> {
    let bounds = chunk_bounds(items.len(), n);
    let mut rest = items.into_iter();
    bounds
        .into_iter()
        .enumerate()
        .map(|(index, range)| Chunk {
            index,
            items: rest.by_ref().take(range.len()).collect(),
        })
        .collect()
}
