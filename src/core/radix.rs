// src/core/radix.rs

//! Mixed-radix arithmetic over the dimensions of a sweep.
//!
//! The last dimension varies fastest, so enumerating `[2, 3]` visits
//! `[0,0] [0,1] [0,2] [1,0] [1,1] [1,2]`.

use crate::core::error::SweepError;

/// Product of `dims`, or `None` if it does not fit in a `usize`.
///
/// Any empty dimension makes the product zero, even when the others would overflow.
pub(crate) fn checked_total(dims: &[usize]) -> Option<usize> {
    if dims.contains(&0) {
        return Some(0);
    }
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Converts between linear indices and multi-indices for a fixed set of dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedRadix {
    dims: Vec<usize>,
    total: usize,
}

impl MixedRadix {
    /// Builds the radix for `dims`. Fails if the number of points overflows.
    pub fn new(dims: Vec<usize>) -> Result<Self, SweepError> {
        let total = checked_total(&dims).ok_or_else(|| SweepError::SpaceTooLarge {
            axis: format!("{:?}", dims),
        })?;
        Ok(Self { dims, total })
    }

    /// A radix with a single empty dimension; it enumerates nothing.
    pub(crate) fn empty() -> Self {
        Self {
            dims: vec![0],
            total: 0,
        }
    }

    /// The dimensions, most significant first.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of points. Zero axes give a single, empty point.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Converts `linear` into a multi-index, or `None` when it is out of range.
    pub fn to_multi(&self, linear: usize) -> Option<Vec<usize>> {
        if linear >= self.total {
            return None;
        }
        let mut multi = vec![0; self.dims.len()];
        let mut rest = linear;
        // `linear < total` guarantees every dimension is non-zero here.
        for (slot, &dim) in multi.iter_mut().rev().zip(self.dims.iter().rev()) {
            *slot = rest % dim;
            rest /= dim;
        }
        Some(multi)
    }

    /// Converts a multi-index back into its linear position.
    ///
    /// Returns `None` if the index has the wrong length or a component is out of range.
    pub fn to_linear(&self, multi: &[usize]) -> Option<usize> {
        if multi.len() != self.dims.len() {
            return None;
        }
        let mut linear = 0;
        let mut acc_dim = 1;
        for (&idx, &dim) in multi.iter().rev().zip(self.dims.iter().rev()) {
            if idx >= dim {
                return None;
            }
            linear += idx * acc_dim;
            acc_dim *= dim;
        }
        Some(linear)
    }

    /// A lazy enumeration of every multi-index from `start` onwards.
    pub fn iter_from(&self, start: usize) -> MultiRange {
        MultiRange {
            radix: self.clone(),
            next: start,
        }
    }
}

/// Iterator over the multi-indices of a [`MixedRadix`], in linear order.
///
/// Restart it at any offset with [`MixedRadix::iter_from`]; map it to yield rendered
/// commands instead of raw indices.
#[derive(Debug, Clone)]
pub struct MultiRange {
    radix: MixedRadix,
    next: usize,
}

impl MultiRange {
    /// Linear index of the element the next call to `next()` yields.
    pub fn position(&self) -> usize {
        self.next
    }

    /// The radix being enumerated.
    pub fn radix(&self) -> &MixedRadix {
        &self.radix
    }
}

impl Iterator for MultiRange {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let multi = self.radix.to_multi(self.next)?;
        self.next += 1;
        Some(multi)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.radix.total.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MultiRange {}
