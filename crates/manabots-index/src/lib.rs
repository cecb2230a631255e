//! Span indexing abstractions for one-dimensional range queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by span index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A position submitted to `rebuild` was NaN or infinite.
    #[error("position {index} is not finite")]
    NonFinite { index: usize },
}

/// Common behaviour exposed by span indices.
pub trait SpanIndex {
    /// Rebuild internal structures from entity positions. Entry `i` of
    /// `positions` keeps slot `i` in every subsequent visit callback.
    fn rebuild(&mut self, positions: &[f32]) -> Result<(), IndexError>;

    /// Visit every indexed slot whose position falls inside `[min, max]`,
    /// in ascending position order.
    fn visit_range(&self, min: f32, max: f32, visitor: &mut dyn FnMut(usize, f32));
}

/// Sorted-vector span index; one binary search per query, O(result) visits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortedSpanIndex {
    #[serde(skip)]
    order: Vec<(OrderedFloat<f32>, usize)>,
}

impl SortedSpanIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the index holds no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Slot and position nearest to `from`, if any slot is indexed.
    #[must_use]
    pub fn nearest(&self, from: f32) -> Option<(usize, f32)> {
        if self.order.is_empty() {
            return None;
        }
        let split = self
            .order
            .partition_point(|(pos, _)| pos.into_inner() < from);
        let mut best: Option<(usize, f32)> = None;
        for &(pos, slot) in self
            .order
            .get(split.saturating_sub(1)..)
            .into_iter()
            .flatten()
            .take(2)
        {
            let pos = pos.into_inner();
            let closer = best.is_none_or(|(_, b)| (pos - from).abs() < (b - from).abs());
            if closer {
                best = Some((slot, pos));
            }
        }
        best
    }
}

impl SpanIndex for SortedSpanIndex {
    fn rebuild(&mut self, positions: &[f32]) -> Result<(), IndexError> {
        self.order.clear();
        self.order.reserve(positions.len());
        for (index, &pos) in positions.iter().enumerate() {
            if !pos.is_finite() {
                self.order.clear();
                return Err(IndexError::NonFinite { index });
            }
            self.order.push((OrderedFloat(pos), index));
        }
        self.order.sort_unstable();
        Ok(())
    }

    fn visit_range(&self, min: f32, max: f32, visitor: &mut dyn FnMut(usize, f32)) {
        if min > max {
            return;
        }
        let start = self.order.partition_point(|(pos, _)| pos.into_inner() < min);
        for &(pos, slot) in &self.order[start..] {
            let pos = pos.into_inner();
            if pos > max {
                break;
            }
            visitor(slot, pos);
        }
    }
}
