//! Gradient Utilities
//!
//! The model aggregates the parameter gradients of every trainable layer in
//! one flat accumulator. This module describes where each layer's slice
//! lives in it and provides norm/clipping helpers over the whole buffer.
//!
//! ## Layout
//!
//! Slices are assigned in backward-walk order, tail first:
//!
//! ```text
//! layers:       [fc0] [relu] [fc1] [relu] [fc2]
//! accumulator:  | fc2 grads | fc1 grads | fc0 grads |
//!               0           a           b           total
//! ```
//!
//! The table is computed once, when the graph is frozen. Backward and update
//! walks look a layer's range up by index instead of advancing a shared
//! cursor, so an early return can never leave a stale offset behind.
//!
//! ## Gradient Clipping
//!
//! ```text
//! norm = √(Σ gradient²)
//! if norm > max_norm:
//!     gradients *= (max_norm / norm)
//! ```
//!
//! Every element is scaled by the same factor, preserving direction while
//! bounding the step.

use std::ops::Range;

use crate::linalg;

/// Per-layer ranges into the shared gradient accumulator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GradientLayout {
    slots: Vec<Option<Range<usize>>>,
    total: usize,
}

impl GradientLayout {
    /// Build the table from each layer's `internal_grad` length, in graph
    /// order (`None` for layers without parameters).
    pub fn new(lengths: &[Option<usize>]) -> Self {
        let mut slots = vec![None; lengths.len()];
        let mut offset = 0;

        for (slot, len) in slots.iter_mut().zip(lengths).rev() {
            if let Some(len) = *len {
                *slot = Some(offset..offset + len);
                offset += len;
            }
        }

        Self {
            slots,
            total: offset,
        }
    }

    /// Range of layer `index`, if it has trainable parameters.
    pub fn slot(&self, index: usize) -> Option<Range<usize>> {
        self.slots.get(index).cloned().flatten()
    }

    /// Length of the whole accumulator.
    pub fn total_len(&self) -> usize {
        self.total
    }

    /// Number of layers described.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// L2 norm of a flat gradient buffer: √(Σ g²).
pub fn compute_grad_norm(grads: &[f32]) -> f32 {
    grads.iter().map(|&g| g * g).sum::<f32>().sqrt()
}

/// Scale `grads` down so its L2 norm is at most `max_norm`.
///
/// Returns the norm measured before clipping.
pub fn clip_gradients(grads: &mut [f32], max_norm: f32) -> f32 {
    let norm = compute_grad_norm(grads);

    // Only clip if norm exceeds threshold
    if norm > max_norm && norm > 0.0 {
        linalg::scale(grads, max_norm / norm);
    }

    norm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_tail_first() {
        // fc(6) relu fc(4) relu fc(2)
        let layout = GradientLayout::new(&[Some(6), None, Some(4), None, Some(2)]);

        assert_eq!(layout.total_len(), 12);
        assert_eq!(layout.slot(4), Some(0..2));
        assert_eq!(layout.slot(2), Some(2..6));
        assert_eq!(layout.slot(0), Some(6..12));
        assert_eq!(layout.slot(1), None);
        assert_eq!(layout.slot(99), None);
    }

    #[test]
    fn test_layout_without_parameters() {
        let layout = GradientLayout::new(&[None, None]);
        assert_eq!(layout.total_len(), 0);
        assert_eq!(layout.len(), 2);
    }

    #[test]
    fn test_grad_norm() {
        assert_eq!(compute_grad_norm(&[3.0, 4.0]), 5.0);
        assert_eq!(compute_grad_norm(&[]), 0.0);
    }

    #[test]
    fn test_clip_scales_to_max_norm() {
        let mut grads = [3.0, 4.0];
        let before = clip_gradients(&mut grads, 1.0);
        assert_eq!(before, 5.0);
        assert!((compute_grad_norm(&grads) - 1.0).abs() < 1e-6);
        assert!((grads[0] / grads[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_clip_leaves_small_gradients() {
        let mut grads = [0.1, 0.2];
        clip_gradients(&mut grads, 1.0);
        assert_eq!(grads, [0.1, 0.2]);
    }
}
