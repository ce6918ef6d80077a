//! Flat Tensor Buffer
//!
//! Every value that flows through the engine lives in a [`Tensor`]: a flat,
//! owned `Vec<f32>`. The engine never tracks multi-dimensional shapes. A
//! fully-connected layer knows its weight matrix is `out_size × in_size`
//! row-major, and a training set knows its example stride; the tensor itself
//! is always 1-D.
//!
//! ## Allocation
//!
//! [`Tensor::new`] reserves its buffer with `Vec::try_reserve_exact`, so an
//! allocation failure surfaces as [`NnError::OutOfMemory`] instead of aborting
//! the process. Nothing is left half-built on failure: the tensor is only
//! returned once its buffer exists.
//!
//! ## Example
//!
//! ```rust
//! use chainrule::Tensor;
//!
//! let mut t = Tensor::new(4)?;
//! assert_eq!(t.len(), 4);
//! assert!(t.data.iter().all(|&x| x == 0.0));
//!
//! t.copy_from(&[1.0, 2.0, 3.0, 4.0])?;
//! assert_eq!(t.as_slice()[2], 3.0);
//! # Ok::<(), chainrule::NnError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

/// A flat buffer of `f32` elements.
///
/// The buffer is owned. Borrowed views (a layer's input, the incoming loss
/// gradient) are plain slices handed out by the model, never tensors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Flat storage of all elements
    pub data: Vec<f32>,
}

impl Tensor {
    /// Allocate a zero-filled tensor of `length` elements.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::OutOfMemory`] if the buffer cannot be reserved.
    pub fn new(length: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(length)
            .map_err(|_| NnError::OutOfMemory { requested: length })?;
        data.resize(length, 0.0);
        Ok(Self { data })
    }

    /// Wrap an existing vector without copying.
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Set every element to zero.
    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Overwrite the contents with `src`.
    ///
    /// # Errors
    ///
    /// Returns [`NnError::ShapeMismatch`] if `src` has a different length.
    pub fn copy_from(&mut self, src: &[f32]) -> Result<()> {
        if src.len() != self.len() {
            return Err(NnError::shape("tensor copy", self.len(), src.len()));
        }
        self.data.copy_from_slice(src);
        Ok(())
    }

    /// Release the tensor.
    ///
    /// Equivalent to dropping it; kept so callers that manage lifetimes
    /// explicitly have a named counterpart to [`Tensor::new`].
    pub fn destroy(self) {}
}

impl From<Vec<f32>> for Tensor {
    fn from(data: Vec<f32>) -> Self {
        Self::from_vec(data)
    }
}

impl AsRef<[f32]> for Tensor {
    fn as_ref(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let t = Tensor::new(7).unwrap();
        assert_eq!(t.len(), 7);
        assert!(t.data.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_new_empty() {
        let t = Tensor::new(0).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn test_new_reports_out_of_memory() {
        // Far beyond isize::MAX bytes; the reservation must fail cleanly.
        let err = Tensor::new(usize::MAX / 2).unwrap_err();
        assert!(matches!(err, NnError::OutOfMemory { .. }));
    }

    #[test]
    fn test_copy_from_checks_length() {
        let mut t = Tensor::new(3).unwrap();
        assert!(t.copy_from(&[1.0, 2.0]).is_err());
        t.copy_from(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_fill_and_zero() {
        let mut t = Tensor::from_vec(vec![1.0, -2.0]);
        t.fill(5.0);
        assert_eq!(t.data, vec![5.0, 5.0]);
        t.zero();
        assert_eq!(t.data, vec![0.0, 0.0]);
    }
}
