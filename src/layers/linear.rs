//! Fully Connected Layer
//!
//! The fully connected layer performs an affine transformation of a single
//! example vector: `out = W · in + B`.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  in [in_size]
//! Weight: W  [out_size, in_size]   (row-major)
//! Bias:   B  [out_size]
//! Output: out = W · in + B   [out_size]
//! ```
//!
//! ## Backward Pass
//!
//! With `g = loss_grad` (length `out_size`), by the chain rule:
//!
//! ```text
//! grad_W[i, j] = in[j] · g[i]
//! grad_B[i]    = g[i]
//! in_grad[j]   = Σ_i W[i, j] · g[i]
//! ```
//!
//! ## Gradient Layout
//!
//! `internal_grad` is one contiguous buffer of `out_size·in_size + out_size`
//! elements: `grad_W` in the same row-major order as `W`, then `grad_B`.
//!
//! ## Update
//!
//! [`Layer::update`] adds `internal_grad` onto `W` and `B` elementwise. By
//! then the optimizer has already turned the raw gradient into a step, so
//! the sign and magnitude are the optimizer's decision, not the layer's.
//!
//! ## Initialization
//!
//! Weights use Xavier/He initialization (`randn · √(2/in_size)`) from an
//! explicit seed; the bias starts at zero.

use super::{Layer, LayerShape};
use crate::error::{NnError, Result};
use crate::linalg;
use crate::random::xavier_he_init;
use crate::tensor::Tensor;

/// Fully connected layer
///
/// The parameters are only reachable through length-checked setters or
/// [`Layer::parameters_mut`], so `weight` always holds `out_size × in_size`
/// values and `bias` holds `out_size`.
pub struct FullyConnected {
    weight: Tensor,
    bias: Tensor,
    internal_grad: Tensor,
    in_size: usize,
    out_size: usize,
}

impl FullyConnected {
    /// Create a layer with He-initialized weights and zero bias.
    ///
    /// # Arguments
    ///
    /// * `in_size` - Input width
    /// * `out_size` - Output width
    /// * `seed` - Seed for the weight initialization
    ///
    /// # Errors
    ///
    /// [`NnError::InvalidConfiguration`] for a zero width,
    /// [`NnError::OutOfMemory`] if any buffer cannot be allocated.
    pub fn new(in_size: usize, out_size: usize, seed: u64) -> Result<Self> {
        if in_size == 0 || out_size == 0 {
            return Err(NnError::config(format!(
                "fully connected layer needs non-zero widths, got {in_size} -> {out_size}"
            )));
        }
        let weight = xavier_he_init(in_size, out_size, seed)?;
        let bias = Tensor::new(out_size)?;
        Self::from_parameters(in_size, out_size, weight, bias)
    }

    /// Create a layer from explicit parameters.
    ///
    /// # Errors
    ///
    /// [`NnError::ShapeMismatch`] if `weight` is not `out_size × in_size` or
    /// `bias` is not `out_size` long, [`NnError::OutOfMemory`] if
    /// `out_size × in_size` overflows.
    pub fn from_parameters(
        in_size: usize,
        out_size: usize,
        weight: Tensor,
        bias: Tensor,
    ) -> Result<Self> {
        let weight_len = out_size
            .checked_mul(in_size)
            .ok_or(NnError::OutOfMemory {
                requested: usize::MAX,
            })?;
        if weight.len() != weight_len {
            return Err(NnError::shape(
                "fully connected weight",
                weight_len,
                weight.len(),
            ));
        }
        if bias.len() != out_size {
            return Err(NnError::shape("fully connected bias", out_size, bias.len()));
        }

        let internal_grad = Tensor::new(weight.len() + bias.len())?;

        Ok(Self {
            weight,
            bias,
            internal_grad,
            in_size,
            out_size,
        })
    }

    pub fn in_size(&self) -> usize {
        self.in_size
    }

    pub fn out_size(&self) -> usize {
        self.out_size
    }

    /// Row-major `out_size × in_size` weight matrix.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Replace the weight matrix.
    ///
    /// # Errors
    ///
    /// [`NnError::ShapeMismatch`] if `weight` is not `out_size × in_size`.
    pub fn set_weight(&mut self, weight: Tensor) -> Result<()> {
        if weight.len() != self.weight.len() {
            return Err(NnError::shape(
                "fully connected weight",
                self.weight.len(),
                weight.len(),
            ));
        }
        self.weight = weight;
        Ok(())
    }

    /// Replace the bias vector.
    ///
    /// # Errors
    ///
    /// [`NnError::ShapeMismatch`] if `bias` is not `out_size` long.
    pub fn set_bias(&mut self, bias: Tensor) -> Result<()> {
        if bias.len() != self.out_size {
            return Err(NnError::shape("fully connected bias", self.out_size, bias.len()));
        }
        self.bias = bias;
        Ok(())
    }
}

impl Layer for FullyConnected {
    fn kind(&self) -> &'static str {
        "fully_connected"
    }

    fn forward(&mut self, input: &[f32], out: &mut [f32]) {
        linalg::dot(
            self.weight.as_slice(),
            self.out_size,
            self.in_size,
            input,
            out,
        );
        linalg::add_assign(out, self.bias.as_slice());
    }

    fn backward(&mut self, input: &[f32], loss_grad: &[f32], in_grad: &mut [f32]) {
        let (weight_grad, bias_grad) = self
            .internal_grad
            .as_mut_slice()
            .split_at_mut(self.out_size * self.in_size);

        in_grad.iter_mut().for_each(|x| *x = 0.0);

        for (i, &g) in loss_grad.iter().enumerate() {
            let row = i * self.in_size;
            let w_row = &self.weight.as_slice()[row..row + self.in_size];
            let gw_row = &mut weight_grad[row..row + self.in_size];

            for j in 0..self.in_size {
                gw_row[j] = input[j] * g;
                in_grad[j] += w_row[j] * g;
            }

            bias_grad[i] = g;
        }
    }

    fn update(&mut self) {
        let (weight_step, bias_step) = self
            .internal_grad
            .as_slice()
            .split_at(self.out_size * self.in_size);

        linalg::add_assign(self.weight.as_mut_slice(), weight_step);
        linalg::add_assign(self.bias.as_mut_slice(), bias_step);
    }

    fn internal_grad(&self) -> Option<&Tensor> {
        Some(&self.internal_grad)
    }

    fn internal_grad_mut(&mut self) -> Option<&mut Tensor> {
        Some(&mut self.internal_grad)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// Init function for a [`FullyConnected`] layer seeded with `seed`.
pub fn fully_connected(seed: u64) -> impl FnOnce(LayerShape) -> Result<Box<dyn Layer>> {
    move |shape| {
        let layer = FullyConnected::new(shape.in_size, shape.out_size, seed)?;
        Ok(Box::new(layer))
    }
}
