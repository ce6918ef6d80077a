//! Adam Optimizer Implementation
//!
//! An optimizer transforms the averaged mini-batch gradient into the step
//! each layer adds onto its parameters. It runs once per mini-batch, over
//! the model's whole flat gradient buffer, in place.
//!
//! ## Algorithm
//!
//! For each element with gradient g:
//!
//! ```text
//! m = β₁ * m + (1 - β₁) * g        # First moment (momentum)
//! v = β₂ * v + (1 - β₂) * g²       # Second moment (variance)
//! m_hat = m / (1 - β₁^t)           # Bias correction
//! v_hat = v / (1 - β₂^t)           # Bias correction
//! g ← -lr * m_hat / (√v_hat + ε)   # Step, written back over the gradient
//! ```
//!
//! where:
//! - β₁ = 0.99, β₂ = 0.999
//! - ε = 1e-7
//! - t = optimizer application count, starting at 1
//!
//! The result already carries the minus sign, so layers apply it by plain
//! addition.
//!
//! ## State
//!
//! `m` and `v` are sized lazily from the first gradient seen and start at
//! zero. Applying the optimizer later to a gradient of a different length
//! is a [`NnError::ShapeMismatch`].
//!
//! ## References
//!
//! - Kingma & Ba (2014): "Adam: A Method for Stochastic Optimization"
//!   https://arxiv.org/abs/1412.6980

use crate::error::{NnError, Result};
use crate::tensor::Tensor;

/// A pluggable gradient transform.
pub trait Optimizer {
    fn kind(&self) -> &'static str;

    /// Replace `grad` with the parameter step for this mini-batch.
    fn apply(&mut self, grad: &mut [f32], learning_rate: f32) -> Result<()>;
}

/// Adam optimizer state
///
/// # Fields
///
/// - **beta1**: Momentum decay rate (default: 0.99)
/// - **beta2**: Variance decay rate (default: 0.999)
/// - **epsilon**: Numerical stability constant (default: 1e-7)
/// - **step**: Bias-correction exponent of the next application (starts at 1)
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub step: u32,
    m: Option<Tensor>,
    v: Option<Tensor>,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new()
    }
}

impl Adam {
    pub fn new() -> Self {
        Self::with_betas(0.99, 0.999)
    }

    pub fn with_betas(beta1: f32, beta2: f32) -> Self {
        Self {
            beta1,
            beta2,
            epsilon: 1e-7,
            step: 1,
            m: None,
            v: None,
        }
    }

    /// First-moment estimate, once the first gradient has been seen.
    pub fn first_moment(&self) -> Option<&Tensor> {
        self.m.as_ref()
    }

    pub fn second_moment(&self) -> Option<&Tensor> {
        self.v.as_ref()
    }

    fn moments(&mut self, len: usize) -> Result<(&mut Tensor, &mut Tensor)> {
        if self.m.is_none() {
            self.m = Some(Tensor::new(len)?);
        }
        if self.v.is_none() {
            self.v = Some(Tensor::new(len)?);
        }

        match (self.m.as_mut(), self.v.as_mut()) {
            (Some(m), Some(v)) if m.len() == len => Ok((m, v)),
            (Some(m), _) => Err(NnError::shape("adam moment length", m.len(), len)),
            (None, _) => Err(NnError::OutOfMemory { requested: len }),
        }
    }
}

impl Optimizer for Adam {
    fn kind(&self) -> &'static str {
        "adam"
    }

    fn apply(&mut self, grad: &mut [f32], learning_rate: f32) -> Result<()> {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let t = self.step as f32;

        // Bias correction factors
        let bias_correction1 = 1.0 - beta1.powf(t);
        let bias_correction2 = 1.0 - beta2.powf(t);

        let (m, v) = self.moments(grad.len())?;

        for ((g, m), v) in grad
            .iter_mut()
            .zip(m.as_mut_slice())
            .zip(v.as_mut_slice())
        {
            *m = beta1 * *m + (1.0 - beta1) * *g;
            *v = beta2 * *v + (1.0 - beta2) * *g * *g;

            let m_hat = *m / bias_correction1;
            let v_hat = *v / bias_correction2;

            *g = (-learning_rate * m_hat) / (v_hat.sqrt() + epsilon);
        }

        self.step += 1;
        Ok(())
    }
}

/// Init function for an [`Adam`] optimizer with the default betas.
pub fn adam() -> impl FnOnce() -> Result<Box<dyn Optimizer>> {
    || Ok(Box::new(Adam::new()))
}
