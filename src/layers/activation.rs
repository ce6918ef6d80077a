//! Activation Layers
//!
//! Parameter-free layers that transform each element independently.
//!
//! ## ReLU (Rectified Linear Unit)
//!
//! ```text
//! forward:   out[i]     = max(0, in[i])
//! backward:  in_grad[i] = loss_grad[i]   if in[i] > 0
//!                         0              otherwise
//! ```
//!
//! The local derivative is a 0/1 gate; the chain rule multiplies it by the
//! incoming gradient. At exactly `in[i] == 0` the gradient is taken as 0.
//!
//! ## Identity
//!
//! Copies its input forward and its incoming gradient backward. Useful as a
//! placeholder and for testing the graph plumbing.
//!
//! Both layers require `in_size == out_size`.

use super::{Layer, LayerShape};
use crate::error::{NnError, Result};

fn require_same_width(kind: &'static str, shape: LayerShape) -> Result<()> {
    if shape.in_size != shape.out_size {
        tracing::debug!(kind, ?shape, "activation width mismatch");
        return Err(NnError::shape(
            "activation layer width",
            shape.in_size,
            shape.out_size,
        ));
    }
    Ok(())
}

/// Rectified linear unit.
#[derive(Debug, Default, Clone)]
pub struct Relu;

impl Layer for Relu {
    fn kind(&self) -> &'static str {
        "relu"
    }

    fn forward(&mut self, input: &[f32], out: &mut [f32]) {
        for (o, &x) in out.iter_mut().zip(input) {
            *o = if x > 0.0 { x } else { 0.0 };
        }
    }

    fn backward(&mut self, input: &[f32], loss_grad: &[f32], in_grad: &mut [f32]) {
        for ((g, &x), &upstream) in in_grad.iter_mut().zip(input).zip(loss_grad) {
            *g = if x > 0.0 { upstream } else { 0.0 };
        }
    }
}

/// Pass-through layer.
#[derive(Debug, Default, Clone)]
pub struct Identity;

impl Layer for Identity {
    fn kind(&self) -> &'static str {
        "identity"
    }

    fn forward(&mut self, input: &[f32], out: &mut [f32]) {
        out.copy_from_slice(input);
    }

    fn backward(&mut self, _input: &[f32], loss_grad: &[f32], in_grad: &mut [f32]) {
        in_grad.copy_from_slice(loss_grad);
    }
}

/// Init function for a [`Relu`] layer.
pub fn relu() -> impl FnOnce(LayerShape) -> Result<Box<dyn Layer>> {
    |shape| {
        require_same_width("relu", shape)?;
        Ok(Box::new(Relu))
    }
}

/// Init function for an [`Identity`] layer.
pub fn identity() -> impl FnOnce(LayerShape) -> Result<Box<dyn Layer>> {
    |shape| {
        require_same_width("identity", shape)?;
        Ok(Box::new(Identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_forward() {
        let mut layer = Relu;
        let mut out = [9.0; 4];
        layer.forward(&[-1.0, 0.0, 0.5, 3.0], &mut out);
        assert_eq!(out, [0.0, 0.0, 0.5, 3.0]);
    }

    #[test]
    fn test_relu_backward_gates_gradient() {
        let mut layer = Relu;
        let input = [-2.0, 0.0, 1e-6, 4.0];
        let upstream = [0.3, -0.7, 1.5, -2.5];
        let mut in_grad = [9.0; 4];
        layer.backward(&input, &upstream, &mut in_grad);

        // exactly zero where input <= 0, unchanged where input > 0
        assert_eq!(in_grad, [0.0, 0.0, 1.5, -2.5]);
        assert!(layer.internal_grad().is_none());
    }

    #[test]
    fn test_relu_backward_matches_finite_difference() {
        let input = [-1.3f32, -0.2, 0.4, 2.1];
        let upstream = [0.5f32, -1.0, 2.0, 0.25];
        let mut layer = Relu;

        let mut in_grad = [0.0; 4];
        layer.backward(&input, &upstream, &mut in_grad);

        // L = Σ upstream[i] · relu(in[i])
        let loss = |x: &[f32]| -> f32 {
            let mut out = [0.0; 4];
            Relu.forward(x, &mut out);
            out.iter().zip(&upstream).map(|(o, g)| o * g).sum()
        };

        let h = 1e-3;
        for i in 0..4 {
            let mut plus = input;
            let mut minus = input;
            plus[i] += h;
            minus[i] -= h;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
            assert!((numeric - in_grad[i]).abs() < 1e-3, "element {i}");
        }
    }

    #[test]
    fn test_identity_round_trip() {
        let mut layer = Identity;
        let mut out = [0.0; 3];
        layer.forward(&[1.0, -2.0, 3.0], &mut out);
        assert_eq!(out, [1.0, -2.0, 3.0]);

        let mut in_grad = [0.0; 3];
        layer.backward(&out, &[0.1, 0.2, 0.3], &mut in_grad);
        assert_eq!(in_grad, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_init_rejects_width_change() {
        let shape = LayerShape {
            in_size: 3,
            out_size: 4,
        };
        assert!(matches!(
            relu()(shape),
            Err(NnError::ShapeMismatch { .. })
        ));
        assert!(identity()(shape).is_err());

        let same = LayerShape {
            in_size: 4,
            out_size: 4,
        };
        assert_eq!(relu()(same).unwrap().kind(), "relu");
    }
}
