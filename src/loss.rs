//! Loss Functions
//!
//! The loss node sits after the last layer. Its forward hook turns the
//! network output into a scalar; its backward hook writes the gradient of
//! that scalar w.r.t. the output, which seeds the backward walk.
//!
//! ## Mean Squared Error
//!
//! ```text
//! L          = (1/n) Σ (expected[i] - output[i])²
//! dL/dout[i] = -(2/n) · (expected[i] - output[i])
//! ```
//!
//! The gradient points in the direction of increasing loss; the optimizer
//! negates it.
//!
//! ## Cross-Entropy with Softmax
//!
//! `expected` is one-hot: the entry equal to exactly `1.0` marks the true
//! class `t`. The loss uses the log-sum-exp trick so large logits cannot
//! overflow:
//!
//! ```text
//! m          = max(logits)
//! L          = -logits[t] + m + ln Σ exp(logits[i] - m)
//! dL/dout[i] = softmax(logits)[i] - [i == t]
//! ```
//!
//! If no entry equals `1.0`, the true-class term is dropped and the loss is
//! `ln Σ exp(logits[i] - m)`.

use crate::error::Result;

/// A terminal node of the computation graph.
pub trait Loss {
    fn kind(&self) -> &'static str;

    /// Scalar loss of `output` against `expected`.
    fn forward(&self, output: &[f32], expected: &[f32]) -> f32;

    /// Write dL/d`output` into `in_grad`.
    fn backward(&self, output: &[f32], expected: &[f32], in_grad: &mut [f32]);
}

/// Mean squared error.
#[derive(Debug, Default, Clone)]
pub struct MeanSquaredError;

impl Loss for MeanSquaredError {
    fn kind(&self) -> &'static str {
        "mse"
    }

    fn forward(&self, output: &[f32], expected: &[f32]) -> f32 {
        if output.is_empty() {
            return 0.0;
        }
        let sum: f32 = output
            .iter()
            .zip(expected)
            .map(|(&o, &e)| (e - o) * (e - o))
            .sum();
        sum / output.len() as f32
    }

    fn backward(&self, output: &[f32], expected: &[f32], in_grad: &mut [f32]) {
        let c = -2.0 / output.len() as f32;
        for ((g, &o), &e) in in_grad.iter_mut().zip(output).zip(expected) {
            *g = c * (e - o);
        }
    }
}

/// Softmax cross-entropy against a one-hot target.
#[derive(Debug, Default, Clone)]
pub struct CrossEntropy;

impl CrossEntropy {
    fn max_logit(logits: &[f32]) -> f32 {
        logits.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

impl Loss for CrossEntropy {
    fn kind(&self) -> &'static str {
        "cross_entropy"
    }

    fn forward(&self, output: &[f32], expected: &[f32]) -> f32 {
        if output.is_empty() {
            return 0.0;
        }
        let max = Self::max_logit(output);

        let mut loss = 0.0;
        let mut sum = 0.0;
        for (&logit, &target) in output.iter().zip(expected) {
            if target == 1.0 {
                loss = -logit + max;
            }
            sum += (logit - max).exp();
        }

        loss + sum.ln()
    }

    fn backward(&self, output: &[f32], expected: &[f32], in_grad: &mut [f32]) {
        let max = Self::max_logit(output);
        let sum: f32 = output.iter().map(|&l| (l - max).exp()).sum();

        for ((g, &logit), &target) in in_grad.iter_mut().zip(output).zip(expected) {
            *g = (logit - max).exp() / sum;
            if target == 1.0 {
                *g -= 1.0;
            }
        }
    }
}

/// Init function for [`MeanSquaredError`]. Receives the network output width.
pub fn mse() -> impl FnOnce(usize) -> Result<Box<dyn Loss>> {
    |_width| Ok(Box::new(MeanSquaredError))
}

/// Init function for [`CrossEntropy`]. Receives the network output width.
pub fn cross_entropy() -> impl FnOnce(usize) -> Result<Box<dyn Loss>> {
    |_width| Ok(Box::new(CrossEntropy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_gradient(loss: &dyn Loss, output: &[f32], expected: &[f32]) -> Vec<f32> {
        let h = 1e-2f32;
        (0..output.len())
            .map(|i| {
                let mut plus = output.to_vec();
                let mut minus = output.to_vec();
                plus[i] += h;
                minus[i] -= h;
                (loss.forward(&plus, expected) - loss.forward(&minus, expected)) / (2.0 * h)
            })
            .collect()
    }

    #[test]
    fn test_mse_of_identical_vectors_is_zero() {
        let v = [0.3, -1.2, 5.0, 0.0];
        assert_eq!(MeanSquaredError.forward(&v, &v), 0.0);

        let mut grad = [1.0; 4];
        MeanSquaredError.backward(&v, &v, &mut grad);
        assert!(grad.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_mse_value() {
        // ((1-0)² + (2-4)²) / 2
        assert_eq!(MeanSquaredError.forward(&[0.0, 4.0], &[1.0, 2.0]), 2.5);
    }

    #[test]
    fn test_mse_gradient_sign_matches_finite_difference() {
        let output = [0.5, -1.0, 2.0];
        let expected = [1.0, 1.0, -1.0];
        let mut grad = [0.0; 3];
        MeanSquaredError.backward(&output, &expected, &mut grad);

        let numeric = numeric_gradient(&MeanSquaredError, &output, &expected);
        for (a, n) in grad.iter().zip(&numeric) {
            assert!((a - n).abs() < 1e-3, "analytic {a} numeric {n}");
        }
        // output below target: increasing the output lowers the loss
        assert!(grad[0] < 0.0);
    }

    #[test]
    fn test_cross_entropy_prefers_argmax_target() {
        let logits = [0.2, 3.0, -1.5, 0.7];
        let at_argmax = CrossEntropy.forward(&logits, &[0.0, 1.0, 0.0, 0.0]);
        let at_argmin = CrossEntropy.forward(&logits, &[0.0, 0.0, 1.0, 0.0]);
        assert!(at_argmax < at_argmin);
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let loss = CrossEntropy.forward(&[0.0; 4], &[1.0, 0.0, 0.0, 0.0]);
        assert!((loss - 4.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_large_logits_are_finite() {
        let logits = [1000.0, 999.0, -1000.0];
        let expected = [0.0, 1.0, 0.0];
        assert!(CrossEntropy.forward(&logits, &expected).is_finite());

        let mut grad = [0.0; 3];
        CrossEntropy.backward(&logits, &expected, &mut grad);
        assert!(grad.iter().all(|g| g.is_finite()));
        // softmax gradients sum to zero for a one-hot target
        assert!(grad.iter().sum::<f32>().abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_gradient_matches_finite_difference() {
        let logits = [0.1, -0.4, 1.3, 0.2];
        let expected = [0.0, 0.0, 0.0, 1.0];
        let mut grad = [0.0; 4];
        CrossEntropy.backward(&logits, &expected, &mut grad);

        let numeric = numeric_gradient(&CrossEntropy, &logits, &expected);
        for (a, n) in grad.iter().zip(&numeric) {
            assert!((a - n).abs() < 1e-3, "analytic {a} numeric {n}");
        }
    }

    #[test]
    fn test_cross_entropy_without_true_class() {
        let logits = [0.0, 0.0];
        let loss = CrossEntropy.forward(&logits, &[0.0, 0.0]);
        assert!((loss - 2.0f32.ln()).abs() < 1e-6);
    }
}
