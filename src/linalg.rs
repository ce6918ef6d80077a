//! Linear-Algebra Kernels
//!
//! Stateless kernels over raw `f32` slices. Layers call these for their
//! forward passes and the model calls them to aggregate gradients.
//!
//! ## Kernels
//!
//! ```text
//! dot:          C[i] = Σ_j A[i, j] · B[j]      A is rows × columns, row-major
//! vector_sum:   C[i] = A[i] + B[i]
//! scalar_mult:  B[i] = alpha · A[i]
//! ```
//!
//! ## Two Kernel Sets
//!
//! - [`scalar`]: one element at a time. The reference semantics.
//! - [`simd`]: processes [`LANES`] elements per step with a lane-wise
//!   accumulator, then handles the remainder with a descending tail. The
//!   lane loop is written so LLVM can lower it to AVX/NEON vector
//!   instructions without `unsafe`.
//!
//! Both sets are always compiled. The top-level functions dispatch to
//! [`simd`] when the `simd` feature is enabled and to [`scalar`] otherwise.
//! Elementwise kernels are bit-identical across the two sets; `dot` differs
//! only in floating-point summation order.
//!
//! Slice lengths are preconditions and are asserted. The model validates
//! every size at graph-construction time, so a failing assertion here means
//! a bug in a layer, not bad user input.

/// Block width of the [`simd`] kernels.
pub const LANES: usize = 8;

/// Matrix · vector product. `a` is `rows × columns` row-major, `b` has
/// `columns` elements and `c` receives `rows` elements.
#[inline]
pub fn dot(a: &[f32], rows: usize, columns: usize, b: &[f32], c: &mut [f32]) {
    #[cfg(feature = "simd")]
    simd::dot(a, rows, columns, b, c);
    #[cfg(not(feature = "simd"))]
    scalar::dot(a, rows, columns, b, c);
}

/// Elementwise `c = a + b`.
#[inline]
pub fn vector_sum(a: &[f32], b: &[f32], c: &mut [f32]) {
    #[cfg(feature = "simd")]
    simd::vector_sum(a, b, c);
    #[cfg(not(feature = "simd"))]
    scalar::vector_sum(a, b, c);
}

/// Elementwise `acc += b`, the in-place form of [`vector_sum`].
#[inline]
pub fn add_assign(acc: &mut [f32], b: &[f32]) {
    #[cfg(feature = "simd")]
    simd::add_assign(acc, b);
    #[cfg(not(feature = "simd"))]
    scalar::add_assign(acc, b);
}

/// Elementwise `b = alpha · a`.
#[inline]
pub fn scalar_mult(a: &[f32], alpha: f32, b: &mut [f32]) {
    #[cfg(feature = "simd")]
    simd::scalar_mult(a, alpha, b);
    #[cfg(not(feature = "simd"))]
    scalar::scalar_mult(a, alpha, b);
}

/// Elementwise `a *= alpha`, the in-place form of [`scalar_mult`].
#[inline]
pub fn scale(a: &mut [f32], alpha: f32) {
    #[cfg(feature = "simd")]
    simd::scale(a, alpha);
    #[cfg(not(feature = "simd"))]
    scalar::scale(a, alpha);
}

/// Reference kernels, one element per step.
pub mod scalar {
    pub fn dot(a: &[f32], rows: usize, columns: usize, b: &[f32], c: &mut [f32]) {
        assert_eq!(a.len(), rows * columns, "matrix length");
        assert_eq!(b.len(), columns, "vector length");
        assert_eq!(c.len(), rows, "output length");

        for (row, out) in a.chunks_exact(columns.max(1)).zip(c.iter_mut()) {
            let mut sum = 0.0;
            for (&x, &y) in row.iter().zip(b) {
                sum += x * y;
            }
            *out = sum;
        }

        // chunks_exact yields nothing for zero columns
        if columns == 0 {
            c.iter_mut().for_each(|x| *x = 0.0);
        }
    }

    pub fn vector_sum(a: &[f32], b: &[f32], c: &mut [f32]) {
        assert_eq!(a.len(), b.len());
        assert_eq!(a.len(), c.len());
        for ((out, &x), &y) in c.iter_mut().zip(a).zip(b) {
            *out = x + y;
        }
    }

    pub fn add_assign(acc: &mut [f32], b: &[f32]) {
        assert_eq!(acc.len(), b.len());
        for (out, &y) in acc.iter_mut().zip(b) {
            *out += y;
        }
    }

    pub fn scalar_mult(a: &[f32], alpha: f32, b: &mut [f32]) {
        assert_eq!(a.len(), b.len());
        for (out, &x) in b.iter_mut().zip(a) {
            *out = alpha * x;
        }
    }

    pub fn scale(a: &mut [f32], alpha: f32) {
        for x in a.iter_mut() {
            *x *= alpha;
        }
    }
}

/// Blocked kernels, [`LANES`] elements per step plus a descending tail.
pub mod simd {
    use super::LANES;

    /// Reduce the lane accumulator the way a 256-bit register is reduced:
    /// fold the high half onto the low half, then pairwise.
    #[inline(always)]
    fn horizontal_sum(acc: [f32; LANES]) -> f32 {
        let lo = [
            acc[0] + acc[4],
            acc[1] + acc[5],
            acc[2] + acc[6],
            acc[3] + acc[7],
        ];
        let pair = [lo[0] + lo[1], lo[2] + lo[3]];
        pair[0] + pair[1]
    }

    pub fn dot(a: &[f32], rows: usize, columns: usize, b: &[f32], c: &mut [f32]) {
        assert_eq!(a.len(), rows * columns, "matrix length");
        assert_eq!(b.len(), columns, "vector length");
        assert_eq!(c.len(), rows, "output length");

        let blocked = columns - columns % LANES;

        for (i, out) in c.iter_mut().enumerate() {
            let row = &a[i * columns..(i + 1) * columns];

            let mut acc = [0.0f32; LANES];
            for (x, y) in row[..blocked]
                .chunks_exact(LANES)
                .zip(b[..blocked].chunks_exact(LANES))
            {
                for k in 0..LANES {
                    acc[k] += x[k] * y[k];
                }
            }

            let mut sum = horizontal_sum(acc);
            for j in (blocked..columns).rev() {
                sum += row[j] * b[j];
            }
            *out = sum;
        }
    }

    pub fn vector_sum(a: &[f32], b: &[f32], c: &mut [f32]) {
        assert_eq!(a.len(), b.len());
        assert_eq!(a.len(), c.len());

        let blocked = a.len() - a.len() % LANES;
        for ((out, x), y) in c[..blocked]
            .chunks_exact_mut(LANES)
            .zip(a[..blocked].chunks_exact(LANES))
            .zip(b[..blocked].chunks_exact(LANES))
        {
            for k in 0..LANES {
                out[k] = x[k] + y[k];
            }
        }
        for j in (blocked..a.len()).rev() {
            c[j] = a[j] + b[j];
        }
    }

    pub fn add_assign(acc: &mut [f32], b: &[f32]) {
        assert_eq!(acc.len(), b.len());

        let blocked = acc.len() - acc.len() % LANES;
        for (out, y) in acc[..blocked]
            .chunks_exact_mut(LANES)
            .zip(b[..blocked].chunks_exact(LANES))
        {
            for k in 0..LANES {
                out[k] += y[k];
            }
        }
        for j in (blocked..b.len()).rev() {
            acc[j] += b[j];
        }
    }

    pub fn scalar_mult(a: &[f32], alpha: f32, b: &mut [f32]) {
        assert_eq!(a.len(), b.len());

        let blocked = a.len() - a.len() % LANES;
        for (out, x) in b[..blocked]
            .chunks_exact_mut(LANES)
            .zip(a[..blocked].chunks_exact(LANES))
        {
            for k in 0..LANES {
                out[k] = alpha * x[k];
            }
        }
        for j in (blocked..a.len()).rev() {
            b[j] = alpha * a[j];
        }
    }

    pub fn scale(a: &mut [f32], alpha: f32) {
        let blocked = a.len() - a.len() % LANES;
        for block in a[..blocked].chunks_exact_mut(LANES) {
            for x in block.iter_mut() {
                *x *= alpha;
            }
        }
        for x in a[blocked..].iter_mut().rev() {
            *x *= alpha;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dot_small_matrix() {
        // [[1, 2, 3], [4, 5, 6]] · [1, 0, -1]
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [1.0, 0.0, -1.0];
        let mut c = [0.0; 2];
        dot(&a, 2, 3, &b, &mut c);
        assert_eq!(c, [-2.0, -2.0]);
    }

    #[test]
    fn test_dot_overwrites_output() {
        let a = [1.0, 1.0];
        let b = [2.0, 3.0];
        let mut c = [100.0];
        dot(&a, 1, 2, &b, &mut c);
        assert_eq!(c, [5.0]);
    }

    #[test]
    fn test_dot_zero_columns() {
        let mut c = [7.0, 7.0];
        scalar::dot(&[], 2, 0, &[], &mut c);
        assert_eq!(c, [0.0, 0.0]);
        let mut c = [7.0, 7.0];
        simd::dot(&[], 2, 0, &[], &mut c);
        assert_eq!(c, [0.0, 0.0]);
    }

    #[test]
    fn test_vector_sum_and_add_assign() {
        let a = [1.0, 2.0, 3.0];
        let b = [0.5, 0.5, 0.5];
        let mut c = [0.0; 3];
        vector_sum(&a, &b, &mut c);
        assert_eq!(c, [1.5, 2.5, 3.5]);

        let mut acc = a;
        add_assign(&mut acc, &b);
        assert_eq!(acc, c);
    }

    #[test]
    fn test_scalar_mult_and_scale() {
        let a = [1.0, -2.0, 4.0];
        let mut b = [0.0; 3];
        scalar_mult(&a, 0.5, &mut b);
        assert_eq!(b, [0.5, -1.0, 2.0]);

        let mut a = a;
        scale(&mut a, 0.5);
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic]
    fn test_dot_rejects_short_vector() {
        let mut c = [0.0; 1];
        dot(&[1.0, 2.0], 1, 2, &[1.0], &mut c);
    }

    fn matrix_and_vector() -> impl Strategy<Value = (usize, usize, Vec<f32>, Vec<f32>)> {
        (1usize..6, 0usize..40).prop_flat_map(|(rows, columns)| {
            (
                Just(rows),
                Just(columns),
                prop::collection::vec(-10.0f32..10.0, rows * columns),
                prop::collection::vec(-10.0f32..10.0, columns),
            )
        })
    }

    proptest! {
        #[test]
        fn blocked_dot_matches_scalar((rows, columns, a, b) in matrix_and_vector()) {
            let mut expected = vec![0.0; rows];
            let mut got = vec![0.0; rows];
            scalar::dot(&a, rows, columns, &b, &mut expected);
            simd::dot(&a, rows, columns, &b, &mut got);
            for (i, (e, g)) in expected.iter().zip(&got).enumerate() {
                // summation order differs; bound by the magnitude of the terms
                let row = &a[i * columns..(i + 1) * columns];
                let magnitude: f32 = row.iter().zip(&b).map(|(x, y)| (x * y).abs()).sum();
                prop_assert!((e - g).abs() <= 1e-5 * magnitude + 1e-6);
            }
        }

        #[test]
        fn blocked_elementwise_is_bit_identical(
            a in prop::collection::vec(-100.0f32..100.0, 0..50),
            alpha in -4.0f32..4.0,
        ) {
            let b: Vec<f32> = a.iter().rev().copied().collect();

            let mut s = vec![0.0; a.len()];
            let mut v = vec![0.0; a.len()];
            scalar::vector_sum(&a, &b, &mut s);
            simd::vector_sum(&a, &b, &mut v);
            prop_assert_eq!(&s, &v);

            scalar::scalar_mult(&a, alpha, &mut s);
            simd::scalar_mult(&a, alpha, &mut v);
            prop_assert_eq!(&s, &v);

            let mut s = a.clone();
            let mut v = a.clone();
            scalar::add_assign(&mut s, &b);
            simd::add_assign(&mut v, &b);
            prop_assert_eq!(&s, &v);

            scalar::scale(&mut s, alpha);
            simd::scale(&mut v, alpha);
            prop_assert_eq!(s, v);
        }
    }
}
