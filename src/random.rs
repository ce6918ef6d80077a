//! Deterministic Random Number Generation
//!
//! Parameter initialization must be reproducible bit-for-bit from a seed, so
//! the engine carries its own small generator instead of depending on a
//! platform RNG.
//!
//! ## Construction
//!
//! ```text
//! seed (u64) ──SplitMix64──> z0 ──> [hi32(z0), lo32(z0)] ─┐
//!            ──SplitMix64──> z1 ──> [hi32(z1), lo32(z1)] ─┴─> xoshiro128+ state [u32; 4]
//! ```
//!
//! ## Uniform floats
//!
//! Each xoshiro128+ step sums two state words, keeps the top 23 bits as a
//! mantissa and ORs in the exponent bits of `1.0`. The result is a float in
//! `[1, 2)`; subtracting `1.0` shifts it to `[0, 1)`.
//!
//! ## Normal floats
//!
//! [`randn`] uses the Marsaglia polar method: draw `(x, y)` uniformly in
//! `[-1, 1)²` until `0 < s = x² + y² < 1`, then
//!
//! ```text
//! chi = √(-2·ln(s) / s)
//! samples: x·chi, y·chi
//! ```
//!
//! Even slots draw a fresh pair and take `x·chi`; odd slots take the cached
//! `y·chi` without drawing.
//!
//! ## References
//!
//! - Blackman & Vigna, "Scrambled linear pseudorandom number generators"
//!   <https://prng.di.unimi.it/>

use crate::error::{NnError, Result};
use crate::tensor::Tensor;

/// SplitMix64, used only to expand a 64-bit seed into generator state.
#[derive(Clone, Debug)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        let x = self.state;
        let mut z = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;

        self.state = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
        z
    }

    /// One step split into its upper and lower 32-bit halves, in that order.
    pub fn next_pair(&mut self) -> [u32; 2] {
        let z = self.next_u64();
        [(z >> 32) as u32, (z & 0xffff_ffff) as u32]
    }
}

/// xoshiro128+ producing uniform `f32` values in `[0, 1)`.
#[derive(Clone, Debug)]
pub struct Xoshiro128Plus {
    s: [u32; 4],
}

impl Xoshiro128Plus {
    /// Seed the 128-bit state from two SplitMix64 steps.
    pub fn from_seed(seed: u64) -> Self {
        let mut mix = SplitMix64::new(seed);
        let [a, b] = mix.next_pair();
        let [c, d] = mix.next_pair();
        Self { s: [a, b, c, d] }
    }

    pub fn state(&self) -> [u32; 4] {
        self.s
    }

    /// Advance the generator and return a uniform float in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        let s = &mut self.s;

        let bits = (s[0].wrapping_add(s[3]) >> 9) | 0x3f80_0000;

        let t = s[1] << 9;
        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(11);

        f32::from_bits(bits) - 1.0
    }
}

/// Fill `tensor` with uniform samples in `[0, 1)`.
pub fn randu(tensor: &mut Tensor, seed: u64) {
    let mut rng = Xoshiro128Plus::from_seed(seed);
    for x in tensor.data.iter_mut() {
        *x = rng.next_f32();
    }
}

/// Fill `tensor` with standard normal samples.
pub fn randn(tensor: &mut Tensor, seed: u64) {
    let mut rng = Xoshiro128Plus::from_seed(seed);
    let mut cached = 0.0f32;

    for (i, out) in tensor.data.iter_mut().enumerate() {
        if i % 2 == 1 {
            *out = cached;
            continue;
        }

        let (x, y, s) = loop {
            let x = rng.next_f32() * 2.0 - 1.0;
            let y = rng.next_f32() * 2.0 - 1.0;
            let s = x * x + y * y;
            if s != 0.0 && s < 1.0 {
                break (x, y, s);
            }
        };

        let chi = (-2.0 * s.ln() / s).sqrt();
        *out = x * chi;
        cached = y * chi;
    }
}

/// Draw an `out_size × in_size` weight tensor scaled by `√(2 / in_size)`.
///
/// # Errors
///
/// Returns [`NnError::OutOfMemory`] if the tensor cannot be allocated or
/// `out_size × in_size` overflows `usize`.
pub fn xavier_he_init(in_size: usize, out_size: usize, seed: u64) -> Result<Tensor> {
    let len = out_size
        .checked_mul(in_size)
        .ok_or(NnError::OutOfMemory {
            requested: usize::MAX,
        })?;
    let mut tensor = Tensor::new(len)?;
    randn(&mut tensor, seed);

    let std = (2.0 / in_size as f32).sqrt();
    crate::linalg::scale(tensor.as_mut_slice(), std);

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mean_and_variance(data: &[f32]) -> (f64, f64) {
        let n = data.len() as f64;
        let mean = data.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var = data
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, var)
    }

    #[test]
    fn test_splitmix_mixes_before_advancing() {
        // The state is mixed first and advanced afterwards, so seed 0 yields 0
        // and the second output equals the canonical first output for seed 0.
        let mut mix = SplitMix64::new(0);
        assert_eq!(mix.next_u64(), 0);
        assert_eq!(mix.next_u64(), 0xe220_a839_7b1d_cdaf);
    }

    #[test]
    fn test_state_is_split_upper_then_lower() {
        let mut mix = SplitMix64::new(42);
        let z0 = mix.next_u64();
        let z1 = mix.next_u64();

        let rng = Xoshiro128Plus::from_seed(42);
        assert_eq!(
            rng.state(),
            [
                (z0 >> 32) as u32,
                z0 as u32,
                (z1 >> 32) as u32,
                z1 as u32
            ]
        );
    }

    #[test]
    fn test_randn_statistics() {
        let mut t = Tensor::new(100_000).unwrap();
        randn(&mut t, 1234);
        let (mean, var) = mean_and_variance(&t.data);
        assert!(mean.abs() < 0.02, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }

    #[test]
    fn test_randn_reuses_second_sample() {
        // Odd slots reuse the pair drawn for the preceding even slot, so a
        // longer tensor shares its prefix with a shorter one.
        let mut short = Tensor::new(3).unwrap();
        let mut long = Tensor::new(4).unwrap();
        randn(&mut short, 9);
        randn(&mut long, 9);
        assert_eq!(short.data[..3], long.data[..3]);
    }

    #[test]
    fn test_xavier_he_scale() {
        let in_size = 50;
        let t = xavier_he_init(in_size, 400, 77).unwrap();
        assert_eq!(t.len(), 20_000);

        let (_, var) = mean_and_variance(&t.data);
        let expected = 2.0 / in_size as f64;
        assert!((var - expected).abs() < 0.1 * expected, "variance {var}");

        let mut raw = Tensor::new(20_000).unwrap();
        randn(&mut raw, 77);
        let std = (2.0 / in_size as f32).sqrt();
        assert_eq!(t.data[17], raw.data[17] * std);
    }

    #[test]
    fn test_xavier_he_rejects_overflowing_shape() {
        assert!(matches!(
            xavier_he_init(usize::MAX, 2, 1),
            Err(NnError::OutOfMemory { requested: usize::MAX })
        ));
    }

    proptest! {
        #[test]
        fn randu_is_deterministic_and_in_range(seed in any::<u64>(), n in 0usize..512) {
            let mut a = Tensor::new(n).unwrap();
            let mut b = Tensor::new(n).unwrap();
            randu(&mut a, seed);
            randu(&mut b, seed);

            prop_assert_eq!(&a.data, &b.data);
            for &x in &a.data {
                prop_assert!((0.0..1.0).contains(&x));
            }
        }

        #[test]
        fn randn_is_deterministic(seed in any::<u64>(), n in 0usize..256) {
            let mut a = Tensor::new(n).unwrap();
            let mut b = Tensor::new(n).unwrap();
            randn(&mut a, seed);
            randn(&mut b, seed);

            // compare bit patterns so a NaN would still be caught as equal-or-not
            let bits = |t: &Tensor| t.data.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
            prop_assert_eq!(bits(&a), bits(&b));
            prop_assert!(a.data.iter().all(|x| x.is_finite()));
        }
    }
}
