//! Backend equivalence self-check.
//!
//! Runs every kernel on random inputs through the scalar backend and through
//! the backend under test and compares the results: bit-exact for integer
//! elements, within [`TOLERANCE`] for floats. The forward pass is also checked
//! against [`reference_forward`], a direct unvectorised computation.

use log::warn;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::activation::{Activation, ClippedReLU};
use crate::error::{Error, Result};
use crate::kernels;
use crate::nnue::features::zeroed_boxed;
use crate::simd::{Backend, Element, FromAcc, MultiplyAddAdjacent, Scalar, Widen};

/// Relative tolerance for floating elements (absolute below magnitude 1).
pub const TOLERANCE: f64 = 1e-3;

const INPUT: usize = 64;
const FEATURES: usize = 16;
const DELTA: usize = INPUT * FEATURES;
const ROW: usize = INPUT * 2;
const OUTPUT: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub backend: &'static str,
    pub rounds: u64,
    pub seed: u64,
    /// Elements compared across all kernels and rounds.
    pub checks: usize,
}

/// `true` when `actual` is acceptably equal to `expected` for `T`.
pub fn close<T: Element>(expected: T, actual: T) -> bool {
    if T::INTEGER {
        expected == actual
    } else {
        let (e, a) = (expected.to_f64(), actual.to_f64());
        (e - a).abs() <= TOLERANCE * e.abs().max(1.0)
    }
}

/// Unvectorised forward pass: `bias[o + k] + dot(act(a), row_k[..INPUT]) + dot(act(b), row_k[INPUT..])`.
#[allow(clippy::too_many_arguments)]
pub fn reference_forward<A, T, O, const N: usize, const R: usize, const OUT: usize, const BIAS: usize>(
    _activation: A,
    input_a: &[T; N],
    input_b: &[T; N],
    weight: &[[T; R]; OUT],
    bias: &[T; BIAS],
    output: &mut [O; BIAS],
    o: usize,
) where
    A: Activation<T>,
    T: Widen,
    O: FromAcc<T::Acc>,
{
    for (k, row) in weight.iter().enumerate() {
        let mut sum = <T::Acc as Element>::ZERO;
        for j in 0..N {
            sum = sum.add(A::activate(input_a[j]).widen().mul(row[j].widen()));
            sum = sum.add(A::activate(input_b[j]).widen().mul(row[N + j].widen()));
        }
        output[o + k] = O::from_acc(sum.add(bias[o + k].widen()));
    }
}

fn compare<T: Element>(kernel: &'static str, backend: &'static str, expected: &[T], actual: &[T]) -> Result<usize> {
    for (index, (&e, &a)) in expected.iter().zip(actual).enumerate() {
        if !close(e, a) {
            warn!("{kernel} on {backend}: mismatch at {index}: {a:?} vs {e:?}");
            return Err(Error::Mismatch { kernel, backend, index, expected: e.to_f64(), actual: a.to_f64() });
        }
    }
    Ok(expected.len())
}

struct Fixture<T: Element> {
    a: [T; INPUT],
    b: [T; INPUT],
    delta: Box<[T; DELTA]>,
    weight: Box<[[T; ROW]; OUTPUT]>,
    bias: [T; OUTPUT],
    rows: [usize; 4],
}

impl<T: Element> Fixture<T> {
    fn random(rng: &mut SmallRng, sample: fn(&mut SmallRng) -> T) -> Self {
        let mut delta = zeroed_boxed::<T, DELTA>();
        delta.iter_mut().for_each(|v| *v = sample(rng));
        let mut weight: Box<[[T; ROW]; OUTPUT]> = Box::new([[T::ZERO; ROW]; OUTPUT]);
        weight.iter_mut().flatten().for_each(|v| *v = sample(rng));
        Self {
            a: std::array::from_fn(|_| sample(rng)),
            b: std::array::from_fn(|_| sample(rng)),
            delta,
            weight,
            bias: std::array::from_fn(|_| sample(rng)),
            rows: std::array::from_fn(|_| rng.gen_range(0..FEATURES) * INPUT),
        }
    }
}

fn round<B, A, T, O>(backend: B, activation: A, rng: &mut SmallRng, sample: fn(&mut SmallRng) -> T) -> Result<usize>
where
    B: MultiplyAddAdjacent<T>,
    A: Activation<T> + Copy,
    T: Widen,
    O: FromAcc<T::Acc>,
{
    let f = Fixture::random(rng, sample);
    let delta = &*f.delta;
    let [r0, r1, r2, r3] = f.rows;
    let name = B::NAME;
    let mut checks = 0;

    let (mut sa, mut sb) = (f.a, f.b);
    let (mut va, mut vb) = (f.a, f.b);
    kernels::add_to_all(Scalar, &mut sa, &mut sb, delta, r0, r1);
    kernels::add_to_all(backend, &mut va, &mut vb, delta, r0, r1);
    checks += compare("add_to_all", name, &sa, &va)?;
    checks += compare("add_to_all", name, &sb, &vb)?;

    kernels::subtract_from_all(Scalar, &mut sa, &mut sb, delta, r2, r3);
    kernels::subtract_from_all(backend, &mut va, &mut vb, delta, r2, r3);
    checks += compare("subtract_from_all", name, &sa, &va)?;
    checks += compare("subtract_from_all", name, &sb, &vb)?;

    kernels::subtract_and_add_to_all(Scalar, &mut sa, &mut sb, delta, r0, r2, r1, r3);
    kernels::subtract_and_add_to_all(backend, &mut va, &mut vb, delta, r0, r2, r1, r3);
    checks += compare("subtract_and_add_to_all", name, &sa, &va)?;
    checks += compare("subtract_and_add_to_all", name, &sb, &vb)?;

    let mut reference = [O::ZERO; OUTPUT];
    let mut scalar = [O::ZERO; OUTPUT];
    let mut vector = [O::ZERO; OUTPUT];
    reference_forward(activation, &sa, &sb, &*f.weight, &f.bias, &mut reference, 0);
    kernels::activate_flatten_and_forward(Scalar, activation, &sa, &sb, &*f.weight, &f.bias, &mut scalar, 0);
    kernels::activate_flatten_and_forward(backend, activation, &va, &vb, &*f.weight, &f.bias, &mut vector, 0);
    checks += compare("activate_flatten_and_forward", Scalar::NAME, &reference, &scalar)?;
    checks += compare("activate_flatten_and_forward", name, &scalar, &vector)?;

    Ok(checks)
}

/// One verification round (integer and float kernels) with its own inputs.
pub fn verify_round<B>(backend: B, seed: u64) -> Result<usize>
where
    B: MultiplyAddAdjacent<i16> + MultiplyAddAdjacent<f32>,
{
    let mut rng = SmallRng::seed_from_u64(seed);
    let ints = round::<B, ClippedReLU<127>, i16, i32>(backend, ClippedReLU, &mut rng, |r| r.gen_range(-2000..2000))?;
    let floats = round::<B, ClippedReLU<1>, f32, f32>(backend, ClippedReLU, &mut rng, |r| r.gen_range(-1.0..1.0))?;
    Ok(ints + floats)
}

/// Runs `rounds` independent rounds in parallel. Round `r` uses seed `seed + r`.
pub fn verify<B>(backend: B, rounds: u64, seed: u64) -> Result<VerifyReport>
where
    B: MultiplyAddAdjacent<i16> + MultiplyAddAdjacent<f32>,
{
    verify_with_progress(backend, rounds, seed, || {})
}

/// [`verify`], calling `on_round` from the worker thread after each round finishes.
pub fn verify_with_progress<B, F>(backend: B, rounds: u64, seed: u64, on_round: F) -> Result<VerifyReport>
where
    B: MultiplyAddAdjacent<i16> + MultiplyAddAdjacent<f32>,
    F: Fn() + Sync + Send,
{
    let checks = (0..rounds)
        .into_par_iter()
        .map(|r| {
            let n = verify_round(backend, seed.wrapping_add(r));
            on_round();
            n
        })
        .try_reduce(|| 0, |x, y| Ok(x + y))?;
    Ok(VerifyReport { backend: B::NAME, rounds, seed, checks })
}

/// Verifies every SIMD backend the running CPU supports.
pub fn verify_available(rounds: u64, seed: u64) -> Result<Vec<VerifyReport>> {
    let mut out = vec![verify(Scalar, rounds, seed)?];
    #[cfg(target_arch = "x86_64")]
    {
        if let Some(b) = crate::simd::Avx2::detect() {
            out.push(verify(b, rounds, seed)?);
        }
        if let Some(b) = crate::simd::Avx512::detect() {
            out.push(verify(b, rounds, seed)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn scalar_agrees_with_reference() {
        let report = verify(Scalar, 4, 7).unwrap();
        assert_eq!(report.backend, "scalar");
        assert!(report.checks > 0);
    }

    #[test]
    fn progress_fires_once_per_round() {
        let seen = AtomicU64::new(0);
        let report = verify_with_progress(Scalar, 6, 21, || {
            seen.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 6);
        assert_eq!(report.rounds, 6);
    }

    #[test]
    fn close_is_exact_for_integers() {
        assert!(close(5i16, 5));
        assert!(!close(5i32, 6));
        assert!(close(1000.0f32, 1000.5));
        assert!(!close(1.0f32, 1.01));
    }
}
