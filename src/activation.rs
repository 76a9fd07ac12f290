//! Activation capabilities applied to accumulator values before the forward pass.
//!
//! An activation is a zero-sized type with one pure scalar operation. The
//! kernels apply it lane by lane through [`Activation::activate_lane`], which
//! falls back to the scalar function unless the activation supplies a lane form.

use crate::simd::{Element, Lanes};

pub trait Activation<T: Element> {
    fn activate(x: T) -> T;

    #[inline(always)]
    fn activate_lane<B: Lanes<T>>(backend: B, lane: B::Lane) -> B::Lane {
        backend.map(lane, Self::activate)
    }
}

/// Passes values through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T: Element> Activation<T> for Identity {
    #[inline(always)]
    fn activate(x: T) -> T { x }

    #[inline(always)]
    fn activate_lane<B: Lanes<T>>(_backend: B, lane: B::Lane) -> B::Lane { lane }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl<T: Element> Activation<T> for ReLU {
    #[inline(always)]
    fn activate(x: T) -> T { if x > T::ZERO { x } else { T::ZERO } }

    #[inline(always)]
    fn activate_lane<B: Lanes<T>>(backend: B, lane: B::Lane) -> B::Lane {
        backend.max(lane, backend.zero())
    }
}

/// Clamps to `[0, MAX]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClippedReLU<const MAX: i32>;

impl<T: Element, const MAX: i32> Activation<T> for ClippedReLU<MAX> {
    #[inline(always)]
    fn activate(x: T) -> T {
        let hi = T::from_i32(MAX);
        let x = if x > T::ZERO { x } else { T::ZERO };
        if x < hi { x } else { hi }
    }

    #[inline(always)]
    fn activate_lane<B: Lanes<T>>(backend: B, lane: B::Lane) -> B::Lane {
        let lo = backend.max(lane, backend.zero());
        backend.min(lo, backend.splat(T::from_i32(MAX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::{Backend, Scalar};

    /// Squares after clipping; has no lane form, so it exercises `Lanes::map`.
    struct Squared;

    impl Activation<i16> for Squared {
        fn activate(x: i16) -> i16 {
            let c = x.clamp(0, 127);
            (c * c) >> 7
        }
    }

    #[test]
    fn clipped_relu_clamps_both_ends() {
        assert_eq!(<ClippedReLU<127> as Activation<i16>>::activate(-5), 0);
        assert_eq!(<ClippedReLU<127> as Activation<i16>>::activate(64), 64);
        assert_eq!(<ClippedReLU<127> as Activation<i16>>::activate(900), 127);
        assert_eq!(<ClippedReLU<1> as Activation<f32>>::activate(0.25), 0.25);
    }

    #[test]
    fn lane_forms_match_scalar_forms() {
        let xs: [i16; 64] = std::array::from_fn(|i| (i as i16 - 32) * 7);
        check_lanes::<ReLU>(&xs);
        check_lanes::<ClippedReLU<127>>(&xs);
        check_lanes::<Squared>(&xs);
    }

    fn check_lanes<A: Activation<i16>>(xs: &[i16; 64]) {
        let expected: Vec<i16> = xs.iter().map(|&x| A::activate(x)).collect();
        assert_eq!(run::<A, Scalar>(Scalar, xs), expected);
        #[cfg(target_arch = "x86_64")]
        {
            if let Some(b) = crate::simd::Avx2::detect() {
                assert_eq!(run::<A, _>(b, xs), expected);
            }
            if let Some(b) = crate::simd::Avx512::detect() {
                assert_eq!(run::<A, _>(b, xs), expected);
            }
        }
    }

    fn run<A: Activation<i16>, B: Lanes<i16>>(b: B, xs: &[i16; 64]) -> Vec<i16> {
        let mut out = [0i16; 64];
        let mut i = 0;
        while i < 64 {
            // SAFETY: 64 is a multiple of every i16 lane width.
            unsafe {
                let lane = b.load(xs, i);
                b.store(A::activate_lane(b, lane), &mut out, i);
            }
            i += B::LANES;
        }
        out.to_vec()
    }
}
