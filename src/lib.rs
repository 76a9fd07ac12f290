//! Efficiently updatable network (NNUE) kernels.
//!
//! The two perspective accumulators are updated in place as sparse features
//! toggle, then a dense layer runs over their activated concatenation. Every
//! kernel lives once in [`kernels`] and is compiled against the backend in
//! [`simd`]; the free functions here use the build's [`simd::Native`] backend.

pub mod activation;
pub mod error;
pub mod kernels;
pub mod nnue;
pub mod simd;
pub mod verify;

pub use activation::{Activation, ClippedReLU, Identity, ReLU};
pub use error::{Error, Result};
pub use nnue::{Accumulator, Dense, FeaturePair, FeatureTable, FeatureUpdate, Network};
pub use simd::{native, Native};

use simd::{Element, FromAcc, Lanes, MultiplyAddAdjacent, Widen};

/// [`kernels::add_to_all`] on the native backend.
#[inline]
pub fn add_to_all<T, const INPUT: usize, const DELTA: usize>(
    input_a: &mut [T; INPUT],
    input_b: &mut [T; INPUT],
    delta: &[T; DELTA],
    o_a: usize,
    o_b: usize,
) where
    T: Element,
    Native: Lanes<T>,
{
    kernels::add_to_all(native(), input_a, input_b, delta, o_a, o_b)
}

/// [`kernels::subtract_from_all`] on the native backend.
#[inline]
pub fn subtract_from_all<T, const INPUT: usize, const DELTA: usize>(
    input_a: &mut [T; INPUT],
    input_b: &mut [T; INPUT],
    delta: &[T; DELTA],
    o_a: usize,
    o_b: usize,
) where
    T: Element,
    Native: Lanes<T>,
{
    kernels::subtract_from_all(native(), input_a, input_b, delta, o_a, o_b)
}

/// [`kernels::subtract_and_add_to_all`] on the native backend.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn subtract_and_add_to_all<T, const INPUT: usize, const DELTA: usize>(
    input_a: &mut [T; INPUT],
    input_b: &mut [T; INPUT],
    delta: &[T; DELTA],
    o_a_sub: usize,
    o_a_add: usize,
    o_b_sub: usize,
    o_b_add: usize,
) where
    T: Element,
    Native: Lanes<T>,
{
    kernels::subtract_and_add_to_all(native(), input_a, input_b, delta, o_a_sub, o_a_add, o_b_sub, o_b_add)
}

/// [`kernels::activate_flatten_and_forward`] on the native backend.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn activate_flatten_and_forward<A, T, O, const INPUT: usize, const ROW: usize, const OUTPUT: usize, const BIAS: usize>(
    activation: A,
    input_a: &[T; INPUT],
    input_b: &[T; INPUT],
    weight: &[[T; ROW]; OUTPUT],
    bias: &[T; BIAS],
    output: &mut [O; BIAS],
    o: usize,
) where
    A: Activation<T>,
    T: Widen,
    O: FromAcc<T::Acc>,
    Native: MultiplyAddAdjacent<T>,
{
    kernels::activate_flatten_and_forward(native(), activation, input_a, input_b, weight, bias, output, o)
}
