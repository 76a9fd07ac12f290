//! Accumulator update and forward-propagation kernels.
//!
//! Each kernel is written once against the [`Lanes`] primitives and
//! monomorphised per backend. Shapes are const generics; relations between
//! them that a type cannot spell are asserted at monomorphisation time. Delta
//! and output offsets are checked once per call, before the loops run.

use std::marker::PhantomData;

use crate::activation::Activation;
use crate::simd::{Element, FromAcc, Lanes, MultiplyAddAdjacent, Widen};

struct Stride<B, T, const N: usize>(PhantomData<(B, T)>);

impl<B: Lanes<T>, T: Element, const N: usize> Stride<B, T, N> {
    const DIVIDES: () = assert!(N % <B as Lanes<T>>::LANES == 0, "accumulator length must be a multiple of the lane width");
}

struct Dense<const INPUT: usize, const ROW: usize, const OUTPUT: usize, const BIAS: usize>;

impl<const INPUT: usize, const ROW: usize, const OUTPUT: usize, const BIAS: usize> Dense<INPUT, ROW, OUTPUT, BIAS> {
    const SHAPE: () = {
        assert!(ROW == INPUT * 2, "weight rows must hold 2 * INPUT columns");
        assert!(OUTPUT <= BIAS, "bias/output arrays shorter than OUTPUT");
    };
}

#[inline(always)]
fn check_row(offset: usize, input: usize, delta: usize) {
    assert!(
        offset <= delta && delta - offset >= input,
        "delta row at offset {offset} (len {input}) overruns table of {delta}"
    );
}

/// `acc[i] = op(acc[i], delta[offset + i])` over one accumulator.
#[inline(always)]
fn update_row<B, T, F, const INPUT: usize, const DELTA: usize>(
    backend: B,
    acc: &mut [T; INPUT],
    delta: &[T; DELTA],
    offset: usize,
    op: F,
) where
    B: Lanes<T>,
    T: Element,
    F: Fn(B::Lane, B::Lane) -> B::Lane,
{
    let mut i = 0;
    while i < INPUT {
        // SAFETY: INPUT is a multiple of LANES and offset + INPUT <= DELTA.
        unsafe {
            let x = backend.load(acc, i);
            let d = backend.load(delta, offset + i);
            backend.store(op(x, d), acc, i);
        }
        i += B::LANES;
    }
}

/// Adds the delta rows at `o_a`/`o_b` into `input_a`/`input_b`.
///
/// Used when a feature becomes active. Each perspective indexes the shared
/// table with its own offset.
#[inline]
pub fn add_to_all<B, T, const INPUT: usize, const DELTA: usize>(
    backend: B,
    input_a: &mut [T; INPUT],
    input_b: &mut [T; INPUT],
    delta: &[T; DELTA],
    o_a: usize,
    o_b: usize,
) where
    B: Lanes<T>,
    T: Element,
{
    let () = Stride::<B, T, INPUT>::DIVIDES;
    check_row(o_a, INPUT, DELTA);
    check_row(o_b, INPUT, DELTA);
    update_row(backend, input_a, delta, o_a, |x, d| backend.add(x, d));
    update_row(backend, input_b, delta, o_b, |x, d| backend.add(x, d));
}

/// Subtracts the delta rows at `o_a`/`o_b`; the inverse of [`add_to_all`].
#[inline]
pub fn subtract_from_all<B, T, const INPUT: usize, const DELTA: usize>(
    backend: B,
    input_a: &mut [T; INPUT],
    input_b: &mut [T; INPUT],
    delta: &[T; DELTA],
    o_a: usize,
    o_b: usize,
) where
    B: Lanes<T>,
    T: Element,
{
    let () = Stride::<B, T, INPUT>::DIVIDES;
    check_row(o_a, INPUT, DELTA);
    check_row(o_b, INPUT, DELTA);
    update_row(backend, input_a, delta, o_a, |x, d| backend.sub(x, d));
    update_row(backend, input_b, delta, o_b, |x, d| backend.sub(x, d));
}

/// One feature leaves and another arrives: `acc[i] = acc[i] - delta[s + i] + delta[a + i]`
/// in a single pass per accumulator.
///
/// Exactly equal to [`subtract_from_all`] followed by [`add_to_all`] for
/// integer elements. For `f32` the rounding may differ from that sequence.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn subtract_and_add_to_all<B, T, const INPUT: usize, const DELTA: usize>(
    backend: B,
    input_a: &mut [T; INPUT],
    input_b: &mut [T; INPUT],
    delta: &[T; DELTA],
    o_a_sub: usize,
    o_a_add: usize,
    o_b_sub: usize,
    o_b_add: usize,
) where
    B: Lanes<T>,
    T: Element,
{
    let () = Stride::<B, T, INPUT>::DIVIDES;
    for o in [o_a_sub, o_a_add, o_b_sub, o_b_add] {
        check_row(o, INPUT, DELTA);
    }
    for (acc, o_sub, o_add) in [(input_a, o_a_sub, o_a_add), (input_b, o_b_sub, o_b_add)] {
        let mut i = 0;
        while i < INPUT {
            // SAFETY: INPUT is a multiple of LANES and both rows lie inside the table.
            unsafe {
                let x = backend.load(acc, i);
                let s = backend.load(delta, o_sub + i);
                let a = backend.load(delta, o_add + i);
                backend.store(backend.add(backend.sub(x, s), a), acc, i);
            }
            i += B::LANES;
        }
    }
}

/// Dense layer over the activated concatenation `[act(input_a) | act(input_b)]`.
///
/// Writes `OUTPUT` results to `output[o..o + OUTPUT]`. `weight` is the
/// row-major `OUTPUT x 2 * INPUT` matrix stored contiguously, so row `k`
/// starts at flat index `k * 2 * INPUT`; its first `INPUT` columns weight
/// `input_a`, the rest weight `input_b`. Bias `bias[o + k]` is added after the reduction.
///
/// Per output unit the products are folded into one lane accumulator with
/// `multiply_add_adjacent` and reduced with a single `sum` at the end. The
/// activation is re-applied for every unit; the accumulators are read-only.
#[allow(clippy::too_many_arguments)]
#[inline(never)]
pub fn activate_flatten_and_forward<A, B, T, O, const INPUT: usize, const ROW: usize, const OUTPUT: usize, const BIAS: usize>(
    backend: B,
    _activation: A,
    input_a: &[T; INPUT],
    input_b: &[T; INPUT],
    weight: &[[T; ROW]; OUTPUT],
    bias: &[T; BIAS],
    output: &mut [O; BIAS],
    o: usize,
) where
    A: Activation<T>,
    B: MultiplyAddAdjacent<T>,
    T: Widen,
    O: FromAcc<T::Acc>,
{
    let () = Stride::<B, T, INPUT>::DIVIDES;
    let () = Dense::<INPUT, ROW, OUTPUT, BIAS>::SHAPE;
    assert!(o <= BIAS - OUTPUT, "output offset {o} + {OUTPUT} overruns {BIAS}");

    let weight = weight.as_flattened();
    let step = <B as Lanes<T>>::LANES;
    let mut row = 0;
    for k in 0..OUTPUT {
        let mut acc = <B as Lanes<T::Acc>>::zero(backend);
        let mut j = 0;
        while j < INPUT {
            // SAFETY: j + LANES <= INPUT, and row + 2 * INPUT <= weight.len() by SHAPE.
            unsafe {
                let x = <B as Lanes<T>>::load(backend, input_a, j);
                let w = <B as Lanes<T>>::load(backend, weight, row + j);
                let x = A::activate_lane(backend, x);
                let p = <B as MultiplyAddAdjacent<T>>::multiply_add_adjacent(backend, x, w);
                acc = <B as Lanes<T::Acc>>::add(backend, acc, p);

                let x = <B as Lanes<T>>::load(backend, input_b, j);
                let w = <B as Lanes<T>>::load(backend, weight, row + INPUT + j);
                let x = A::activate_lane(backend, x);
                let p = <B as MultiplyAddAdjacent<T>>::multiply_add_adjacent(backend, x, w);
                acc = <B as Lanes<T::Acc>>::add(backend, acc, p);
            }
            j += step;
        }
        row += INPUT * 2;

        let total = Element::add(<B as Lanes<T::Acc>>::sum(backend, acc), bias[o + k].widen());
        output[o + k] = O::from_acc(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{ClippedReLU, Identity};
    use crate::simd::Scalar;

    #[test]
    fn add_then_subtract_restores_scalar() {
        let mut a = [1i16, 2, 3, 4];
        let mut b = [5i16, 6, 7, 8];
        let delta = [1i16, 1, 1, 1, 2, 2, 2, 2];
        add_to_all(Scalar, &mut a, &mut b, &delta, 0, 4);
        assert_eq!(a, [2, 3, 4, 5]);
        assert_eq!(b, [7, 8, 9, 10]);
        subtract_from_all(Scalar, &mut a, &mut b, &delta, 0, 4);
        assert_eq!(a, [1, 2, 3, 4]);
        assert_eq!(b, [5, 6, 7, 8]);
    }

    #[test]
    fn fused_update_moves_a_feature() {
        let mut a = [10i32; 4];
        let mut b = [20i32; 4];
        let delta = [1i32, 2, 3, 4, 100, 200, 300, 400];
        subtract_and_add_to_all(Scalar, &mut a, &mut b, &delta, 0, 4, 4, 0);
        assert_eq!(a, [109, 208, 307, 406]);
        assert_eq!(b, [-79, -178, -277, -376]);
    }

    #[test]
    fn forward_writes_at_offset() {
        let a = [1i16, -2];
        let b = [3i16, 4];
        // one row: [A-cols | B-cols]
        let w = [[1i16, 1, 2, 2]];
        let bias = [0i16, 7, 0];
        let mut out = [0i32; 3];
        activate_flatten_and_forward(Scalar, Identity, &a, &b, &w, &bias, &mut out, 1);
        // 1 - 2 + 6 + 8 + 7
        assert_eq!(out, [0, 20, 0]);
    }

    #[test]
    fn forward_applies_activation_per_unit() {
        let a = [-5i16, 200];
        let b = [50i16, 0];
        let w = [[1i16, 1, 1, 1], [2, 0, 0, 2]];
        let bias = [1i16, -1];
        let mut out = [0i32; 2];
        activate_flatten_and_forward(Scalar, ClippedReLU::<127>, &a, &b, &w, &bias, &mut out, 0);
        // activated: a = [0, 127], b = [50, 0]
        assert_eq!(out, [178, -1]);
    }

    #[test]
    #[should_panic(expected = "overruns")]
    fn out_of_range_row_is_rejected() {
        let mut a = [0i16; 4];
        let mut b = [0i16; 4];
        let delta = [0i16; 8];
        add_to_all(Scalar, &mut a, &mut b, &delta, 0, 5);
    }
}
