//! Portable fallback: a lane is a single element.

use super::{Backend, Element, Lanes, MultiplyAddAdjacent, Widen};

#[derive(Debug, Clone, Copy, Default)]
pub struct Scalar;

impl Scalar {
    /// # Safety
    ///
    /// Always safe; exists so every backend exposes the same constructor.
    pub const unsafe fn new_unchecked() -> Self { Scalar }
}

impl Backend for Scalar {
    const NAME: &'static str = "scalar";
    const BITS: usize = 0;

    fn detect() -> Option<Self> { Some(Scalar) }
}

impl<T: Element> Lanes<T> for Scalar {
    type Lane = T;
    const LANES: usize = 1;

    #[inline(always)]
    fn zero(self) -> T { T::ZERO }
    #[inline(always)]
    fn splat(self, v: T) -> T { v }

    #[inline(always)]
    unsafe fn load(self, src: &[T], offset: usize) -> T {
        debug_assert!(offset < src.len());
        *src.get_unchecked(offset)
    }

    #[inline(always)]
    unsafe fn store(self, lane: T, dst: &mut [T], offset: usize) {
        debug_assert!(offset < dst.len());
        *dst.get_unchecked_mut(offset) = lane;
    }

    #[inline(always)]
    fn add(self, a: T, b: T) -> T { a.add(b) }
    #[inline(always)]
    fn sub(self, a: T, b: T) -> T { a.sub(b) }
    #[inline(always)]
    fn max(self, a: T, b: T) -> T { if a > b { a } else { b } }
    #[inline(always)]
    fn min(self, a: T, b: T) -> T { if a < b { a } else { b } }
    #[inline(always)]
    fn sum(self, lane: T) -> T { lane }

    #[inline(always)]
    fn map<F: Fn(T) -> T>(self, lane: T, f: F) -> T { f(lane) }
}

impl<T: Widen> MultiplyAddAdjacent<T> for Scalar {
    // One element per lane, so the "pair" is a single widened product.
    #[inline(always)]
    fn multiply_add_adjacent(self, a: T, b: T) -> T::Acc {
        a.widen().mul(b.widen())
    }
}
