//! AVX-512 backend: 512-bit lanes (32 x i16, 16 x i32, 16 x f32).
//! Requires `avx512f` for i32/f32 and `avx512bw` for i16.

use std::arch::x86_64::*;

use super::{Backend, Lanes, MultiplyAddAdjacent};

/// Token proving AVX-512F and AVX-512BW are available.
#[derive(Debug, Clone, Copy)]
pub struct Avx512 {
    _private: (),
}

impl Avx512 {
    /// # Safety
    ///
    /// The running CPU must support AVX-512F and AVX-512BW.
    pub const unsafe fn new_unchecked() -> Self { Avx512 { _private: () } }
}

impl Backend for Avx512 {
    const NAME: &'static str = "avx512";
    const BITS: usize = 512;

    fn detect() -> Option<Self> {
        if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512bw") {
            // SAFETY: checked above.
            Some(unsafe { Self::new_unchecked() })
        } else {
            None
        }
    }
}

// Every intrinsic call below is sound because an `Avx512` token exists.

impl Lanes<i16> for Avx512 {
    type Lane = __m512i;
    const LANES: usize = 32;

    #[inline(always)]
    fn zero(self) -> __m512i { unsafe { _mm512_setzero_si512() } }
    #[inline(always)]
    fn splat(self, v: i16) -> __m512i { unsafe { _mm512_set1_epi16(v) } }

    #[inline(always)]
    unsafe fn load(self, src: &[i16], offset: usize) -> __m512i {
        debug_assert!(offset + 32 <= src.len());
        _mm512_loadu_epi16(src.as_ptr().add(offset))
    }

    #[inline(always)]
    unsafe fn store(self, lane: __m512i, dst: &mut [i16], offset: usize) {
        debug_assert!(offset + 32 <= dst.len());
        _mm512_storeu_epi16(dst.as_mut_ptr().add(offset), lane)
    }

    #[inline(always)]
    fn add(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_add_epi16(a, b) } }
    #[inline(always)]
    fn sub(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_sub_epi16(a, b) } }
    #[inline(always)]
    fn max(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_max_epi16(a, b) } }
    #[inline(always)]
    fn min(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_min_epi16(a, b) } }

    #[inline(always)]
    fn sum(self, lane: __m512i) -> i16 {
        let mut buf = [0i16; 32];
        unsafe { _mm512_storeu_epi16(buf.as_mut_ptr(), lane) };
        buf.iter().fold(0i16, |acc, &v| acc.wrapping_add(v))
    }
}

impl Lanes<i32> for Avx512 {
    type Lane = __m512i;
    const LANES: usize = 16;

    #[inline(always)]
    fn zero(self) -> __m512i { unsafe { _mm512_setzero_si512() } }
    #[inline(always)]
    fn splat(self, v: i32) -> __m512i { unsafe { _mm512_set1_epi32(v) } }

    #[inline(always)]
    unsafe fn load(self, src: &[i32], offset: usize) -> __m512i {
        debug_assert!(offset + 16 <= src.len());
        _mm512_loadu_epi32(src.as_ptr().add(offset))
    }

    #[inline(always)]
    unsafe fn store(self, lane: __m512i, dst: &mut [i32], offset: usize) {
        debug_assert!(offset + 16 <= dst.len());
        _mm512_storeu_epi32(dst.as_mut_ptr().add(offset), lane)
    }

    #[inline(always)]
    fn add(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_add_epi32(a, b) } }
    #[inline(always)]
    fn sub(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_sub_epi32(a, b) } }
    #[inline(always)]
    fn max(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_max_epi32(a, b) } }
    #[inline(always)]
    fn min(self, a: __m512i, b: __m512i) -> __m512i { unsafe { _mm512_min_epi32(a, b) } }
    #[inline(always)]
    fn sum(self, lane: __m512i) -> i32 { unsafe { _mm512_reduce_add_epi32(lane) } }
}

impl Lanes<f32> for Avx512 {
    type Lane = __m512;
    const LANES: usize = 16;

    #[inline(always)]
    fn zero(self) -> __m512 { unsafe { _mm512_setzero_ps() } }
    #[inline(always)]
    fn splat(self, v: f32) -> __m512 { unsafe { _mm512_set1_ps(v) } }

    #[inline(always)]
    unsafe fn load(self, src: &[f32], offset: usize) -> __m512 {
        debug_assert!(offset + 16 <= src.len());
        _mm512_loadu_ps(src.as_ptr().add(offset))
    }

    #[inline(always)]
    unsafe fn store(self, lane: __m512, dst: &mut [f32], offset: usize) {
        debug_assert!(offset + 16 <= dst.len());
        _mm512_storeu_ps(dst.as_mut_ptr().add(offset), lane)
    }

    #[inline(always)]
    fn add(self, a: __m512, b: __m512) -> __m512 { unsafe { _mm512_add_ps(a, b) } }
    #[inline(always)]
    fn sub(self, a: __m512, b: __m512) -> __m512 { unsafe { _mm512_sub_ps(a, b) } }
    #[inline(always)]
    fn max(self, a: __m512, b: __m512) -> __m512 { unsafe { _mm512_max_ps(a, b) } }
    #[inline(always)]
    fn min(self, a: __m512, b: __m512) -> __m512 { unsafe { _mm512_min_ps(a, b) } }
    #[inline(always)]
    fn sum(self, lane: __m512) -> f32 { unsafe { _mm512_reduce_add_ps(lane) } }
}

impl MultiplyAddAdjacent<i16> for Avx512 {
    #[inline(always)]
    fn multiply_add_adjacent(self, a: __m512i, b: __m512i) -> __m512i {
        unsafe { _mm512_madd_epi16(a, b) }
    }
}

impl MultiplyAddAdjacent<f32> for Avx512 {
    #[inline(always)]
    fn multiply_add_adjacent(self, a: __m512, b: __m512) -> __m512 {
        unsafe {
            let p = _mm512_mul_ps(a, b);
            // even slots keep the pair sum, odd slots are zeroed by the mask
            _mm512_maskz_add_ps(0x5555, p, _mm512_permute_ps(p, 0b10_11_00_01))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avx512_madd_pairs_products() {
        let Some(b) = Avx512::detect() else { return };
        let x: [i16; 32] = std::array::from_fn(|i| i as i16 - 16);
        let w: [i16; 32] = std::array::from_fn(|i| 3 - (i as i16 % 7));
        let mut out = [0i32; 16];
        unsafe {
            let xa = Lanes::<i16>::load(b, &x, 0);
            let wa = Lanes::<i16>::load(b, &w, 0);
            let m = MultiplyAddAdjacent::<i16>::multiply_add_adjacent(b, xa, wa);
            Lanes::<i32>::store(b, m, &mut out, 0);
        }
        for k in 0..16 {
            let e = x[2 * k] as i32 * w[2 * k] as i32 + x[2 * k + 1] as i32 * w[2 * k + 1] as i32;
            assert_eq!(out[k], e, "pair {k}");
        }
    }

    #[test]
    fn avx512_float_madd_zeroes_odd_slots() {
        let Some(b) = Avx512::detect() else { return };
        let x: [f32; 16] = std::array::from_fn(|i| i as f32);
        let w = [2.0f32; 16];
        let mut out = [f32::NAN; 16];
        unsafe {
            let xa = Lanes::<f32>::load(b, &x, 0);
            let wa = Lanes::<f32>::load(b, &w, 0);
            let m = MultiplyAddAdjacent::<f32>::multiply_add_adjacent(b, xa, wa);
            Lanes::<f32>::store(b, m, &mut out, 0);
        }
        for k in 0..8 {
            assert_eq!(out[2 * k], 2.0 * (4 * k + 1) as f32);
            assert_eq!(out[2 * k + 1], 0.0);
        }
    }
}
