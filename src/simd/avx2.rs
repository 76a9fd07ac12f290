//! AVX2 backend: 256-bit lanes (16 x i16, 8 x i32, 8 x f32).

use std::arch::x86_64::*;

use super::{Backend, Lanes, MultiplyAddAdjacent};

/// Token proving AVX2 is available.
#[derive(Debug, Clone, Copy)]
pub struct Avx2 {
    _private: (),
}

impl Avx2 {
    /// # Safety
    ///
    /// The running CPU must support AVX2.
    pub const unsafe fn new_unchecked() -> Self { Avx2 { _private: () } }
}

impl Backend for Avx2 {
    const NAME: &'static str = "avx2";
    const BITS: usize = 256;

    fn detect() -> Option<Self> {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: checked above.
            Some(unsafe { Self::new_unchecked() })
        } else {
            None
        }
    }
}

// Every intrinsic call below is sound because an `Avx2` token exists.

impl Lanes<i16> for Avx2 {
    type Lane = __m256i;
    const LANES: usize = 16;

    #[inline(always)]
    fn zero(self) -> __m256i { unsafe { _mm256_setzero_si256() } }
    #[inline(always)]
    fn splat(self, v: i16) -> __m256i { unsafe { _mm256_set1_epi16(v) } }

    #[inline(always)]
    unsafe fn load(self, src: &[i16], offset: usize) -> __m256i {
        debug_assert!(offset + 16 <= src.len());
        _mm256_loadu_si256(src.as_ptr().add(offset) as *const __m256i)
    }

    #[inline(always)]
    unsafe fn store(self, lane: __m256i, dst: &mut [i16], offset: usize) {
        debug_assert!(offset + 16 <= dst.len());
        _mm256_storeu_si256(dst.as_mut_ptr().add(offset) as *mut __m256i, lane)
    }

    #[inline(always)]
    fn add(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_add_epi16(a, b) } }
    #[inline(always)]
    fn sub(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_sub_epi16(a, b) } }
    #[inline(always)]
    fn max(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_max_epi16(a, b) } }
    #[inline(always)]
    fn min(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_min_epi16(a, b) } }

    #[inline(always)]
    fn sum(self, lane: __m256i) -> i16 {
        let mut buf = [0i16; 16];
        unsafe { _mm256_storeu_si256(buf.as_mut_ptr() as *mut __m256i, lane) };
        buf.iter().fold(0i16, |acc, &v| acc.wrapping_add(v))
    }
}

impl Lanes<i32> for Avx2 {
    type Lane = __m256i;
    const LANES: usize = 8;

    #[inline(always)]
    fn zero(self) -> __m256i { unsafe { _mm256_setzero_si256() } }
    #[inline(always)]
    fn splat(self, v: i32) -> __m256i { unsafe { _mm256_set1_epi32(v) } }

    #[inline(always)]
    unsafe fn load(self, src: &[i32], offset: usize) -> __m256i {
        debug_assert!(offset + 8 <= src.len());
        _mm256_loadu_si256(src.as_ptr().add(offset) as *const __m256i)
    }

    #[inline(always)]
    unsafe fn store(self, lane: __m256i, dst: &mut [i32], offset: usize) {
        debug_assert!(offset + 8 <= dst.len());
        _mm256_storeu_si256(dst.as_mut_ptr().add(offset) as *mut __m256i, lane)
    }

    #[inline(always)]
    fn add(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_add_epi32(a, b) } }
    #[inline(always)]
    fn sub(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_sub_epi32(a, b) } }
    #[inline(always)]
    fn max(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_max_epi32(a, b) } }
    #[inline(always)]
    fn min(self, a: __m256i, b: __m256i) -> __m256i { unsafe { _mm256_min_epi32(a, b) } }

    #[inline(always)]
    fn sum(self, lane: __m256i) -> i32 {
        unsafe {
            let lo = _mm256_castsi256_si128(lane);
            let hi = _mm256_extracti128_si256(lane, 1);
            let s = _mm_add_epi32(lo, hi);
            let s = _mm_add_epi32(s, _mm_shuffle_epi32(s, 0b01_00_11_10));
            let s = _mm_add_epi32(s, _mm_shuffle_epi32(s, 0b10_11_00_01));
            _mm_cvtsi128_si32(s)
        }
    }
}

impl Lanes<f32> for Avx2 {
    type Lane = __m256;
    const LANES: usize = 8;

    #[inline(always)]
    fn zero(self) -> __m256 { unsafe { _mm256_setzero_ps() } }
    #[inline(always)]
    fn splat(self, v: f32) -> __m256 { unsafe { _mm256_set1_ps(v) } }

    #[inline(always)]
    unsafe fn load(self, src: &[f32], offset: usize) -> __m256 {
        debug_assert!(offset + 8 <= src.len());
        _mm256_loadu_ps(src.as_ptr().add(offset))
    }

    #[inline(always)]
    unsafe fn store(self, lane: __m256, dst: &mut [f32], offset: usize) {
        debug_assert!(offset + 8 <= dst.len());
        _mm256_storeu_ps(dst.as_mut_ptr().add(offset), lane)
    }

    #[inline(always)]
    fn add(self, a: __m256, b: __m256) -> __m256 { unsafe { _mm256_add_ps(a, b) } }
    #[inline(always)]
    fn sub(self, a: __m256, b: __m256) -> __m256 { unsafe { _mm256_sub_ps(a, b) } }
    #[inline(always)]
    fn max(self, a: __m256, b: __m256) -> __m256 { unsafe { _mm256_max_ps(a, b) } }
    #[inline(always)]
    fn min(self, a: __m256, b: __m256) -> __m256 { unsafe { _mm256_min_ps(a, b) } }

    #[inline(always)]
    fn sum(self, lane: __m256) -> f32 {
        unsafe {
            let lo = _mm256_castps256_ps128(lane);
            let hi = _mm256_extractf128_ps(lane, 1);
            let s = _mm_add_ps(lo, hi);
            let s = _mm_add_ps(s, _mm_movehl_ps(s, s));
            let s = _mm_add_ss(s, _mm_shuffle_ps(s, s, 0b01));
            _mm_cvtss_f32(s)
        }
    }
}

impl MultiplyAddAdjacent<i16> for Avx2 {
    #[inline(always)]
    fn multiply_add_adjacent(self, a: __m256i, b: __m256i) -> __m256i {
        unsafe { _mm256_madd_epi16(a, b) }
    }
}

impl MultiplyAddAdjacent<f32> for Avx2 {
    #[inline(always)]
    fn multiply_add_adjacent(self, a: __m256, b: __m256) -> __m256 {
        unsafe {
            let p = _mm256_mul_ps(a, b);
            // swap neighbours, add, then clear the odd slots
            let s = _mm256_add_ps(p, _mm256_permute_ps(p, 0b10_11_00_01));
            _mm256_blend_ps(s, _mm256_setzero_ps(), 0b1010_1010)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avx2_madd_pairs_products() {
        let Some(b) = Avx2::detect() else { return };
        let x: [i16; 16] = std::array::from_fn(|i| i as i16 + 1);
        let w = [2i16; 16];
        let mut out = [0i32; 8];
        unsafe {
            let xa = Lanes::<i16>::load(b, &x, 0);
            let wa = Lanes::<i16>::load(b, &w, 0);
            let m = MultiplyAddAdjacent::<i16>::multiply_add_adjacent(b, xa, wa);
            Lanes::<i32>::store(b, m, &mut out, 0);
        }
        for (k, v) in out.iter().enumerate() {
            let i = 2 * k as i32;
            assert_eq!(*v, 2 * (i + 1) + 2 * (i + 2));
        }
    }

    #[test]
    fn avx2_float_madd_zeroes_odd_slots() {
        let Some(b) = Avx2::detect() else { return };
        let x: [f32; 8] = std::array::from_fn(|i| i as f32);
        let w = [1.0f32; 8];
        let mut out = [f32::NAN; 8];
        unsafe {
            let xa = Lanes::<f32>::load(b, &x, 0);
            let wa = Lanes::<f32>::load(b, &w, 0);
            let m = MultiplyAddAdjacent::<f32>::multiply_add_adjacent(b, xa, wa);
            Lanes::<f32>::store(b, m, &mut out, 0);
        }
        assert_eq!(out, [1.0, 0.0, 5.0, 0.0, 9.0, 0.0, 13.0, 0.0]);
    }

    #[test]
    fn avx2_sums_wrap() {
        let Some(b) = Avx2::detect() else { return };
        let v = [i32::MAX, 1, 0, 0, 0, 0, 0, 0];
        let lane = unsafe { Lanes::<i32>::load(b, &v, 0) };
        assert_eq!(Lanes::<i32>::sum(b, lane), i32::MIN);
    }
}
