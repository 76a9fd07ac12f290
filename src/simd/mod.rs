//! Vector backends for the NNUE kernels.
//!
//! A backend is a zero-sized token type. Owning a token proves the running CPU
//! supports its instruction set, so the lane primitives are safe to call; only
//! `load`/`store` stay `unsafe` because they take raw offsets.
//!
//! - `Avx512`: 512-bit lanes (`avx512f` + `avx512bw`)
//! - `Avx2`: 256-bit lanes
//! - `Scalar`: one element per lane, portable fallback
//!
//! [`Native`] names the backend chosen for this build. It is a type alias
//! resolved by `cfg`, never a runtime branch.

pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod avx2;

#[cfg(target_arch = "x86_64")]
pub mod avx512;

pub use scalar::Scalar;

#[cfg(target_arch = "x86_64")]
pub use avx2::Avx2;

#[cfg(target_arch = "x86_64")]
pub use avx512::Avx512;

/// Largest lane element count of any backend (512 bits of `i16`).
pub const MAX_LANES: usize = 32;

mod sealed {
    pub trait Sealed {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
}

/// Numeric element stored in accumulators, tables and lanes.
///
/// Integer arithmetic wraps, matching what the vector units do.
pub trait Element: sealed::Sealed + Copy + PartialEq + PartialOrd + Default + Send + Sync + std::fmt::Debug + 'static {
    const ZERO: Self;
    const INTEGER: bool;

    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn from_i32(v: i32) -> Self;
    fn to_f64(self) -> f64;
}

impl Element for i16 {
    const ZERO: Self = 0;
    const INTEGER: bool = true;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
    #[inline(always)]
    fn from_i32(v: i32) -> Self { v as i16 }
    #[inline(always)]
    fn to_f64(self) -> f64 { self as f64 }
}

impl Element for i32 {
    const ZERO: Self = 0;
    const INTEGER: bool = true;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
    #[inline(always)]
    fn from_i32(v: i32) -> Self { v }
    #[inline(always)]
    fn to_f64(self) -> f64 { self as f64 }
}

impl Element for f32 {
    const ZERO: Self = 0.0;
    const INTEGER: bool = false;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self { self + rhs }
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self { self - rhs }
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self { self * rhs }
    #[inline(always)]
    fn from_i32(v: i32) -> Self { v as f32 }
    #[inline(always)]
    fn to_f64(self) -> f64 { self as f64 }
}

/// Element types with a dot-product accumulation type.
pub trait Widen: Element {
    type Acc: Element;
    fn widen(self) -> Self::Acc;
}

impl Widen for i16 {
    type Acc = i32;
    #[inline(always)]
    fn widen(self) -> i32 { self as i32 }
}

impl Widen for f32 {
    type Acc = f32;
    #[inline(always)]
    fn widen(self) -> f32 { self }
}

/// Conversion of a reduced dot product into the output element type.
pub trait FromAcc<A: Element>: Element {
    fn from_acc(a: A) -> Self;
}

impl FromAcc<i32> for i32 {
    #[inline(always)]
    fn from_acc(a: i32) -> Self { a }
}

impl FromAcc<i32> for i16 {
    #[inline(always)]
    fn from_acc(a: i32) -> Self { a as i16 }
}

impl FromAcc<i32> for f32 {
    #[inline(always)]
    fn from_acc(a: i32) -> Self { a as f32 }
}

impl FromAcc<f32> for f32 {
    #[inline(always)]
    fn from_acc(a: f32) -> Self { a }
}

/// Backend identity shared by every element type.
pub trait Backend: Copy + Send + Sync + std::fmt::Debug + 'static {
    const NAME: &'static str;
    /// Register width in bits.
    const BITS: usize;

    /// Returns a token if the running CPU supports this backend.
    fn detect() -> Option<Self>;
}

/// Lane primitives for element type `T`.
pub trait Lanes<T: Element>: Backend {
    type Lane: Copy;
    /// Elements per lane; the kernels' processing stride.
    const LANES: usize;

    fn zero(self) -> Self::Lane;
    fn splat(self, v: T) -> Self::Lane;

    /// Reads `LANES` elements starting at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + LANES <= src.len()`.
    unsafe fn load(self, src: &[T], offset: usize) -> Self::Lane;

    /// Writes `LANES` elements starting at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + LANES <= dst.len()`.
    unsafe fn store(self, lane: Self::Lane, dst: &mut [T], offset: usize);

    fn add(self, a: Self::Lane, b: Self::Lane) -> Self::Lane;
    fn sub(self, a: Self::Lane, b: Self::Lane) -> Self::Lane;
    /// `a > b ? a : b` per element (returns `b` for unordered floats).
    fn max(self, a: Self::Lane, b: Self::Lane) -> Self::Lane;
    /// `a < b ? a : b` per element (returns `b` for unordered floats).
    fn min(self, a: Self::Lane, b: Self::Lane) -> Self::Lane;
    /// Horizontal reduction to one scalar.
    fn sum(self, lane: Self::Lane) -> T;

    /// Applies a scalar function to every element of a lane.
    ///
    /// The default spills the lane to the stack; backends with cheaper
    /// access override it.
    #[inline]
    fn map<F: Fn(T) -> T>(self, lane: Self::Lane, f: F) -> Self::Lane {
        let mut buf = [T::ZERO; MAX_LANES];
        debug_assert!(Self::LANES <= MAX_LANES);
        // SAFETY: LANES <= MAX_LANES for every backend.
        unsafe { self.store(lane, &mut buf, 0) };
        for v in &mut buf[..Self::LANES] {
            *v = f(*v);
        }
        // SAFETY: as above.
        unsafe { self.load(&buf, 0) }
    }
}

/// The fused dot-product step: multiply elementwise, then add each adjacent
/// pair of products into the accumulation type.
///
/// Kept as its own primitive so a kernel issues one operation per chunk
/// instead of a multiply followed by a separate horizontal add. The result
/// is always one full `Lanes<T::Acc>` lane; for floats the pair sums sit in
/// the even slots and the odd slots are zero.
pub trait MultiplyAddAdjacent<T: Widen>: Lanes<T> + Lanes<T::Acc> {
    fn multiply_add_adjacent(
        self,
        a: <Self as Lanes<T>>::Lane,
        b: <Self as Lanes<T>>::Lane,
    ) -> <Self as Lanes<T::Acc>>::Lane;
}

#[cfg(all(target_arch = "x86_64", feature = "simd-avx512", target_feature = "avx512f", target_feature = "avx512bw"))]
pub type Native = Avx512;

#[cfg(all(
    target_arch = "x86_64",
    feature = "simd-avx2",
    target_feature = "avx2",
    not(all(feature = "simd-avx512", target_feature = "avx512f", target_feature = "avx512bw"))
))]
pub type Native = Avx2;

#[cfg(not(all(
    target_arch = "x86_64",
    any(
        all(feature = "simd-avx512", target_feature = "avx512f", target_feature = "avx512bw"),
        all(feature = "simd-avx2", target_feature = "avx2")
    )
)))]
pub type Native = Scalar;

/// Token for the build's native backend.
#[inline(always)]
pub const fn native() -> Native {
    // SAFETY: `Native` only names a SIMD backend when the build targets its instruction set.
    unsafe { Native::new_unchecked() }
}

/// Names of the backends the running CPU supports, widest first.
pub fn available() -> Vec<&'static str> {
    let mut out = Vec::with_capacity(3);
    #[cfg(target_arch = "x86_64")]
    {
        if Avx512::detect().is_some() { out.push(Avx512::NAME); }
        if Avx2::detect().is_some() { out.push(Avx2::NAME); }
    }
    out.push(Scalar::NAME);
    out
}
