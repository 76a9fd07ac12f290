use crate::error::{Error, Result};
use crate::simd::Element;

/// Per-feature weight rows, the delta table the accumulator kernels read.
///
/// Feature `f` owns the `INPUT` elements starting at `f * INPUT`.
#[derive(Clone)]
pub struct FeatureTable<T: Element, const INPUT: usize, const DELTA: usize> {
    rows: Box<[T; DELTA]>,
}

impl<T: Element, const INPUT: usize, const DELTA: usize> FeatureTable<T, INPUT, DELTA> {
    const ROWS: () = assert!(INPUT > 0 && DELTA % INPUT == 0, "delta table must hold whole rows");

    /// Number of feature rows.
    pub const FEATURES: usize = DELTA / INPUT;

    pub fn zeroed() -> Self {
        let () = Self::ROWS;
        Self { rows: zeroed_boxed() }
    }

    /// Takes a flat, row-major table of `FEATURES * INPUT` values.
    pub fn from_vec(values: Vec<T>) -> Result<Self> {
        let () = Self::ROWS;
        Ok(Self { rows: boxed(values, "feature table")? })
    }

    /// Builds the table from `f(feature, column)`.
    pub fn from_fn<F: FnMut(usize, usize) -> T>(mut f: F) -> Self {
        let mut table = Self::zeroed();
        for (i, v) in table.rows.iter_mut().enumerate() {
            *v = f(i / INPUT, i % INPUT);
        }
        table
    }

    pub fn features(&self) -> usize { Self::FEATURES }

    /// Offset of `feature`'s row in the delta table.
    #[inline]
    pub fn offset(&self, feature: usize) -> Result<usize> {
        if feature < Self::FEATURES {
            Ok(feature * INPUT)
        } else {
            Err(Error::FeatureOutOfRange { feature, features: Self::FEATURES })
        }
    }

    pub fn row(&self, feature: usize) -> Result<&[T]> {
        let o = self.offset(feature)?;
        Ok(&self.rows[o..o + INPUT])
    }

    pub fn as_array(&self) -> &[T; DELTA] { &self.rows }
}

/// Moves a runtime vector into a fixed-size boxed array.
pub(crate) fn boxed<T, const N: usize>(values: Vec<T>, what: &'static str) -> Result<Box<[T; N]>> {
    let actual = values.len();
    values
        .into_boxed_slice()
        .try_into()
        .map_err(|_| Error::Length { what, expected: N, actual })
}

/// Heap-allocated zero array; large tables never touch the stack.
pub(crate) fn zeroed_boxed<T: Element, const N: usize>() -> Box<[T; N]> {
    match boxed(vec![T::ZERO; N], "zeroed") {
        Ok(b) => b,
        Err(_) => unreachable!("vec has exactly N elements"),
    }
}
