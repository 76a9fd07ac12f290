use log::trace;

use crate::error::Result;
use crate::kernels;
use crate::nnue::features::FeatureTable;
use crate::simd::{Element, Lanes};

/// A feature index per perspective. The two perspectives may map the same
/// input to different rows (e.g. a mirrored board).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeaturePair {
    pub a: usize,
    pub b: usize,
}

impl FeaturePair {
    pub const fn new(a: usize, b: usize) -> Self { Self { a, b } }
}

/// Features toggled by one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureUpdate {
    pub added: Vec<FeaturePair>,
    pub removed: Vec<FeaturePair>,
}

impl FeatureUpdate {
    pub fn new() -> Self { Self::default() }

    pub fn add(mut self, a: usize, b: usize) -> Self {
        self.added.push(FeaturePair::new(a, b));
        self
    }

    pub fn remove(mut self, a: usize, b: usize) -> Self {
        self.removed.push(FeaturePair::new(a, b));
        self
    }

    pub fn is_empty(&self) -> bool { self.added.is_empty() && self.removed.is_empty() }

    /// The update that undoes this one.
    pub fn inverse(&self) -> Self {
        Self { added: self.removed.clone(), removed: self.added.clone() }
    }
}

/// Both perspectives of the first-layer state.
#[derive(Clone, Debug, PartialEq)]
pub struct Accumulator<T: Element, const INPUT: usize> {
    pub a: [T; INPUT],
    pub b: [T; INPUT],
}

impl<T: Element, const INPUT: usize> Default for Accumulator<T, INPUT> {
    fn default() -> Self { Self { a: [T::ZERO; INPUT], b: [T::ZERO; INPUT] } }
}

impl<T: Element, const INPUT: usize> Accumulator<T, INPUT> {
    pub fn new() -> Self { Self::default() }

    /// Both perspectives start from the feature-transformer bias.
    pub fn from_bias(bias: &[T; INPUT]) -> Self { Self { a: *bias, b: *bias } }

    /// Recomputes from scratch: bias plus the rows of every active feature.
    pub fn refresh<B, const DELTA: usize>(
        &mut self,
        backend: B,
        bias: &[T; INPUT],
        table: &FeatureTable<T, INPUT, DELTA>,
        active_a: &[usize],
        active_b: &[usize],
    ) -> Result<()>
    where
        B: Lanes<T>,
    {
        let oa = offsets(table, active_a)?;
        let ob = offsets(table, active_b)?;
        trace!("refresh accumulator: {} / {} active features", oa.len(), ob.len());

        self.a = *bias;
        self.b = *bias;
        let delta = table.as_array();
        // Rows are added pairwise; the longer list finishes against a scratch copy.
        let common = oa.len().min(ob.len());
        for i in 0..common {
            kernels::add_to_all(backend, &mut self.a, &mut self.b, delta, oa[i], ob[i]);
        }
        let mut scratch = [T::ZERO; INPUT];
        for &o in &oa[common..] {
            kernels::add_to_all(backend, &mut self.a, &mut scratch, delta, o, o);
        }
        for &o in &ob[common..] {
            kernels::add_to_all(backend, &mut scratch, &mut self.b, delta, o, o);
        }
        Ok(())
    }

    /// Applies an update in place.
    ///
    /// Removals are paired with additions and go through the fused
    /// subtract-and-add kernel; leftovers use the plain kernels. Every
    /// feature is validated before anything is touched.
    pub fn apply<B, const DELTA: usize>(
        &mut self,
        backend: B,
        table: &FeatureTable<T, INPUT, DELTA>,
        update: &FeatureUpdate,
    ) -> Result<()>
    where
        B: Lanes<T>,
    {
        if update.is_empty() {
            return Ok(());
        }
        let removed = pair_offsets(table, &update.removed)?;
        let added = pair_offsets(table, &update.added)?;
        let delta = table.as_array();

        let fused = removed.len().min(added.len());
        for (r, a) in removed.iter().zip(&added) {
            kernels::subtract_and_add_to_all(backend, &mut self.a, &mut self.b, delta, r.0, a.0, r.1, a.1);
        }
        for r in &removed[fused..] {
            kernels::subtract_from_all(backend, &mut self.a, &mut self.b, delta, r.0, r.1);
        }
        for a in &added[fused..] {
            kernels::add_to_all(backend, &mut self.a, &mut self.b, delta, a.0, a.1);
        }
        Ok(())
    }

    /// Undoes [`apply`](Self::apply). Exact for integer elements.
    pub fn revert<B, const DELTA: usize>(
        &mut self,
        backend: B,
        table: &FeatureTable<T, INPUT, DELTA>,
        update: &FeatureUpdate,
    ) -> Result<()>
    where
        B: Lanes<T>,
    {
        self.apply(backend, table, &update.inverse())
    }
}

fn offsets<T: Element, const INPUT: usize, const DELTA: usize>(
    table: &FeatureTable<T, INPUT, DELTA>,
    features: &[usize],
) -> Result<Vec<usize>> {
    features.iter().map(|&f| table.offset(f)).collect()
}

fn pair_offsets<T: Element, const INPUT: usize, const DELTA: usize>(
    table: &FeatureTable<T, INPUT, DELTA>,
    pairs: &[FeaturePair],
) -> Result<Vec<(usize, usize)>> {
    pairs.iter().map(|p| Ok((table.offset(p.a)?, table.offset(p.b)?))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::simd::Scalar;
    use pretty_assertions::assert_eq;

    fn table() -> FeatureTable<i32, 4, 16> {
        FeatureTable::from_fn(|f, c| ((f + 1) * 10 + c) as i32)
    }

    #[test]
    fn refresh_sums_rows_per_perspective() {
        let t = table();
        let mut acc = Accumulator::new();
        acc.refresh(Scalar, &[1, 1, 1, 1], &t, &[0, 1], &[3]).unwrap();
        assert_eq!(acc.a, [1 + 10 + 20, 1 + 11 + 21, 1 + 12 + 22, 1 + 13 + 23]);
        assert_eq!(acc.b, [41, 42, 43, 44]);
    }

    #[test]
    fn apply_matches_refresh_and_revert_restores() {
        let t = table();
        let bias = [0; 4];
        let mut acc = Accumulator::new();
        acc.refresh(Scalar, &bias, &t, &[0, 1], &[2, 3]).unwrap();
        let before = acc.clone();

        // one move (0 -> 2 / 3 -> 1) plus one capture (1 / 2 leave)
        let up = FeatureUpdate::new().remove(0, 3).add(2, 1).remove(1, 2);
        acc.apply(Scalar, &t, &up).unwrap();
        let mut full = Accumulator::new();
        full.refresh(Scalar, &bias, &t, &[2], &[1]).unwrap();
        assert_eq!(acc, full);

        acc.revert(Scalar, &t, &up).unwrap();
        assert_eq!(acc, before);
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let t = table();
        let mut acc = Accumulator::from_bias(&[7; 4]);
        let up = FeatureUpdate::new();
        assert!(up.is_empty());
        assert!(!up.clone().add(0, 1).is_empty());
        acc.apply(Scalar, &t, &up).unwrap();
        acc.revert(Scalar, &t, &up).unwrap();
        assert_eq!(acc, Accumulator::from_bias(&[7; 4]));
    }

    #[test]
    fn bad_feature_leaves_state_untouched() {
        let t = table();
        let mut acc = Accumulator::from_bias(&[5; 4]);
        let up = FeatureUpdate::new().add(0, 0).add(1, 9);
        assert_eq!(acc.apply(Scalar, &t, &up), Err(Error::FeatureOutOfRange { feature: 9, features: 4 }));
        assert_eq!(acc, Accumulator::from_bias(&[5; 4]));
    }
}
