use log::debug;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::kernels;
use crate::nnue::accumulator::{Accumulator, FeatureUpdate};
use crate::nnue::features::{boxed, FeatureTable};
use crate::simd::{Backend, Element, FromAcc, MultiplyAddAdjacent, Widen};

/// Output layer over the concatenated perspectives: `OUTPUT` rows of
/// `ROW = 2 * INPUT` weights plus one bias per row.
#[derive(Clone)]
pub struct Dense<T: Element, const ROW: usize, const OUTPUT: usize> {
    pub weight: Box<[[T; ROW]; OUTPUT]>,
    pub bias: Box<[T; OUTPUT]>,
}

impl<T: Element, const ROW: usize, const OUTPUT: usize> Dense<T, ROW, OUTPUT> {
    /// `weight` is row-major, `OUTPUT * ROW` values.
    pub fn from_vec(weight: Vec<T>, bias: Vec<T>) -> Result<Self> {
        if weight.len() != OUTPUT * ROW {
            return Err(Error::Length { what: "dense weight", expected: OUTPUT * ROW, actual: weight.len() });
        }
        let rows: Vec<[T; ROW]> = weight.chunks_exact(ROW).map(|c| std::array::from_fn(|i| c[i])).collect();
        Ok(Self { weight: boxed(rows, "dense weight")?, bias: boxed(bias, "dense bias")? })
    }
}

/// A feature transformer feeding one dense layer, with incremental state.
///
/// `B` is the backend token all kernels run on and `A` the activation applied
/// to the accumulators before the dense layer.
pub struct Network<B, A, T, O, const INPUT: usize, const DELTA: usize, const ROW: usize, const OUTPUT: usize>
where
    T: Element,
{
    backend: B,
    activation: A,
    pub table: FeatureTable<T, INPUT, DELTA>,
    pub bias: Box<[T; INPUT]>,
    pub dense: Dense<T, ROW, OUTPUT>,
    acc: Accumulator<T, INPUT>,
    _out: std::marker::PhantomData<O>,
}

impl<B, A, T, O, const INPUT: usize, const DELTA: usize, const ROW: usize, const OUTPUT: usize>
    Network<B, A, T, O, INPUT, DELTA, ROW, OUTPUT>
where
    B: MultiplyAddAdjacent<T>,
    A: Activation<T> + Copy,
    T: Widen,
    O: FromAcc<T::Acc>,
{
    pub fn new(
        backend: B,
        activation: A,
        table: FeatureTable<T, INPUT, DELTA>,
        bias: Box<[T; INPUT]>,
        dense: Dense<T, ROW, OUTPUT>,
    ) -> Self {
        debug!(
            "network {} features x {} -> {} on {} backend",
            table.features(),
            INPUT,
            OUTPUT,
            B::NAME
        );
        let acc = Accumulator::from_bias(&*bias);
        Self { backend, activation, table, bias, dense, acc, _out: std::marker::PhantomData }
    }

    pub fn accumulator(&self) -> &Accumulator<T, INPUT> { &self.acc }

    /// Recomputes the accumulators from the active feature lists.
    pub fn refresh(&mut self, active_a: &[usize], active_b: &[usize]) -> Result<()> {
        self.acc.refresh(self.backend, &self.bias, &self.table, active_a, active_b)
    }

    pub fn apply(&mut self, update: &FeatureUpdate) -> Result<()> {
        self.acc.apply(self.backend, &self.table, update)
    }

    pub fn revert(&mut self, update: &FeatureUpdate) -> Result<()> {
        self.acc.revert(self.backend, &self.table, update)
    }

    /// Forward pass over the current accumulators.
    pub fn evaluate(&self) -> [O; OUTPUT] {
        forward(self.backend, self.activation, &self.acc, &self.dense)
    }

    /// Full recompute without touching the incremental state; used for parity checks.
    pub fn evaluate_full(&self, active_a: &[usize], active_b: &[usize]) -> Result<[O; OUTPUT]> {
        let mut acc = Accumulator::new();
        acc.refresh(self.backend, &self.bias, &self.table, active_a, active_b)?;
        Ok(forward(self.backend, self.activation, &acc, &self.dense))
    }
}

fn forward<B, A, T, O, const INPUT: usize, const ROW: usize, const OUTPUT: usize>(
    backend: B,
    activation: A,
    acc: &Accumulator<T, INPUT>,
    dense: &Dense<T, ROW, OUTPUT>,
) -> [O; OUTPUT]
where
    B: MultiplyAddAdjacent<T> + Backend,
    A: Activation<T>,
    T: Widen,
    O: FromAcc<T::Acc>,
{
    let mut out = [O::ZERO; OUTPUT];
    kernels::activate_flatten_and_forward(backend, activation, &acc.a, &acc.b, &*dense.weight, &*dense.bias, &mut out, 0);
    out
}
