//! Incremental NNUE state built on the kernels: feature table, perspective
//! accumulators with apply/revert, and the dense layer they feed.

pub mod accumulator;
pub mod features;
pub mod network;

pub use accumulator::{Accumulator, FeaturePair, FeatureUpdate};
pub use features::FeatureTable;
pub use network::{Dense, Network};
