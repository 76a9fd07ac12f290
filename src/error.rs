use thiserror::Error;

/// Construction-time and self-check failures. The kernels themselves never
/// return errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("{what}: expected {expected} elements, got {actual}")]
    Length { what: &'static str, expected: usize, actual: usize },

    #[error("feature {feature} out of range (table has {features} rows)")]
    FeatureOutOfRange { feature: usize, features: usize },

    #[error("backend {0} is not supported by this CPU")]
    BackendUnavailable(&'static str),

    #[error("{kernel} on {backend}: element {index} is {actual}, scalar reference gives {expected}")]
    Mismatch {
        kernel: &'static str,
        backend: &'static str,
        index: usize,
        expected: f64,
        actual: f64,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
