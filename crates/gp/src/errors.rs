use thiserror::Error;

/// A result type for GP surrogate operations
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when fitting or querying a [`GaussianProcess`](crate::GaussianProcess)
/// or a [`MultiGp`](crate::MultiGp)
#[derive(Error, Debug)]
pub enum GpError {
    /// When sample or observation dimensions disagree with the declared or
    /// first-seen dimensions
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Declared or first-seen dimension
        expected: usize,
        /// Offending dimension
        actual: usize,
    },
    /// When the Gram matrix cannot be factorized even after the jitter ladder
    #[error("Gram matrix not positive definite (jitter up to {max_jitter:e} exhausted)")]
    NonPositiveDefinite {
        /// Largest jitter tried before giving up
        max_jitter: f64,
    },
    /// When a rank-one Cholesky extension yields a non-positive diagonal;
    /// the caller must recompute from scratch
    #[error("Incremental Cholesky update failed, recompute needed")]
    IncrementalUpdateFailed,
    /// When hyperparameter optimization runs into NaN or infinite
    /// likelihood values; the previous hyperparameters are retained
    #[error("Hyperparameter optimization diverged: {0}")]
    HyperparamOptimizationDiverged(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When an invalid value is given
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
