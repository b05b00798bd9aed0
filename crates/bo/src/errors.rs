use thiserror::Error;

/// A result type for Bayesian optimization errors
pub type Result<T> = std::result::Result<T, BoError>;

/// An error for the Bayesian optimization loop
#[derive(Error, Debug)]
pub enum BoError {
    /// When configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// When the surrogate fails
    #[error("GP error")]
    GpError(#[from] opale_gp::GpError),
    /// When every evaluation was blacklisted and no observation exists
    #[error("no observation accumulated")]
    NoObservation,
}
