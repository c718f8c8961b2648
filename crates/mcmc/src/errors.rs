use thiserror::Error;

/// A result type for ensemble sampling
pub type Result<T> = std::result::Result<T, McmcError>;

/// An error when running the [`EnsembleSampler`](crate::EnsembleSampler)
#[derive(Error, Debug)]
pub enum McmcError {
    /// When sampler configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
    /// When walker positions do not match the sampler dimensions
    #[error("Value error: {0}")]
    InvalidValueError(String),
    /// When the worker pool cannot be built
    #[error(transparent)]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}
