use thiserror::Error;

/// A result type for surrogate building and querying
pub type Result<T> = std::result::Result<T, SurrogateError>;

/// An error when building, persisting or querying a spectrum surrogate
#[derive(Error, Debug)]
pub enum SurrogateError {
    /// When configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
    /// When the center statistic selector is not recognized
    #[error("Unexpected center measure '{name}', acceptable values are: {valid}")]
    UnknownCenterMeasure {
        /// Requested center measure
        name: String,
        /// Comma separated list of supported center measures
        valid: String,
    },
    /// When the kernel family name is not recognized
    #[error("Unexpected kernel '{name}', acceptable values are: {valid}")]
    UnknownKernel {
        /// Requested kernel name
        name: String,
        /// Comma separated list of supported kernel names
        valid: String,
    },
    /// When an invalid value is encountered
    #[error("Value error: {0}")]
    InvalidValue(String),
    /// When a parameter is missing from the library metadata
    #[error("Parameter '{0}' not found in library metadata")]
    MissingParameter(String),
    /// When a persisted model holds no posterior chain
    #[error("Model for frequency #{0} holds no posterior chain")]
    MissingChain(usize),
    /// When a persisted model holds no MAP hyperparameters
    #[error("Model for frequency #{0} holds no MAP hyperparameters")]
    MissingKernelMap(usize),
    /// When a persisted model holds no center value
    #[error("Model for frequency #{0} holds no center value")]
    MissingCenter(usize),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When min/max statistics cannot be computed
    #[error(transparent)]
    MinMaxError(#[from] ndarray_stats::errors::MinMaxError),
    /// When a GP error occurs
    #[error("GP error")]
    GpError(#[from] gwbox_gp::GpError),
    /// When ensemble sampling fails
    #[error("MCMC error")]
    McmcError(#[from] gwbox_mcmc::McmcError),
    /// When IO fails
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When numpy array read fails
    #[error("IO error")]
    ReadNpyError(#[from] ndarray_npy::ReadNpyError),
    /// When numpy array write fails
    #[error("IO error")]
    WriteNpyError(#[from] ndarray_npy::WriteNpyError),
    /// When (de)serialization fails
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// When a worker pool cannot be built
    #[error(transparent)]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}
