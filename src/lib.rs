//! Gaussian process surrogates of gravitational-wave background (GWB) spectra.
//!
//! A surrogate is trained on a library of simulated characteristic strain spectra
//! (several realizations per sample of physical parameters). Each of the lowest
//! frequency bins gets its own GP model mapping physical parameters to the smoothed
//! and centered log10 squared strain of that bin.
//!
//! Training goes through the following steps:
//! * spectra preprocessing: realizations are reduced to a center curve smoothed
//!   along frequency, its spread across realizations gives the target uncertainties
//!   (see [smoothed_gwb]),
//! * parameter extraction (see [parameter_values]),
//! * kernel hyperparameters posterior sampling with an affine-invariant ensemble
//!   sampler (see [fit_kernel_params]).
//!
//! Trained surrogates are saved as JSON files and give either point predictions
//! with MAP hyperparameters ([hc_from_gp]) or posterior draws of the strain
//! accounting for hyperparameters uncertainty ([sample_hc_from_gp]).
//!
//! # Example
//!
//! ```no_run
//! use gwbox::{train_gp_from_dir, TrainConfig, TrainedSurrogate};
//! use ndarray::array;
//!
//! let config = TrainConfig::default().nfreqs(10).nsamples(500).seed(42);
//! let (_, path) = train_gp_from_dir("path/to/library", &config).expect("training");
//!
//! let surrogate = TrainedSurrogate::load(path).expect("trained surrogate");
//! let env_pars = array![5., 8.5];
//! let pred = surrogate.predict_hc(&env_pars).expect("prediction");
//! println!("hc = {}", pred.hc);
//! let draws = surrogate.sample_hc(&env_pars, 200, Some(42)).expect("draws");
//! println!("hc draws {:?}", draws.dim());
//! ```
//!
//! Logs are emitted with the [log] crate, [init_logger] sets up a logger
//! configured with the `GWBOX_LOG` environment variable (default: `info`).
#![warn(missing_docs)]

mod config;
mod errors;
mod fitter;
mod library;
mod model;
mod params;
mod persistence;
mod predictor;
mod preprocess;
mod sampler;
mod train;

pub use config::*;
pub use errors::*;
pub use fitter::*;
pub use library::*;
pub use model::*;
pub use params::*;
pub use persistence::*;
pub use predictor::*;
pub use preprocess::*;
pub use sampler::*;
pub use train::*;

pub use gwbox_gp::{GaussianProcess, KernelFamily};

/// Environment variable controlling the logger level
pub const GWBOX_LOG: &str = "GWBOX_LOG";

/// Set up logging to stdout, level taken from `GWBOX_LOG` (default: `info`).
/// Does nothing when a logger is already set.
pub fn init_logger() {
    let env = env_logger::Env::new().filter_or(GWBOX_LOG, "info");
    let mut builder = env_logger::Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();
}
