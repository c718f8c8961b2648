//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! with known observation noise, the building block of spectrum surrogates.
//!
//! A zero-mean GP is parameterized by a stationary [Kernel] made of a family
//! (see [KernelFamily]), an amplitude and one metric value per input dimension.
//! Hyperparameters are usually handled in log space as
//! `[ln(amplitude), ln(metric_1), ..., ln(metric_nx)]` which is the layout expected
//! by MCMC samplers exploring the likelihood surface.
//!
//! GP methods are implemented by [GaussianProcess] parameterized by [GpParams].
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
pub mod kernels;
mod parameters;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use kernels::{Kernel, KernelFamily};
pub use parameters::*;
pub use utils::DiffMatrix;
