//! This library implements the affine-invariant ensemble sampler of
//! Goodman & Weare (2010), "Ensemble samplers with affine invariance",
//! Comm. App. Math. Comp. Sci. 5(1), 65-80, using the stretch move.
//!
//! An ensemble of walkers is split in two halves updated in turn: each walker of one half
//! is stretched toward or away from a randomly chosen walker of the complementary half.
//! Log-probability evaluations of a half are distributed on a bounded rayon worker pool
//! while random numbers are drawn sequentially, so a seeded run gives the same chain
//! whatever the number of threads.
//!
//! ```no_run
//! use gwbox_mcmc::EnsembleSampler;
//! use ndarray::{Array2, ArrayView1};
//! use ndarray_rand::rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256Plus;
//!
//! let ln_prob = |x: &ArrayView1<f64>| -0.5 * x.dot(x);
//! let mut sampler = EnsembleSampler::new(8, 2, ln_prob)
//!     .expect("valid sampler")
//!     .with_rng(Xoshiro256Plus::seed_from_u64(42));
//! let state = sampler
//!     .run_mcmc(&Array2::zeros((8, 2)), 100)
//!     .expect("sampling");
//! let chain = sampler.flatchain();
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod errors;
mod sampler;

pub use errors::*;
pub use sampler::*;
