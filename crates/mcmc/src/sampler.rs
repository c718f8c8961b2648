use crate::errors::{McmcError, Result};

use log::debug;
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::ops::Range;

/// Default scale parameter of the stretch move distribution `g(z) ~ 1/sqrt(z)` on `[1/a, a]`
pub const DEFAULT_STRETCH_SCALE: f64 = 2.0;

/// A log-probability density (up to a constant) to be sampled.
///
/// Evaluations happen concurrently on the sampler worker pool hence the `Sync` bound.
/// Returning `f64::NEG_INFINITY` rejects the point, a NaN value is handled the same way.
pub trait LogProbability: Sync {
    /// Log-probability value at `x`
    fn ln_prob(&self, x: &ArrayView1<f64>) -> f64;
}

impl<T> LogProbability for T
where
    T: Fn(&ArrayView1<f64>) -> f64 + Sync,
{
    fn ln_prob(&self, x: &ArrayView1<f64>) -> f64 {
        self(x)
    }
}

/// Positions of the walkers of the ensemble with their log-probability values
#[derive(Clone, Debug, PartialEq)]
pub struct WalkerState {
    /// Walker positions (nwalkers, ndim)
    pub positions: Array2<f64>,
    /// Log-probability at each walker position (nwalkers,)
    pub ln_probs: Array1<f64>,
}

impl WalkerState {
    /// Index of the walker with the highest log-probability.
    /// The first walker is returned when every value is `-inf` or when values
    /// cannot be ordered (nan).
    pub fn best_walker(&self) -> usize {
        self.ln_probs.argmax().unwrap_or(0)
    }

    /// Position of the walker with the highest log-probability
    pub fn best_position(&self) -> ArrayView1<f64> {
        self.positions.row(self.best_walker())
    }
}

/// Affine-invariant ensemble sampler using the stretch move.
///
/// The chain of every step run since creation or last [`reset`](EnsembleSampler::reset)
/// is retained and exposed flattened walker by walker (walker-major order).
pub struct EnsembleSampler<P: LogProbability, R: Rng = Xoshiro256Plus> {
    nwalkers: usize,
    ndim: usize,
    ln_prob: P,
    /// Stretch move scale parameter
    a: f64,
    /// Worker pool size, defaults to min(nwalkers/2, available cores)
    n_threads: Option<usize>,
    rng: R,
    /// Walker positions at each step
    chain: Vec<Array2<f64>>,
    /// Walker log-probabilities at each step
    ln_probs: Vec<Array1<f64>>,
    naccepted: Array1<usize>,
    iterations: usize,
}

impl<P: LogProbability> EnsembleSampler<P, Xoshiro256Plus> {
    /// Constructor of an ensemble of `nwalkers` walkers in a `ndim`-dimensional space.
    ///
    /// `nwalkers` has to be even and at least twice `ndim`.
    pub fn new(nwalkers: usize, ndim: usize, ln_prob: P) -> Result<Self> {
        Self::new_with_rng(nwalkers, ndim, ln_prob, Xoshiro256Plus::from_entropy())
    }
}

impl<P: LogProbability, R: Rng> EnsembleSampler<P, R> {
    /// Constructor with a given random generator
    pub fn new_with_rng(nwalkers: usize, ndim: usize, ln_prob: P, rng: R) -> Result<Self> {
        if ndim == 0 {
            return Err(McmcError::InvalidConfigError(
                "Dimension of the sampled space should be positive".to_string(),
            ));
        }
        if nwalkers % 2 != 0 || nwalkers < 2 * ndim {
            return Err(McmcError::InvalidConfigError(format!(
                "Number of walkers should be even and at least {} (twice the dimension), got {}",
                2 * ndim,
                nwalkers
            )));
        }
        Ok(EnsembleSampler {
            nwalkers,
            ndim,
            ln_prob,
            a: DEFAULT_STRETCH_SCALE,
            n_threads: None,
            rng,
            chain: vec![],
            ln_probs: vec![],
            naccepted: Array1::zeros(nwalkers),
            iterations: 0,
        })
    }

    /// Sets the random generator, any chain already sampled is kept
    pub fn with_rng<R2: Rng>(self, rng: R2) -> EnsembleSampler<P, R2> {
        EnsembleSampler {
            nwalkers: self.nwalkers,
            ndim: self.ndim,
            ln_prob: self.ln_prob,
            a: self.a,
            n_threads: self.n_threads,
            rng,
            chain: self.chain,
            ln_probs: self.ln_probs,
            naccepted: self.naccepted,
            iterations: self.iterations,
        }
    }

    /// Sets the stretch move scale parameter (should be greater than 1.)
    pub fn stretch_scale(mut self, a: f64) -> Self {
        self.a = a;
        self
    }

    /// Sets the number of threads used to evaluate the log-probability
    pub fn n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    /// Number of walkers
    pub fn nwalkers(&self) -> usize {
        self.nwalkers
    }

    /// Dimension of the sampled space
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Number of steps retained since last reset
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Log-probability density being sampled
    pub fn ln_prob(&self) -> &P {
        &self.ln_prob
    }

    /// Run `nsteps` steps of the sampler starting from walker positions `p0` (nwalkers, ndim).
    /// Returns the walker state after the last step.
    pub fn run_mcmc(&mut self, p0: &Array2<f64>, nsteps: usize) -> Result<WalkerState> {
        self.check(p0)?;
        let pool = self.thread_pool()?;
        let ln_probs = self.compute_ln_probs(&pool, p0);
        let state = WalkerState {
            positions: p0.to_owned(),
            ln_probs,
        };
        self.sample(&pool, state, nsteps)
    }

    /// Run `nsteps` steps of the sampler starting from a previous walker state,
    /// log-probabilities of the state are not recomputed.
    pub fn run_mcmc_from_state(&mut self, state: WalkerState, nsteps: usize) -> Result<WalkerState> {
        self.check(&state.positions)?;
        if state.ln_probs.len() != self.nwalkers {
            return Err(McmcError::InvalidValueError(format!(
                "Expected {} log-probability values, got {}",
                self.nwalkers,
                state.ln_probs.len()
            )));
        }
        let pool = self.thread_pool()?;
        self.sample(&pool, state, nsteps)
    }

    /// Clear the retained chain and acceptance statistics
    pub fn reset(&mut self) {
        self.chain.clear();
        self.ln_probs.clear();
        self.naccepted.fill(0);
        self.iterations = 0;
    }

    /// Retained chain flattened as a (nwalkers * nsteps, ndim) array,
    /// row `w * nsteps + s` is the position of walker `w` at step `s`.
    pub fn flatchain(&self) -> Array2<f64> {
        let nsteps = self.chain.len();
        let mut flat = Array2::zeros((self.nwalkers * nsteps, self.ndim));
        for (s, step) in self.chain.iter().enumerate() {
            for (w, pos) in step.rows().into_iter().enumerate() {
                flat.row_mut(w * nsteps + s).assign(&pos);
            }
        }
        flat
    }

    /// Log-probabilities of the [flatchain](EnsembleSampler::flatchain) rows
    pub fn flat_ln_prob(&self) -> Array1<f64> {
        let nsteps = self.ln_probs.len();
        let mut flat = Array1::zeros(self.nwalkers * nsteps);
        for (s, step) in self.ln_probs.iter().enumerate() {
            for (w, lp) in step.iter().enumerate() {
                flat[w * nsteps + s] = *lp;
            }
        }
        flat
    }

    /// Fraction of accepted proposals per walker since last reset
    pub fn acceptance_fraction(&self) -> Array1<f64> {
        if self.iterations == 0 {
            return Array1::zeros(self.nwalkers);
        }
        self.naccepted.mapv(|n| n as f64 / self.iterations as f64)
    }

    fn check(&self, p0: &Array2<f64>) -> Result<()> {
        if self.a <= 1. {
            return Err(McmcError::InvalidConfigError(format!(
                "Stretch scale should be greater than 1, got {}",
                self.a
            )));
        }
        if p0.dim() != (self.nwalkers, self.ndim) {
            return Err(McmcError::InvalidValueError(format!(
                "Walker positions should be of shape ({}, {}), got {:?}",
                self.nwalkers,
                self.ndim,
                p0.dim()
            )));
        }
        Ok(())
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        let n_threads = self
            .n_threads
            .unwrap_or_else(|| {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                (self.nwalkers / 2).min(cores)
            })
            .max(1);
        debug!("Ensemble sampler pool with {n_threads} threads");
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()?)
    }

    /// Evaluate log-probabilities of the rows of `positions` on the worker pool
    fn compute_ln_probs(&self, pool: &rayon::ThreadPool, positions: &Array2<f64>) -> Array1<f64> {
        let ln_prob = &self.ln_prob;
        let values: Vec<f64> = pool.install(|| {
            (0..positions.nrows())
                .into_par_iter()
                .map(|k| {
                    let lp = ln_prob.ln_prob(&positions.row(k));
                    if lp.is_nan() {
                        f64::NEG_INFINITY
                    } else {
                        lp
                    }
                })
                .collect()
        });
        Array1::from(values)
    }

    fn sample(
        &mut self,
        pool: &rayon::ThreadPool,
        mut state: WalkerState,
        nsteps: usize,
    ) -> Result<WalkerState> {
        let half = self.nwalkers / 2;
        self.chain.reserve(nsteps);
        self.ln_probs.reserve(nsteps);
        for _ in 0..nsteps {
            let halves = [(0..half, half..self.nwalkers), (half..self.nwalkers, 0..half)];
            for (active, complement) in halves {
                self.stretch_move(pool, &mut state, active, complement);
            }
            self.chain.push(state.positions.to_owned());
            self.ln_probs.push(state.ln_probs.to_owned());
            self.iterations += 1;
        }
        debug!(
            "Ensemble sampler ran {} steps, mean acceptance={}",
            nsteps,
            self.acceptance_fraction().mean().unwrap_or(0.)
        );
        Ok(state)
    }

    /// Update `active` walkers by stretching them toward walkers picked from `complement`
    fn stretch_move(
        &mut self,
        pool: &rayon::ThreadPool,
        state: &mut WalkerState,
        active: Range<usize>,
        complement: Range<usize>,
    ) {
        let n = active.len();
        let a = self.a;
        let zz: Array1<f64> = (0..n)
            .map(|_| {
                let u: f64 = self.rng.gen();
                ((a - 1.) * u + 1.).powi(2) / a
            })
            .collect();
        let picks: Vec<usize> = (0..n)
            .map(|_| self.rng.gen_range(complement.clone()))
            .collect();

        let mut proposals = Array2::zeros((n, self.ndim));
        for (k, mut q) in proposals.rows_mut().into_iter().enumerate() {
            let s = state.positions.row(active.start + k);
            let c = state.positions.row(picks[k]);
            q.assign(&(&c - &((&c - &s) * zz[k])));
        }
        let new_ln_probs = self.compute_ln_probs(pool, &proposals);

        let ndim_1 = (self.ndim - 1) as f64;
        for k in 0..n {
            let w = active.start + k;
            // nan when both values are -inf: proposal rejected
            let ln_pdiff = ndim_1 * zz[k].ln() + new_ln_probs[k] - state.ln_probs[w];
            let u: f64 = self.rng.gen();
            if ln_pdiff > u.ln() {
                state.positions.row_mut(w).assign(&proposals.row(k));
                state.ln_probs[w] = new_ln_probs[k];
                self.naccepted[w] += 1;
            }
        }
    }
}
