//! Surrogate training configuration.
use crate::errors::{Result, SurrogateError};
use crate::model::parse_kernel;
use crate::preprocess::CenterMeasure;

use gwbox_gp::KernelFamily;
use serde::{Deserialize, Serialize};

/// Training configuration of a spectrum surrogate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of lowest frequencies to train on
    pub(crate) nfreqs: usize,
    /// Number of MCMC walkers (even)
    pub(crate) nwalkers: usize,
    /// Number of production steps of the MCMC
    pub(crate) nsamples: usize,
    /// Fraction of `nsamples` used as length of each burn-in stage
    pub(crate) burn_frac: f64,
    /// Fraction of leading library samples reserved for testing
    pub(crate) test_frac: f64,
    /// Statistic used to center spectra
    pub(crate) center_measure: CenterMeasure,
    /// Kernel family name (case insensitive)
    pub(crate) kernel: String,
    /// Lower bound of the number of walkers, the effective bound is
    /// max(min_walkers, 2 * kernel dimension)
    pub(crate) min_walkers: usize,
    /// Random generator seed, taken from entropy if not set
    pub(crate) seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            nfreqs: 30,
            nwalkers: 36,
            nsamples: 1500,
            burn_frac: 0.25,
            test_frac: 0.0,
            center_measure: CenterMeasure::Median,
            kernel: KernelFamily::ExpSquared.name().to_string(),
            min_walkers: 2,
            seed: None,
        }
    }
}

impl TrainConfig {
    /// Sets the number of frequencies to train on
    pub fn nfreqs(mut self, nfreqs: usize) -> Self {
        self.nfreqs = nfreqs;
        self
    }

    /// Sets the number of MCMC walkers
    pub fn nwalkers(mut self, nwalkers: usize) -> Self {
        self.nwalkers = nwalkers;
        self
    }

    /// Sets the number of MCMC production steps
    pub fn nsamples(mut self, nsamples: usize) -> Self {
        self.nsamples = nsamples;
        self
    }

    /// Sets the burn-in fraction
    pub fn burn_frac(mut self, burn_frac: f64) -> Self {
        self.burn_frac = burn_frac;
        self
    }

    /// Sets the fraction of samples reserved for testing
    pub fn test_frac(mut self, test_frac: f64) -> Self {
        self.test_frac = test_frac;
        self
    }

    /// Sets the center measure
    pub fn center_measure(mut self, center_measure: CenterMeasure) -> Self {
        self.center_measure = center_measure;
        self
    }

    /// Sets the kernel family name
    pub fn kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = kernel.into();
        self
    }

    /// Sets the minimum number of walkers
    pub fn min_walkers(mut self, min_walkers: usize) -> Self {
        self.min_walkers = min_walkers;
        self
    }

    /// Sets the random generator seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of steps of each burn-in stage
    pub fn burn_steps(&self) -> usize {
        (self.burn_frac * self.nsamples as f64).floor() as usize
    }

    /// Kernel family selected by name
    pub fn kernel_family(&self) -> Result<KernelFamily> {
        parse_kernel(&self.kernel)
    }

    /// Check configuration consistency, walkers number being checked against
    /// the kernel dimension when fitting
    pub fn check(&self) -> Result<()> {
        if self.nfreqs == 0 {
            return Err(SurrogateError::InvalidConfigError(
                "Number of frequencies should be positive".to_string(),
            ));
        }
        if self.nsamples == 0 {
            return Err(SurrogateError::InvalidConfigError(
                "Number of MCMC samples should be positive".to_string(),
            ));
        }
        if self.nwalkers % 2 != 0 || self.nwalkers < self.min_walkers {
            return Err(SurrogateError::InvalidConfigError(format!(
                "Number of walkers should be even and at least {}, got {}",
                self.min_walkers, self.nwalkers
            )));
        }
        if !(self.burn_frac >= 0. && self.burn_frac.is_finite()) {
            return Err(SurrogateError::InvalidConfigError(format!(
                "Burn-in fraction should be non negative, got {}",
                self.burn_frac
            )));
        }
        if !(0.0..1.0).contains(&self.test_frac) {
            return Err(SurrogateError::InvalidConfigError(format!(
                "Test fraction should be in [0, 1), got {}",
                self.test_frac
            )));
        }
        self.kernel_family()?;
        Ok(())
    }
}
