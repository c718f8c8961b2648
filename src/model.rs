//! Per-frequency GP model.
//!
//! A [GpSpec] gathers what is known before fitting: the shared parameter design,
//! the targets and uncertainties of one frequency bin and the kernel family.
//! It evaluates the log-posterior of the kernel hyperparameters
//! `p = [ln(amplitude), ln(metric_1), ..., ln(metric_nparams)]`.
//!
//! Fitting attaches a [FitResult] exactly once, giving a [TrainedGp].
use crate::errors::{Result, SurrogateError};
use crate::params::{ParamBounds, ParameterDesign};

use gwbox_gp::{GaussianProcess, GpError, KernelFamily};
use gwbox_mcmc::LogProbability;
use linfa::prelude::{DatasetBase, Fit};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1};
use std::sync::Arc;

/// Bound of the uniform prior box of each log hyperparameter
pub const PRIOR_BOUND: f64 = 20.;

/// Kernel family selected by name (case insensitive)
pub fn parse_kernel(name: &str) -> Result<KernelFamily> {
    name.parse().map_err(|err| match err {
        GpError::UnknownKernel { name, valid } => SurrogateError::UnknownKernel { name, valid },
        err => SurrogateError::GpError(err),
    })
}

/// Unfitted model of one frequency bin
#[derive(Clone, Debug)]
pub struct GpSpec {
    design: Arc<ParameterDesign>,
    y: Array1<f64>,
    yerr: Array1<f64>,
    bounds: Arc<ParamBounds>,
    kernel: KernelFamily,
}

impl GpSpec {
    /// Constructor validating the kernel name against supported kernel families
    pub fn new(
        design: Arc<ParameterDesign>,
        y: Array1<f64>,
        yerr: Array1<f64>,
        bounds: Arc<ParamBounds>,
        kernel_name: &str,
    ) -> Result<Self> {
        let kernel = parse_kernel(kernel_name)?;
        Self::with_kernel(design, y, yerr, bounds, kernel)
    }

    /// Constructor given a kernel family
    pub fn with_kernel(
        design: Arc<ParameterDesign>,
        y: Array1<f64>,
        yerr: Array1<f64>,
        bounds: Arc<ParamBounds>,
        kernel: KernelFamily,
    ) -> Result<Self> {
        if y.len() != design.nsamples() || yerr.len() != design.nsamples() {
            return Err(SurrogateError::InvalidValue(format!(
                "Targets ({}) and uncertainties ({}) should match design samples number ({})",
                y.len(),
                yerr.len(),
                design.nsamples()
            )));
        }
        if bounds.len() != design.nparams() {
            return Err(SurrogateError::InvalidValue(format!(
                "Parameter bounds ({}) should match design parameters number ({})",
                bounds.len(),
                design.nparams()
            )));
        }
        Ok(GpSpec {
            design,
            y,
            yerr,
            bounds,
            kernel,
        })
    }

    /// Training parameter design
    pub fn design(&self) -> &ParameterDesign {
        &self.design
    }

    /// Zero-centered training targets
    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    /// Training targets standard deviations
    pub fn yerr(&self) -> &Array1<f64> {
        &self.yerr
    }

    /// Parameter ranges of the design
    pub fn bounds(&self) -> &ParamBounds {
        &self.bounds
    }

    /// Kernel family
    pub fn kernel(&self) -> KernelFamily {
        self.kernel
    }

    /// Number of physical parameters
    pub fn nparams(&self) -> usize {
        self.design.nparams()
    }

    /// Number of kernel hyperparameters: amplitude plus one metric per parameter
    pub fn ndim(&self) -> usize {
        self.nparams() + 1
    }

    /// Uniform log-prior on `[-PRIOR_BOUND, PRIOR_BOUND]^ndim`, bounds included
    pub fn ln_prior(&self, p: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> f64 {
        if p.iter().all(|v| (-PRIOR_BOUND..=PRIOR_BOUND).contains(v)) {
            p.len() as f64 * (1. / (2. * PRIOR_BOUND)).ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// GP marginal log-likelihood of the targets given log hyperparameters,
    /// `-inf` when the covariance matrix cannot be factorized
    pub fn ln_likelihood(&self, p: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> f64 {
        match self.condition(p) {
            Ok(gp) if gp.likelihood().is_finite() => gp.likelihood(),
            _ => f64::NEG_INFINITY,
        }
    }

    /// Log-posterior, the likelihood being evaluated only inside the prior box
    pub fn ln_posterior(&self, p: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> f64 {
        let lp = self.ln_prior(p);
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        lp + self.ln_likelihood(p)
    }

    /// GP conditioned on training data with the given log hyperparameters
    pub fn condition(
        &self,
        p: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<GaussianProcess<f64>> {
        if p.len() != self.ndim() {
            return Err(SurrogateError::InvalidValue(format!(
                "Expected {} kernel hyperparameters, got {}",
                self.ndim(),
                p.len()
            )));
        }
        let gp = GaussianProcess::params_from_log(self.kernel, &p.to_owned())
            .yerr(self.yerr.to_owned())
            .fit(&DatasetBase::new(self.design.values().view(), self.y.view()))?;
        Ok(gp)
    }
}

impl LogProbability for GpSpec {
    fn ln_prob(&self, x: &ArrayView1<f64>) -> f64 {
        self.ln_posterior(x)
    }
}

/// Posterior sampling outcome of one frequency bin
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    /// Flattened posterior chain (n, ndim)
    pub chain: Array2<f64>,
    /// Log-posterior of the chain rows (n,)
    pub lnprob: Array1<f64>,
    /// Maximum a posteriori hyperparameters (ndim,)
    pub kernel_map: Array1<f64>,
    /// Center removed from the targets of the frequency
    pub center: f64,
}

/// Fitted model of one frequency bin
#[derive(Clone, Debug)]
pub struct TrainedGp {
    spec: GpSpec,
    fit: FitResult,
}

impl TrainedGp {
    /// Constructor checking fit result dimensions against the model
    pub fn new(spec: GpSpec, fit: FitResult) -> Result<Self> {
        let ndim = spec.ndim();
        if fit.chain.ncols() != ndim || fit.kernel_map.len() != ndim {
            return Err(SurrogateError::InvalidValue(format!(
                "Chain ({}) and MAP ({}) dimensions should match kernel dimension ({})",
                fit.chain.ncols(),
                fit.kernel_map.len(),
                ndim
            )));
        }
        if fit.lnprob.len() != fit.chain.nrows() {
            return Err(SurrogateError::InvalidValue(format!(
                "Log-posterior values ({}) should match chain length ({})",
                fit.lnprob.len(),
                fit.chain.nrows()
            )));
        }
        Ok(TrainedGp { spec, fit })
    }

    /// Model specification
    pub fn spec(&self) -> &GpSpec {
        &self.spec
    }

    /// Fit outcome
    pub fn fit_result(&self) -> &FitResult {
        &self.fit
    }

    /// Flattened posterior chain
    pub fn chain(&self) -> &Array2<f64> {
        &self.fit.chain
    }

    /// Log-posterior of the chain rows
    pub fn lnprob(&self) -> &Array1<f64> {
        &self.fit.lnprob
    }

    /// Maximum a posteriori log hyperparameters
    pub fn kernel_map(&self) -> &Array1<f64> {
        &self.fit.kernel_map
    }

    /// Center removed from the targets
    pub fn center(&self) -> f64 {
        self.fit.center
    }

    /// GP conditioned with the MAP hyperparameters
    pub fn map_gp(&self) -> Result<GaussianProcess<f64>> {
        self.spec.condition(&self.fit.kernel_map)
    }
}
