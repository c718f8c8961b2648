use crate::errors::{GpError, Result};
use crate::kernels::{Kernel, KernelFamily};
use linfa::{Float, ParamGuard};
use ndarray::Array1;

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GpValidParams<F: Float> {
    /// Covariance kernel with its hyperparameters
    pub(crate) kernel: Kernel<F>,
    /// Optional standard deviation of the training outputs, one value per training point
    pub(crate) yerr: Option<Array1<F>>,
}

impl<F: Float> GpValidParams<F> {
    /// Get covariance kernel
    pub fn kernel(&self) -> &Kernel<F> {
        &self.kernel
    }

    /// Get training outputs standard deviations if any
    pub fn yerr(&self) -> Option<&Array1<F>> {
        self.yerr.as_ref()
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](crate::GaussianProcess).
pub struct GpParams<F: Float>(GpValidParams<F>);

impl<F: Float> GpParams<F> {
    /// A constructor for GP parameters given a kernel
    pub fn new(kernel: Kernel<F>) -> GpParams<F> {
        Self(GpValidParams { kernel, yerr: None })
    }

    /// A constructor for GP parameters given a kernel family and log hyperparameters
    /// `[ln(amplitude), ln(metric_1), ..., ln(metric_nx)]`
    pub fn from_log_params(family: KernelFamily, log_params: &Array1<F>) -> GpParams<F> {
        Self::new(Kernel::from_log_params(family, log_params))
    }

    /// Set covariance kernel.
    pub fn kernel(mut self, kernel: Kernel<F>) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set standard deviations of the training outputs.
    ///
    /// Their squares are added to the diagonal of the training covariance matrix.
    pub fn yerr(mut self, yerr: Array1<F>) -> Self {
        self.0.yerr = Some(yerr);
        self
    }
}

impl<F: Float> From<GpValidParams<F>> for GpParams<F> {
    fn from(valid: GpValidParams<F>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float> ParamGuard for GpParams<F> {
    type Checked = GpValidParams<F>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        self.0.kernel.check()?;
        if let Some(yerr) = &self.0.yerr {
            if yerr.iter().any(|v| !v.is_finite() || *v < F::zero()) {
                return Err(GpError::InvalidValueError(
                    "`yerr` should contain non-negative finite values".to_string(),
                ));
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
