use crate::errors::{GpError, Result};
use crate::kernels::{Kernel, KernelFamily};
use crate::parameters::{GpParams, GpValidParams};
use crate::utils::DiffMatrix;

use linfa::prelude::{DatasetBase, Fit, Float};
use linfa_linalg::{cholesky::*, eigh::*, triangular::*};

use ndarray::{Array, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;

use log::debug;
use std::fmt;

/// Eigenvalues below this threshold are considered null when sampling
const EIGEN_LOWER_BOUND: f64 = 1e-9;

/// A GP regression model conditioned on noisy training data.
///
/// The training outputs are modeled as a zero-mean gaussian process
///
/// `Y(x) = Z(x) + e(x)`
///
/// where:
/// * `Z(x)` is a gaussian process with covariance `k(x, x') = a * kernel(x, x'; metric)`,
/// * `e(x) ~ Normal(0, yerr(x)^2)` is an independent observation noise
///   known at every training point.
///
/// Conditioning factorizes `K = k(X, X) + diag(yerr^2)` once with a Cholesky
/// decomposition, then the model is queried for:
/// * the marginal log-likelihood of the training outputs,
/// * the predictive mean and (co)variance at new points,
/// * realizations drawn from the conditional predictive distribution.
///
/// A covariance matrix which is not positive definite is reported as an error,
/// callers decide whether it is fatal.
///
/// # Example
///
/// ```no_run
/// use gwbox_gp::{GaussianProcess, Kernel, KernelFamily};
/// use linfa::prelude::*;
/// use ndarray::{arr1, arr2, array};
///
/// let xt = arr2(&[[0.0], [1.0], [2.0], [3.0], [4.0]]);
/// let yt = arr1(&[0.0, 1.0, 1.5, 0.9, 1.0]);
///
/// let kernel = Kernel::new(KernelFamily::ExpSquared, 1.0, array![1.0]);
/// let gp = GaussianProcess::params(kernel)
///     .yerr(arr1(&[0.1; 5]))
///     .fit(&Dataset::new(xt, yt))
///     .expect("GP conditioned");
///
/// let (mean, var) = gp.predict_valvar(&arr2(&[[1.5]])).expect("GP prediction");
/// ```
#[derive(Debug, Clone)]
pub struct GaussianProcess<F: Float> {
    /// Covariance kernel
    kernel: Kernel<F>,
    /// Marginal log-likelihood of the training outputs
    likelihood: F,
    /// Lower Cholesky factor of the training covariance matrix
    k_chol: Array2<F>,
    /// Solution of the linear equation system : \[K\] x alpha = y
    alpha: Array2<F>,
    /// Training inputs
    xt: Array2<F>,
    /// Training outputs
    yt: Array1<F>,
    /// Training outputs standard deviations
    yerr: Array1<F>,
}

impl<F: Float> fmt::Display for GaussianProcess<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(kernel={}, n_obs={}, likelihood={})",
            self.kernel,
            self.xt.nrows(),
            self.likelihood
        )
    }
}

impl<F: Float> GaussianProcess<F> {
    /// Gp parameters contructor
    pub fn params(kernel: Kernel<F>) -> GpParams<F> {
        GpParams::new(kernel)
    }

    /// Gp parameters contructor given a kernel family and log hyperparameters
    pub fn params_from_log(family: KernelFamily, log_params: &Array1<F>) -> GpParams<F> {
        GpParams::from_log_params(family, log_params)
    }

    /// Marginal log-likelihood of the training outputs
    /// `-1/2 y^T K^-1 y - 1/2 log|K| - n/2 log(2 pi)`
    pub fn likelihood(&self) -> F {
        self.likelihood
    }

    /// Covariance kernel
    pub fn kernel(&self) -> &Kernel<F> {
        &self.kernel
    }

    /// Training inputs and outputs
    pub fn training_data(&self) -> (&Array2<F>, &Array1<F>) {
        (&self.xt, &self.yt)
    }

    /// Training outputs standard deviations
    pub fn yerr(&self) -> &Array1<F> {
        &self.yerr
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let kxs = self.kernel.cross_covariance(x, &self.xt)?;
        Ok(kxs.dot(&self.alpha).remove_axis(Axis(1)))
    }

    /// Predict both output values and variances at n given `x` points of nx components.
    ///
    /// Variances are returned as computed: round-off on an ill-conditioned covariance
    /// may make them slightly negative.
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let kxs = self.kernel.cross_covariance(x, &self.xt)?;
        let mean = kxs.dot(&self.alpha).remove_axis(Axis(1));
        let v = self.k_chol.solve_triangular(&kxs.t(), UPLO::Lower)?;
        let var = v
            .mapv(|v| v * v)
            .sum_axis(Axis(0))
            .mapv(|v| self.kernel.amplitude() - v);
        Ok((mean, var))
    }

    /// Predict mean values and the covariance matrix (n, n) at n given `x` points
    pub fn predict_cov(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array2<F>)> {
        let kxs = self.kernel.cross_covariance(x, &self.xt)?;
        let mean = kxs.dot(&self.alpha).remove_axis(Axis(1));
        let v = self.k_chol.solve_triangular(&kxs.t(), UPLO::Lower)?;
        let kss = self.kernel.cross_covariance(x, x)?;
        Ok((mean, kss - v.t().dot(&v)))
    }

    /// Draw `n_traj` realizations from the conditional predictive distribution at n given `x` points.
    /// Returns a (n, n_traj) matrix.
    ///
    /// The conditioned covariance matrix is decomposed using its eigenvalues which is
    /// more robust than cholesky decomposition against ill-conditioned matrices.
    pub fn sample_conditional<R: Rng>(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
        rng: &mut R,
    ) -> Result<Array2<F>> {
        let (mean, cov) = self.predict_cov(x)?;
        sample(mean.insert_axis(Axis(1)), cov, n_traj, rng)
    }
}

impl<F: Float, D: Data<Elem = F>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError>
    for GpValidParams<F>
{
    type Object = GaussianProcess<F>;

    /// Condition the GP on the given training dataset
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();

        if x.nrows() == 0 {
            return Err(GpError::InvalidValueError(
                "At least one training point is required".to_string(),
            ));
        }
        if y.len() != x.nrows() {
            return Err(GpError::InvalidValueError(format!(
                "Training outputs size ({}) should match training inputs number ({})",
                y.len(),
                x.nrows()
            )));
        }
        if x.ncols() != self.kernel().ndim() {
            return Err(GpError::InvalidValueError(format!(
                "Kernel dimension ({}) should match training inputs dimension ({})",
                self.kernel().ndim(),
                x.ncols()
            )));
        }
        let yerr = match self.yerr() {
            Some(yerr) if yerr.len() != x.nrows() => {
                return Err(GpError::InvalidValueError(format!(
                    "Training outputs deviations size ({}) should match training inputs number ({})",
                    yerr.len(),
                    x.nrows()
                )));
            }
            Some(yerr) => yerr.to_owned(),
            None => Array1::zeros(x.nrows()),
        };

        let x_distances = DiffMatrix::new(x);
        let mut k_mx = self.kernel().covariance(&x_distances);
        k_mx.diag_mut()
            .iter_mut()
            .zip(yerr.iter())
            .for_each(|(k, e)| *k += *e * *e);

        let (likelihood, k_chol, alpha) = marginal_likelihood(k_mx, y)?;
        debug!("GP conditioned with {} likelihood={}", self.kernel(), likelihood);

        Ok(GaussianProcess {
            kernel: self.kernel().clone(),
            likelihood,
            k_chol,
            alpha,
            xt: x.to_owned(),
            yt: y.to_owned(),
            yerr,
        })
    }
}

/// Compute the marginal log-likelihood given the covariance matrix `k_mx` of
/// the training outputs `y`.
/// Returns the likelihood, the lower cholesky factor of `k_mx` and `k_mx^-1.y`
fn marginal_likelihood<F: Float>(
    k_mx: Array2<F>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<(F, Array2<F>, Array2<F>)> {
    let k_chol = k_mx.cholesky()?;
    // Not positive definite matrices may slip through as nan values
    if k_chol
        .diag()
        .iter()
        .any(|v| !v.is_finite() || *v <= F::zero())
    {
        return Err(GpError::LikelihoodComputationError(
            "covariance matrix is not positive definite".to_string(),
        ));
    }

    let y = y.to_owned().insert_axis(Axis(1));
    let yt = k_chol.solve_triangular(&y, UPLO::Lower)?;
    let alpha = k_chol.t().solve_triangular(&yt, UPLO::Upper)?;

    // The determinant of K is equal to the squared product of
    // the diagonal elements of its Cholesky decomposition k_chol
    let logdet = k_chol.diag().mapv(|v| v.ln()).sum() * F::cast(2.);
    let n_obs = F::cast(k_chol.nrows());
    let two_pi = F::cast(2. * std::f64::consts::PI);
    let quad = yt.mapv(|v| v * v).sum();
    let likelihood = F::cast(-0.5) * (quad + logdet + n_obs * two_pi.ln());

    if !likelihood.is_finite() {
        return Err(GpError::LikelihoodComputationError(format!(
            "non finite likelihood value {likelihood}"
        )));
    }
    Ok((likelihood, k_chol, alpha))
}

/// Sample `n_traj` trajectories from a multivariate normal distribution given its
/// `mean_x` (n, 1) and `cov_x` (n, n) using the eigenvalues decomposition of the covariance matrix.
pub(crate) fn sample<F: Float, R: Rng>(
    mean_x: Array2<F>,
    cov_x: Array2<F>,
    n_traj: usize,
    rng: &mut R,
) -> Result<Array2<F>> {
    let n_eval = mean_x.nrows();
    let (v, w) = cov_x.eigh_into()?;
    let v = v.mapv(|x| {
        // Negative or tiny eigenvalues are due to round-off
        if x < F::cast(EIGEN_LOWER_BOUND) {
            return F::zero();
        }
        x.sqrt()
    });
    let c = w.dot(&Array2::from_diag(&v));
    let ary = Array::random_using((n_eval, n_traj), StandardNormal, rng).mapv(|v: f64| F::cast(v));
    Ok(mean_x + c.dot(&ary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::KernelFamily;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::Dataset;
    use ndarray::{arr1, arr2, array, Array};
    use ndarray_rand::rand::SeedableRng;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    fn xsinx_data() -> (Array2<f64>, Array1<f64>) {
        let xt = Array::linspace(0., 5., 10).insert_axis(Axis(1));
        let yt = xt.column(0).mapv(f64::sin);
        (xt, yt)
    }

    /// Brute force version using explicit matrix inversion through a full solve
    fn naive_likelihood(k: &Array2<f64>, y: &Array1<f64>) -> f64 {
        let l = k.cholesky().unwrap();
        let z = l
            .solve_triangular(&y.to_owned().insert_axis(Axis(1)), UPLO::Lower)
            .unwrap();
        let det: f64 = l.diag().iter().map(|v| v * v).product();
        -0.5 * z.mapv(|v| v * v).sum()
            - 0.5 * det.ln()
            - 0.5 * y.len() as f64 * (2. * std::f64::consts::PI).ln()
    }

    #[test]
    fn test_likelihood() {
        let xt = arr2(&[[0.0], [1.0], [2.5]]);
        let yt = arr1(&[0.3, -0.2, 0.5]);
        let yerr = arr1(&[0.1, 0.2, 0.1]);
        let kernel = Kernel::new(KernelFamily::ExpSquared, 1.5, array![0.8]);
        let gp = GaussianProcess::params(kernel.clone())
            .yerr(yerr.clone())
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .expect("GP fit error");

        let mut k = kernel.cross_covariance(&xt, &xt).unwrap();
        k.diag_mut()
            .iter_mut()
            .zip(yerr.iter())
            .for_each(|(k, e)| *k += e * e);
        assert_abs_diff_eq!(naive_likelihood(&k, &yt), gp.likelihood(), epsilon = 1e-10);
    }

    #[test]
    fn test_single_point_likelihood() {
        // 1-dim normal N(0, a + e^2) evaluated at y
        let a = 2.0;
        let e = 0.5;
        let y = 0.7;
        let gp = GaussianProcess::params(Kernel::new(KernelFamily::Exp, a, array![1.]))
            .yerr(arr1(&[e]))
            .fit(&Dataset::new(arr2(&[[0.3]]), arr1(&[y])))
            .expect("GP fit error");
        let s2: f64 = a + e * e;
        let expected = -0.5 * y * y / s2 - 0.5 * (2. * std::f64::consts::PI * s2).ln();
        assert_abs_diff_eq!(expected, gp.likelihood(), epsilon = 1e-12);
    }

    macro_rules! test_gp_interpolation {
        ($kernel:ident) => {
            paste! {
                #[test]
                fn [<test_gp_ $kernel:snake _interpolation>]() {
                    let (xt, yt) = xsinx_data();
                    let kernel = Kernel::new(KernelFamily::$kernel, 1., array![1.]);
                    let gp = GaussianProcess::params(kernel)
                        .yerr(Array1::from_elem(xt.nrows(), 1e-3))
                        .fit(&Dataset::new(xt.clone(), yt.clone()))
                        .expect("GP fit error");

                    let (mean, var) = gp.predict_valvar(&xt).expect("prediction error");
                    assert_abs_diff_eq!(mean, yt, epsilon = 1e-2);
                    assert_abs_diff_eq!(var, Array1::zeros(xt.nrows()), epsilon = 1e-4);
                    assert_abs_diff_eq!(gp.predict(&xt).unwrap(), mean, epsilon = 1e-12);

                    // far from training data the prior is recovered
                    let (mean, var) = gp.predict_valvar(&arr2(&[[50.]])).unwrap();
                    assert_abs_diff_eq!(mean[0], 0., epsilon = 1e-6);
                    assert_abs_diff_eq!(var[0], 1., epsilon = 1e-6);
                }
            }
        };
    }

    test_gp_interpolation!(ExpSquared);
    test_gp_interpolation!(Exp);
    test_gp_interpolation!(Matern32);
    test_gp_interpolation!(Matern52);

    #[test]
    fn test_predict_cov_diag_matches_var() {
        let (xt, yt) = xsinx_data();
        let gp = GaussianProcess::params_from_log(KernelFamily::Matern52, &array![0., 0.5])
            .yerr(Array1::from_elem(xt.nrows(), 0.1))
            .fit(&Dataset::new(xt, yt))
            .expect("GP fit error");
        let x = arr2(&[[0.25], [1.7], [4.2]]);
        let (m1, var) = gp.predict_valvar(&x).unwrap();
        let (m2, cov) = gp.predict_cov(&x).unwrap();
        assert_abs_diff_eq!(m1, m2, epsilon = 1e-12);
        assert_abs_diff_eq!(var, cov.diag(), epsilon = 1e-10);
        assert_abs_diff_eq!(cov, cov.t(), epsilon = 1e-10);
    }

    #[test]
    fn test_sample_conditional() {
        let (xt, yt) = xsinx_data();
        let gp = GaussianProcess::params(Kernel::new(KernelFamily::ExpSquared, 1., array![1.]))
            .yerr(Array1::from_elem(xt.nrows(), 0.05))
            .fit(&Dataset::new(xt, yt))
            .expect("GP fit error");
        let x = arr2(&[[2.2]]);
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let n_traj = 5000;
        let samples = gp.sample_conditional(&x, n_traj, &mut rng).unwrap();
        assert_eq!((1, n_traj), samples.dim());

        let (mean, var) = gp.predict_valvar(&x).unwrap();
        let smean = samples.mean().unwrap();
        let svar = samples.var(0.);
        assert_abs_diff_eq!(smean, mean[0], epsilon = 5. * (var[0] / n_traj as f64).sqrt());
        assert_abs_diff_eq!(svar, var[0], epsilon = 0.1 * var[0]);
    }

    #[test]
    fn test_sample_reproducible() {
        let (xt, yt) = xsinx_data();
        let gp = GaussianProcess::params(Kernel::new(KernelFamily::Exp, 0.5, array![2.]))
            .fit(&Dataset::new(xt, yt))
            .expect("GP fit error");
        let x = arr2(&[[0.6], [3.3]]);
        let s1 = gp
            .sample_conditional(&x, 3, &mut Xoshiro256Plus::seed_from_u64(0))
            .unwrap();
        let s2 = gp
            .sample_conditional(&x, 3, &mut Xoshiro256Plus::seed_from_u64(0))
            .unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_singular_covariance() {
        // duplicated points without noise give a singular covariance matrix
        let xt = arr2(&[[1.0], [1.0], [2.0]]);
        let yt = arr1(&[0.1, 0.2, 0.3]);
        let res = GaussianProcess::params(Kernel::new(KernelFamily::ExpSquared, 1., array![1.]))
            .fit(&Dataset::new(xt, yt));
        assert!(res.is_err());
    }

    #[test]
    fn test_bad_dimensions() {
        let xt = arr2(&[[1.0, 2.0], [0.0, 1.0]]);
        let yt = arr1(&[0.1, 0.2]);
        let kernel = Kernel::new(KernelFamily::ExpSquared, 1., array![1.]);
        assert!(GaussianProcess::params(kernel.clone())
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .is_err());
        let kernel = Kernel::new(KernelFamily::ExpSquared, 1., array![1., 1.]);
        assert!(GaussianProcess::params(kernel)
            .yerr(arr1(&[0.1]))
            .fit(&Dataset::new(xt, yt))
            .is_err());
    }
}
