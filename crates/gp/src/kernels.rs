//! A module for stationary covariance kernels modeling the correlation between
//! GP outputs at two points of the input space.
//!
//! Kernels are expressed with the squared scaled distance
//! `r² = Σ_j d_j² / metric_j` where `metric` holds per-dimension squared length scales.
//!
//! The following kernel families are implemented:
//! * exponential squared `exp(-r²/2)`,
//! * exponential `exp(-r)`,
//! * matern 3/2 `(1 + √3 r) exp(-√3 r)`,
//! * matern 5/2 `(1 + √5 r + 5r²/3) exp(-√5 r)`.
//!
//! Families are selected at runtime by name with [`KernelFamily`], names being matched
//! case-insensitively (`"ExpSquaredKernel"`, `"matern32kernel"`, ...).

use crate::errors::{GpError, Result};
use crate::utils::{pairwise_differences, DiffMatrix};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use paste::paste;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// A trait for stationary kernels used in GP regression
pub trait KernelModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Kernel value given the squared scaled distance `r2` between two points.
    fn value_r2(&self, r2: F) -> F;

    /// Compute kernel values given distances `d` (n, nx) between pairs of points
    /// and the `metric` (nx,) squared length scales.
    /// Returns n values, one per row of `d`.
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        metric: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let inv_metric = metric.mapv(|m| F::one() / m);
        let r2 = d.mapv(|v| v * v).dot(&inv_metric);
        r2.mapv(|v| self.value_r2(v))
    }
}

/// Exponential squared kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ExpSquaredKernel();

impl<F: Float> KernelModel<F> for ExpSquaredKernel {
    /// exp( - r² / 2 )
    fn value_r2(&self, r2: F) -> F {
        F::exp(F::cast(-0.5) * r2)
    }
}

/// Exponential kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ExpKernel();

impl<F: Float> KernelModel<F> for ExpKernel {
    /// exp( - r )
    fn value_r2(&self, r2: F) -> F {
        F::exp(-r2.sqrt())
    }
}

/// Matern 3/2 kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Matern32Kernel();

impl<F: Float> KernelModel<F> for Matern32Kernel {
    /// (1 + sqrt(3) * r) exp( - sqrt(3) * r )
    fn value_r2(&self, r2: F) -> F {
        let r = (F::cast(3.) * r2).sqrt();
        (F::one() + r) * F::exp(-r)
    }
}

/// Matern 5/2 kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Matern52Kernel();

impl<F: Float> KernelModel<F> for Matern52Kernel {
    /// (1 + sqrt(5) * r + 5/3 * r²) exp( - sqrt(5) * r )
    fn value_r2(&self, r2: F) -> F {
        let five_r2 = F::cast(5.) * r2;
        let r = five_r2.sqrt();
        (F::one() + r + five_r2 / F::cast(3.)) * F::exp(-r)
    }
}

macro_rules! declare_kernel_display_impl {
    ($kernel:ident) => {
        paste! {
            impl fmt::Display for [<$kernel Kernel>] {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}Kernel", stringify!($kernel))
                }
            }
        }
    };
}

declare_kernel_display_impl!(ExpSquared);
declare_kernel_display_impl!(Exp);
declare_kernel_display_impl!(Matern32);
declare_kernel_display_impl!(Matern52);

/// Enumeration of the supported kernel families, used to select a kernel by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub enum KernelFamily {
    /// See [ExpSquaredKernel]
    #[default]
    ExpSquared,
    /// See [ExpKernel]
    Exp,
    /// See [Matern32Kernel]
    Matern32,
    /// See [Matern52Kernel]
    Matern52,
}

impl KernelFamily {
    /// All supported kernel families
    pub const ALL: [KernelFamily; 4] = [
        KernelFamily::ExpSquared,
        KernelFamily::Exp,
        KernelFamily::Matern32,
        KernelFamily::Matern52,
    ];

    /// Canonical kernel name
    pub fn name(&self) -> &'static str {
        match self {
            KernelFamily::ExpSquared => "ExpSquaredKernel",
            KernelFamily::Exp => "ExpKernel",
            KernelFamily::Matern32 => "Matern32Kernel",
            KernelFamily::Matern52 => "Matern52Kernel",
        }
    }

    /// Canonical names of all supported kernel families
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.name()).collect()
    }

    /// Kernel value given the squared scaled distance `r2`
    pub fn value_r2<F: Float>(&self, r2: F) -> F {
        match self {
            KernelFamily::ExpSquared => ExpSquaredKernel().value_r2(r2),
            KernelFamily::Exp => ExpKernel().value_r2(r2),
            KernelFamily::Matern32 => Matern32Kernel().value_r2(r2),
            KernelFamily::Matern52 => Matern52Kernel().value_r2(r2),
        }
    }

    /// See [KernelModel::value]
    pub fn value<F: Float>(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        metric: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        match self {
            KernelFamily::ExpSquared => ExpSquaredKernel().value(d, metric),
            KernelFamily::Exp => ExpKernel().value(d, metric),
            KernelFamily::Matern32 => Matern32Kernel().value(d, metric),
            KernelFamily::Matern52 => Matern52Kernel().value(d, metric),
        }
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for KernelFamily {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self> {
        let lcase = s.to_lowercase();
        Self::ALL
            .iter()
            .find(|k| k.name().to_lowercase() == lcase)
            .copied()
            .ok_or_else(|| GpError::UnknownKernel {
                name: s.to_string(),
                valid: Self::names().join(", "),
            })
    }
}

impl From<KernelFamily> for String {
    fn from(item: KernelFamily) -> String {
        item.name().to_string()
    }
}

impl TryFrom<String> for KernelFamily {
    type Error = GpError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A kernel of a given family scaled by an amplitude, with its squared length scales.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel<F: Float> {
    family: KernelFamily,
    amplitude: F,
    metric: Array1<F>,
}

impl<F: Float> Kernel<F> {
    /// Constructor given the `amplitude` and `metric` (squared length scales) values
    pub fn new(family: KernelFamily, amplitude: F, metric: Array1<F>) -> Self {
        Kernel {
            family,
            amplitude,
            metric,
        }
    }

    /// Constructor from log hyperparameters `[ln(amplitude), ln(metric_1), ..., ln(metric_nx)]`
    pub fn from_log_params(family: KernelFamily, p: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Self {
        let amplitude = F::exp(p[0]);
        let metric = p.iter().skip(1).map(|v| F::exp(*v)).collect::<Array1<F>>();
        Kernel::new(family, amplitude, metric)
    }

    /// Log hyperparameters `[ln(amplitude), ln(metric_1), ..., ln(metric_nx)]`
    pub fn log_params(&self) -> Array1<F> {
        std::iter::once(self.amplitude.ln())
            .chain(self.metric.iter().map(|m| m.ln()))
            .collect()
    }

    /// Kernel family
    pub fn family(&self) -> KernelFamily {
        self.family
    }

    /// Amplitude, i.e. the kernel value at zero distance
    pub fn amplitude(&self) -> F {
        self.amplitude
    }

    /// Squared length scales
    pub fn metric(&self) -> &Array1<F> {
        &self.metric
    }

    /// Input dimension handled by this kernel
    pub fn ndim(&self) -> usize {
        self.metric.len()
    }

    /// Check that hyperparameters are strictly positive finite values
    pub fn check(&self) -> Result<()> {
        let valid = |v: &F| v.is_finite() && *v > F::zero();
        if !valid(&self.amplitude) || !self.metric.iter().all(valid) {
            return Err(GpError::InvalidValueError(format!(
                "Kernel hyperparameters should be positive finite values, got amplitude={} metric={}",
                self.amplitude, self.metric
            )));
        }
        Ok(())
    }

    /// Covariance matrix (n_obs, n_obs) between training points given their differences
    pub fn covariance(&self, x_distances: &DiffMatrix<F>) -> Array2<F> {
        let kxx = self.family.value(&x_distances.d, &self.metric);
        let mut k_mx = Array2::<F>::eye(x_distances.n_obs).mapv(|v| v * self.amplitude);
        for (i, ij) in x_distances.d_indices.outer_iter().enumerate() {
            k_mx[[ij[0], ij[1]]] = self.amplitude * kxx[i];
            k_mx[[ij[1], ij[0]]] = self.amplitude * kxx[i];
        }
        k_mx
    }

    /// Cross covariance matrix (n1, n2) between `x1` (n1, nx) and `x2` (n2, nx) points
    pub fn cross_covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        if x1.ncols() != self.ndim() || x2.ncols() != self.ndim() {
            return Err(GpError::InvalidValueError(format!(
                "Kernel dimension is {}, got points of dimension {} and {}",
                self.ndim(),
                x1.ncols(),
                x2.ncols()
            )));
        }
        let dx = pairwise_differences(x1, x2);
        let k = self
            .family
            .value(&dx, &self.metric)
            .mapv(|v| v * self.amplitude);
        Ok(Array2::from_shape_vec(
            (x1.nrows(), x2.nrows()),
            k.into_raw_vec(),
        )?)
    }
}

impl<F: Float> fmt::Display for Kernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} * {}(metric={})",
            self.amplitude, self.family, self.metric
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    macro_rules! test_kernel_at_zero {
        ($kernel:ident) => {
            paste! {
                #[test]
                fn [<test_ $kernel:snake _kernel_at_zero_distance>]() {
                    let d = array![[0., 0.], [0., 0.]];
                    let metric = array![0.3, 2.];
                    let k = [<$kernel Kernel>]().value(&d, &metric);
                    assert_abs_diff_eq!(k, array![1., 1.], epsilon = 1e-12);
                }

                #[test]
                fn [<test_ $kernel:snake _kernel_decreasing>]() {
                    let d = Array::linspace(0., 5., 20).insert_axis(ndarray::Axis(1));
                    let k = [<$kernel Kernel>]().value(&d, &array![1.5]);
                    k.windows(2).into_iter().for_each(|w| assert!(w[1] < w[0]));
                }
            }
        };
    }

    test_kernel_at_zero!(ExpSquared);
    test_kernel_at_zero!(Exp);
    test_kernel_at_zero!(Matern32);
    test_kernel_at_zero!(Matern52);

    #[test]
    fn test_kernel_values() {
        // r² = 1/2 + 4/2 = 2.5
        let d = array![[1., 2.]];
        let metric = array![2., 2.];
        let r2: f64 = 2.5;
        let r = r2.sqrt();
        assert_abs_diff_eq!(
            ExpSquaredKernel().value(&d, &metric)[0],
            (-0.5 * r2).exp(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            ExpKernel().value(&d, &metric)[0],
            (-r).exp(),
            epsilon = 1e-12
        );
        let s3 = 3f64.sqrt() * r;
        assert_abs_diff_eq!(
            Matern32Kernel().value(&d, &metric)[0],
            (1. + s3) * (-s3).exp(),
            epsilon = 1e-12
        );
        let s5 = 5f64.sqrt() * r;
        assert_abs_diff_eq!(
            Matern52Kernel().value(&d, &metric)[0],
            (1. + s5 + 5. * r2 / 3.) * (-s5).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_kernel_family_from_str() {
        assert_eq!(
            KernelFamily::ExpSquared,
            "expsquaredkernel".parse::<KernelFamily>().unwrap()
        );
        assert_eq!(
            KernelFamily::Matern52,
            "MATERN52KERNEL".parse::<KernelFamily>().unwrap()
        );
        for k in KernelFamily::ALL {
            assert_eq!(k, k.to_string().parse::<KernelFamily>().unwrap());
        }
    }

    #[test]
    fn test_unknown_kernel() {
        let err = "NotAKernel".parse::<KernelFamily>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("NotAKernel"));
        for name in KernelFamily::names() {
            assert!(msg.contains(name), "{name} not listed in '{msg}'");
        }
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_kernel_family_json() {
        for k in KernelFamily::ALL {
            let json = serde_json::to_string(&k).unwrap();
            assert_eq!(format!("\"{}\"", k.name()), json);
            assert_eq!(k, serde_json::from_str::<KernelFamily>(&json).unwrap());
        }
        assert_eq!(
            KernelFamily::Matern32,
            serde_json::from_str::<KernelFamily>("\"matern32kernel\"").unwrap()
        );
        assert!(serde_json::from_str::<KernelFamily>("\"NotAKernel\"").is_err());
    }

    #[test]
    fn test_log_params() {
        let p = array![0.5, -1., 2.];
        let kernel = Kernel::from_log_params(KernelFamily::Exp, &p);
        assert_abs_diff_eq!(kernel.amplitude(), 0.5f64.exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(kernel.metric(), &array![(-1f64).exp(), 2f64.exp()]);
        assert_abs_diff_eq!(kernel.log_params(), p, epsilon = 1e-12);
    }

    #[test]
    fn test_covariance_symmetric() {
        let xt = array![[0.1, 1.], [0.5, 0.2], [0.9, 0.7]];
        let kernel = Kernel::new(KernelFamily::Matern32, 2., array![0.5, 1.5]);
        let k = kernel.covariance(&DiffMatrix::new(&xt));
        let kc = kernel.cross_covariance(&xt, &xt).unwrap();
        assert_abs_diff_eq!(k, k.t(), epsilon = 1e-12);
        assert_abs_diff_eq!(k, kc, epsilon = 1e-12);
        assert_abs_diff_eq!(k.diag(), array![2., 2., 2.], epsilon = 1e-12);
    }

    #[test]
    fn test_check_kernel() {
        assert!(Kernel::new(KernelFamily::Exp, 1., array![1.]).check().is_ok());
        assert!(Kernel::new(KernelFamily::Exp, 0., array![1.]).check().is_err());
        assert!(Kernel::new(KernelFamily::Exp, 1., array![f64::INFINITY])
            .check()
            .is_err());
    }
}
