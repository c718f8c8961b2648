//! Design matrix of the physical parameters of the training samples.
use crate::errors::{Result, SurrogateError};
use crate::library::SpectraLibrary;
use crate::preprocess::test_index;

use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix1};
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};

/// Amplitude-like parameter expected in log10 units
pub const LOG_AMP_PARAM: &str = "mmb_amp";
/// Values above this threshold denote linear units of [LOG_AMP_PARAM]
pub const LOG_AMP_THRESHOLD: f64 = 100.;

/// Parameter values of the training samples, one named column per parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDesign {
    names: Vec<String>,
    values: Array2<f64>,
}

impl ParameterDesign {
    /// Constructor checking one name is given per column
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if names.len() != values.ncols() {
            return Err(SurrogateError::InvalidValue(format!(
                "Parameter names number ({}) should match design columns ({})",
                names.len(),
                values.ncols()
            )));
        }
        Ok(ParameterDesign { names, values })
    }

    /// Ordered parameter names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Parameter values `[sample, parameter]`
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of parameters
    pub fn nparams(&self) -> usize {
        self.names.len()
    }

    /// Number of samples
    pub fn nsamples(&self) -> usize {
        self.values.nrows()
    }
}

/// Range of values of a named parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamBound {
    /// Parameter name
    pub name: String,
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

/// Ordered ranges of the design parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamBounds(Vec<ParamBound>);

impl ParamBounds {
    /// Min and max of each design column
    pub fn from_design(design: &ParameterDesign) -> Result<Self> {
        let bounds = design
            .names()
            .iter()
            .zip(design.values().columns())
            .map(|(name, col)| {
                Ok(ParamBound {
                    name: name.to_owned(),
                    min: *col.min()?,
                    max: *col.max()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ParamBounds(bounds))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there is no parameter
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ordered parameter ranges
    pub fn iter(&self) -> impl Iterator<Item = &ParamBound> {
        self.0.iter()
    }

    /// Range of the named parameter
    pub fn get(&self, name: &str) -> Option<&ParamBound> {
        self.0.iter().find(|b| b.name == name)
    }

    /// Middle of each parameter range, usable as a reference parameter vector
    pub fn midpoints(&self) -> Array1<f64> {
        self.0.iter().map(|b| 0.5 * (b.min + b.max)).collect()
    }

    /// `n` evenly spaced values of each parameter range as a (n, nparams) array
    pub fn linspace(&self, n: usize) -> Array2<f64> {
        let mut grid = Array2::zeros((n, self.len()));
        for (mut col, b) in grid.columns_mut().into_iter().zip(self.0.iter()) {
            col.assign(&Array1::linspace(b.min, b.max, n));
        }
        grid
    }

    /// Check the given parameter vector has one value per parameter
    pub fn check_dim(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<()> {
        if x.len() != self.len() {
            return Err(SurrogateError::InvalidValue(format!(
                "Expected {} parameter values ({}), got {}",
                self.len(),
                self.0
                    .iter()
                    .map(|b| b.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                x.len()
            )));
        }
        Ok(())
    }
}

/// Parameter design of the training samples of the given library,
/// the leading `test_frac` fraction of samples being reserved for testing.
///
/// The [LOG_AMP_PARAM] column is converted to log10 when any of its values
/// exceeds [LOG_AMP_THRESHOLD].
pub fn parameter_values(library: &SpectraLibrary, test_frac: f64) -> Result<ParameterDesign> {
    if !(0.0..1.0).contains(&test_frac) {
        return Err(SurrogateError::InvalidConfigError(format!(
            "Test fraction should be in [0, 1), got {test_frac}"
        )));
    }
    let test_ind = test_index(library.nsamples(), test_frac);
    let names = library.param_names().to_vec();
    let ncols = library.sample_params().ncols();
    if let Some(missing) = names.get(ncols) {
        return Err(SurrogateError::MissingParameter(missing.to_owned()));
    }
    let mut values = library
        .sample_params()
        .slice(s![test_ind.., ..names.len()])
        .to_owned();

    if let Some(k) = names.iter().position(|n| n == LOG_AMP_PARAM) {
        let mut col = values.column_mut(k);
        if col.iter().any(|&v| v > LOG_AMP_THRESHOLD) {
            col.mapv_inplace(f64::log10);
        }
    }
    ParameterDesign::new(names, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::tests::synthetic_library;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    fn library(sample_params: Array2<f64>, names: &[&str]) -> SpectraLibrary {
        let nsamples = sample_params.nrows();
        SpectraLibrary::new(
            Array3::ones((nsamples, 7, 2)),
            Array1::ones(7),
            sample_params,
            names.iter().map(|n| n.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_parameter_values_log_amp() {
        let lib = synthetic_library(20, 8, 3, 0);
        let design = parameter_values(&lib, 0.25).unwrap();
        assert_eq!(15, design.nsamples());
        assert_eq!(2, design.nparams());
        let raw = lib.sample_params().slice(s![5.., ..]);
        assert_abs_diff_eq!(raw.column(0), design.values().column(0), epsilon = 1e-15);
        assert_abs_diff_eq!(
            raw.column(1).mapv(f64::log10),
            design.values().column(1),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_parameter_values_already_log() {
        let lib = library(array![[1., 8.5], [2., 9.0], [3., 8.1]], &["hard_time", "mmb_amp"]);
        let design = parameter_values(&lib, 0.).unwrap();
        assert_eq!(lib.sample_params(), design.values());
        // only the designated parameter is converted
        let lib = library(array![[1000., 8.5], [2., 9.0]], &["hard_time", "other"]);
        let design = parameter_values(&lib, 0.).unwrap();
        assert_eq!(lib.sample_params(), design.values());
    }

    #[test]
    fn test_parameter_values_missing_column() {
        let lib = library(array![[1.], [2.]], &["hard_time", "mmb_amp"]);
        match parameter_values(&lib, 0.) {
            Err(SurrogateError::MissingParameter(name)) => assert_eq!("mmb_amp", name),
            res => panic!("unexpected result {res:?}"),
        }
    }

    #[test]
    fn test_parameter_values_invalid_test_frac() {
        let lib = synthetic_library(10, 8, 3, 0);
        for test_frac in [1., 1.5, -0.1, f64::NAN] {
            assert!(matches!(
                parameter_values(&lib, test_frac),
                Err(SurrogateError::InvalidConfigError(_))
            ));
        }
        assert_eq!(1, parameter_values(&lib, 0.95).unwrap().nsamples());
    }

    #[test]
    fn test_param_bounds() {
        let design = ParameterDesign::new(
            vec!["a".to_string(), "b".to_string()],
            array![[1., -2.], [3., 0.], [2., 4.]],
        )
        .unwrap();
        let bounds = ParamBounds::from_design(&design).unwrap();
        assert_eq!(2, bounds.len());
        assert_eq!(
            Some(&ParamBound {
                name: "b".to_string(),
                min: -2.,
                max: 4.
            }),
            bounds.get("b")
        );
        assert_eq!(array![2., 1.], bounds.midpoints());
        assert_abs_diff_eq!(
            array![[1., -2.], [2., 1.], [3., 4.]],
            bounds.linspace(3),
            epsilon = 1e-12
        );
        assert!(bounds.check_dim(&array![1., 2.]).is_ok());
        assert!(bounds.check_dim(&array![1.]).is_err());
    }

    #[test]
    fn test_param_bounds_nan() {
        let design = ParameterDesign::new(vec!["a".to_string()], array![[1.], [f64::NAN]]).unwrap();
        assert!(ParamBounds::from_design(&design).is_err());
    }
}
