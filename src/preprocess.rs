//! Spectrum preprocessing: raw realizations of simulated spectra are turned into
//! smoothed, zero-centered log-spectrum training targets with their uncertainties.
use crate::errors::{Result, SurrogateError};
use crate::library::SpectraLibrary;

use linfa_linalg::{cholesky::*, triangular::*};
use log::{debug, warn};
use ndarray::{s, Array, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Zip};
use ndarray_stats::{interpolate::Midpoint, Quantile1dExt};
use noisy_float::types::{n64, N64};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// Year duration in seconds, frequencies are expressed in 1/yr
pub const YR: f64 = 365.25 * 86400.0;

/// Lower bound of squared amplitudes before taking logarithms
pub const SPECTRUM_FLOOR: f64 = 1e-40;

/// Smoothing window length (number of frequencies)
pub const SAVGOL_WINDOW: usize = 7;
/// Smoothing polynomial order
pub const SAVGOL_ORDER: usize = 3;

/// Statistic used to center spectra, across realizations and across samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CenterMeasure {
    /// Arithmetic mean
    Mean,
    /// Median, midpoint of the two middle values for an even count
    #[default]
    Median,
}

impl CenterMeasure {
    /// All supported center measures
    pub const ALL: [CenterMeasure; 2] = [CenterMeasure::Mean, CenterMeasure::Median];

    /// Lowercase name of the measure
    pub fn name(&self) -> &'static str {
        match self {
            CenterMeasure::Mean => "mean",
            CenterMeasure::Median => "median",
        }
    }

    /// Center value of the given (non empty) values
    pub fn center(&self, values: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> f64 {
        match self {
            CenterMeasure::Mean => values.mean().unwrap_or(f64::NAN),
            CenterMeasure::Median => median(values),
        }
    }
}

impl fmt::Display for CenterMeasure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CenterMeasure {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| SurrogateError::UnknownCenterMeasure {
                name: s.to_string(),
                valid: Self::ALL.map(|c| c.name()).join(", "),
            })
    }
}

impl From<CenterMeasure> for String {
    fn from(center: CenterMeasure) -> String {
        center.name().to_string()
    }
}

impl TryFrom<String> for CenterMeasure {
    type Error = SurrogateError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

fn median(values: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> f64 {
    let finite: Option<Array1<N64>> = values.iter().map(|&v| N64::try_new(v)).collect();
    finite
        .and_then(|mut v| v.quantile_mut(n64(0.5), &Midpoint).ok())
        .map_or(f64::NAN, |m| m.raw())
}

/// Training targets derived from a spectra library
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingSet {
    /// Dimensionless frequencies (fobs x YR)
    pub freqs: Array1<f64>,
    /// Standard deviation of log10 spectra across realizations `[sample, freq]`
    pub yerr: Array2<f64>,
    /// Smoothed zero-centered log10 spectra `[sample, freq]`
    pub yobs: Array2<f64>,
    /// Center removed from each frequency `[freq]`
    pub centers: Array1<f64>,
}

impl TrainingSet {
    /// Number of frequency bins
    pub fn nfreqs(&self) -> usize {
        self.freqs.len()
    }

    /// Number of training samples
    pub fn nsamples(&self) -> usize {
        self.yobs.nrows()
    }
}

/// Index of the first training sample, leading samples being reserved as a test set
pub fn test_index(nsamples: usize, test_frac: f64) -> usize {
    (nsamples as f64 * test_frac).floor() as usize
}

/// Squared amplitude lower bounded by [SPECTRUM_FLOOR], non finite values are floored too
pub fn clamp_floor(v: f64) -> f64 {
    if v.is_finite() && v >= SPECTRUM_FLOOR {
        v
    } else {
        SPECTRUM_FLOOR
    }
}

/// Savitzky-Golay smoothing filter.
///
/// Each point is replaced by the value of the least-squares polynomial fitted on
/// the window centered on it. At both ends the polynomial fitted on the first
/// (resp. last) full window is evaluated instead.
#[derive(Clone, Debug)]
pub struct SavgolFilter {
    window: usize,
    /// Projection onto polynomials over one window (window, window)
    hat: Array2<f64>,
}

impl SavgolFilter {
    /// Constructor given an odd window length and a polynomial order lower than the window
    pub fn new(window: usize, order: usize) -> Result<Self> {
        if window % 2 == 0 || order >= window {
            return Err(SurrogateError::InvalidValue(format!(
                "Smoothing window should be odd and greater than polynomial order, got window={window} order={order}"
            )));
        }
        let half = (window / 2) as f64;
        let a = Array2::from_shape_fn((window, order + 1), |(i, p)| {
            (i as f64 - half).powi(p as i32)
        });
        // hat = A (A^T A)^-1 A^T
        let ata_chol = a.t().dot(&a).cholesky()?;
        let y = ata_chol.solve_triangular(&a.t(), UPLO::Lower)?;
        let coefs = ata_chol.t().solve_triangular(&y, UPLO::Upper)?;
        Ok(SavgolFilter {
            window,
            hat: a.dot(&coefs),
        })
    }

    /// Smooth the given values, at least `window` values are required
    pub fn apply(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<Array1<f64>> {
        let n = y.len();
        let w = self.window;
        if n < w {
            return Err(SurrogateError::InvalidValue(format!(
                "At least {w} values are required for smoothing, got {n}"
            )));
        }
        let half = w / 2;
        let first = y.slice(s![..w]);
        let last = y.slice(s![n - w..]);
        let smoothed = Array::from_shape_fn(n, |i| {
            if i < half {
                self.hat.row(i).dot(&first)
            } else if i >= n - half {
                self.hat.row(i + w - n).dot(&last)
            } else {
                self.hat.row(half).dot(&y.slice(s![i - half..=i + half]))
            }
        });
        Ok(smoothed)
    }
}

/// Smoothed and zero-centered log10 spectra of the given library.
///
/// * `nfreqs`: number of lowest frequencies kept (all of them if greater than available)
/// * `test_frac`: fraction of leading samples reserved for testing
/// * `center`: statistic used across realizations and across samples
pub fn smoothed_gwb(
    library: &SpectraLibrary,
    nfreqs: usize,
    test_frac: f64,
    center: CenterMeasure,
) -> Result<TrainingSet> {
    if !(0.0..1.0).contains(&test_frac) {
        return Err(SurrogateError::InvalidConfigError(format!(
            "Test fraction should be in [0, 1), got {test_frac}"
        )));
    }
    let test_ind = test_index(library.nsamples(), test_frac);
    let nfreqs = nfreqs.min(library.nfreqs());
    if test_ind >= library.nsamples() {
        return Err(SurrogateError::InvalidConfigError(
            "No training sample left after test set reservation".to_string(),
        ));
    }
    if library.nrealizations() == 0 {
        return Err(SurrogateError::InvalidValue(
            "Spectra library holds no realization".to_string(),
        ));
    }
    let filter = SavgolFilter::new(SAVGOL_WINDOW, SAVGOL_ORDER)?;
    debug!(
        "Preprocess spectra of samples {}.. on {} frequencies",
        test_ind, nfreqs
    );

    let gwb = library
        .gwb()
        .slice(s![test_ind.., ..nfreqs, ..])
        .mapv(|v| clamp_floor(v * v));
    let log_gwb = gwb.mapv(f64::log10);

    let centered = Zip::from(gwb.lanes(Axis(2))).map_collect(|lane| center.center(&lane).log10());
    let mut smoothed = Array2::zeros(centered.raw_dim());
    for (mut row, raw) in smoothed.rows_mut().into_iter().zip(centered.rows()) {
        row.assign(&filter.apply(&raw)?);
    }

    let yerr = log_gwb.std_axis(Axis(2), 0.);
    if yerr.iter().any(|v| !v.is_finite()) {
        warn!("Non finite uncertainties found in spectra library");
    }

    let centers: Array1<f64> = smoothed
        .columns()
        .into_iter()
        .map(|col: ArrayView1<f64>| center.center(&col))
        .collect();
    let yobs = &smoothed - &centers.view().insert_axis(Axis(0));
    let freqs = library.fobs().slice(s![..nfreqs]).mapv(|f| f * YR);

    Ok(TrainingSet {
        freqs,
        yerr,
        yobs,
        centers,
    })
}
