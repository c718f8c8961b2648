//! Point predictions of the characteristic strain from MAP models.
use crate::errors::{Result, SurrogateError};
use crate::model::TrainedGp;

use gwbox_gp::GaussianProcess;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1};

/// Factor applied to `|mean|` to replace a negative predicted variance
pub const VARIANCE_FLOOR_FACTOR: f64 = 1e-5;

/// Predicted variance, a negative (or nan) value being replaced by `1e-5 x |mean|`
pub fn guard_variance(mean: f64, var: f64) -> f64 {
    if var >= 0. {
        var
    } else {
        VARIANCE_FLOOR_FACTOR * mean.abs()
    }
}

/// Characteristic strain given the log10 squared strain `rho`
pub fn hc_from_rho(rho: f64) -> f64 {
    10f64.powf(rho).sqrt()
}

/// Characteristic strain predictions, one entry per frequency
#[derive(Clone, Debug, PartialEq)]
pub struct HcPrediction {
    /// Characteristic strain
    pub hc: Array1<f64>,
    /// Predicted log10 squared strain: center + residual mean
    pub rho: Array1<f64>,
    /// Residual mean and standard deviation `[freq, 2]`
    pub rho_pred: Array2<f64>,
}

/// GPs conditioned with the MAP hyperparameters of each frequency model
pub fn set_up_predictions(models: &[TrainedGp]) -> Result<Vec<GaussianProcess<f64>>> {
    models.iter().map(|m| m.map_gp()).collect()
}

/// Characteristic strain predicted by the `gps` of the `models` at parameters `env_pars`
pub fn hc_from_gp(
    models: &[TrainedGp],
    gps: &[GaussianProcess<f64>],
    env_pars: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> Result<HcPrediction> {
    if models.len() != gps.len() {
        return Err(SurrogateError::InvalidValue(format!(
            "GPs number ({}) should match models number ({})",
            gps.len(),
            models.len()
        )));
    }
    if let Some(model) = models.first() {
        model.spec().bounds().check_dim(env_pars)?;
    }
    let x = env_pars.to_owned().insert_axis(Axis(0));

    let nfreqs = models.len();
    let mut hc = Array1::zeros(nfreqs);
    let mut rho = Array1::zeros(nfreqs);
    let mut rho_pred = Array2::zeros((nfreqs, 2));
    for (i, (model, gp)) in models.iter().zip(gps).enumerate() {
        let (mean, var) = gp.predict_valvar(&x)?;
        let std = guard_variance(mean[0], var[0]).sqrt();
        rho_pred[[i, 0]] = mean[0];
        rho_pred[[i, 1]] = std;
        rho[i] = model.center() + mean[0];
        hc[i] = hc_from_rho(rho[i]);
    }
    Ok(HcPrediction { hc, rho, rho_pred })
}
