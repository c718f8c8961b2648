//! Trained surrogate persistence as JSON.
//!
//! A saved surrogate holds the frequencies and, for each frequency model, the
//! training data, the parameter ranges, the kernel family and the fit result.
//! Field names used by earlier releases are still accepted when loading:
//!
//! | legacy name        | field        |
//! |--------------------|--------------|
//! | `emcee_kernel_map` | `kernel_map` |
//! | `emcee_flatchain`  | `chain`      |
//! | `emcee_flatlnprob` | `lnprob`     |
//! | `center_spectra`   | `center`     |
//! | `mean_spectra`     | `center`     |
//!
//! A field present with a non null value takes precedence over its legacy names.
use crate::errors::{Result, SurrogateError};
use crate::model::{FitResult, GpSpec, TrainedGp};
use crate::params::{ParamBounds, ParameterDesign};
use crate::predictor::{hc_from_gp, set_up_predictions, HcPrediction};
use crate::sampler::sample_hc_from_gp;

use chrono::Local;
use gwbox_gp::{GaussianProcess, KernelFamily};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix of trained surrogate file names
pub const TRAINED_GP_PREFIX: &str = "trained_gp_";

const LEGACY_FIELDS: [(&str, &str); 5] = [
    ("emcee_kernel_map", "kernel_map"),
    ("emcee_flatchain", "chain"),
    ("emcee_flatlnprob", "lnprob"),
    ("center_spectra", "center"),
    ("mean_spectra", "center"),
];

#[derive(Serialize, Deserialize)]
struct GpRecord {
    x: Array2<f64>,
    y: Array1<f64>,
    yerr: Array1<f64>,
    par_dict: ParamBounds,
    #[serde(default)]
    kernel: KernelFamily,
    chain: Option<Array2<f64>>,
    lnprob: Option<Array1<f64>>,
    kernel_map: Option<Array1<f64>>,
    center: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct SurrogateRecord {
    freqs: Array1<f64>,
    gps: Vec<Value>,
}

/// Rename legacy fields of a model record, a canonical non null value winning
fn resolve_legacy_fields(record: &mut Map<String, Value>) {
    for (legacy, canonical) in LEGACY_FIELDS {
        if let Some(value) = record.remove(legacy) {
            let is_set = record.get(canonical).map_or(false, |v| !v.is_null());
            if !is_set && !value.is_null() {
                debug!("Legacy field '{legacy}' read as '{canonical}'");
                record.insert(canonical.to_string(), value);
            }
        }
    }
}

/// Frequency models of a trained spectrum surrogate
#[derive(Clone, Debug)]
pub struct TrainedSurrogate {
    freqs: Array1<f64>,
    models: Vec<TrainedGp>,
}

impl TrainedSurrogate {
    /// Constructor checking one model is given per frequency
    pub fn new(freqs: Array1<f64>, models: Vec<TrainedGp>) -> Result<Self> {
        if freqs.len() != models.len() {
            return Err(SurrogateError::InvalidValue(format!(
                "Frequencies number ({}) should match models number ({})",
                freqs.len(),
                models.len()
            )));
        }
        Ok(TrainedSurrogate { freqs, models })
    }

    /// Frequencies in 1/yr
    pub fn freqs(&self) -> &Array1<f64> {
        &self.freqs
    }

    /// Frequency models
    pub fn models(&self) -> &[TrainedGp] {
        &self.models
    }

    /// Parameter ranges of the training design
    pub fn param_bounds(&self) -> Option<&ParamBounds> {
        self.models.first().map(|m| m.spec().bounds())
    }

    /// MAP conditioned GPs, see [set_up_predictions]
    pub fn set_up_predictions(&self) -> Result<Vec<GaussianProcess<f64>>> {
        set_up_predictions(&self.models)
    }

    /// Characteristic strain predicted at `env_pars` with MAP hyperparameters,
    /// GPs being conditioned on each call. Use [hc_from_gp] with GPs from
    /// [TrainedSurrogate::set_up_predictions] for repeated queries.
    pub fn predict_hc(
        &self,
        env_pars: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<HcPrediction> {
        let gps = self.set_up_predictions()?;
        hc_from_gp(&self.models, &gps, env_pars)
    }

    /// Characteristic strain posterior draws, see [sample_hc_from_gp]
    pub fn sample_hc(
        &self,
        env_pars: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        nsamples: usize,
        seed: Option<u64>,
    ) -> Result<Array2<f64>> {
        sample_hc_from_gp(&self.models, env_pars, nsamples, seed)
    }

    /// JSON representation
    pub fn to_json(&self) -> Result<Value> {
        let gps = self
            .models
            .iter()
            .map(|m| {
                let spec = m.spec();
                let fit = m.fit_result();
                serde_json::to_value(GpRecord {
                    x: spec.design().values().to_owned(),
                    y: spec.y().to_owned(),
                    yerr: spec.yerr().to_owned(),
                    par_dict: spec.bounds().clone(),
                    kernel: spec.kernel(),
                    chain: Some(fit.chain.to_owned()),
                    lnprob: Some(fit.lnprob.to_owned()),
                    kernel_map: Some(fit.kernel_map.to_owned()),
                    center: Some(fit.center),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(serde_json::to_value(SurrogateRecord {
            freqs: self.freqs.to_owned(),
            gps,
        })?)
    }

    /// Rebuild from a JSON representation, legacy field names being accepted
    pub fn from_json(value: Value) -> Result<Self> {
        let record: SurrogateRecord = serde_json::from_value(value)?;
        let mut shared: Option<(Arc<ParameterDesign>, Arc<ParamBounds>)> = None;
        let mut models = Vec::with_capacity(record.gps.len());
        for (i, mut gp) in record.gps.into_iter().enumerate() {
            if let Value::Object(map) = &mut gp {
                resolve_legacy_fields(map);
            }
            let gp: GpRecord = serde_json::from_value(gp)?;
            let chain = gp.chain.ok_or(SurrogateError::MissingChain(i))?;
            let lnprob = gp.lnprob.ok_or(SurrogateError::MissingChain(i))?;
            let kernel_map = gp.kernel_map.ok_or(SurrogateError::MissingKernelMap(i))?;
            let center = gp.center.ok_or(SurrogateError::MissingCenter(i))?;

            let (design, bounds) = match shared.take() {
                Some((design, bounds)) if design.values() == &gp.x && *bounds == gp.par_dict => {
                    (design, bounds)
                }
                _ => {
                    let names = gp.par_dict.iter().map(|b| b.name.to_owned()).collect();
                    (
                        Arc::new(ParameterDesign::new(names, gp.x)?),
                        Arc::new(gp.par_dict),
                    )
                }
            };
            shared = Some((design.clone(), bounds.clone()));
            let spec = GpSpec::with_kernel(design, gp.y, gp.yerr, bounds, gp.kernel)?;
            models.push(TrainedGp::new(
                spec,
                FitResult {
                    chain,
                    lnprob,
                    kernel_map,
                    center,
                },
            )?);
        }
        Self::new(record.freqs, models)
    }

    /// Save as JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, &self.to_json()?)?;
        info!("Trained surrogate saved in {}", path.as_ref().display());
        Ok(())
    }

    /// Load from JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let value: Value = serde_json::from_reader(reader)?;
        Self::from_json(value)
    }
}

/// Output file `trained_gp_<stem>.json` in `dir`, a local timestamp being
/// appended to the stem when the file already exists
pub fn output_path<P: AsRef<Path>>(dir: P, stem: &str) -> PathBuf {
    let dir = dir.as_ref();
    let path = dir.join(format!("{TRAINED_GP_PREFIX}{stem}.json"));
    if path.exists() {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        dir.join(format!("{TRAINED_GP_PREFIX}{stem}{stamp}.json"))
    } else {
        path
    }
}
