//! Surrogate training from a spectra library.
use crate::config::TrainConfig;
use crate::errors::{Result, SurrogateError};
use crate::fitter::fit_kernel_params;
use crate::library::SpectraLibrary;
use crate::model::GpSpec;
use crate::params::{parameter_values, ParamBounds, ParameterDesign};
use crate::persistence::{output_path, TrainedSurrogate};
use crate::preprocess::{smoothed_gwb, TrainingSet};

use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One model specification per frequency bin, all of them sharing the design
/// and its parameter ranges
pub fn create_gp_specs(
    training: &TrainingSet,
    design: ParameterDesign,
    kernel: &str,
) -> Result<Vec<GpSpec>> {
    if design.nsamples() != training.nsamples() {
        return Err(SurrogateError::InvalidValue(format!(
            "Design samples number ({}) should match training samples number ({})",
            design.nsamples(),
            training.nsamples()
        )));
    }
    let bounds = Arc::new(ParamBounds::from_design(&design)?);
    let design = Arc::new(design);
    training
        .yobs
        .columns()
        .into_iter()
        .zip(training.yerr.columns())
        .map(|(y, yerr)| {
            GpSpec::new(
                design.clone(),
                y.to_owned(),
                yerr.to_owned(),
                bounds.clone(),
                kernel,
            )
        })
        .collect()
}

/// Train a surrogate on `library`, then save it in `library_dir` as
/// `trained_gp_<library_dir name>.json`.
///
/// Returns the trained surrogate and the path of the saved file.
pub fn train_gp<P: AsRef<Path>>(
    library: &SpectraLibrary,
    library_dir: P,
    config: &TrainConfig,
) -> Result<(TrainedSurrogate, PathBuf)> {
    crate::init_logger();
    config.check()?;

    let training = smoothed_gwb(
        library,
        config.nfreqs,
        config.test_frac,
        config.center_measure,
    )?;
    let design = parameter_values(library, config.test_frac)?;
    info!(
        "Train {} frequencies on {} samples of {} parameters with {}",
        training.nfreqs(),
        design.nsamples(),
        design.nparams(),
        config.kernel
    );
    let specs = create_gp_specs(&training, design, &config.kernel)?;
    let models = fit_kernel_params(specs, &training.centers, config)?;
    let surrogate = TrainedSurrogate::new(training.freqs, models)?;

    let dir = library_dir.as_ref();
    let stem = dir
        .canonicalize()
        .ok()
        .and_then(|d| d.file_name().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "library".to_string());
    let path = output_path(dir, &stem);
    surrogate.save(&path)?;
    info!("GPs are saved at {}", path.display());
    Ok((surrogate, path))
}

/// Load the library stored in `library_dir` then [train_gp]
pub fn train_gp_from_dir<P: AsRef<Path>>(
    library_dir: P,
    config: &TrainConfig,
) -> Result<(TrainedSurrogate, PathBuf)> {
    let library = SpectraLibrary::from_dir(library_dir.as_ref())?;
    train_gp(&library, library_dir, config)
}
