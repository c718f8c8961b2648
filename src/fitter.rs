//! Kernel hyperparameters posterior sampling, one frequency bin after another.
//!
//! For each bin the ensemble sampler goes through the following stages:
//! 1. walkers are initialized around `ln(1) = 0` with a tiny gaussian spread,
//! 2. a first burn-in is run then its chain discarded,
//! 3. walkers are reseeded tightly around the best walker of the first burn-in
//!    and a second burn-in is run, its chain discarded as well,
//! 4. the production run is retained: its flattened chain, log-posterior values
//!    and the chain row of maximum log-posterior (MAP) make the fit result.
use crate::config::TrainConfig;
use crate::errors::{Result, SurrogateError};
use crate::model::{FitResult, GpSpec, TrainedGp};

use gwbox_mcmc::EnsembleSampler;
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use std::fmt;
use std::time::Instant;

/// Spread of the initial walkers
pub const INIT_SPREAD: f64 = 1e-4;
/// Spread of the walkers reseeded around the best first burn-in walker
pub const RESEED_SPREAD: f64 = 1e-8;

/// Stages of the posterior sampling of one frequency bin
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitStage {
    /// Walkers initialization
    Initialize,
    /// First burn-in
    BurnIn1,
    /// Second burn-in after reseeding
    BurnIn2,
    /// Retained run
    Production,
    /// Fit result extracted
    Done,
}

impl fmt::Display for FitStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            FitStage::Initialize => "Initialize walkers",
            FitStage::BurnIn1 => "Running burn-in",
            FitStage::BurnIn2 => "Running second burn-in",
            FitStage::Production => "Running production",
            FitStage::Done => "Done",
        };
        write!(f, "{s}")
    }
}

/// Check the number of walkers against the kernel dimension
pub fn check_walkers(nwalkers: usize, min_walkers: usize, ndim: usize) -> Result<()> {
    let min = min_walkers.max(2 * ndim);
    if nwalkers % 2 != 0 || nwalkers < min {
        return Err(SurrogateError::InvalidConfigError(format!(
            "Number of walkers should be even and at least {min}, got {nwalkers}"
        )));
    }
    Ok(())
}

/// Sample kernel hyperparameters posterior of every frequency bin model,
/// `centers` being the values removed from the targets of each bin.
pub fn fit_kernel_params(
    specs: Vec<GpSpec>,
    centers: &Array1<f64>,
    config: &TrainConfig,
) -> Result<Vec<TrainedGp>> {
    config.check()?;
    if specs.len() != centers.len() {
        return Err(SurrogateError::InvalidConfigError(format!(
            "Centers number ({}) should match models number ({})",
            centers.len(),
            specs.len()
        )));
    }
    if let Some(spec) = specs.first() {
        check_walkers(config.nwalkers, config.min_walkers, spec.ndim())?;
    }
    let mut rng = match config.seed {
        Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
        None => Xoshiro256Plus::from_entropy(),
    };

    let nfreqs = specs.len();
    specs
        .into_iter()
        .zip(centers.iter())
        .enumerate()
        .map(|(ifreq, (spec, &center))| {
            let noise_rng = rng.clone();
            rng.jump();
            let mcmc_rng = rng.clone();
            rng.jump();
            info!("Fit frequency {}/{}", ifreq + 1, nfreqs);
            fit_frequency(spec, center, config, noise_rng, mcmc_rng)
        })
        .collect()
}

/// Sample kernel hyperparameters posterior of one frequency bin model
fn fit_frequency(
    spec: GpSpec,
    center: f64,
    config: &TrainConfig,
    mut noise_rng: Xoshiro256Plus,
    mcmc_rng: Xoshiro256Plus,
) -> Result<TrainedGp> {
    let ndim = spec.ndim();
    let nwalkers = config.nwalkers;
    let burn_steps = config.burn_steps();
    check_walkers(nwalkers, config.min_walkers, ndim)?;

    let start = Instant::now();
    let mut sampler = EnsembleSampler::new_with_rng(nwalkers, ndim, spec.clone(), mcmc_rng)?;

    info!("{}", FitStage::Initialize);
    let p0: Array2<f64> =
        Array2::random_using((nwalkers, ndim), StandardNormal, &mut noise_rng) * INIT_SPREAD;

    info!("{} ({burn_steps} steps)", FitStage::BurnIn1);
    let state = sampler.run_mcmc(&p0, burn_steps)?;
    sampler.reset();

    info!("{} ({burn_steps} steps)", FitStage::BurnIn2);
    let best = state.best_position().to_owned();
    debug!(
        "Reseed walkers around {} (ln_prob={})",
        best,
        state.ln_probs[state.best_walker()]
    );
    let noise: Array2<f64> = Array2::random_using((nwalkers, ndim), StandardNormal, &mut noise_rng);
    let p0 = noise * RESEED_SPREAD + best.insert_axis(Axis(0));
    let state = sampler.run_mcmc(&p0, burn_steps)?;
    sampler.reset();

    info!("{} ({} steps)", FitStage::Production, config.nsamples);
    sampler.run_mcmc_from_state(state, config.nsamples)?;
    debug!(
        "Production mean acceptance fraction={}",
        sampler.acceptance_fraction().mean().unwrap_or(0.)
    );

    let chain = sampler.flatchain();
    let lnprob = sampler.flat_ln_prob();
    let kernel_map = chain.row(lnprob.argmax()?).to_owned();
    info!(
        "{} in {:.2} min, MAP={} ",
        FitStage::Done,
        start.elapsed().as_secs_f64() / 60.,
        kernel_map
    );

    TrainedGp::new(
        spec,
        FitResult {
            chain,
            lnprob,
            kernel_map,
            center,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::small_spec;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn config() -> TrainConfig {
        TrainConfig::default()
            .nwalkers(8)
            .nsamples(40)
            .burn_frac(0.25)
            .seed(42)
    }

    #[test]
    fn test_fit_kernel_params() {
        let specs = vec![small_spec("ExpSquaredKernel"), small_spec("Matern52Kernel")];
        let trained = fit_kernel_params(specs, &array![-30., -31.], &config()).unwrap();
        assert_eq!(2, trained.len());
        for (gp, center) in trained.iter().zip([-30., -31.]) {
            assert_eq!((8 * 40, 3), gp.chain().dim());
            assert_eq!(8 * 40, gp.lnprob().len());
            assert_eq!(center, gp.center());
            // MAP is the chain row of maximum log-posterior
            let imax = gp.lnprob().argmax().unwrap();
            assert_eq!(gp.chain().row(imax), gp.kernel_map().view());
            assert!(gp.lnprob().iter().all(|lp| *lp <= gp.lnprob()[imax]));
            assert!(gp.lnprob()[imax].is_finite());
            assert_abs_diff_eq!(
                gp.spec().ln_posterior(gp.kernel_map()),
                gp.lnprob()[imax],
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_fit_kernel_params_seeded() {
        let fit = |seed| {
            fit_kernel_params(
                vec![small_spec("ExpKernel")],
                &array![0.],
                &config().nsamples(10).seed(seed),
            )
            .unwrap()
        };
        let (t1, t2, t3) = (fit(1), fit(1), fit(2));
        assert_eq!(t1[0].fit_result(), t2[0].fit_result());
        assert_ne!(t1[0].chain(), t3[0].chain());
    }

    #[test]
    fn test_map_prediction_within_uncertainty() {
        let trained = fit_kernel_params(
            vec![small_spec("ExpSquaredKernel")],
            &array![0.],
            &config().nsamples(200),
        )
        .unwrap();
        let spec = trained[0].spec();
        let gp = trained[0].map_gp().unwrap();
        let mean = gp.predict(spec.design().values()).unwrap();
        for ((m, y), e) in mean.iter().zip(spec.y()).zip(spec.yerr()) {
            assert!((m - y).abs() <= *e, "residual {} above {}", (m - y).abs(), e);
        }
    }

    #[test]
    fn test_walkers_validation() {
        assert!(check_walkers(6, 2, 3).is_ok());
        assert!(check_walkers(4, 2, 3).is_err());
        assert!(check_walkers(8, 10, 3).is_err());
        assert!(check_walkers(7, 2, 3).is_err());

        let specs = vec![small_spec("ExpSquaredKernel")];
        assert!(fit_kernel_params(specs.clone(), &array![0.], &config().nwalkers(4)).is_err());
        assert!(fit_kernel_params(specs, &array![0., 1.], &config()).is_err());
    }

    #[test]
    fn test_zero_burn_in() {
        let trained = fit_kernel_params(
            vec![small_spec("Matern32Kernel")],
            &array![0.],
            &config().burn_frac(0.).nsamples(5),
        )
        .unwrap();
        assert_eq!((40, 3), trained[0].chain().dim());
    }
}
