//! Posterior sampling of the characteristic strain.
//!
//! Each frequency draw picks a hyperparameter vector from the posterior chain
//! (with replacement), conditions the GP on the training data with it and draws
//! one sample of the conditional distribution at the requested parameters.
//! Frequencies are processed in parallel, each one with its own random stream
//! so that a seeded run gives the same result whatever the number of threads.
use crate::errors::{Result, SurrogateError};
use crate::model::TrainedGp;
use crate::predictor::hc_from_rho;

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// Below this number of draws the sampled distribution is poorly described
pub const MIN_ADVISED_SAMPLES: usize = 100;

/// Whether `nsamples` posterior draws are too few to describe the distribution
pub fn is_undersampled(nsamples: usize) -> bool {
    nsamples < MIN_ADVISED_SAMPLES
}

/// Draw `nsamples` characteristic strain spectra at parameters `env_pars`,
/// returned as a `(nsamples, nfreqs)` array.
pub fn sample_hc_from_gp(
    models: &[TrainedGp],
    env_pars: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    nsamples: usize,
    seed: Option<u64>,
) -> Result<Array2<f64>> {
    if is_undersampled(nsamples) {
        warn!(
            "{nsamples} samples drawn, at least {MIN_ADVISED_SAMPLES} are advised to sample the posterior"
        );
    }
    if let Some(model) = models.first() {
        model.spec().bounds().check_dim(env_pars)?;
    }
    for (i, model) in models.iter().enumerate() {
        if model.chain().nrows() == 0 {
            return Err(SurrogateError::MissingChain(i));
        }
    }

    let mut rng = match seed {
        Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
        None => Xoshiro256Plus::from_entropy(),
    };
    let rngs: Vec<Xoshiro256Plus> = models
        .iter()
        .map(|_| {
            let r = rng.clone();
            rng.jump();
            r
        })
        .collect();

    let n_threads = std::thread::available_parallelism()
        .map_or(1, |n| n.get())
        .saturating_sub(1)
        .max(1);
    debug!("Sample {} frequencies with {n_threads} threads", models.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()?;

    let x = env_pars.to_owned().insert_axis(Axis(0));
    let per_freq = pool.install(|| {
        models
            .par_iter()
            .zip(rngs.into_par_iter())
            .map(|(model, mut rng)| sample_frequency(model, &x, nsamples, &mut rng))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut hc = Array2::zeros((nsamples, models.len()));
    for (mut col, samples) in hc.columns_mut().into_iter().zip(per_freq) {
        col.assign(&samples);
    }
    Ok(hc)
}

fn sample_frequency(
    model: &TrainedGp,
    x: &Array2<f64>,
    nsamples: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<Array1<f64>> {
    let chain = model.chain();
    let mut hc = Array1::zeros(nsamples);
    for h in hc.iter_mut() {
        let row = chain.row(rng.gen_range(0..chain.nrows()));
        let gp = model.spec().condition(&row)?;
        let rho = gp.sample_conditional(x, 1, rng)?;
        *h = hc_from_rho(model.center() + rho[[0, 0]]);
    }
    Ok(hc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::small_spec;
    use crate::model::FitResult;
    use ndarray::{array, Array};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use ndarray_stats::QuantileExt;

    fn trained(center: f64, seed: u64) -> TrainedGp {
        let spec = small_spec("ExpSquaredKernel");
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let chain = Array::random_using((30, 3), Normal::new(0., 0.3).unwrap(), &mut rng);
        let lnprob = chain
            .rows()
            .into_iter()
            .map(|row| spec.ln_posterior(&row))
            .collect::<Array1<f64>>();
        let kernel_map = chain.row(lnprob.argmax().unwrap()).to_owned();
        TrainedGp::new(
            spec,
            FitResult {
                chain,
                lnprob,
                kernel_map,
                center,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_sample_hc_from_gp() {
        let models = vec![trained(-30., 0), trained(-31., 1), trained(-32., 2)];
        let hc = sample_hc_from_gp(&models, &array![3., 8.5], 120, Some(42)).unwrap();
        assert_eq!((120, 3), hc.dim());
        assert!(hc.iter().all(|v| v.is_finite() && *v > 0.));
        // strain scales with the frequency center
        let means = hc.mean_axis(Axis(0)).unwrap();
        assert!(means[0] > means[1] && means[1] > means[2]);
    }

    #[test]
    fn test_sample_hc_few_samples() {
        let models = vec![trained(-30., 0)];
        assert!(is_undersampled(50));
        assert!(!is_undersampled(MIN_ADVISED_SAMPLES));
        let hc = sample_hc_from_gp(&models, &array![3., 8.5], 50, Some(0)).unwrap();
        assert_eq!((50, 1), hc.dim());
        assert!(hc.iter().all(|v| v.is_finite() && *v > 0.));
    }

    #[test]
    fn test_sample_hc_seeded() {
        let models = vec![trained(-30., 0), trained(-31., 1)];
        let env = array![5., 8.2];
        let h1 = sample_hc_from_gp(&models, &env, 20, Some(7)).unwrap();
        let h2 = sample_hc_from_gp(&models, &env, 20, Some(7)).unwrap();
        let h3 = sample_hc_from_gp(&models, &env, 20, Some(8)).unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_sample_hc_errors() {
        let models = vec![trained(-30., 0)];
        assert!(sample_hc_from_gp(&models, &array![3.], 10, None).is_err());

        let spec = small_spec("ExpSquaredKernel");
        let empty = TrainedGp::new(
            spec,
            FitResult {
                chain: Array2::zeros((0, 3)),
                lnprob: Array1::zeros(0),
                kernel_map: Array1::zeros(3),
                center: 0.,
            },
        )
        .unwrap();
        match sample_hc_from_gp(&[empty], &array![3., 8.5], 10, None) {
            Err(SurrogateError::MissingChain(0)) => (),
            res => panic!("unexpected result {res:?}"),
        }
    }
}
