//! Spectra library, the read-only input corpus of surrogate training.
//!
//! A library directory holds numpy arrays and a json metadata file:
//! * `gwb.npy`: strain amplitudes indexed by `[sample, frequency, realization]`,
//! * `fobs.npy`: observed frequencies in Hz `[frequency]`,
//! * `sample_params.npy`: physical parameters `[sample, parameter]`,
//! * `library.json`: `{"param_names": [...]}` ordered names of the parameter columns.
use crate::errors::{Result, SurrogateError};

use ndarray::{Array1, Array2, Array3};
use ndarray_npy::{read_npy, write_npy};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Strain amplitudes filename
pub const GWB_FILE: &str = "gwb.npy";
/// Observed frequencies filename
pub const FOBS_FILE: &str = "fobs.npy";
/// Sample parameters filename
pub const SAMPLE_PARAMS_FILE: &str = "sample_params.npy";
/// Library metadata filename
pub const METADATA_FILE: &str = "library.json";

#[derive(Debug, Serialize, Deserialize)]
struct LibraryMetadata {
    param_names: Vec<String>,
}

/// Ensemble of simulated spectra with the parameters used to generate them
#[derive(Clone, Debug)]
pub struct SpectraLibrary {
    gwb: Array3<f64>,
    fobs: Array1<f64>,
    sample_params: Array2<f64>,
    param_names: Vec<String>,
}

impl SpectraLibrary {
    /// Constructor checking shape consistency of the given arrays
    pub fn new(
        gwb: Array3<f64>,
        fobs: Array1<f64>,
        sample_params: Array2<f64>,
        param_names: Vec<String>,
    ) -> Result<Self> {
        let (nsamples, nfreqs, _) = gwb.dim();
        if fobs.len() != nfreqs {
            return Err(SurrogateError::InvalidValue(format!(
                "Frequency axis length ({}) should match spectra frequency number ({})",
                fobs.len(),
                nfreqs
            )));
        }
        if sample_params.nrows() != nsamples {
            return Err(SurrogateError::InvalidValue(format!(
                "Sample parameters rows ({}) should match spectra sample number ({})",
                sample_params.nrows(),
                nsamples
            )));
        }
        Ok(SpectraLibrary {
            gwb,
            fobs,
            sample_params,
            param_names,
        })
    }

    /// Read a library from the given directory
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let gwb: Array3<f64> = read_npy(dir.join(GWB_FILE))?;
        let fobs: Array1<f64> = read_npy(dir.join(FOBS_FILE))?;
        let sample_params: Array2<f64> = read_npy(dir.join(SAMPLE_PARAMS_FILE))?;
        let file = File::open(dir.join(METADATA_FILE))?;
        let metadata: LibraryMetadata = serde_json::from_reader(BufReader::new(file))?;
        Self::new(gwb, fobs, sample_params, metadata.param_names)
    }

    /// Write the library into the given directory, created if needed
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        write_npy(dir.join(GWB_FILE), &self.gwb)?;
        write_npy(dir.join(FOBS_FILE), &self.fobs)?;
        write_npy(dir.join(SAMPLE_PARAMS_FILE), &self.sample_params)?;
        let file = File::create(dir.join(METADATA_FILE))?;
        let metadata = LibraryMetadata {
            param_names: self.param_names.clone(),
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &metadata)?;
        Ok(())
    }

    /// Strain amplitudes `[sample, frequency, realization]`
    pub fn gwb(&self) -> &Array3<f64> {
        &self.gwb
    }

    /// Observed frequencies in Hz
    pub fn fobs(&self) -> &Array1<f64> {
        &self.fobs
    }

    /// Physical parameters `[sample, parameter]`
    pub fn sample_params(&self) -> &Array2<f64> {
        &self.sample_params
    }

    /// Ordered parameter names
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Number of simulated samples
    pub fn nsamples(&self) -> usize {
        self.gwb.dim().0
    }

    /// Number of frequencies
    pub fn nfreqs(&self) -> usize {
        self.gwb.dim().1
    }

    /// Number of realizations per sample
    pub fn nrealizations(&self) -> usize {
        self.gwb.dim().2
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::{StandardNormal, Uniform};
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    /// A small library of power-law spectra `hc ~ A (f/f0)^(-2/3)` with log-normal
    /// realization noise where the amplitude `A` depends on `hard_time` and `mmb_amp`
    pub(crate) fn synthetic_library(
        nsamples: usize,
        nfreqs: usize,
        nreals: usize,
        seed: u64,
    ) -> SpectraLibrary {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let hard_time = Array1::random_using(nsamples, Uniform::new(0.1, 11.), &mut rng);
        let log_mmb = Array1::random_using(nsamples, Uniform::new(8., 9.), &mut rng);
        let mut sample_params = Array2::zeros((nsamples, 2));
        sample_params.column_mut(0).assign(&hard_time);
        sample_params
            .column_mut(1)
            .assign(&log_mmb.mapv(|v| 10f64.powf(v)));

        let f0 = 1. / (10. * crate::YR);
        let fobs = Array1::linspace(1., nfreqs as f64, nfreqs) * f0;
        let noise: Array3<f64> =
            Array3::random_using((nsamples, nfreqs, nreals), StandardNormal, &mut rng);
        let mut gwb = Array3::zeros((nsamples, nfreqs, nreals));
        for ((i, j, k), v) in gwb.indexed_iter_mut() {
            let amp = 1e-15 * 10f64.powf(0.5 * (log_mmb[i] - 8.)) * (1. + 0.05 * hard_time[i]);
            let shape = (fobs[j] / f0).powf(-2. / 3.);
            *v = amp * shape * (0.1 * noise[[i, j, k]]).exp();
        }
        SpectraLibrary::new(
            gwb,
            fobs,
            sample_params,
            vec!["hard_time".to_string(), "mmb_amp".to_string()],
        )
        .expect("valid synthetic library")
    }

    #[test]
    fn test_library_shapes() {
        let lib = synthetic_library(5, 8, 3, 0);
        assert_eq!(5, lib.nsamples());
        assert_eq!(8, lib.nfreqs());
        assert_eq!(3, lib.nrealizations());
        assert_eq!(&["hard_time", "mmb_amp"], lib.param_names());
        assert!(lib.gwb().iter().all(|v| *v > 0.));
    }

    #[test]
    fn test_library_inconsistent_shapes() {
        let gwb = Array3::zeros((2, 3, 4));
        assert!(SpectraLibrary::new(
            gwb.clone(),
            array![1., 2.],
            Array2::zeros((2, 1)),
            vec!["a".to_string()]
        )
        .is_err());
        assert!(SpectraLibrary::new(
            gwb,
            array![1., 2., 3.],
            Array2::zeros((3, 1)),
            vec!["a".to_string()]
        )
        .is_err());
    }

    #[test]
    fn test_library_save_load() {
        let dir = "target/tests/library_save_load";
        let lib = synthetic_library(4, 7, 2, 1);
        lib.save(dir).expect("library saved");
        let loaded = SpectraLibrary::from_dir(dir).expect("library loaded");
        assert_eq!(lib.gwb(), loaded.gwb());
        assert_eq!(lib.fobs(), loaded.fobs());
        assert_eq!(lib.sample_params(), loaded.sample_params());
        assert_eq!(lib.param_names(), loaded.param_names());
    }

    #[test]
    fn test_library_missing_dir() {
        assert!(SpectraLibrary::from_dir("target/tests/not_a_library").is_err());
    }
}
