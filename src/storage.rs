use faer::Mat;

use crate::mcmc::Sample;

/// Result of one sampling run.
#[derive(Debug, Clone)]
pub struct Trace {
    /// One column per stored sample, nCoefs rows.
    pub coefficients: Mat<f64>,
    pub z: Vec<f64>,
    pub marg_lik_numerator: Vec<f64>,
    pub marg_lik_denominator: Vec<f64>,
    pub n_accepted: usize,
    pub high_density_log_posterior: f64,
}

/// Append-only accumulation of chain draws and bridge terms.
///
/// The coefficient matrix is allocated at the configured sample count up
/// front; the z and bridge sequences grow one entry per stored iteration.
pub(crate) struct SampleStorage {
    coef_samples: Mat<f64>,
    n_saved: usize,
    z_samples: Vec<f64>,
    numerator: Vec<f64>,
    denominator: Vec<f64>,
}

impl SampleStorage {
    pub(crate) fn new(n_coefs: usize, n_samples: usize) -> Self {
        Self {
            coef_samples: Mat::zeros(n_coefs, n_samples),
            n_saved: 0,
            z_samples: Vec::with_capacity(n_samples),
            numerator: Vec::new(),
            denominator: Vec::new(),
        }
    }

    /// Append one coefficient column and one z value. Writing past the
    /// configured capacity is a bug in the store cadence, not a data error.
    pub(crate) fn store_parameters(&mut self, sample: &Sample) {
        assert!(
            self.n_saved < self.coef_samples.ncols(),
            "sample store capacity exceeded"
        );
        assert!(sample.coefs.nrows() == self.coef_samples.nrows());

        for j in 0..self.coef_samples.nrows() {
            self.coef_samples[(j, self.n_saved)] = sample.coefs[j];
        }
        self.n_saved += 1;
        self.z_samples.push(sample.z);
    }

    /// Append one numerator/denominator bridge pair, independent of the
    /// coefficient cursor.
    pub(crate) fn store_marg_lik_terms(&mut self, numerator: f64, denominator: f64) {
        self.numerator.push(numerator);
        self.denominator.push(denominator);
    }

    pub(crate) fn n_saved(&self) -> usize {
        self.n_saved
    }

    pub(crate) fn finalize(self, n_accepted: usize, high_density_log_posterior: f64) -> Trace {
        Trace {
            coefficients: self.coef_samples,
            z: self.z_samples,
            marg_lik_numerator: self.numerator,
            marg_lik_denominator: self.denominator,
            n_accepted,
            high_density_log_posterior,
        }
    }
}
