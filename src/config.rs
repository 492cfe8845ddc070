use faer::{Col, Mat};

use crate::glm::ResponseFamily;
use crate::prior::GPrior;

/// Immutable design matrix and response for one model fit.
///
/// The matrix is produced by an external design provider (fractional
/// polynomial and grouped-covariate expansion happen there); column 0 is the
/// intercept. Nothing in this crate mutates it.
#[derive(Debug, Clone)]
pub struct ModelData {
    pub design: Mat<f64>,
    pub response: Col<f64>,
}

impl ModelData {
    pub fn new(design: Mat<f64>, response: Col<f64>) -> Self {
        Self { design, response }
    }

    pub fn n_obs(&self) -> usize {
        self.design.nrows()
    }

    pub fn n_coefs(&self) -> usize {
        self.design.ncols()
    }
}

/// Model configuration consumed read-only by the IWLS engine and the sampler.
pub struct GlmModelConfig<F: ResponseFamily> {
    /// Link, variance and log-likelihood capability of the response.
    pub family: F,
    /// Prior density of the covariance factor g.
    pub g_prior: GPrior,
    /// Per-observation dispersions modulating the GLM variance.
    pub dispersions: Col<f64>,
    /// Starting linear predictor for the first IWLS run.
    pub lin_pred_start: Col<f64>,
    /// Scale factor dividing the design cross-product in the g-prior
    /// precision (model specific, supplied by the caller).
    pub prior_scale: f64,
}

/// Configuration of one sampling run.
///
/// There is deliberately no `Default`: the convergence tolerance is a
/// required input, and guessing one here would silently change which IWLS
/// fixed points count as converged.
#[derive(Debug, Clone, Copy)]
pub struct McmcSettings {
    /// Total Markov chain iterations.
    pub iterations: usize,
    /// Iterations discarded before any sample is stored.
    pub burnin: usize,
    /// Thinning interval between stored samples.
    pub step: usize,
    /// Compute Chib-Jeliazkov bridge terms at every stored iteration.
    pub estimate_marg_lik: bool,
    /// The caller's claim that this is the intercept-only model; checked
    /// against the design width at sampler construction.
    pub is_null_model: bool,
    /// Hold z fixed at `fixed_z` instead of sampling its posterior.
    pub use_fixed_z: bool,
    /// The fixed z value, read only when `use_fixed_z` is set.
    pub fixed_z: f64,
    /// Mode of the approximate marginal z posterior, the chain start.
    pub start_z: f64,
    /// Iteration cap for IWLS runs to convergence.
    pub max_iwls_iterations: usize,
    /// IWLS convergence tolerance on the coefficient scale.
    pub tolerance: f64,
    /// Seed of the sampler-owned random stream.
    pub seed: u64,
}

impl McmcSettings {
    /// Number of samples a full run stores.
    pub fn n_samples(&self) -> usize {
        self.iterations.saturating_sub(self.burnin).div_ceil(self.step)
    }
}
