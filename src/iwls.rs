use faer::linalg::solvers::{Llt, Solve};
use faer::{Col, Mat, Scale, Side};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{GlmModelConfig, ModelData};
use crate::glm::ResponseFamily;
use crate::math::{self, criterion};
use crate::mcmc::Sample;

#[derive(Error, Debug)]
pub enum IwlsError {
    /// The weighted cross-product plus scaled prior precision was not
    /// positive definite. Carries the 1-based IWLS round and the z = log(g)
    /// in effect; the chain cannot continue past this point.
    #[error(
        "Cholesky factorization of the coefficient precision failed in IWLS iteration {iteration} for z={z}"
    )]
    NotPositiveDefinite { iteration: usize, z: f64 },

    #[error(
        "Cholesky factorization of the scaled design cross-product failed during engine construction"
    )]
    PriorNotPositiveDefinite,

    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Gaussian approximation of the conditional coefficient posterior at one g:
/// mean, lower Cholesky factor L of the precision Q = LL', its log
/// determinant, and the linear predictor at the mean.
///
/// Owned by the engine that produced it; the sampler clones it into state
/// snapshots.
#[derive(Debug, Clone)]
pub struct ProposalInfo {
    pub coefs: Col<f64>,
    pub factor: Mat<f64>,
    pub log_precision_determinant: f64,
    pub lin_pred: Col<f64>,
}

/// Iteratively weighted least squares engine for one model fit.
///
/// Construction fixes the design, the prior precision structure and its
/// cached cross-product determinant; every proposal of the Markov chain then
/// reuses the same engine with a fresh g and starting point.
pub struct Iwls<'m, F: ResponseFamily> {
    data: &'m ModelData,
    config: &'m GlmModelConfig<F>,
    n_obs: usize,
    n_coefs: usize,
    is_null_model: bool,
    use_fixed_z: bool,
    inv_sqrt_dispersions: Col<f64>,
    /// Row/column 0 identically zero; non-intercept block is the scaled
    /// design cross-product divided by the prior scale. All zero for the
    /// null model.
    prior_precision: Mat<f64>,
    /// log det of the scaled non-intercept cross-product (not divided by the
    /// prior scale); 0 for the null model where no factor exists.
    log_crossprod_determinant: f64,
    epsilon: f64,
    results: ProposalInfo,
}

impl<'m, F: ResponseFamily> Iwls<'m, F> {
    pub fn new(
        data: &'m ModelData,
        config: &'m GlmModelConfig<F>,
        use_fixed_z: bool,
        epsilon: f64,
    ) -> Result<Self, IwlsError> {
        let n_obs = data.n_obs();
        let n_coefs = data.n_coefs();

        if n_coefs == 0 {
            return Err(IwlsError::DimensionMismatch {
                what: "design columns",
                expected: 1,
                actual: 0,
            });
        }
        for (what, actual) in [
            ("response", data.response.nrows()),
            ("dispersions", config.dispersions.nrows()),
            ("starting linear predictor", config.lin_pred_start.nrows()),
        ] {
            if actual != n_obs {
                return Err(IwlsError::DimensionMismatch {
                    what,
                    expected: n_obs,
                    actual,
                });
            }
        }

        let inv_sqrt_dispersions = Col::from_fn(n_obs, |i| 1.0 / config.dispersions[i].sqrt());

        let is_null_model = n_coefs == 1;
        let mut prior_precision = Mat::zeros(n_coefs, n_coefs);
        let mut log_crossprod_determinant = 0.0;

        if !is_null_model {
            // dispersion-scaled design without the intercept column
            let scaled = Mat::from_fn(n_obs, n_coefs - 1, |i, j| {
                inv_sqrt_dispersions[i] * data.design[(i, j + 1)]
            });
            let crossprod = scaled.transpose() * &scaled;

            for i in 0..n_coefs - 1 {
                for j in 0..n_coefs - 1 {
                    prior_precision[(i + 1, j + 1)] = crossprod[(i, j)] / config.prior_scale;
                }
            }

            let chol = Llt::new(crossprod.as_ref(), Side::Lower)
                .map_err(|_| IwlsError::PriorNotPositiveDefinite)?;
            let l = chol.L();
            log_crossprod_determinant =
                2.0 * (0..n_coefs - 1).map(|j| l[(j, j)].ln()).sum::<f64>();
        }

        Ok(Self {
            data,
            config,
            n_obs,
            n_coefs,
            is_null_model,
            use_fixed_z,
            inv_sqrt_dispersions,
            prior_precision,
            log_crossprod_determinant,
            epsilon,
            results: ProposalInfo {
                coefs: Col::zeros(n_coefs),
                factor: Mat::zeros(n_coefs, n_coefs),
                log_precision_determinant: 0.0,
                lin_pred: config.lin_pred_start.clone(),
            },
        })
    }

    pub fn n_coefs(&self) -> usize {
        self.n_coefs
    }

    pub fn is_null_model(&self) -> bool {
        self.is_null_model
    }

    /// The approximation produced by the most recent run.
    pub fn results(&self) -> &ProposalInfo {
        &self.results
    }

    /// Run IWLS at covariance factor g from the engine's current linear
    /// predictor until convergence or `max_iter` rounds, whichever comes
    /// first, and return the number of rounds executed.
    ///
    /// Convergence is never accepted after the first round (the previous
    /// coefficients may come from an unrelated starting point), so a
    /// converged run always takes at least two. Exhausting `max_iter` is not
    /// an error: one fixed-count step is a legitimate request.
    pub fn run_from_last_lin_pred(&mut self, max_iter: usize, g: f64) -> Result<usize, IwlsError> {
        let mut iter = 0;
        let mut converged = false;

        while iter < max_iter && !converged {
            iter += 1;

            // pseudo-responses and sqrt weights, independent per observation;
            // the ordered collect keeps the result identical for any thread
            // count
            let family = &self.config.family;
            let response = self.data.response.try_as_col_major().unwrap().as_slice();
            let eta = self.results.lin_pred.try_as_col_major().unwrap().as_slice();
            let inv_sqrt_disp = self
                .inv_sqrt_dispersions
                .try_as_col_major()
                .unwrap()
                .as_slice();
            let transformed: Vec<(f64, f64)> = (0..self.n_obs)
                .into_par_iter()
                .map(|i| {
                    let mu = family.linkinv(eta[i]);
                    let dmu_deta = family.mu_eta(eta[i]);
                    let pseudo = eta[i] + (response[i] - mu) / dmu_deta;
                    let sqrt_weight = inv_sqrt_disp[i] * dmu_deta / family.variance(mu).sqrt();
                    (pseudo, sqrt_weight)
                })
                .collect();

            let scaled_design = Mat::from_fn(self.n_obs, self.n_coefs, |i, j| {
                self.data.design[(i, j)] * transformed[i].1
            });
            let weighted_pseudo =
                Mat::from_fn(self.n_obs, 1, |i, _| transformed[i].0 * transformed[i].1);

            // Q = X'WX + prior precision / g
            let mut prior_scaled = self.prior_precision.clone();
            prior_scaled *= Scale(1.0 / g);
            let precision = scaled_design.transpose() * &scaled_design + prior_scaled;

            let chol = Llt::new(precision.as_ref(), Side::Lower).map_err(|_| {
                IwlsError::NotPositiveDefinite {
                    iteration: iter,
                    z: g.ln(),
                }
            })?;

            let coefs_old = self.results.coefs.clone();

            // forward-backward solve LL' m = X'W pseudo
            let rhs = scaled_design.transpose() * &weighted_pseudo;
            let solution = chol.solve(rhs.as_ref());
            self.results.coefs = solution.col(0).to_owned();
            self.results.factor = chol.L().to_owned();
            self.results.lin_pred = &self.data.design * &self.results.coefs;

            converged = iter > 1
                && criterion(
                    coefs_old.try_as_col_major().unwrap().as_slice(),
                    self.results.coefs.try_as_col_major().unwrap().as_slice(),
                ) < self.epsilon;
        }

        self.results.log_precision_determinant = 2.0
            * (0..self.n_coefs)
                .map(|j| self.results.factor[(j, j)].ln())
                .sum::<f64>();

        Ok(iter)
    }

    /// Seed the linear predictor, then run as `run_from_last_lin_pred`.
    pub fn run_from_lin_pred(
        &mut self,
        max_iter: usize,
        g: f64,
        lin_pred: &Col<f64>,
    ) -> Result<usize, IwlsError> {
        assert!(lin_pred.nrows() == self.n_obs);
        self.results.lin_pred = lin_pred.clone();
        self.run_from_last_lin_pred(max_iter, g)
    }

    /// Seed the linear predictor as design x coefs, then run.
    pub fn run_from_coefs(
        &mut self,
        max_iter: usize,
        g: f64,
        coefs: &Col<f64>,
    ) -> Result<usize, IwlsError> {
        assert!(coefs.nrows() == self.n_coefs);
        self.results.lin_pred = &self.data.design * coefs;
        self.run_from_last_lin_pred(max_iter, g)
    }

    /// Full unnormalized log posterior of (coefs, z).
    ///
    /// Every model-dependent normalizing term is included: the value feeds
    /// the Chib-Jeliazkov estimate, which compares it across models, so it
    /// must be absolutely correct rather than correct up to a constant.
    pub fn log_un_posterior(&self, sample: &Sample) -> f64 {
        let lin_pred = &self.data.design * &sample.coefs;
        let means: Vec<f64> = lin_pred
            .try_as_col_major()
            .unwrap()
            .as_slice()
            .iter()
            .map(|&eta| self.config.family.linkinv(eta))
            .collect();

        let mut ret = self.config.family.loglik(&means);

        if !self.is_null_model {
            let g = sample.z.exp();
            let intercept = sample.coefs[0];

            // ||D^(-1/2) (eta - beta_0)||^2 without forming the non-intercept
            // design product
            let scaled: Vec<f64> = self
                .inv_sqrt_dispersions
                .try_as_col_major()
                .unwrap()
                .as_slice()
                .iter()
                .zip(lin_pred.try_as_col_major().unwrap().as_slice())
                .map(|(&d, &eta)| d * (eta - intercept))
                .collect();
            let norm_squared = math::vector_dot(&scaled, &scaled);

            let non_intercept = self.n_coefs as f64 - 1.0;
            ret += 0.5
                * (self.log_crossprod_determinant
                    - norm_squared / (g * self.config.prior_scale)
                    - non_intercept
                        * (2.0 * math::LN_SQRT_2PI + sample.z + self.config.prior_scale.ln()));

            if !self.use_fixed_z {
                // log prior of g plus the Jacobian of sampling z = log(g)
                ret += self.config.g_prior.log_density(g) + sample.z;
            }
        }

        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glm::BernoulliLogit;
    use crate::prior::GPrior;

    fn bernoulli_null_model() -> (ModelData, GlmModelConfig<BernoulliLogit>) {
        let response = Col::from_fn(4, |i| [0.0, 1.0, 1.0, 0.0][i]);
        let data = ModelData::new(Mat::from_fn(4, 1, |_, _| 1.0), response.clone());
        let config = GlmModelConfig {
            family: BernoulliLogit::new(response),
            g_prior: GPrior::HyperG { a: 4.0 },
            dispersions: Col::from_fn(4, |_| 1.0),
            lin_pred_start: Col::zeros(4),
            prior_scale: 1.0,
        };
        (data, config)
    }

    fn bernoulli_two_coef_model() -> (ModelData, GlmModelConfig<BernoulliLogit>) {
        let response = Col::from_fn(6, |i| [0.0, 0.0, 1.0, 0.0, 1.0, 1.0][i]);
        let covariate = [-1.5, -1.0, -0.5, 0.5, 1.0, 1.5];
        let design = Mat::from_fn(6, 2, |i, j| if j == 0 { 1.0 } else { covariate[i] });
        let data = ModelData::new(design, response.clone());
        let config = GlmModelConfig {
            family: BernoulliLogit::new(response),
            g_prior: GPrior::HyperG { a: 4.0 },
            dispersions: Col::from_fn(6, |_| 1.0),
            lin_pred_start: Col::zeros(6),
            prior_scale: 1.0,
        };
        (data, config)
    }

    #[test]
    fn null_model_prior_precision_is_zero() {
        let (data, config) = bernoulli_null_model();
        let iwls = Iwls::new(&data, &config, false, 1e-8).unwrap();

        assert!(iwls.is_null_model());
        assert_eq!(iwls.prior_precision[(0, 0)], 0.0);
        assert_eq!(iwls.log_crossprod_determinant, 0.0);
    }

    #[test]
    fn null_model_posterior_is_the_bare_loglik() {
        let (data, config) = bernoulli_null_model();
        let iwls = Iwls::new(&data, &config, false, 1e-8).unwrap();

        let sample = Sample {
            coefs: Col::from_fn(1, |_| 0.3),
            z: 1.7,
        };
        let mu = config.family.linkinv(0.3);
        let expected = config.family.loglik(&[mu, mu, mu, mu]);
        assert_eq!(iwls.log_un_posterior(&sample), expected);
    }

    #[test]
    fn intercept_only_bernoulli_converges_to_the_logit_of_the_mean() {
        let (data, config) = bernoulli_null_model();
        let mut iwls = Iwls::new(&data, &config, false, 1e-8).unwrap();

        let iterations = iwls
            .run_from_lin_pred(30, 1.0, &config.lin_pred_start)
            .unwrap();

        // at least two rounds by convention, convergence within the cap
        assert!(iterations > 1);
        assert!(iterations <= 30);
        // the mode is logit(mean(y)) = logit(0.5) = 0
        approx::assert_abs_diff_eq!(iwls.results().coefs[0], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn identical_runs_are_bit_identical() {
        let (data, config) = bernoulli_two_coef_model();

        let mut first = Iwls::new(&data, &config, false, 1e-8).unwrap();
        let mut second = Iwls::new(&data, &config, false, 1e-8).unwrap();

        let iters_first = first
            .run_from_lin_pred(30, 1.5, &config.lin_pred_start)
            .unwrap();
        let iters_second = second
            .run_from_lin_pred(30, 1.5, &config.lin_pred_start)
            .unwrap();

        assert_eq!(iters_first, iters_second);
        for j in 0..2 {
            assert_eq!(first.results().coefs[j], second.results().coefs[j]);
        }
        assert_eq!(
            first.results().log_precision_determinant,
            second.results().log_precision_determinant
        );
    }

    #[test]
    fn single_step_reports_one_round() {
        let (data, config) = bernoulli_two_coef_model();
        let mut iwls = Iwls::new(&data, &config, false, 1e-8).unwrap();

        let iterations = iwls
            .run_from_coefs(1, 1.0, &Col::zeros(2))
            .unwrap();
        assert_eq!(iterations, 1);
    }

    #[test]
    fn fixed_z_posterior_omits_the_z_prior_terms() {
        let (data, config) = bernoulli_two_coef_model();
        let free = Iwls::new(&data, &config, false, 1e-8).unwrap();
        let fixed = Iwls::new(&data, &config, true, 1e-8).unwrap();

        let sample = Sample {
            coefs: Col::from_fn(2, |j| [0.1, -0.2][j]),
            z: 0.4,
        };
        let difference = free.log_un_posterior(&sample) - fixed.log_un_posterior(&sample);
        let expected = config.g_prior.log_density(0.4f64.exp()) + 0.4;
        assert!((difference - expected).abs() < 1e-12);
    }

    #[test]
    fn mismatched_response_length_is_rejected() {
        let (data, mut config) = bernoulli_null_model();
        config.dispersions = Col::from_fn(3, |_| 1.0);

        let result = Iwls::new(&data, &config, false, 1e-8);
        assert!(matches!(
            result,
            Err(IwlsError::DimensionMismatch {
                what: "dispersions",
                ..
            })
        ));
    }
}
