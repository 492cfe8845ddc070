use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::bridge;
use crate::config::{GlmModelConfig, McmcSettings, ModelData};
use crate::glm::ResponseFamily;
use crate::iwls::{Iwls, IwlsError};
use crate::mcmc::{self, McmcState, Sample};
use crate::prior::MarginalZ;
use crate::storage::{SampleStorage, Trace};

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error(transparent)]
    Iwls(#[from] IwlsError),

    #[error("the design has {n_coefs} coefficients, but the settings declare is_null_model={declared}")]
    NullModelMismatch { n_coefs: usize, declared: bool },
}

/// Per-iteration report for callers that drive progress displays.
///
/// The crate itself performs no I/O.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Progress {
    pub iteration: usize,
    pub accepted: bool,
    pub n_accepted: usize,
    pub stored: bool,
}

/// Metropolis-Hastings sampler for (coefficients, z) with IWLS-recomputed
/// Gaussian proposals.
///
/// Two value slots `old` and `now` hold the previously accepted and the
/// currently proposed state; exactly one of them is current after each
/// iteration, and slot assignment always copies the full state. The state
/// accepted before the first move is frozen as the high density point for
/// the bridge terms.
///
/// All randomness comes from one explicitly seeded stream, drawn in a fixed
/// order per iteration: z, coefficients, bridge z and coefficients when this
/// iteration stores a bridge pair, acceptance.
pub struct GlmSampler<'m, F: ResponseFamily> {
    iwls: Iwls<'m, F>,
    marginal_z: &'m MarginalZ,
    settings: McmcSettings,
    rng: ChaCha8Rng,
    old: McmcState,
    now: McmcState,
    high_density_point: McmcState,
    storage: SampleStorage,
    n_accepted: usize,
    iteration: usize,
}

impl<'m, F: ResponseFamily> GlmSampler<'m, F> {
    /// Build the engine, locate the high density point by one IWLS run to
    /// convergence at the starting z, and seed both chain slots with it.
    pub fn new(
        data: &'m ModelData,
        config: &'m GlmModelConfig<F>,
        marginal_z: &'m MarginalZ,
        settings: McmcSettings,
    ) -> Result<Self, SamplerError> {
        assert!(settings.step > 0, "step must be positive");

        let mut iwls = Iwls::new(data, config, settings.use_fixed_z, settings.tolerance)?;

        if settings.is_null_model != iwls.is_null_model() {
            return Err(SamplerError::NullModelMismatch {
                n_coefs: iwls.n_coefs(),
                declared: settings.is_null_model,
            });
        }

        let start_z = if settings.use_fixed_z {
            settings.fixed_z
        } else {
            settings.start_z
        };

        iwls.run_from_lin_pred(
            settings.max_iwls_iterations,
            start_z.exp(),
            &config.lin_pred_start,
        )?;

        let proposal = iwls.results().clone();
        let sample = Sample {
            coefs: proposal.coefs.clone(),
            z: start_z,
        };
        let log_un_posterior = iwls.log_un_posterior(&sample);
        let state = McmcState {
            sample,
            log_un_posterior,
            proposal,
        };

        let storage = SampleStorage::new(iwls.n_coefs(), settings.n_samples());
        let rng = ChaCha8Rng::seed_from_u64(settings.seed);

        Ok(Self {
            iwls,
            marginal_z,
            settings,
            rng,
            old: state.clone(),
            now: state.clone(),
            high_density_point: state,
            storage,
            n_accepted: 0,
            iteration: 0,
        })
    }

    /// The frozen reference state of the bridge estimator.
    pub fn high_density_point(&self) -> &McmcState {
        &self.high_density_point
    }

    /// One Metropolis-Hastings iteration.
    pub fn step(&mut self) -> Result<Progress, SamplerError> {
        let iteration = self.iteration;
        let n_coefs = self.iwls.n_coefs();

        // propose: new z, one IWLS step from the accepted coefficients, then
        // a Gaussian draw from the resulting approximation
        self.now.sample.z = self.marginal_z.generate(&mut self.rng);
        self.iwls
            .run_from_coefs(1, self.now.sample.z.exp(), &self.old.sample.coefs)?;
        self.now.proposal = self.iwls.results().clone();

        let w = mcmc::standard_normals(&mut self.rng, n_coefs);
        self.now.sample.coefs = mcmc::draw_coefs(&self.now.proposal, w);
        self.now.log_un_posterior = self.iwls.log_un_posterior(&self.now.sample);

        // reverse jump: the proposal that would have generated old from now
        self.iwls
            .run_from_coefs(1, self.old.sample.z.exp(), &self.now.sample.coefs)?;
        let mut reverse = self.old.clone();
        reverse.proposal = self.iwls.results().clone();

        let log_proposal_ratio = reverse.log_proposal_density(self.marginal_z)
            - self.now.log_proposal_density(self.marginal_z);
        let log_posterior_ratio = self.now.log_un_posterior - self.old.log_un_posterior;

        let stored = iteration >= self.settings.burnin
            && (iteration - self.settings.burnin) % self.settings.step == 0;

        // bridge randomness precedes the acceptance draw in the stream; the
        // terms themselves are computed after accept/reject below
        let bridge_draws = if stored && self.settings.estimate_marg_lik {
            let bridge_z = self.marginal_z.generate(&mut self.rng);
            let bridge_w = mcmc::standard_normals(&mut self.rng, n_coefs);
            Some((bridge_z, bridge_w))
        } else {
            None
        };

        let uniform: f64 = self.rng.random();
        let accepted = uniform < (log_posterior_ratio + log_proposal_ratio).exp();
        if accepted {
            self.old = self.now.clone();
            self.n_accepted += 1;
        } else {
            self.now = self.old.clone();
        }

        if stored {
            self.storage.store_parameters(&self.now.sample);

            if let Some((bridge_z, bridge_w)) = bridge_draws {
                let (numerator, denominator) = bridge::marg_lik_terms(
                    &mut self.iwls,
                    &self.high_density_point,
                    &self.now,
                    self.marginal_z,
                    bridge_z,
                    bridge_w,
                )?;
                self.storage.store_marg_lik_terms(numerator, denominator);
            }
        }

        self.iteration += 1;
        Ok(Progress {
            iteration,
            accepted,
            n_accepted: self.n_accepted,
            stored,
        })
    }

    /// Run the configured number of iterations and return the trace.
    pub fn run(mut self) -> Result<Trace, SamplerError> {
        for _ in 0..self.settings.iterations {
            self.step()?;
        }

        debug_assert!(self.storage.n_saved() == self.settings.n_samples());
        Ok(self
            .storage
            .finalize(self.n_accepted, self.high_density_point.log_un_posterior))
    }
}
