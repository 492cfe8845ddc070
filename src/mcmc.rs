use faer::Col;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::iwls::ProposalInfo;
use crate::math;
use crate::prior::MarginalZ;

/// One point of the Markov chain state space: coefficients plus z = log(g).
#[derive(Debug, Clone)]
pub struct Sample {
    pub coefs: Col<f64>,
    pub z: f64,
}

/// A chain state snapshot: the sample, its unnormalized log posterior, and
/// the Gaussian proposal that generated it.
///
/// Slot assignments in the sampler copy the whole value; `old` and `now`
/// never share internal references.
#[derive(Debug, Clone)]
pub struct McmcState {
    pub sample: Sample,
    pub log_un_posterior: f64,
    pub proposal: ProposalInfo,
}

impl McmcState {
    /// Normalized log density of the sample under its own proposal: the
    /// multivariate normal with mean `proposal.coefs` and precision LL',
    /// plus the z-marginal density.
    ///
    /// The quadratic form goes through the triangular product L'(x - mean),
    /// never through an explicit inverse. Full normalization matters here:
    /// these values enter the Chib-Jeliazkov terms across different z.
    pub fn log_proposal_density(&self, marginal_z: &MarginalZ) -> f64 {
        let n = self.proposal.coefs.nrows();

        let diff: Vec<f64> = self
            .sample
            .coefs
            .try_as_col_major()
            .unwrap()
            .as_slice()
            .iter()
            .zip(self.proposal.coefs.try_as_col_major().unwrap().as_slice())
            .map(|(&x, &m)| x - m)
            .collect();
        let mut rotated = vec![0.0; n];
        math::tri_lower_transpose_matvec(self.proposal.factor.as_ref(), &diff, &mut rotated);

        0.5 * (self.proposal.log_precision_determinant - math::vector_dot(&rotated, &rotated))
            - n as f64 * math::LN_SQRT_2PI
            + marginal_z.log_density(self.sample.z)
    }
}

/// One standard-normal vector from the shared chain stream.
pub(crate) fn standard_normals(rng: &mut dyn RngCore, n: usize) -> Col<f64> {
    let dist = StandardNormal;
    Col::from_fn(n, |_| dist.sample(rng))
}

/// Map a standard-normal vector through the proposal: solve L' v = w, then
/// shift by the proposal mean, giving a draw from N(mean, (LL')^-1).
pub(crate) fn draw_coefs(proposal: &ProposalInfo, mut w: Col<f64>) -> Col<f64> {
    math::tri_lower_transpose_solve(
        proposal.factor.as_ref(),
        w.try_as_col_major_mut().unwrap().as_slice_mut(),
    );
    math::add_assign(
        w.try_as_col_major_mut().unwrap().as_slice_mut(),
        proposal.coefs.try_as_col_major().unwrap().as_slice(),
    );
    w
}
