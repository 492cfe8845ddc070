use faer::Col;

use crate::glm::ResponseFamily;
use crate::iwls::{Iwls, IwlsError};
use crate::mcmc::{draw_coefs, McmcState};
use crate::prior::MarginalZ;

/// One Chib-Jeliazkov bridge term pair for a stored iteration.
///
/// Both terms are acceptance-probability style ratios anchored at the frozen
/// high density point; the marginal likelihood estimate itself is the ratio
/// of their running means and is left to the caller.
///
/// `bridge_z` and `bridge_w` are the pre-drawn randomness for the denominator
/// draw; the sampler draws them in its fixed stream order before the
/// acceptance draw.
pub(crate) fn marg_lik_terms<F: ResponseFamily>(
    iwls: &mut Iwls<'_, F>,
    high_density_point: &McmcState,
    current: &McmcState,
    marginal_z: &MarginalZ,
    bridge_z: f64,
    bridge_w: Col<f64>,
) -> Result<(f64, f64), IwlsError> {
    // denominator: a fresh draw from the high density point's proposal frame
    let mut denominator = high_density_point.clone();
    denominator.sample.z = bridge_z;

    iwls.run_from_lin_pred(1, bridge_z.exp(), &high_density_point.proposal.lin_pred)?;
    denominator.proposal = iwls.results().clone();
    denominator.sample.coefs = draw_coefs(&denominator.proposal, bridge_w);
    denominator.log_un_posterior = iwls.log_un_posterior(&denominator.sample);

    let forward_density = denominator.log_proposal_density(marginal_z);

    let mut reverse_denominator = high_density_point.clone();
    iwls.run_from_coefs(
        1,
        reverse_denominator.sample.z.exp(),
        &denominator.sample.coefs,
    )?;
    reverse_denominator.proposal = iwls.results().clone();
    let reverse_density = reverse_denominator.log_proposal_density(marginal_z);

    let denominator_term = (denominator.log_un_posterior
        - high_density_point.log_un_posterior
        + reverse_density
        - forward_density)
        .min(0.0)
        .exp();

    // numerator: proposal density of the accepted sample seen from the high
    // density point's frame, against the reverse move back
    let mut numerator = current.clone();
    iwls.run_from_lin_pred(
        1,
        numerator.sample.z.exp(),
        &high_density_point.proposal.lin_pred,
    )?;
    numerator.proposal = iwls.results().clone();
    let numerator_forward = numerator.log_proposal_density(marginal_z);

    let mut reverse_numerator = high_density_point.clone();
    iwls.run_from_coefs(1, reverse_numerator.sample.z.exp(), &current.sample.coefs)?;
    reverse_numerator.proposal = iwls.results().clone();
    let numerator_reverse = reverse_numerator.log_proposal_density(marginal_z);

    let numerator_term = (high_density_point.log_un_posterior - current.log_un_posterior
        + numerator_forward)
        .min(numerator_reverse)
        .exp();

    Ok((numerator_term, denominator_term))
}
