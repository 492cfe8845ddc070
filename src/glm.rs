use faer::Col;

use crate::math::ln_gamma;

/// Link and distribution capability of a GLM response.
///
/// Implementations own the response vector so that `loglik` can be evaluated
/// from a mean vector alone. All log-likelihoods must carry their complete
/// normalizing constants: the values are compared across models by the
/// marginal likelihood estimator, so they have to be absolutely correct, not
/// just correct up to an additive constant.
pub trait ResponseFamily: Send + Sync {
    /// Inverse link, eta -> mu.
    fn linkinv(&self, eta: f64) -> f64;

    /// Derivative of the inverse link, d mu / d eta.
    fn mu_eta(&self, eta: f64) -> f64;

    /// Variance function, mu -> V(mu).
    fn variance(&self, mu: f64) -> f64;

    /// Log-likelihood of the owned response at the given mean vector.
    fn loglik(&self, means: &[f64]) -> f64;
}

/// Bernoulli response with the canonical logit link.
#[derive(Debug, Clone)]
pub struct BernoulliLogit {
    response: Col<f64>,
}

impl BernoulliLogit {
    pub fn new(response: Col<f64>) -> Self {
        Self { response }
    }
}

impl ResponseFamily for BernoulliLogit {
    fn linkinv(&self, eta: f64) -> f64 {
        // evaluate on the side that keeps exp() bounded
        if eta < 0.0 {
            let e = eta.exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + (-eta).exp())
        }
    }

    fn mu_eta(&self, eta: f64) -> f64 {
        let mu = self.linkinv(eta);
        mu * (1.0 - mu)
    }

    fn variance(&self, mu: f64) -> f64 {
        mu * (1.0 - mu)
    }

    fn loglik(&self, means: &[f64]) -> f64 {
        assert!(means.len() == self.response.nrows());

        let mut ret = 0.0;
        for (i, &mu) in means.iter().enumerate() {
            let y = self.response[i];
            ret += y * mu.ln() + (1.0 - y) * (1.0 - mu).ln();
        }
        ret
    }
}

/// Poisson response with the canonical log link.
#[derive(Debug, Clone)]
pub struct PoissonLog {
    response: Col<f64>,
}

impl PoissonLog {
    pub fn new(response: Col<f64>) -> Self {
        Self { response }
    }
}

impl ResponseFamily for PoissonLog {
    fn linkinv(&self, eta: f64) -> f64 {
        eta.exp()
    }

    fn mu_eta(&self, eta: f64) -> f64 {
        eta.exp()
    }

    fn variance(&self, mu: f64) -> f64 {
        mu
    }

    fn loglik(&self, means: &[f64]) -> f64 {
        assert!(means.len() == self.response.nrows());

        let mut ret = 0.0;
        for (i, &mu) in means.iter().enumerate() {
            let y = self.response[i];
            ret += y * mu.ln() - mu - ln_gamma(y + 1.0);
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logit_linkinv_is_symmetric() {
        let family = BernoulliLogit::new(Col::zeros(1));
        for eta in [-30.0, -2.0, -0.5, 0.0, 0.5, 2.0, 30.0] {
            let mu = family.linkinv(eta);
            assert!((0.0..=1.0).contains(&mu));
            assert!((mu + family.linkinv(-eta) - 1.0).abs() < 1e-12);
        }
        assert!((family.linkinv(0.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn logit_mu_eta_matches_variance_at_mu() {
        // canonical link: d mu / d eta equals V(mu)
        let family = BernoulliLogit::new(Col::zeros(1));
        for eta in [-3.0, -1.0, 0.0, 1.0, 3.0] {
            let mu = family.linkinv(eta);
            assert!((family.mu_eta(eta) - family.variance(mu)).abs() < 1e-12);
        }
    }

    #[test]
    fn bernoulli_loglik_known_value() {
        let response = Col::from_fn(2, |i| if i == 0 { 1.0 } else { 0.0 });
        let family = BernoulliLogit::new(response);
        // y = [1, 0] at mu = [0.5, 0.5] has likelihood 0.25
        let ll = family.loglik(&[0.5, 0.5]);
        assert!((ll - 0.25f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn poisson_loglik_known_value() {
        let response = Col::from_fn(1, |_| 2.0);
        let family = PoissonLog::new(response);
        // P(Y = 2 | mu = 1) = exp(-1) / 2
        let ll = family.loglik(&[1.0]);
        assert!((ll - (-1.0 - 2f64.ln())).abs() < 1e-12);
    }
}
