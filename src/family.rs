use std::fmt::Debug;

use crate::Link;

/// Exponential-family distribution consumed by [`crate::GlmResponse`].
///
/// Implementors supply the per-observation pieces; the whole-vector
/// deviance and signed deviance residuals are derived from `dev_resid`.
pub trait Family: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn canonical_link(&self) -> Link;

    fn variance(&self, mu: f64) -> f64;

    /// Weighted unit deviance of a single observation, never negative.
    fn dev_resid(&self, y: f64, mu: f64, wt: f64) -> f64;

    fn mu_start(&self, y: f64, wt: f64) -> f64;

    fn in_support(&self, y: f64) -> bool;

    fn deviance(&self, mu: &[f64], y: &[f64], wt: &[f64]) -> f64 {
        y.iter()
            .zip(mu)
            .zip(wt)
            .map(|((y, mu), wt)| self.dev_resid(*y, *mu, *wt))
            .sum()
    }

    /// Signed square roots of the unit deviances, so that the squares sum to
    /// [`Family::deviance`].
    fn deviance_residuals(&self, y: &[f64], mu: &[f64], wt: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(mu)
            .zip(wt)
            .map(|((y, mu), wt)| (y - mu).signum() * self.dev_resid(*y, *mu, *wt).max(0.0).sqrt())
            .collect()
    }
}

#[inline(always)]
fn y_log_y(y: f64, mu: f64) -> f64 {
    if y == 0.0 {
        0.0
    } else {
        y * (y / mu).ln()
    }
}

#[inline(always)]
fn binomial_dev_resid(y: f64, mu: f64, wt: f64) -> f64 {
    2.0 * wt * (y_log_y(y, mu) + y_log_y(1.0 - y, 1.0 - mu))
}

/// Normal distribution, canonical identity link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gaussian;

impl Family for Gaussian {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn canonical_link(&self) -> Link {
        Link::Identity
    }

    fn variance(&self, _mu: f64) -> f64 {
        1.0
    }

    fn dev_resid(&self, y: f64, mu: f64, wt: f64) -> f64 {
        wt * (y - mu).powi(2)
    }

    fn mu_start(&self, y: f64, _wt: f64) -> f64 {
        y
    }

    fn in_support(&self, y: f64) -> bool {
        y.is_finite()
    }
}

/// Binary 0/1 response, canonical logit link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bernoulli;

impl Family for Bernoulli {
    fn name(&self) -> &'static str {
        "bernoulli"
    }

    fn canonical_link(&self) -> Link {
        Link::Logit
    }

    fn variance(&self, mu: f64) -> f64 {
        mu * (1.0 - mu)
    }

    fn dev_resid(&self, y: f64, mu: f64, wt: f64) -> f64 {
        binomial_dev_resid(y, mu, wt)
    }

    fn mu_start(&self, y: f64, wt: f64) -> f64 {
        (wt * y + 0.5) / (wt + 1.0)
    }

    fn in_support(&self, y: f64) -> bool {
        y == 0.0 || y == 1.0
    }
}

/// Proportion of successes with the number of trials passed as the prior
/// weight, canonical logit link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Binomial;

impl Family for Binomial {
    fn name(&self) -> &'static str {
        "binomial"
    }

    fn canonical_link(&self) -> Link {
        Link::Logit
    }

    fn variance(&self, mu: f64) -> f64 {
        mu * (1.0 - mu)
    }

    fn dev_resid(&self, y: f64, mu: f64, wt: f64) -> f64 {
        binomial_dev_resid(y, mu, wt)
    }

    fn mu_start(&self, y: f64, wt: f64) -> f64 {
        (wt * y + 0.5) / (wt + 1.0)
    }

    fn in_support(&self, y: f64) -> bool {
        (0.0..=1.0).contains(&y)
    }
}

/// Counts, canonical log link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Poisson;

impl Family for Poisson {
    fn name(&self) -> &'static str {
        "poisson"
    }

    fn canonical_link(&self) -> Link {
        Link::Log
    }

    fn variance(&self, mu: f64) -> f64 {
        mu
    }

    fn dev_resid(&self, y: f64, mu: f64, wt: f64) -> f64 {
        2.0 * wt * (y_log_y(y, mu) - (y - mu))
    }

    fn mu_start(&self, y: f64, _wt: f64) -> f64 {
        y + 0.1
    }

    fn in_support(&self, y: f64) -> bool {
        y.is_finite() && y >= 0.0 && y.fract() == 0.0
    }
}

/// Positive continuous response, canonical inverse link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gamma;

impl Family for Gamma {
    fn name(&self) -> &'static str {
        "gamma"
    }

    fn canonical_link(&self) -> Link {
        Link::Inverse
    }

    fn variance(&self, mu: f64) -> f64 {
        mu.powi(2)
    }

    fn dev_resid(&self, y: f64, mu: f64, wt: f64) -> f64 {
        -2.0 * wt * ((y / mu).ln() - (y - mu) / mu)
    }

    fn mu_start(&self, y: f64, _wt: f64) -> f64 {
        y
    }

    fn in_support(&self, y: f64) -> bool {
        y.is_finite() && y > 0.0
    }
}
