use rayon::prelude::*;
use tracing::trace;

use crate::{Error, Family, Link};

/// Response side of a GLM fit: the observations, their prior weights and
/// offset, and the current mean and linear predictor.
#[derive(Debug, Clone)]
pub struct GlmResponse<D: Family> {
    distribution: D,
    link: Link,
    y: Vec<f64>,
    mu: Vec<f64>,
    eta: Vec<f64>,
    offset: Vec<f64>,
    weights: Vec<f64>,
}

impl<D: Family> GlmResponse<D> {
    /// Builds a response from fully specified state. All vectors must have the
    /// length of `y` and every `y` must lie in the support of `distribution`.
    pub fn new(
        distribution: D,
        link: Link,
        y: Vec<f64>,
        mu: Vec<f64>,
        eta: Vec<f64>,
        offset: Vec<f64>,
        weights: Vec<f64>,
    ) -> Result<Self, Error> {
        let n = y.len();
        Error::check_len("mu", n, mu.len())?;
        Error::check_len("eta", n, eta.len())?;
        Error::check_len("offset", n, offset.len())?;
        Error::check_len("weights", n, weights.len())?;
        check_support(&distribution, &y)?;
        Ok(Self {
            distribution,
            link,
            y,
            mu,
            eta,
            offset,
            weights,
        })
    }

    /// Canonical link, zero offset and unit weights.
    pub fn from_y(distribution: D, y: Vec<f64>) -> Result<Self, Error> {
        Self::with_options(distribution, None, y, None, None)
    }

    /// Starts `mu` from the family's heuristic and `eta` from `linkfun(mu)`.
    /// Missing pieces default to the canonical link, a zero offset and unit
    /// weights.
    pub fn with_options(
        distribution: D,
        link: Option<Link>,
        y: Vec<f64>,
        offset: Option<Vec<f64>>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, Error> {
        let n = y.len();
        let link = link.unwrap_or_else(|| distribution.canonical_link());
        let offset = offset.unwrap_or_else(|| vec![0.0; n]);
        let weights = weights.unwrap_or_else(|| vec![1.0; n]);
        Error::check_len("offset", n, offset.len())?;
        Error::check_len("weights", n, weights.len())?;
        check_support(&distribution, &y)?;
        let mu = y
            .iter()
            .zip(&weights)
            .map(|(y, wt)| distribution.mu_start(*y, *wt))
            .collect::<Vec<_>>();
        let eta = link.linkfun_vec(&mu)?;
        Self::new(distribution, link, y, mu, eta, offset, weights)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    #[inline]
    pub fn distribution(&self) -> &D {
        &self.distribution
    }

    #[inline]
    pub fn link(&self) -> Link {
        self.link
    }

    #[inline]
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    #[inline]
    pub fn mu(&self) -> &[f64] {
        &self.mu
    }

    #[inline]
    pub fn eta(&self) -> &[f64] {
        &self.eta
    }

    #[inline]
    pub fn offset(&self) -> &[f64] {
        &self.offset
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn deviance(&self) -> f64 {
        self.distribution
            .deviance(&self.mu, &self.y, &self.weights)
    }

    pub fn deviance_residuals(&self) -> Vec<f64> {
        self.distribution
            .deviance_residuals(&self.y, &self.mu, &self.weights)
    }

    /// Deviance of the intercept-only model. With no offset its fitted mean
    /// is the weighted mean of `y` whatever the link.
    pub fn null_deviance(&self) -> f64 {
        let total = self.weights.iter().sum::<f64>();
        let mean = self
            .y
            .iter()
            .zip(&self.weights)
            .map(|(y, wt)| y * wt)
            .sum::<f64>()
            / total;
        let mu = vec![mean; self.len()];
        self.distribution.deviance(&mu, &self.y, &self.weights)
    }

    pub fn mu_eta(&self) -> Result<Vec<f64>, Error> {
        self.link.mu_eta_vec(&self.eta)
    }

    pub fn variance(&self) -> Vec<f64> {
        self.mu
            .iter()
            .map(|mu| self.distribution.variance(*mu))
            .collect()
    }

    /// `(y - mu) / mu_eta`
    pub fn working_residuals(&self) -> Result<Vec<f64>, Error> {
        let mu_eta = self.mu_eta()?;
        self.y
            .iter()
            .zip(&self.mu)
            .zip(mu_eta)
            .enumerate()
            .map(|(i, ((y, mu), d))| {
                if d == 0.0 {
                    Err(Error::ZeroMuEta(i))
                } else {
                    Ok((y - mu) / d)
                }
            })
            .collect()
    }

    /// `(eta - offset) + working residuals`
    pub fn working_response(&self) -> Result<Vec<f64>, Error> {
        let mut z = self.working_residuals()?;
        for ((z, eta), off) in z.iter_mut().zip(&self.eta).zip(&self.offset) {
            *z += eta - off;
        }
        Ok(z)
    }

    /// `mu_eta * sqrt(weights / variance)`
    pub fn sqrt_working_weights(&self) -> Result<Vec<f64>, Error> {
        let mu_eta = self.mu_eta()?;
        let distribution = &self.distribution;
        mu_eta
            .par_iter()
            .zip(self.mu.par_iter())
            .zip(self.weights.par_iter())
            .enumerate()
            .map(|(i, ((d, mu), wt))| {
                let variance = distribution.variance(*mu);
                if variance > 0.0 {
                    Ok(d * (wt / variance).sqrt())
                } else {
                    Err(Error::NonPositiveVariance { index: i, variance })
                }
            })
            .collect()
    }

    /// Replaces `eta` with `linear_predictor + offset` and `mu` with its
    /// inverse link, returning the new deviance. The state is only replaced
    /// once every element has passed `valideta`.
    pub fn update(&mut self, linear_predictor: &[f64]) -> Result<f64, Error> {
        Error::check_len("linear predictor", self.len(), linear_predictor.len())?;
        let link = self.link;
        let updated = linear_predictor
            .par_iter()
            .zip(self.offset.par_iter())
            .enumerate()
            .map(|(i, (lp, off))| {
                let eta = link.valideta(i, lp + off)?;
                Ok((eta, link.linkinv_raw(eta)))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        for ((eta, mu), (new_eta, new_mu)) in
            self.eta.iter_mut().zip(self.mu.iter_mut()).zip(updated)
        {
            *eta = new_eta;
            *mu = new_mu;
        }
        let dev = self.deviance();
        trace!(dev, "updated response");
        Ok(dev)
    }
}

fn check_support<D: Family>(distribution: &D, y: &[f64]) -> Result<(), Error> {
    match y.iter().position(|y| !distribution.in_support(*y)) {
        Some(index) => Err(Error::NotInSupport {
            family: distribution.name(),
            index,
            y: y[index],
        }),
        None => Ok(()),
    }
}
