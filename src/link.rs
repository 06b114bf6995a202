use std::{
    f64::consts::{FRAC_1_SQRT_2, PI},
    fmt,
    sync::LazyLock,
};

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::Error;

// ln(-ln(x)) for the smallest positive normal f64, beyond which the cloglog
// inverse link underflows to 0 or saturates at 1
static LL_MAX_ABS: LazyLock<f64> = LazyLock::new(|| (-f64::MIN_POSITIVE.ln()).ln());

/// Largest magnitude of the linear predictor accepted by [`Link::Cloglog`].
#[inline]
pub fn ll_max_abs() -> f64 {
    *LL_MAX_ABS
}

const FRAC_1_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

// past this |eta| the logit inverse link is held within f64::EPSILON of 0 or 1
// and its derivative at f64::EPSILON, so a saturated mean keeps a positive
// variance
const LOGIT_THRESH: f64 = 30.0;

/// Link between the mean response `mu` and the linear predictor `eta`.
///
/// Every transform validates its argument first and returns an
/// [`Error::InvalidMu`] or [`Error::InvalidEta`] instead of clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    Identity,
    Log,
    Logit,
    Probit,
    Cloglog,
    Cauchit,
    Inverse,
}

impl Link {
    pub const ALL: [Link; 7] = [
        Link::Identity,
        Link::Log,
        Link::Logit,
        Link::Probit,
        Link::Cloglog,
        Link::Cauchit,
        Link::Inverse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Link::Identity => "identity",
            Link::Log => "log",
            Link::Logit => "logit",
            Link::Probit => "probit",
            Link::Cloglog => "cloglog",
            Link::Cauchit => "cauchit",
            Link::Inverse => "inverse",
        }
    }

    pub fn is_valid_eta(&self, eta: f64) -> bool {
        match self {
            Link::Cloglog => eta.abs() < ll_max_abs(),
            Link::Inverse => eta.is_finite() && eta > 0.0,
            _ => eta.is_finite(),
        }
    }

    pub fn is_valid_mu(&self, mu: f64) -> bool {
        match self {
            Link::Identity => mu.is_finite(),
            Link::Log | Link::Inverse => mu.is_finite() && mu > 0.0,
            Link::Logit | Link::Probit | Link::Cloglog | Link::Cauchit => mu > 0.0 && mu < 1.0,
        }
    }

    /// Checks `eta`, reporting `index` as its position on failure.
    #[inline]
    pub fn valideta(&self, index: usize, eta: f64) -> Result<f64, Error> {
        if self.is_valid_eta(eta) {
            Ok(eta)
        } else {
            Err(Error::InvalidEta {
                link: *self,
                index,
                eta,
            })
        }
    }

    /// Checks `mu`, reporting `index` as its position on failure.
    #[inline]
    pub fn validmu(&self, index: usize, mu: f64) -> Result<f64, Error> {
        if self.is_valid_mu(mu) {
            Ok(mu)
        } else {
            Err(Error::InvalidMu {
                link: *self,
                index,
                mu,
            })
        }
    }

    /// `eta = g(mu)`
    pub fn linkfun(&self, mu: f64) -> Result<f64, Error> {
        let mu = self.validmu(0, mu)?;
        Ok(self.linkfun_raw(mu))
    }

    /// `mu = g^-1(eta)`
    pub fn linkinv(&self, eta: f64) -> Result<f64, Error> {
        let eta = self.valideta(0, eta)?;
        Ok(self.linkinv_raw(eta))
    }

    /// `d mu / d eta`
    pub fn mu_eta(&self, eta: f64) -> Result<f64, Error> {
        let eta = self.valideta(0, eta)?;
        Ok(self.mu_eta_raw(eta))
    }

    pub fn linkfun_vec(&self, mu: &[f64]) -> Result<Vec<f64>, Error> {
        mu.iter()
            .enumerate()
            .map(|(i, mu)| self.validmu(i, *mu).map(|mu| self.linkfun_raw(mu)))
            .collect()
    }

    pub fn linkinv_vec(&self, eta: &[f64]) -> Result<Vec<f64>, Error> {
        eta.iter()
            .enumerate()
            .map(|(i, eta)| self.valideta(i, *eta).map(|eta| self.linkinv_raw(eta)))
            .collect()
    }

    pub fn mu_eta_vec(&self, eta: &[f64]) -> Result<Vec<f64>, Error> {
        eta.iter()
            .enumerate()
            .map(|(i, eta)| self.valideta(i, *eta).map(|eta| self.mu_eta_raw(eta)))
            .collect()
    }

    #[inline(always)]
    pub(crate) fn linkfun_raw(&self, mu: f64) -> f64 {
        match self {
            Link::Identity => mu,
            Link::Log => mu.ln(),
            Link::Logit => (mu / (1.0 - mu)).ln(),
            Link::Probit => Normal::standard().inverse_cdf(mu),
            Link::Cloglog => (-(-mu).ln_1p()).ln(),
            Link::Cauchit => (PI * (mu - 0.5)).tan(),
            Link::Inverse => 1.0 / mu,
        }
    }

    #[inline(always)]
    pub(crate) fn linkinv_raw(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => eta,
            Link::Log => eta.exp(),
            Link::Logit => {
                let t = if eta < -LOGIT_THRESH {
                    f64::EPSILON
                } else if eta > LOGIT_THRESH {
                    1.0 / f64::EPSILON
                } else {
                    eta.exp()
                };
                t / (1.0 + t)
            },
            Link::Probit => 0.5 * (1.0 + libm::erf(eta * FRAC_1_SQRT_2)),
            Link::Cloglog => -(-eta.exp()).exp_m1(),
            Link::Cauchit => 0.5 + eta.atan() / PI,
            Link::Inverse => 1.0 / eta,
        }
    }

    #[inline(always)]
    pub(crate) fn mu_eta_raw(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => 1.0,
            Link::Log => eta.exp(),
            Link::Logit if eta.abs() > LOGIT_THRESH => f64::EPSILON,
            Link::Logit => {
                let e = (-eta.abs()).exp();
                e / (1.0 + e).powi(2)
            },
            Link::Probit => (-0.5 * eta * eta).exp() * FRAC_1_SQRT_2PI,
            Link::Cloglog => (eta - eta.exp()).exp(),
            Link::Cauchit => 1.0 / (PI * (1.0 + eta * eta)),
            Link::Inverse => -1.0 / (eta * eta),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
