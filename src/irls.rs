use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{Error, Family, GlmResponse, LinPred};

/// Controls for [`fit`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrlsControl {
    pub max_iter: usize,
    /// Smallest fraction of a full step tried by step-halving before the fit
    /// is declared diverged.
    pub min_step_factor: f64,
    /// Relative change in deviance below which the fit has converged.
    pub tolerance: f64,
}

impl Default for IrlsControl {
    fn default() -> Self {
        IrlsControl {
            max_iter: 30,
            min_step_factor: 0.001,
            tolerance: 1e-6,
        }
    }
}

impl IrlsControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `GLMCORE_MAX_ITER`, `GLMCORE_MIN_STEP_FACTOR`
    /// and `GLMCORE_TOLERANCE` where those parse.
    pub fn from_env() -> Self {
        let default = Self::default();
        IrlsControl {
            max_iter: env_or("GLMCORE_MAX_ITER", default.max_iter),
            min_step_factor: env_or("GLMCORE_MIN_STEP_FACTOR", default.min_step_factor),
            tolerance: env_or("GLMCORE_TOLERANCE", default.tolerance),
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_min_step_factor(mut self, min_step_factor: f64) -> Self {
        self.min_step_factor = min_step_factor;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_iter < 1 {
            return Err(Error::InvalidMaxIter(self.max_iter));
        }
        if !(self.min_step_factor > 0.0 && self.min_step_factor < 1.0) {
            return Err(Error::InvalidMinStepFactor(self.min_step_factor));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }

    // R's glm.fit floors the denominator so that a perfect fit, whose
    // deviance is zero up to rounding, still registers as converged
    #[inline]
    fn converged(&self, dev_old: f64, dev: f64) -> bool {
        dev.is_finite() && (dev_old - dev).abs() < self.tolerance * (dev.abs() + 0.1)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|x| x.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrlsState {
    Running,
    Converged,
    Diverged,
    MaxIterExceeded,
}

/// Outcome of a successful [`fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    /// Always [`IrlsState::Converged`]; a fit ending in any other terminal
    /// state is reported as an [`Error`] instead.
    pub state: IrlsState,
    pub iterations: usize,
    pub deviance: f64,
    /// Accepted deviance after each iteration.
    pub deviance_history: Vec<f64>,
}

/// Runs IRLS until the deviance settles, alternating a weighted least squares
/// update of `pred` with a refresh of `resp`.
///
/// A step that fails to lower the deviance (or produces an invalid linear
/// predictor) is repeatedly halved towards the previous coefficients; once
/// the step factor drops below `min_step_factor` the fit fails with
/// [`Error::Diverged`]. Preconditions are checked before either argument is
/// touched.
#[tracing::instrument(skip(pred, resp))]
pub fn fit<P: LinPred, D: Family>(
    pred: &mut P,
    resp: &mut GlmResponse<D>,
    control: IrlsControl,
) -> Result<FitSummary, Error> {
    control.validate()?;
    Error::check_len("design rows", resp.len(), pred.nobs())?;

    let mut state = IrlsState::Running;
    let mut dev_old = f64::INFINITY;
    let mut history = Vec::with_capacity(control.max_iter);
    let mut iter = 0;
    while state == IrlsState::Running {
        if iter >= control.max_iter {
            state = IrlsState::MaxIterExceeded;
            break;
        }
        iter += 1;

        let beta_old = pred.beta().to_vec();
        let z = resp.working_response()?;
        let w = resp.sqrt_working_weights()?;
        pred.update(&z, &w)?;
        let mut dev = candidate_deviance(&*pred, resp)?;

        let mut step = 1.0;
        while !control.converged(dev_old, dev) && !(dev < dev_old) {
            step /= 2.0;
            if step < control.min_step_factor {
                state = IrlsState::Diverged;
                break;
            }
            let halved = pred
                .beta()
                .iter()
                .zip(&beta_old)
                .map(|(b, b_old)| (b + b_old) / 2.0)
                .collect::<Vec<_>>();
            pred.set_beta(&halved)?;
            dev = candidate_deviance(&*pred, resp)?;
            warn!(step, dev, dev_old, "Deviance did not decrease, halving step");
        }
        if state == IrlsState::Diverged {
            break;
        }

        trace!(dev, step, "Iteration {}", iter);
        history.push(dev);
        if control.converged(dev_old, dev) {
            state = IrlsState::Converged;
        }
        dev_old = dev;
    }

    match state {
        IrlsState::Converged => {
            debug!("Converged after {} iterations", iter);
            Ok(FitSummary {
                state,
                iterations: iter,
                deviance: dev_old,
                deviance_history: history,
            })
        },
        IrlsState::Diverged => {
            warn!("Deviance failed to decrease after step-halving at iteration {}", iter);
            Err(Error::Diverged {
                deviance: dev_old,
                iterations: iter,
            })
        },
        _ => {
            warn!("Did not converge after {} iterations", control.max_iter);
            Err(Error::MaxIterExceeded {
                deviance: dev_old,
                iterations: iter,
            })
        },
    }
}

// an invalid linear predictor counts as an infinitely bad step so that
// step-halving pulls it back into the domain
fn candidate_deviance<P: LinPred, D: Family>(
    pred: &P,
    resp: &mut GlmResponse<D>,
) -> Result<f64, Error> {
    match resp.update(&pred.linear_predictor()) {
        Err(e @ Error::InvalidEta { .. }) => {
            debug!("rejected step: {}", e);
            Ok(f64::INFINITY)
        },
        res => res,
    }
}
