use crate::Link;

/// Broad category of an [`Error`], used by callers that only care whether a
/// failure came from bad input, bad numerics or a fit that did not settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Domain,
    Shape,
    Numerical,
    Convergence,
    Precondition,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("linear predictor {eta} at index {index} is outside the domain of the {link} link")]
    InvalidEta { link: Link, index: usize, eta: f64 },
    #[error("mean {mu} at index {index} is outside the domain of the {link} link")]
    InvalidMu { link: Link, index: usize, mu: f64 },
    #[error("response {y} at index {index} is outside the support of the {family} family")]
    NotInSupport {
        family: &'static str,
        index: usize,
        y: f64,
    },
    #[error("{what} has length {found}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("derivative of the inverse link is zero at index {0}")]
    ZeroMuEta(usize),
    #[error("variance {variance} at index {index} is not positive")]
    NonPositiveVariance { index: usize, variance: f64 },
    #[error("normal equations matrix is not positive definite")]
    NotPositiveDefinite,
    #[error("weighted design matrix is rank deficient (column {0})")]
    RankDeficient(usize),
    #[error("deviance failed to decrease after step-halving at iteration {iterations} (deviance {deviance})")]
    Diverged { deviance: f64, iterations: usize },
    #[error("did not converge after {iterations} iterations (deviance {deviance})")]
    MaxIterExceeded { deviance: f64, iterations: usize },
    #[error("max_iter must be at least 1, got {0}")]
    InvalidMaxIter(usize),
    #[error("min_step_factor must lie strictly between 0 and 1, got {0}")]
    InvalidMinStepFactor(f64),
    #[error("tolerance must be finite and positive, got {0}")]
    InvalidTolerance(f64),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidEta { .. } | Error::InvalidMu { .. } | Error::NotInSupport { .. } => {
                ErrorKind::Domain
            },
            Error::DimensionMismatch { .. } => ErrorKind::Shape,
            Error::ZeroMuEta(_)
            | Error::NonPositiveVariance { .. }
            | Error::NotPositiveDefinite
            | Error::RankDeficient(_) => ErrorKind::Numerical,
            Error::Diverged { .. } | Error::MaxIterExceeded { .. } => ErrorKind::Convergence,
            Error::InvalidMaxIter(_)
            | Error::InvalidMinStepFactor(_)
            | Error::InvalidTolerance(_) => ErrorKind::Precondition,
        }
    }

    /// True for failures caused by the numerics of the problem rather than by
    /// the shape or domain of the input.
    #[inline]
    pub fn is_ill_conditioned(&self) -> bool {
        self.kind() == ErrorKind::Numerical
    }

    pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), Error> {
        if expected == found {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                what,
                expected,
                found,
            })
        }
    }
}
