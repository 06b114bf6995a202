use faer::{
    get_global_parallelism,
    linalg::{matmul::matmul, solvers::Solve},
    prelude::SolveLstsq,
    Accum, Col, ColRef, Mat, MatRef, Side,
};
use tracing::{trace, warn};

use crate::Error;

// |R_jj| at or below this fraction of the largest |R_kk| counts as a zero pivot
const QR_RANK_TOL: f64 = 1e-7;
// L_jj^2 at or below this fraction of (X'WX)_jj counts as a zero pivot
const CHOL_PIVOT_TOL: f64 = 1e-10;

/// Coefficient side of a GLM fit: a design matrix and the coefficients of
/// the linear model `X * beta`.
pub trait LinPred {
    fn nobs(&self) -> usize;

    fn ncoef(&self) -> usize;

    fn beta(&self) -> &[f64];

    fn set_beta(&mut self, beta: &[f64]) -> Result<(), Error>;

    /// `X * beta`, without any offset.
    fn linear_predictor(&self) -> Vec<f64>;

    /// Replaces `beta` with the minimizer of
    /// `|| sqrt_weights .* (target - X * beta) ||^2`.
    fn update(&mut self, target: &[f64], sqrt_weights: &[f64]) -> Result<(), Error>;
}

/// Weighted least squares through a fresh QR factorization of the weighted
/// design each update.
#[derive(Debug, Clone)]
pub struct DensePredQr {
    x: Mat<f64>,
    beta: Vec<f64>,
    wx: Mat<f64>,
    r: Option<Mat<f64>>,
}

/// Weighted least squares through the Cholesky factorization of the normal
/// equations. Cheaper than [`DensePredQr`] but refuses designs that lose full
/// column rank once weighted.
#[derive(Debug, Clone)]
pub struct DensePredChol {
    x: Mat<f64>,
    beta: Vec<f64>,
    wx: Mat<f64>,
    xtwx: Mat<f64>,
    l: Option<Mat<f64>>,
}

impl DensePredQr {
    pub fn new(x: Mat<f64>) -> Self {
        let beta = vec![0.0; x.ncols()];
        let wx = Mat::zeros(x.nrows(), x.ncols());
        Self {
            x,
            beta,
            wx,
            r: None,
        }
    }

    pub fn with_beta(x: Mat<f64>, beta: Vec<f64>) -> Result<Self, Error> {
        Error::check_len("beta", x.ncols(), beta.len())?;
        let mut pred = Self::new(x);
        pred.beta = beta;
        Ok(pred)
    }

    #[inline]
    pub fn x(&self) -> MatRef<'_, f64> {
        self.x.as_ref()
    }

    /// Upper triangular `R` of the last weighted factorization.
    pub fn r_factor(&self) -> Option<MatRef<'_, f64>> {
        self.r.as_ref().map(|r| r.as_ref())
    }
}

impl DensePredChol {
    pub fn new(x: Mat<f64>) -> Self {
        let beta = vec![0.0; x.ncols()];
        let wx = Mat::zeros(x.nrows(), x.ncols());
        let xtwx = Mat::zeros(x.ncols(), x.ncols());
        Self {
            x,
            beta,
            wx,
            xtwx,
            l: None,
        }
    }

    pub fn with_beta(x: Mat<f64>, beta: Vec<f64>) -> Result<Self, Error> {
        Error::check_len("beta", x.ncols(), beta.len())?;
        let mut pred = Self::new(x);
        pred.beta = beta;
        Ok(pred)
    }

    #[inline]
    pub fn x(&self) -> MatRef<'_, f64> {
        self.x.as_ref()
    }

    /// Lower triangular `L` of the last `X'WX = LL'` factorization.
    pub fn l_factor(&self) -> Option<MatRef<'_, f64>> {
        self.l.as_ref().map(|l| l.as_ref())
    }
}

impl LinPred for DensePredQr {
    #[inline]
    fn nobs(&self) -> usize {
        self.x.nrows()
    }

    #[inline]
    fn ncoef(&self) -> usize {
        self.x.ncols()
    }

    #[inline]
    fn beta(&self) -> &[f64] {
        &self.beta
    }

    fn set_beta(&mut self, beta: &[f64]) -> Result<(), Error> {
        Error::check_len("beta", self.ncoef(), beta.len())?;
        self.beta.copy_from_slice(beta);
        Ok(())
    }

    fn linear_predictor(&self) -> Vec<f64> {
        mat_vec(self.x.as_ref(), &self.beta)
    }

    fn update(&mut self, target: &[f64], sqrt_weights: &[f64]) -> Result<(), Error> {
        let (n, p) = (self.nobs(), self.ncoef());
        Error::check_len("target", n, target.len())?;
        Error::check_len("sqrt weights", n, sqrt_weights.len())?;
        if p == 0 {
            return Ok(());
        }
        if n < p {
            return Err(Error::RankDeficient(n));
        }
        weight_rows(self.x.as_ref(), sqrt_weights, &mut self.wx);
        let wz = weighted_target(target, sqrt_weights);

        let qr = self.wx.as_ref().qr();
        let qr_r = qr.R();
        let r = Mat::from_fn(p, p, |i, j| if i <= j { qr_r[(i, j)] } else { 0.0 });
        let max_pivot = (0..p).map(|j| r[(j, j)].abs()).fold(0.0, f64::max);
        if let Some(j) = (0..p).find(|&j| !(r[(j, j)].abs() > QR_RANK_TOL * max_pivot)) {
            warn!(column = j, "weighted design is rank deficient");
            return Err(Error::RankDeficient(j));
        }

        let wz = ColRef::from_slice(wz.as_slice());
        let beta = qr.solve_lstsq(&wz);
        for (i, b) in self.beta.iter_mut().enumerate() {
            *b = beta[i];
        }
        self.r = Some(r);
        trace!(beta = ?self.beta, "qr update");
        Ok(())
    }
}

impl LinPred for DensePredChol {
    #[inline]
    fn nobs(&self) -> usize {
        self.x.nrows()
    }

    #[inline]
    fn ncoef(&self) -> usize {
        self.x.ncols()
    }

    #[inline]
    fn beta(&self) -> &[f64] {
        &self.beta
    }

    fn set_beta(&mut self, beta: &[f64]) -> Result<(), Error> {
        Error::check_len("beta", self.ncoef(), beta.len())?;
        self.beta.copy_from_slice(beta);
        Ok(())
    }

    fn linear_predictor(&self) -> Vec<f64> {
        mat_vec(self.x.as_ref(), &self.beta)
    }

    fn update(&mut self, target: &[f64], sqrt_weights: &[f64]) -> Result<(), Error> {
        let (n, p) = (self.nobs(), self.ncoef());
        Error::check_len("target", n, target.len())?;
        Error::check_len("sqrt weights", n, sqrt_weights.len())?;
        if p == 0 {
            return Ok(());
        }
        let par = get_global_parallelism();
        weight_rows(self.x.as_ref(), sqrt_weights, &mut self.wx);
        let wz = weighted_target(target, sqrt_weights);

        matmul(
            self.xtwx.as_mut(),
            Accum::Replace,
            self.wx.transpose(),
            &self.wx,
            1.0,
            par,
        );
        let mut xtwz = Col::<f64>::zeros(p);
        matmul(
            xtwz.as_mut(),
            Accum::Replace,
            self.wx.transpose(),
            ColRef::from_slice(wz.as_slice()),
            1.0,
            par,
        );

        let llt = match self.xtwx.llt(Side::Lower) {
            Ok(llt) => llt,
            Err(e) => {
                warn!("cholesky factorization failed: {:?}", e);
                return Err(Error::NotPositiveDefinite);
            },
        };
        let llt_l = llt.L();
        if let Some(j) =
            (0..p).find(|&j| !(llt_l[(j, j)].powi(2) > CHOL_PIVOT_TOL * self.xtwx[(j, j)]))
        {
            warn!(column = j, "normal equations are numerically singular");
            return Err(Error::NotPositiveDefinite);
        }

        let beta = llt.solve(&xtwz);
        for (i, b) in self.beta.iter_mut().enumerate() {
            *b = beta[i];
        }
        self.l = Some(Mat::from_fn(
            p,
            p,
            |i, j| if i >= j { llt_l[(i, j)] } else { 0.0 },
        ));
        trace!(beta = ?self.beta, "cholesky update");
        Ok(())
    }
}

fn weight_rows(x: MatRef<'_, f64>, sqrt_weights: &[f64], wx: &mut Mat<f64>) {
    for j in 0..x.ncols() {
        for (i, w) in sqrt_weights.iter().enumerate() {
            wx[(i, j)] = x[(i, j)] * w;
        }
    }
}

#[inline]
fn weighted_target(target: &[f64], sqrt_weights: &[f64]) -> Vec<f64> {
    target
        .iter()
        .zip(sqrt_weights)
        .map(|(z, w)| z * w)
        .collect()
}

pub(crate) fn mat_vec(x: MatRef<'_, f64>, beta: &[f64]) -> Vec<f64> {
    let mut eta = Col::<f64>::zeros(x.nrows());
    matmul(
        eta.as_mut(),
        Accum::Replace,
        x,
        ColRef::from_slice(beta),
        1.0,
        get_global_parallelism(),
    );
    (0..eta.nrows()).map(|i| eta[i]).collect()
}
