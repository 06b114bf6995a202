use faer::{Mat, MatRef};
use tracing::debug;

use crate::{
    predictor, DensePredQr, Error, Family, FitSummary, GlmResponse, IrlsControl, LinPred, Link,
};

/// A fitted generalized linear model: the converged response and predictor
/// together with the fit's summary.
#[derive(Debug, Clone)]
pub struct GlmModel<D: Family, P: LinPred> {
    resp: GlmResponse<D>,
    pred: P,
    summary: FitSummary,
}

impl<D: Family> GlmModel<D, DensePredQr> {
    /// Fits `y ~ x` with a QR predictor, the canonical link unless `link` is
    /// given, unit weights and no offset. `x` is used as is, so include a
    /// column of ones for an intercept.
    #[tracing::instrument(skip(x, y, distribution))]
    pub fn fit(
        x: MatRef<'_, f64>,
        y: &[f64],
        distribution: D,
        link: Option<Link>,
        control: IrlsControl,
    ) -> Result<Self, Error> {
        let resp = GlmResponse::with_options(distribution, link, y.to_vec(), None, None)?;
        let pred = DensePredQr::new(x.to_owned());
        Self::fit_with(pred, resp, control)
    }
}

impl<D: Family, P: LinPred> GlmModel<D, P> {
    pub fn fit_with(
        mut pred: P,
        mut resp: GlmResponse<D>,
        control: IrlsControl,
    ) -> Result<Self, Error> {
        let summary = crate::fit(&mut pred, &mut resp, control)?;
        debug!(
            deviance = summary.deviance,
            iterations = summary.iterations,
            "fitted {} model with {} link",
            resp.distribution().name(),
            resp.link()
        );
        Ok(Self {
            resp,
            pred,
            summary,
        })
    }

    #[inline]
    pub fn coef(&self) -> &[f64] {
        self.pred.beta()
    }

    /// Fitted means.
    #[inline]
    pub fn fitted(&self) -> &[f64] {
        self.resp.mu()
    }

    /// Linear predictor including the offset.
    #[inline]
    pub fn linear_predictor(&self) -> &[f64] {
        self.resp.eta()
    }

    #[inline]
    pub fn deviance(&self) -> f64 {
        self.summary.deviance
    }

    pub fn deviance_residuals(&self) -> Vec<f64> {
        self.resp.deviance_residuals()
    }

    /// IRLS weights at convergence, `weights * mu_eta^2 / variance`.
    pub fn working_weights(&self) -> Result<Vec<f64>, Error> {
        Ok(self
            .resp
            .sqrt_working_weights()?
            .into_iter()
            .map(|w| w * w)
            .collect())
    }

    #[inline]
    pub fn iterations(&self) -> usize {
        self.summary.iterations
    }

    #[inline]
    pub fn summary(&self) -> &FitSummary {
        &self.summary
    }

    #[inline]
    pub fn response(&self) -> &GlmResponse<D> {
        &self.resp
    }

    #[inline]
    pub fn predictor(&self) -> &P {
        &self.pred
    }

    /// Predicted means for the rows of `newx`, which must have one column per
    /// coefficient. No offset is applied.
    pub fn predict(&self, newx: MatRef<'_, f64>) -> Result<Vec<f64>, Error> {
        Error::check_len("new design columns", self.pred.ncoef(), newx.ncols())?;
        let eta = predictor::mat_vec(newx, self.pred.beta());
        self.resp.link().linkinv_vec(&eta)
    }
}

impl<D: Family + Clone, P: LinPred> GlmModel<D, P> {
    /// Deviance of the intercept-only model with the same link, weights and
    /// offset. Without an offset this is the deviance at the weighted mean;
    /// otherwise the intercept-only model is fitted.
    pub fn null_deviance(&self, control: IrlsControl) -> Result<f64, Error> {
        let resp = &self.resp;
        if resp.offset().iter().all(|o| *o == 0.0) {
            return Ok(resp.null_deviance());
        }
        let null_resp = GlmResponse::with_options(
            resp.distribution().clone(),
            Some(resp.link()),
            resp.y().to_vec(),
            Some(resp.offset().to_vec()),
            Some(resp.weights().to_vec()),
        )?;
        let null_pred = DensePredQr::new(Mat::from_fn(resp.len(), 1, |_, _| 1.0));
        Ok(GlmModel::fit_with(null_pred, null_resp, control)?.deviance())
    }
}
