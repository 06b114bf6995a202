use faer::Mat;
use glmcore::{
    family, fit, DensePredChol, DensePredQr, Error, ErrorKind, Family, GlmModel, GlmResponse,
    IrlsControl, IrlsState, LinPred, Link,
};
use test_log::test;

macro_rules! assert_float_eq {
    ($a:expr, $b:expr, $tol:expr) => {
        assert!(($a - $b).abs() < $tol, "{:.22} != {:.22}", $a, $b);
    };
}

fn with_intercept(x: &[f64]) -> Mat<f64> {
    Mat::from_fn(x.len(), 2, |i, j| if j == 0 { 1.0 } else { x[i] })
}

#[test]
fn test_gaussian_identity_noiseless() {
    let x = [1.0, 2.0, 3.0, 4.0, 5.0];
    let y = x.iter().map(|x| 2.0 + 3.0 * x).collect::<Vec<_>>();

    let mut pred = DensePredQr::new(with_intercept(&x));
    let mut resp = GlmResponse::from_y(family::Gaussian, y.clone()).unwrap();
    let summary = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap();
    assert_eq!(summary.state, IrlsState::Converged);
    assert!(summary.iterations <= 2);
    assert_float_eq!(pred.beta()[0], 2.0, 1e-10);
    assert_float_eq!(pred.beta()[1], 3.0, 1e-10);
    assert_float_eq!(summary.deviance, 0.0, 1e-12);

    let mut pred = DensePredChol::new(with_intercept(&x));
    let mut resp = GlmResponse::from_y(family::Gaussian, y).unwrap();
    let summary = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap();
    assert!(summary.iterations <= 2);
    assert_float_eq!(pred.beta()[0], 2.0, 1e-10);
    assert_float_eq!(pred.beta()[1], 3.0, 1e-10);
}

#[test]
fn test_bernoulli_logit_overlapping() {
    let x = [-2.0, -1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5, 2.0, 2.5];
    let y = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
    let m = GlmModel::fit(
        with_intercept(&x).as_ref(),
        &y,
        family::Bernoulli,
        None,
        IrlsControl::new(),
    )
    .unwrap();
    assert_eq!(m.summary().state, IrlsState::Converged);
    assert!(m.deviance() < m.null_deviance(IrlsControl::new()).unwrap());
    assert!(m.coef()[1] > 0.0);
    assert!(m.fitted().iter().all(|mu| *mu > 0.0 && *mu < 1.0));
}

#[test]
fn test_bernoulli_logit_separable() {
    let x = [-2.0, -1.5, -1.0, -0.5, 0.5, 1.0, 1.5, 2.0];
    let y = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

    let mut pred = DensePredQr::new(with_intercept(&x));
    let mut resp = GlmResponse::from_y(family::Bernoulli, y.to_vec()).unwrap();
    let null = resp.null_deviance();
    let summary = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap();
    assert_eq!(summary.state, IrlsState::Converged);
    assert!(summary.iterations <= 30);
    assert!(summary.deviance < null);
    assert!(summary.deviance < 1e-6);
    assert!(pred.beta()[1] > 20.0);
    assert!(resp.mu().iter().all(|mu| *mu > 0.0 && *mu < 1.0));

    let mut pred = DensePredChol::new(with_intercept(&x));
    let mut resp = GlmResponse::from_y(family::Bernoulli, y.to_vec()).unwrap();
    let summary = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap();
    assert!(summary.iterations <= 30);
    assert!(summary.deviance < null);
}

#[test]
fn test_poisson_log_deviance_decreases() {
    let x = (0..11).map(|i| i as f64 / 10.0).collect::<Vec<_>>();
    let y = vec![1.0, 0.0, 2.0, 3.0, 2.0, 5.0, 6.0, 8.0, 10.0, 13.0, 15.0];
    let mut pred = DensePredQr::new(with_intercept(&x));
    let mut resp = GlmResponse::from_y(family::Poisson, y).unwrap();
    let summary = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap();
    assert_eq!(summary.state, IrlsState::Converged);

    let hist = &summary.deviance_history;
    assert!(hist.len() >= 2);
    // the last accepted step may sit within rounding of its predecessor
    for w in hist[..hist.len() - 1].windows(2) {
        assert!(w[1] < w[0], "{:?}", hist);
    }
    let last = hist.len() - 1;
    assert!(hist[last] <= hist[last - 1] * (1.0 + 1e-12));

    let ss = resp
        .deviance_residuals()
        .iter()
        .map(|r| r * r)
        .sum::<f64>();
    assert_float_eq!(ss, resp.deviance(), 1e-10);
    assert_float_eq!(summary.deviance, resp.deviance(), 1e-12);
}

#[test]
fn test_gamma_inverse() {
    let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    let y = vec![1.2, 0.9, 0.7, 0.6, 0.5, 0.45];
    let mut pred = DensePredChol::new(with_intercept(&x));
    let mut resp = GlmResponse::from_y(family::Gamma, y).unwrap();
    assert_eq!(resp.link(), Link::Inverse);
    fit(&mut pred, &mut resp, IrlsControl::new()).unwrap();
    assert!(resp.deviance() < resp.null_deviance());
    assert!(resp.eta().iter().all(|eta| *eta > 0.0));
}

#[test]
fn test_zero_max_iter_leaves_state_untouched() {
    let x = [1.0, 2.0, 3.0];
    let mut pred = DensePredQr::with_beta(with_intercept(&x), vec![0.5, 0.5]).unwrap();
    let mut resp = GlmResponse::from_y(family::Poisson, vec![1.0, 2.0, 4.0]).unwrap();
    let mu = resp.mu().to_vec();
    let err = fit(&mut pred, &mut resp, IrlsControl::new().with_max_iter(0)).unwrap_err();
    assert_eq!(err, Error::InvalidMaxIter(0));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(pred.beta(), &[0.5, 0.5]);
    assert_eq!(resp.mu(), mu.as_slice());
}

#[test]
fn test_rank_deficient_design() {
    let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let design = Mat::from_fn(x.len(), 3, |i, j| match j {
        0 => 1.0,
        1 => x[i],
        _ => 2.0 * x[i],
    });
    let y = x.iter().map(|x| 1.0 + x).collect::<Vec<_>>();

    let mut pred = DensePredChol::new(design.clone());
    let mut resp = GlmResponse::from_y(family::Gaussian, y.clone()).unwrap();
    let err = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap_err();
    assert_eq!(err, Error::NotPositiveDefinite);
    assert!(err.is_ill_conditioned());

    let mut pred = DensePredQr::new(design);
    let mut resp = GlmResponse::from_y(family::Gaussian, y).unwrap();
    let err = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap_err();
    assert!(matches!(err, Error::RankDeficient(_)));
    assert!(err.is_ill_conditioned());
}

// identity link whose variance grows with the mean, scored by distance of the
// mean from zero; the reweighted step always moves away from the best fit
#[derive(Debug, Clone, Copy)]
struct Skewed;

impl Family for Skewed {
    fn name(&self) -> &'static str {
        "skewed"
    }

    fn canonical_link(&self) -> Link {
        Link::Identity
    }

    fn variance(&self, mu: f64) -> f64 {
        mu.exp()
    }

    fn dev_resid(&self, _y: f64, mu: f64, wt: f64) -> f64 {
        wt * mu * mu
    }

    fn mu_start(&self, y: f64, _wt: f64) -> f64 {
        y
    }

    fn in_support(&self, y: f64) -> bool {
        y.is_finite()
    }
}

#[test]
fn test_step_halving_gives_up() {
    let mut pred = DensePredQr::new(Mat::from_fn(2, 1, |_, _| 1.0));
    let mut resp = GlmResponse::from_y(Skewed, vec![0.0, 10.0]).unwrap();
    let err = fit(&mut pred, &mut resp, IrlsControl::new()).unwrap_err();
    match err {
        Error::Diverged {
            deviance,
            iterations,
        } => {
            assert_eq!(iterations, 2);
            // the first step lands on the weighted mean 10 / (1 + e^10)
            let b = 10.0 / (1.0 + 10.0f64.exp());
            assert_float_eq!(deviance, 2.0 * b * b, 1e-12);
        },
        e => panic!("unexpected error {e}"),
    }
    assert_eq!(err.kind(), ErrorKind::Convergence);
}

#[test]
fn test_control_round_trips_through_json() {
    let control = IrlsControl::new()
        .with_max_iter(100)
        .with_tolerance(1e-9);
    let json = serde_json::to_string(&control).unwrap();
    let back: IrlsControl = serde_json::from_str(&json).unwrap();
    assert_eq!(back, control);
    let link: Link = serde_json::from_str(r#""cloglog""#).unwrap();
    assert_eq!(link, Link::Cloglog);
}
