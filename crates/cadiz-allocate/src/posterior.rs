//! The Black-Litterman posterior.
//!
//! Prior: equilibrium excess returns implied by market-cap weights,
//! `pi = s * delta * Sigma * w_mkt`, optionally scaled by the macro
//! scalar `s`. Views: absolute per-ticker statements with confidences.
//! The view uncertainty matrix is sized Idzorek-style so that the
//! posterior weight on view `i` equals its configured confidence,
//! independent of tau.

use crate::views::View;
use cadiz_traits::{CadizError, Result, Ticker};
use nalgebra::{DMatrix, DVector};

/// Prior uncertainty scaling. With the Idzorek-style omega the posterior
/// blend weights are invariant to this constant, so it is not exposed in
/// configuration.
pub const TAU: f64 = 0.05;

/// Confidences are clamped into this open interval before sizing omega;
/// a confidence of exactly 1 would make the view an equality constraint.
const CONFIDENCE_CLAMP: (f64, f64) = (0.01, 0.99);

/// The market-implied prior over one optimization set.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorBlock {
    /// Tickers in column order.
    pub tickers: Vec<Ticker>,
    /// Equilibrium excess returns `pi`.
    pub equilibrium_returns: DVector<f64>,
    /// Annualized covariance `Sigma`, symmetric PSD.
    pub covariance: DMatrix<f64>,
    /// Risk aversion `delta`.
    pub risk_aversion: f64,
    /// Market-cap weights used to imply the prior.
    pub market_weights: DVector<f64>,
}

impl PriorBlock {
    /// Build the prior from market caps and a covariance estimate.
    ///
    /// `macro_scalar` multiplies the equilibrium returns (1.0 when the
    /// macro adjuster is disabled or its feed is missing).
    ///
    /// # Errors
    ///
    /// [`CadizError::EmptyOptimizationSet`] for an empty set;
    /// [`CadizError::InvalidData`] on a non-positive market cap or a
    /// covariance whose shape does not match.
    pub fn new(
        tickers: Vec<Ticker>,
        market_caps: &[f64],
        covariance: DMatrix<f64>,
        risk_aversion: f64,
        macro_scalar: f64,
    ) -> Result<Self> {
        let n = tickers.len();
        if n == 0 {
            return Err(CadizError::EmptyOptimizationSet);
        }
        if market_caps.len() != n || covariance.nrows() != n || covariance.ncols() != n {
            return Err(CadizError::InvalidData(format!(
                "prior shape mismatch: {} tickers, {} caps, {}x{} covariance",
                n,
                market_caps.len(),
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        let total: f64 = market_caps.iter().sum();
        if !(total.is_finite() && total > 0.0)
            || market_caps.iter().any(|&c| !c.is_finite() || c <= 0.0)
        {
            return Err(CadizError::InvalidData(
                "market caps must be positive and finite".to_string(),
            ));
        }

        let market_weights = DVector::from_iterator(n, market_caps.iter().map(|c| c / total));
        let equilibrium_returns = &covariance * &market_weights * (risk_aversion * macro_scalar);

        Ok(Self {
            tickers,
            equilibrium_returns,
            covariance,
            risk_aversion,
            market_weights,
        })
    }

    /// Number of tickers in the prior.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    /// Whether the prior is empty (never true for a constructed prior).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Posterior mean and covariance, in the prior's ticker order.
#[derive(Debug, Clone, PartialEq)]
pub struct Posterior {
    /// Posterior expected excess returns.
    pub mean: DVector<f64>,
    /// Posterior covariance, symmetric PSD.
    pub covariance: DMatrix<f64>,
}

/// Blend the prior with views through the Black-Litterman update.
///
/// With no views the posterior is exactly the prior: mean `pi`,
/// covariance `Sigma`. With views, each omega entry is
/// `tau * (P Sigma P')_ii * (1 - c_i) / c_i`, which makes the posterior
/// pull toward view `i` with weight `c_i`.
///
/// The update is a pure function of its inputs: identical inputs yield
/// bit-identical posteriors.
///
/// # Errors
///
/// [`CadizError::CovarianceIllConditioned`] when the view system cannot
/// be inverted; [`CadizError::InvalidData`] when a view indexes outside
/// the prior.
pub fn posterior(prior: &PriorBlock, views: &[View]) -> Result<Posterior> {
    let n = prior.len();
    if views.is_empty() {
        return Ok(Posterior {
            mean: prior.equilibrium_returns.clone(),
            covariance: prior.covariance.clone(),
        });
    }
    if let Some(view) = views.iter().find(|v| v.index >= n) {
        return Err(CadizError::InvalidData(format!(
            "view on {} indexes column {} outside prior of {n}",
            view.ticker, view.index
        )));
    }

    let k = views.len();
    let sigma = &prior.covariance;
    let pi = &prior.equilibrium_returns;

    // Pick matrix: identity rows restricted to the viewed tickers.
    let mut p = DMatrix::zeros(k, n);
    let mut q = DVector::zeros(k);
    for (row, view) in views.iter().enumerate() {
        p[(row, view.index)] = 1.0;
        q[row] = view.expected_excess_return;
    }

    let tau_sigma = sigma * TAU;
    let p_tau_sigma = &p * &tau_sigma;
    let p_tau_sigma_pt = &p_tau_sigma * p.transpose();

    let mut omega = DMatrix::zeros(k, k);
    for (row, view) in views.iter().enumerate() {
        let c = view
            .confidence
            .clamp(CONFIDENCE_CLAMP.0, CONFIDENCE_CLAMP.1);
        omega[(row, row)] = p_tau_sigma_pt[(row, row)] * (1.0 - c) / c;
    }

    let system = &p_tau_sigma_pt + &omega;
    let system_inv = system.try_inverse().ok_or_else(|| {
        CadizError::CovarianceIllConditioned("view system not invertible".to_string())
    })?;

    let residual = &q - &p * pi;
    let gain = p_tau_sigma.transpose() * &system_inv;
    let mean = pi + &gain * residual;

    // Posterior covariance: Sigma + tau*Sigma - tau*Sigma P' (...)^-1 P tau*Sigma
    let reduction = &gain * &p_tau_sigma;
    let covariance = sigma + &tau_sigma - reduction;
    let covariance = (&covariance + covariance.transpose()) * 0.5;

    Ok(Posterior { mean, covariance })
}
