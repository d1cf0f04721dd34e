//! View construction from factor scores.
//!
//! One absolute-return view per optimized ticker: a composite z of +1
//! maps to `alpha_scalar` of annual excess return, scaled by the
//! ticker's own volatility. Confidence comes from the agreement of the
//! three factor z-scores: a ticker all three factors like is a more
//! trustworthy view than one with factors in conflict.

use cadiz_traits::Ticker;
use serde::{Deserialize, Serialize};

/// Views with an alpha magnitude below this are dropped: a zero-alpha
/// view carries no information and would only dilute the prior.
pub const ZERO_VIEW_TOL: f64 = 1e-12;

/// An absolute expected-excess-return view on one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Ticker the view is about.
    pub ticker: Ticker,
    /// Column index of the ticker in the optimization set.
    pub index: usize,
    /// Annual expected excess return.
    pub expected_excess_return: f64,
    /// Confidence in `[0, 1]`, the posterior blend weight of this view.
    pub confidence: f64,
}

/// Map the dispersion of the three factor z-scores to a confidence.
///
/// Dispersion is the sample standard deviation of
/// `(z_value, z_quality, z_momentum)`; tight agreement earns high
/// confidence.
#[must_use]
pub fn confidence_from_dispersion(dispersion: f64) -> f64 {
    if !dispersion.is_finite() {
        return 0.20;
    }
    if dispersion < 0.5 {
        0.80
    } else if dispersion < 1.0 {
        0.60
    } else if dispersion < 1.5 {
        0.40
    } else {
        0.20
    }
}

/// Build views for an optimization set.
///
/// Inputs are aligned by index: `z_total[i]`, `z_components[i]`, and
/// `volatilities[i]` all describe `tickers[i]`. Views whose alpha is
/// numerically zero are dropped; the caller treats an empty view list as
/// "posterior equals prior".
#[must_use]
pub fn build_views(
    tickers: &[Ticker],
    z_total: &[f64],
    z_components: &[(f64, f64, f64)],
    volatilities: &[f64],
    alpha_scalar: f64,
) -> Vec<View> {
    let n = tickers.len().min(z_total.len()).min(volatilities.len());
    let mut views = Vec::with_capacity(n);
    for i in 0..n {
        let q = z_total[i] * volatilities[i] * alpha_scalar;
        if !q.is_finite() || q.abs() < ZERO_VIEW_TOL {
            continue;
        }
        let (zv, zq, zm) = z_components[i];
        views.push(View {
            ticker: tickers[i].clone(),
            index: i,
            expected_excess_return: q,
            confidence: confidence_from_dispersion(dispersion(zv, zq, zm)),
        });
    }
    views
}

/// Sample standard deviation of the three z-components.
fn dispersion(a: f64, b: f64, c: f64) -> f64 {
    let mean = (a + b + c) / 3.0;
    (((a - mean).powi(2) + (b - mean).powi(2) + (c - mean).powi(2)) / 2.0).sqrt()
}
