//! Raw per-ticker factor inputs.
//!
//! Five sub-metrics feed the three composite factors:
//! `fcf_yield` and `earnings_yield` (value), `roic` and `gross_margin`
//! (quality), and `momentum_12m`. Any sub-metric may be missing; the
//! engine substitutes the universe median at the current rebalance.

use cadiz_traits::{FundamentalSnapshot, PriceSeries};
use serde::{Deserialize, Serialize};

/// Trading-day lookback of the momentum factor.
pub const MOMENTUM_LOOKBACK_DAYS: usize = 252;

/// Raw factor sub-metrics for one ticker at one as-of date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFactors {
    /// Free cash flow over market value.
    pub fcf_yield: Option<f64>,
    /// EBIT over market value.
    pub earnings_yield: Option<f64>,
    /// EBIT over invested capital (total assets minus current
    /// liabilities).
    pub roic: Option<f64>,
    /// Gross profit over revenue.
    pub gross_margin: Option<f64>,
    /// Trailing twelve-month price return.
    pub momentum_12m: Option<f64>,
}

impl RawFactors {
    /// Compute raw factors from a fundamental snapshot and a price
    /// series ending at the as-of date.
    ///
    /// Non-positive denominators (market value, invested capital,
    /// revenue) make the affected sub-metric missing rather than
    /// producing a sign-flipped ratio.
    #[must_use]
    pub fn compute(fundamentals: &FundamentalSnapshot, prices: &PriceSeries) -> Self {
        let price = prices.points().last().map(|p| p.close);
        let market_value = match (fundamentals.shares_outstanding, price) {
            (Some(shares), Some(price)) if shares > 0.0 && price > 0.0 => Some(shares * price),
            _ => None,
        };

        let fcf_yield = ratio(fundamentals.free_cash_flow, market_value);
        let earnings_yield = ratio(fundamentals.ebit, market_value);

        let invested_capital = match (fundamentals.total_assets, fundamentals.current_liabilities)
        {
            (Some(assets), Some(liabilities)) => Some(assets - liabilities),
            _ => None,
        };
        let roic = ratio(fundamentals.ebit, invested_capital);

        let gross_margin = ratio(fundamentals.gross_profit, fundamentals.revenue);

        let lookback = MOMENTUM_LOOKBACK_DAYS.min(prices.len().saturating_sub(1));
        let momentum_12m = if lookback > 0 {
            prices.trailing_return(lookback)
        } else {
            None
        };

        Self {
            fcf_yield,
            earnings_yield,
            roic,
            gross_margin,
            momentum_12m,
        }
    }

    /// Whether every sub-metric is missing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fcf_yield.is_none()
            && self.earnings_yield.is_none()
            && self.roic.is_none()
            && self.gross_margin.is_none()
            && self.momentum_12m.is_none()
    }
}

/// `numerator / denominator` when the denominator is strictly positive
/// and both sides are finite.
fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 && n.is_finite() && d.is_finite() => {
            let r = n / d;
            r.is_finite().then_some(r)
        }
        _ => None,
    }
}
