//! Performance metrics over the backtest return series.
//!
//! Computed on per-period returns at the rebalance frequency and
//! annualized with the matching periods-per-year factor. NaN marks a
//! metric the series cannot support (too few observations, zero
//! variance, no drawdown).

use serde::{Deserialize, Serialize};

/// Terminal performance metrics of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Compounded total return over the run.
    pub total_return: f64,
    /// Compound annual growth rate.
    pub cagr: f64,
    /// Annualized volatility of period returns.
    pub volatility: f64,
    /// Annualized Sharpe ratio against the risk-free rate.
    pub sharpe: f64,
    /// Annualized Sortino ratio (downside semideviation denominator).
    pub sortino: f64,
    /// CAGR over absolute max drawdown.
    pub calmar: f64,
    /// Maximum peak-to-trough drawdown, as a positive fraction.
    pub max_drawdown: f64,
    /// Fraction of periods with a positive return.
    pub win_rate: f64,
    /// Mean positive period return.
    pub average_win: f64,
    /// Mean negative period return.
    pub average_loss: f64,
    /// Gross profits over gross losses.
    pub profit_factor: f64,
    /// Annualized Jensen's alpha against the benchmark.
    pub alpha: f64,
    /// Beta against the benchmark.
    pub beta: f64,
}

impl PerformanceMetrics {
    /// Compute metrics from aligned portfolio and benchmark period
    /// returns.
    ///
    /// `periods_per_year` annualizes (12 for monthly, 4 for quarterly
    /// rebalancing); `risk_free_rate` is annual.
    #[must_use]
    pub fn compute(
        portfolio: &[f64],
        benchmark: &[f64],
        periods_per_year: f64,
        risk_free_rate: f64,
    ) -> Self {
        let returns: Vec<f64> = portfolio.iter().copied().filter(|r| r.is_finite()).collect();
        let n = returns.len();
        if n == 0 {
            return Self::empty();
        }

        let rf_period = risk_free_rate / periods_per_year;

        let total_return = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
        let years = n as f64 / periods_per_year;
        let cagr = if total_return > -1.0 && years > 0.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            f64::NAN
        };

        let mean = returns.iter().sum::<f64>() / n as f64;
        let (volatility, sharpe) = if n > 1 {
            let variance =
                returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            let std = variance.sqrt();
            let vol = std * periods_per_year.sqrt();
            let sharpe = if std > 0.0 {
                (mean - rf_period) / std * periods_per_year.sqrt()
            } else {
                f64::NAN
            };
            (vol, sharpe)
        } else {
            (f64::NAN, f64::NAN)
        };

        let downside: f64 = returns
            .iter()
            .map(|r| (r - rf_period).min(0.0).powi(2))
            .sum::<f64>()
            / n as f64;
        let downside_dev = downside.sqrt();
        let sortino = if downside_dev > 0.0 {
            (mean - rf_period) / downside_dev * periods_per_year.sqrt()
        } else {
            f64::NAN
        };

        let max_drawdown = Self::max_drawdown(&returns);
        let calmar = if max_drawdown > 0.0 {
            cagr / max_drawdown
        } else {
            f64::NAN
        };

        let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let win_rate = wins.len() as f64 / n as f64;
        let average_win = if wins.is_empty() {
            f64::NAN
        } else {
            wins.iter().sum::<f64>() / wins.len() as f64
        };
        let average_loss = if losses.is_empty() {
            f64::NAN
        } else {
            losses.iter().sum::<f64>() / losses.len() as f64
        };
        let gross_loss: f64 = losses.iter().map(|l| l.abs()).sum();
        let profit_factor = if gross_loss > 0.0 {
            wins.iter().sum::<f64>() / gross_loss
        } else {
            f64::NAN
        };

        let (alpha, beta) = Self::alpha_beta(&returns, benchmark, periods_per_year, rf_period);

        Self {
            total_return,
            cagr,
            volatility,
            sharpe,
            sortino,
            calmar,
            max_drawdown,
            win_rate,
            average_win,
            average_loss,
            profit_factor,
            alpha,
            beta,
        }
    }

    /// Maximum drawdown of a compounded return path.
    fn max_drawdown(returns: &[f64]) -> f64 {
        let mut level = 1.0f64;
        let mut peak = 1.0f64;
        let mut max_dd = 0.0f64;
        for r in returns {
            level *= 1.0 + r;
            if level > peak {
                peak = level;
            }
            let dd = (peak - level) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
        max_dd
    }

    /// Jensen's alpha (annualized) and beta against the benchmark.
    fn alpha_beta(
        portfolio: &[f64],
        benchmark: &[f64],
        periods_per_year: f64,
        rf_period: f64,
    ) -> (f64, f64) {
        let pairs: Vec<(f64, f64)> = portfolio
            .iter()
            .zip(benchmark)
            .filter(|(p, b)| p.is_finite() && b.is_finite())
            .map(|(&p, &b)| (p, b))
            .collect();
        if pairs.len() < 2 {
            return (f64::NAN, f64::NAN);
        }
        let n = pairs.len() as f64;
        let mean_p = pairs.iter().map(|(p, _)| p).sum::<f64>() / n;
        let mean_b = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
        let mut cov = 0.0;
        let mut var_b = 0.0;
        for (p, b) in &pairs {
            cov += (p - mean_p) * (b - mean_b);
            var_b += (b - mean_b).powi(2);
        }
        if var_b <= 0.0 {
            return (f64::NAN, f64::NAN);
        }
        let beta = cov / var_b;
        let alpha = ((mean_p - rf_period) - beta * (mean_b - rf_period)) * periods_per_year;
        (alpha, beta)
    }

    fn empty() -> Self {
        Self {
            total_return: 0.0,
            cagr: f64::NAN,
            volatility: f64::NAN,
            sharpe: f64::NAN,
            sortino: f64::NAN,
            calmar: f64::NAN,
            max_drawdown: 0.0,
            win_rate: f64::NAN,
            average_win: f64::NAN,
            average_loss: f64::NAN,
            profit_factor: f64::NAN,
            alpha: f64::NAN,
            beta: f64::NAN,
        }
    }
}
