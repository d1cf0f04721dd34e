//! Constrained portfolio optimization.
//!
//! Five objectives over the posterior, under per-ticker bounds, a
//! per-sector gross exposure cap, and a budget. Long/short construction
//! decomposes into two long-form solves: the long book on the
//! non-negative-composite tickers and the short book on the negated
//! posterior of the rest, with the short book constrained to the sector
//! headroom the long book left.
//!
//! The quadratic term always carries a tiny ridge, so degenerate faces
//! of the feasible set resolve to their interior point and outputs are
//! deterministic.

use crate::solver::solve_box_qp;
use cadiz_traits::{CadizError, Objective, Result, Sector, StrategyConfig, Ticker, TradingMode};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Relative ridge added to the quadratic term for tie-breaking.
const RIDGE_SCALE: f64 = 1e-8;

/// Weights with magnitude below this are snapped to exactly zero.
const WEIGHT_SNAP: f64 = 1e-10;

/// Sector cap violations below this tolerance are ignored.
const SECTOR_TOL: f64 = 1e-9;

/// Golden-section iterations of the max-Sharpe frontier search.
const SHARPE_SEARCH_ITER: usize = 60;

/// Bisection iterations of the efficient-risk / efficient-return search.
const TARGET_SEARCH_ITER: usize = 80;

/// Log-10 range of risk aversion swept by the frontier searches.
const GAMMA_LOG_RANGE: (f64, f64) = (-4.0, 4.0);

/// One optimization problem: posterior moments plus sector and
/// composite metadata, aligned by index.
#[derive(Debug, Clone)]
pub struct PortfolioProblem {
    /// Tickers in column order.
    pub tickers: Vec<Ticker>,
    /// Posterior expected returns.
    pub mean: DVector<f64>,
    /// Posterior covariance.
    pub covariance: DMatrix<f64>,
    /// Sector of each ticker.
    pub sectors: Vec<Sector>,
    /// Composite factor score of each ticker (drives the long/short
    /// partition).
    pub composite: Vec<f64>,
}

impl PortfolioProblem {
    fn validate(&self) -> Result<()> {
        let n = self.tickers.len();
        if n == 0 {
            return Err(CadizError::EmptyOptimizationSet);
        }
        if self.mean.len() != n
            || self.covariance.nrows() != n
            || self.covariance.ncols() != n
            || self.sectors.len() != n
            || self.composite.len() != n
        {
            return Err(CadizError::InvalidData(format!(
                "problem shape mismatch for {n} tickers"
            )));
        }
        Ok(())
    }
}

/// Optimized weights with the portfolio-level statistics of the solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPortfolio {
    /// Tickers, aligned with `weights`.
    pub tickers: Vec<Ticker>,
    /// Portfolio weights.
    pub weights: Vec<f64>,
    /// Posterior expected return of the portfolio.
    pub expected_return: f64,
    /// Posterior volatility of the portfolio.
    pub volatility: f64,
    /// Sharpe ratio against the configured risk-free rate.
    pub sharpe: f64,
}

impl OptimizedPortfolio {
    /// Net exposure: sum of signed weights.
    #[must_use]
    pub fn net_exposure(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Gross exposure: sum of absolute weights.
    #[must_use]
    pub fn gross_exposure(&self) -> f64 {
        self.weights.iter().map(|w| w.abs()).sum()
    }
}

/// Convex portfolio optimizer over a posterior.
#[derive(Debug, Clone)]
pub struct PortfolioOptimizer {
    objective: Objective,
    mode: TradingMode,
    weight_bounds: (f64, f64),
    sector_cap: f64,
    risk_aversion: f64,
    risk_free_rate: f64,
    min_target_sharpe: Option<f64>,
}

impl PortfolioOptimizer {
    /// Create an optimizer from the strategy configuration.
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            objective: config.objective,
            mode: config.mode,
            weight_bounds: config.weight_bounds,
            sector_cap: config.sector_cap,
            risk_aversion: config.risk_aversion,
            risk_free_rate: config.risk_free_rate,
            min_target_sharpe: config.min_target_sharpe,
        }
    }

    /// Solve the configured problem.
    ///
    /// # Errors
    ///
    /// - [`CadizError::EmptyOptimizationSet`] on an empty problem;
    /// - [`CadizError::ConfigurationInvalid`] when the bounds cannot
    ///   meet the budget (including the single-ticker case);
    /// - [`CadizError::SolverInfeasible`] when an efficient-risk /
    ///   efficient-return target is unreachable or a long/short book
    ///   has no tickers on its side.
    pub fn optimize(&self, problem: &PortfolioProblem) -> Result<OptimizedPortfolio> {
        problem.validate()?;
        match self.mode {
            TradingMode::LongOnly => self.optimize_long_only(problem),
            TradingMode::LongShort {
                long_exposure,
                short_exposure,
            } => self.optimize_long_short(problem, long_exposure, short_exposure),
        }
    }

    fn optimize_long_only(&self, problem: &PortfolioProblem) -> Result<OptimizedPortfolio> {
        let n = problem.tickers.len();
        let (lower, upper) = self.weight_bounds;
        let budget = self.mode.net_exposure();

        if n == 1 {
            if budget < lower - 1e-12 || budget > upper + 1e-12 {
                return Err(CadizError::ConfigurationInvalid(format!(
                    "single-ticker universe cannot hold {budget} within bounds ({lower}, {upper})"
                )));
            }
            return Ok(self.finish(problem, vec![budget]));
        }
        if n as f64 * upper < budget - 1e-12 {
            return Err(CadizError::ConfigurationInvalid(format!(
                "bounds admit at most {} of the {budget} budget",
                n as f64 * upper
            )));
        }
        if n as f64 * lower > budget + 1e-12 {
            return Err(CadizError::ConfigurationInvalid(format!(
                "bounds force at least {} against the {budget} budget",
                n as f64 * lower
            )));
        }

        let caps: HashMap<Sector, f64> =
            problem.sectors.iter().map(|&s| (s, self.sector_cap)).collect();
        let all: Vec<usize> = (0..n).collect();
        let weights = self.solve_with_sector_caps(
            problem,
            &problem.mean,
            &all,
            budget,
            lower,
            upper,
            &caps,
            self.objective,
        )?;

        let portfolio = self.finish(problem, weights);
        if let (Objective::MaxSharpe, Some(floor)) = (self.objective, self.min_target_sharpe) {
            if portfolio.sharpe < 0.95 * floor {
                tracing::warn!(
                    achieved = portfolio.sharpe,
                    floor,
                    "achieved Sharpe below minimum target, returning best available solution"
                );
            }
        }
        Ok(portfolio)
    }

    fn optimize_long_short(
        &self,
        problem: &PortfolioProblem,
        long_exposure: f64,
        short_exposure: f64,
    ) -> Result<OptimizedPortfolio> {
        let n = problem.tickers.len();
        let upper = self.weight_bounds.1;

        let longs: Vec<usize> = (0..n).filter(|&i| problem.composite[i] >= 0.0).collect();
        let shorts: Vec<usize> = (0..n).filter(|&i| problem.composite[i] < 0.0).collect();
        if longs.is_empty() {
            return Err(CadizError::SolverInfeasible(
                "no non-negative-composite tickers for the long book".to_string(),
            ));
        }

        let long_caps: HashMap<Sector, f64> =
            problem.sectors.iter().map(|&s| (s, self.sector_cap)).collect();
        let long_weights = self.solve_with_sector_caps(
            problem,
            &problem.mean,
            &longs,
            long_exposure,
            0.0,
            upper,
            &long_caps,
            Objective::MaxSharpe,
        )?;

        // The short book may only use the sector headroom the long book
        // left, keeping combined gross exposure per sector under the cap.
        let mut short_caps = long_caps;
        for (sector, cap) in short_caps.iter_mut() {
            *cap = (self.sector_cap - sector_gross(&long_weights, &problem.sectors, *sector))
                .max(0.0);
        }

        let mut weights = long_weights;
        if short_exposure > 0.0 {
            if shorts.is_empty() {
                tracing::warn!(
                    short_exposure,
                    "no negative-composite tickers, short book left unallocated"
                );
            } else {
                let negated = -&problem.mean;
                let short_magnitudes = self.solve_with_sector_caps(
                    problem,
                    &negated,
                    &shorts,
                    short_exposure,
                    0.0,
                    upper,
                    &short_caps,
                    Objective::MaxSharpe,
                )?;
                for i in 0..n {
                    weights[i] -= short_magnitudes[i];
                }
            }
        }

        Ok(self.finish(problem, weights))
    }

    /// Solve an objective on a subset, repairing sector-cap violations.
    ///
    /// Each violating sector (worst first) is re-solved in isolation
    /// with its cap as the budget and frozen; the remaining tickers are
    /// re-solved with the remaining budget. Budget that no sector can
    /// absorb stays in cash.
    #[allow(clippy::too_many_arguments)]
    fn solve_with_sector_caps(
        &self,
        problem: &PortfolioProblem,
        mean: &DVector<f64>,
        indices: &[usize],
        budget: f64,
        lower: f64,
        upper: f64,
        caps: &HashMap<Sector, f64>,
        objective: Objective,
    ) -> Result<Vec<f64>> {
        let n = problem.tickers.len();
        let mut weights: Vec<f64> = vec![0.0; n];
        let mut active: Vec<usize> = indices.to_vec();
        let mut frozen: HashSet<Sector> = HashSet::new();
        let sector_count = caps.len().max(1);

        for _ in 0..=sector_count {
            for &i in &active {
                weights[i] = 0.0;
            }
            let frozen_sum: f64 = (0..n)
                .filter(|i| frozen.contains(&problem.sectors[*i]))
                .map(|i| weights[i].abs())
                .sum();
            let remaining = (budget - frozen_sum).max(0.0);

            if !active.is_empty() && remaining > WEIGHT_SNAP {
                let solved =
                    self.solve_objective(problem, mean, &active, remaining, lower, upper, objective)?;
                for (k, &i) in active.iter().enumerate() {
                    weights[i] = solved[k];
                }
            }

            let violator = caps
                .iter()
                .filter(|&(sector, _)| !frozen.contains(sector))
                .map(|(&sector, &cap)| (sector, sector_gross(&weights, &problem.sectors, sector) - cap))
                .filter(|(_, excess)| *excess > SECTOR_TOL)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            let Some((sector, _)) = violator else {
                snap_weights(&mut weights);
                return Ok(weights);
            };

            let members: Vec<usize> = active
                .iter()
                .copied()
                .filter(|&i| problem.sectors[i] == sector)
                .collect();
            let cap = caps[&sector].min(budget);
            for &i in &members {
                weights[i] = 0.0;
            }
            if !members.is_empty() && cap > WEIGHT_SNAP {
                let solved =
                    self.solve_objective(problem, mean, &members, cap, lower, upper, objective)?;
                for (k, &i) in members.iter().enumerate() {
                    weights[i] = solved[k];
                }
            }
            frozen.insert(sector);
            active.retain(|&i| problem.sectors[i] != sector);
        }

        snap_weights(&mut weights);
        Ok(weights)
    }

    /// Solve one objective on a subset of the problem, without sector
    /// caps. Returns weights aligned with `indices`.
    #[allow(clippy::too_many_arguments)]
    fn solve_objective(
        &self,
        problem: &PortfolioProblem,
        mean: &DVector<f64>,
        indices: &[usize],
        budget: f64,
        lower: f64,
        upper: f64,
        objective: Objective,
    ) -> Result<DVector<f64>> {
        let k = indices.len();
        let mu = DVector::from_iterator(k, indices.iter().map(|&i| mean[i]));
        let mut sigma = DMatrix::zeros(k, k);
        for (a, &i) in indices.iter().enumerate() {
            for (b, &j) in indices.iter().enumerate() {
                sigma[(a, b)] = problem.covariance[(i, j)];
            }
        }
        let ridge = RIDGE_SCALE * (sigma.trace() / k as f64).max(1e-12);
        let mut sigma_r = sigma.clone();
        for i in 0..k {
            sigma_r[(i, i)] += ridge;
        }

        let lower_v = DVector::from_element(k, lower);
        let upper_v = DVector::from_element(k, upper);
        let solve_gamma = |gamma: f64, c: &DVector<f64>| -> DVector<f64> {
            solve_box_qp(&(&sigma_r * gamma), c, &lower_v, &upper_v, budget)
        };

        let weights = match objective {
            Objective::MinVariance => {
                solve_box_qp(&(&sigma_r * 2.0), &DVector::zeros(k), &lower_v, &upper_v, budget)
            }
            Objective::MaxQuadraticUtility => solve_gamma(self.risk_aversion, &mu),
            Objective::MaxSharpe => {
                let excess = &mu - DVector::from_element(k, self.risk_free_rate);
                let sharpe_of = |w: &DVector<f64>| -> f64 {
                    let vol = quad_form(&sigma, w).max(0.0).sqrt();
                    if vol <= 0.0 {
                        f64::NEG_INFINITY
                    } else {
                        excess.dot(w) / vol
                    }
                };
                // Sharpe is unimodal along the frontier traced by the
                // risk-aversion sweep; golden-section search over the
                // exponent is exact to tolerance.
                let phi = (5.0f64.sqrt() - 1.0) / 2.0;
                let (mut a, mut b) = GAMMA_LOG_RANGE;
                let mut x1 = b - phi * (b - a);
                let mut x2 = a + phi * (b - a);
                let mut f1 = sharpe_of(&solve_gamma(10f64.powf(x1), &excess));
                let mut f2 = sharpe_of(&solve_gamma(10f64.powf(x2), &excess));
                for _ in 0..SHARPE_SEARCH_ITER {
                    if f1 < f2 {
                        a = x1;
                        x1 = x2;
                        f1 = f2;
                        x2 = a + phi * (b - a);
                        f2 = sharpe_of(&solve_gamma(10f64.powf(x2), &excess));
                    } else {
                        b = x2;
                        x2 = x1;
                        f2 = f1;
                        x1 = b - phi * (b - a);
                        f1 = sharpe_of(&solve_gamma(10f64.powf(x1), &excess));
                    }
                }
                solve_gamma(10f64.powf(0.5 * (a + b)), &excess)
            }
            Objective::EfficientRisk { target_volatility } => {
                let vol_of =
                    |w: &DVector<f64>| -> f64 { quad_form(&sigma, w).max(0.0).sqrt() };
                let (lo_exp, hi_exp) = GAMMA_LOG_RANGE;
                let aggressive = solve_gamma(10f64.powf(lo_exp), &mu);
                if vol_of(&aggressive) <= target_volatility {
                    aggressive
                } else {
                    let defensive = solve_gamma(10f64.powf(hi_exp), &mu);
                    if vol_of(&defensive) > target_volatility + 1e-6 {
                        return Err(CadizError::SolverInfeasible(format!(
                            "minimum reachable volatility {} exceeds target {target_volatility}",
                            vol_of(&defensive)
                        )));
                    }
                    // Smallest gamma whose volatility is under target
                    let (mut lo, mut hi) = (lo_exp, hi_exp);
                    for _ in 0..TARGET_SEARCH_ITER {
                        let mid = 0.5 * (lo + hi);
                        if vol_of(&solve_gamma(10f64.powf(mid), &mu)) > target_volatility {
                            lo = mid;
                        } else {
                            hi = mid;
                        }
                    }
                    solve_gamma(10f64.powf(hi), &mu)
                }
            }
            Objective::EfficientReturn { target_return } => {
                let min_var_q = &sigma_r * 2.0;
                let ret_of = |w: &DVector<f64>| mu.dot(w);
                let solve_lambda = |lambda: f64| -> DVector<f64> {
                    solve_box_qp(&min_var_q, &(&mu * lambda), &lower_v, &upper_v, budget)
                };
                let base = solve_lambda(0.0);
                if ret_of(&base) >= target_return {
                    base
                } else {
                    let max_lambda = 1e6;
                    let greedy = solve_lambda(max_lambda);
                    if ret_of(&greedy) < target_return - 1e-9 {
                        return Err(CadizError::SolverInfeasible(format!(
                            "maximum reachable return {} below target {target_return}",
                            ret_of(&greedy)
                        )));
                    }
                    let (mut lo, mut hi) = (0.0, max_lambda);
                    for _ in 0..TARGET_SEARCH_ITER {
                        let mid = 0.5 * (lo + hi);
                        if ret_of(&solve_lambda(mid)) < target_return {
                            lo = mid;
                        } else {
                            hi = mid;
                        }
                    }
                    solve_lambda(hi)
                }
            }
        };
        Ok(weights)
    }

    fn finish(&self, problem: &PortfolioProblem, mut weights: Vec<f64>) -> OptimizedPortfolio {
        snap_weights(&mut weights);
        let w = DVector::from_column_slice(&weights);
        let expected_return = problem.mean.dot(&w);
        let volatility = quad_form(&problem.covariance, &w).max(0.0).sqrt();
        let sharpe = if volatility > 0.0 {
            (expected_return - self.risk_free_rate * w.sum()) / volatility
        } else {
            f64::NAN
        };
        OptimizedPortfolio {
            tickers: problem.tickers.clone(),
            weights,
            expected_return,
            volatility,
            sharpe,
        }
    }
}

fn quad_form(sigma: &DMatrix<f64>, w: &DVector<f64>) -> f64 {
    (w.transpose() * sigma * w)[(0, 0)]
}

fn sector_gross(weights: &[f64], sectors: &[Sector], sector: Sector) -> f64 {
    weights
        .iter()
        .zip(sectors)
        .filter(|&(_, &s)| s == sector)
        .map(|(w, _)| w.abs())
        .sum()
}

fn snap_weights(weights: &mut [f64]) {
    for w in weights.iter_mut() {
        if w.abs() < WEIGHT_SNAP {
            *w = 0.0;
        }
    }
}
