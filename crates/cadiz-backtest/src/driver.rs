//! The walk-forward backtest driver.
//!
//! One rebalance date runs through a fixed pipeline: resolve universe →
//! fetch prices and fundamentals → factor scores → macro scalar →
//! factor tilts → posterior → weights → regime scaling → ledger append.
//! Failure locality follows the error design: a bad ticker is dropped
//! from the date, a failed solve retries once with diagonal shrinkage
//! and then carries the previous weights forward, and only the
//! benchmark or the universe resolver going away ends the run.

use crate::calendar;
use crate::ledger::{
    Diagnostics, DroppedTicker, HoldingRecord, Ledger, LedgerEntry, SkippedRebalance, WeightRecord,
};
use crate::metrics::PerformanceMetrics;
use cadiz_allocate::{
    OptimizedPortfolio, PortfolioOptimizer, PortfolioProblem, Posterior, PriorBlock,
    aligned_returns, build_views, estimate_covariance, posterior,
};
use cadiz_factors::{FactorEngine, TickerInput};
use cadiz_regime::{FactorRegimeAdjuster, MacroAdjuster, RegimeDetector};
use cadiz_traits::{
    CadizError, Date, MarketDataProvider, PriceSeries, Result, Sector, StrategyConfig, Ticker,
    Universe, UniverseResolver,
};
use chrono::Days;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Calendar days fetched per ticker to cover two years of trading
/// history plus holidays.
const PRICE_WINDOW_DAYS: u64 = 760;

/// Calendar-day pad before the backtest start for the benchmark fetch,
/// so the first month-end can align to a trading day.
const BENCHMARK_PAD_DAYS: u64 = 40;

/// Calendar-day pad before a period start when fetching accounting
/// prices.
const ACCOUNT_PAD_DAYS: u64 = 10;

/// Minimum tickers that must survive resolution and data fetching for a
/// rebalance to proceed.
const MIN_UNIVERSE: usize = 5;

/// Cooperative cancellation handle for a running backtest.
///
/// Checked once per rebalance date; on cancellation the driver returns
/// the ledger up to the last completed date.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Portfolio and benchmark return over one holding period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturn {
    /// Period start (weights were set here).
    pub start: Date,
    /// Period end.
    pub end: Date,
    /// Portfolio return over the period, net of slippage.
    pub portfolio: f64,
    /// Benchmark return over the period.
    pub benchmark: f64,
}

/// The structured result of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Rebalance records, oldest first.
    pub ledger: Ledger,
    /// Terminal performance metrics.
    pub metrics: PerformanceMetrics,
    /// Everything skipped, dropped, retried, or aborted.
    pub diagnostics: Diagnostics,
    /// Per-period portfolio and benchmark returns.
    pub periods: Vec<PeriodReturn>,
}

impl BacktestReport {
    /// Flattened ledger rows in the fixed serialization schema.
    #[must_use]
    pub fn weight_records(&self) -> Vec<WeightRecord> {
        self.ledger.weight_records()
    }
}

/// Walk-forward backtest driver.
///
/// Owns the provider and resolver; the configuration is validated at
/// construction and a backtest refuses to start on an invalid one.
#[derive(Debug)]
pub struct BacktestDriver<P, R> {
    provider: P,
    resolver: R,
    config: StrategyConfig,
    cancel: CancelToken,
}

impl<P: MarketDataProvider, R: UniverseResolver> BacktestDriver<P, R> {
    /// Create a driver.
    ///
    /// # Errors
    ///
    /// [`CadizError::ConfigurationInvalid`] when the configuration fails
    /// validation.
    pub fn new(provider: P, resolver: R, config: StrategyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            resolver,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// A handle that cancels the running backtest cooperatively.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the walk-forward backtest over `[start, end]`.
    ///
    /// # Errors
    ///
    /// [`CadizError::ConfigurationInvalid`] on an inverted date range;
    /// [`CadizError::ProviderUnavailable`] when the benchmark series
    /// cannot be fetched at all (no ledger exists yet at that point);
    /// [`CadizError::InvalidData`] when the range contains no rebalance
    /// dates. Mid-run failures never surface as errors: they end the
    /// run early with `diagnostics.aborted` set and the partial ledger.
    pub async fn run(&self, start: Date, end: Date) -> Result<BacktestReport> {
        if start >= end {
            return Err(CadizError::ConfigurationInvalid(format!(
                "backtest start {start} is not before end {end}"
            )));
        }

        let benchmark = self
            .provider
            .benchmark_prices(start - Days::new(BENCHMARK_PAD_DAYS), end)
            .await?;
        let trading_days: Vec<Date> = benchmark.points().iter().map(|p| p.date).collect();
        let rebalance_dates = calendar::rebalance_dates(
            &trading_days,
            start,
            end,
            self.config.rebalance_frequency,
        );
        if rebalance_dates.is_empty() {
            return Err(CadizError::InvalidData(format!(
                "no rebalance dates between {start} and {end}"
            )));
        }

        let engine = FactorEngine::from_config(&self.config);
        let optimizer = PortfolioOptimizer::from_config(&self.config);
        let macro_adjuster = MacroAdjuster::from_config(&self.config);
        let tilt_adjuster = FactorRegimeAdjuster::from_config(&self.config);
        let detector = RegimeDetector::from_config(&self.config);

        let mut ledger = Ledger::new();
        let mut diagnostics = Diagnostics::default();
        let mut periods = Vec::new();
        let mut held: BTreeMap<Ticker, f64> = BTreeMap::new();
        let mut prev_date: Option<Date> = None;
        let mut pending_cost = 0.0;

        for &date in &rebalance_dates {
            if self.cancel.is_cancelled() {
                diagnostics.aborted = Some("cancelled".to_string());
                break;
            }

            if let Some(prev) = prev_date {
                let (portfolio, bench) = self
                    .accrue_period(prev, date, &held, &benchmark, &mut diagnostics)
                    .await;
                periods.push(PeriodReturn {
                    start: prev,
                    end: date,
                    portfolio: portfolio - pending_cost,
                    benchmark: bench,
                });
                pending_cost = 0.0;
            }
            prev_date = Some(date);

            match self
                .rebalance(
                    date,
                    &engine,
                    &optimizer,
                    &macro_adjuster,
                    &tilt_adjuster,
                    &detector,
                    &held,
                    &mut diagnostics,
                )
                .await
            {
                Ok(Some(entry)) => {
                    if let Some(bps) = self.config.slippage_bps {
                        pending_cost = entry.turnover * bps / 10_000.0;
                    }
                    held = entry.weights.clone();
                    ledger.push(entry);
                }
                Ok(None) => {
                    // Skipped or failed date: previous weights stay on.
                }
                Err(err) => {
                    tracing::error!(%date, %err, "run-level failure, returning partial ledger");
                    diagnostics.aborted = Some(err.to_string());
                    break;
                }
            }
        }

        // Account the tail between the last rebalance and the end date.
        if diagnostics.aborted.is_none() {
            if let (Some(prev), Some(tail_end)) = (
                prev_date,
                calendar::last_trading_day_at_or_before(&trading_days, end),
            ) {
                if tail_end > prev {
                    let (portfolio, bench) = self
                        .accrue_period(prev, tail_end, &held, &benchmark, &mut diagnostics)
                        .await;
                    periods.push(PeriodReturn {
                        start: prev,
                        end: tail_end,
                        portfolio: portfolio - pending_cost,
                        benchmark: bench,
                    });
                }
            }
        }

        let portfolio_returns: Vec<f64> = periods.iter().map(|p| p.portfolio).collect();
        let benchmark_returns: Vec<f64> = periods.iter().map(|p| p.benchmark).collect();
        let metrics = PerformanceMetrics::compute(
            &portfolio_returns,
            &benchmark_returns,
            self.config.rebalance_frequency.periods_per_year(),
            self.config.risk_free_rate,
        );

        Ok(BacktestReport {
            ledger,
            metrics,
            diagnostics,
            periods,
        })
    }

    /// Weighted portfolio return over `(start, end]` with the held
    /// weights. Cash earns zero; a held ticker without period prices
    /// contributes zero and is recorded in diagnostics.
    async fn accrue_period(
        &self,
        start: Date,
        end: Date,
        held: &BTreeMap<Ticker, f64>,
        benchmark: &PriceSeries,
        diagnostics: &mut Diagnostics,
    ) -> (f64, f64) {
        let bench = benchmark.return_between(start, end).unwrap_or(0.0);
        let mut portfolio = 0.0;
        for (ticker, &weight) in held {
            if weight == 0.0 {
                continue;
            }
            let window = self
                .provider
                .prices(ticker, start - Days::new(ACCOUNT_PAD_DAYS), end)
                .await;
            match window.ok().and_then(|s| s.return_between(start, end)) {
                Some(ticker_return) => portfolio += weight * ticker_return,
                None => diagnostics.dropped.push(DroppedTicker {
                    date: end,
                    ticker: ticker.clone(),
                    reason: "no prices over holding period, treated as cash".to_string(),
                }),
            }
        }
        (portfolio, bench)
    }

    /// Run the full pipeline for one rebalance date.
    ///
    /// `Ok(None)` means the date was skipped or failed locally and the
    /// previous weights stay on; `Err` is reserved for run-level
    /// failures that end the backtest.
    #[allow(clippy::too_many_arguments)]
    async fn rebalance(
        &self,
        date: Date,
        engine: &FactorEngine,
        optimizer: &PortfolioOptimizer,
        macro_adjuster: &MacroAdjuster,
        tilt_adjuster: &FactorRegimeAdjuster,
        detector: &RegimeDetector,
        held: &BTreeMap<Ticker, f64>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<LedgerEntry>> {
        let universe = self.resolver.resolve(date).await.map_err(|err| {
            CadizError::ProviderUnavailable(format!("universe resolution at {date}: {err}"))
        })?;
        if universe.len() < MIN_UNIVERSE {
            skip(diagnostics, date, format!("universe of {} tickers", universe.len()));
            return Ok(None);
        }

        let (inputs, price_map) = self.fetch_inputs(date, &universe, diagnostics).await;
        if inputs.len() < MIN_UNIVERSE {
            skip(
                diagnostics,
                date,
                format!("{} tickers with usable data", inputs.len()),
            );
            return Ok(None);
        }

        let tilts = if self.config.use_factor_regimes {
            Some(tilt_adjuster.tilts(&self.provider, date).await)
        } else {
            None
        };
        let scores = engine.score(date, &inputs, tilts);

        let shortlist = scores.top_n(self.config.top_n);
        let caps_map = match self.provider.market_caps(&shortlist, date).await {
            Ok(caps) => caps,
            Err(err) => {
                skip(diagnostics, date, format!("market caps unavailable: {err}"));
                return Ok(None);
            }
        };
        let set: Vec<Ticker> = shortlist
            .into_iter()
            .filter(|ticker| {
                let has_cap = caps_map.contains_key(ticker);
                if !has_cap {
                    diagnostics.dropped.push(DroppedTicker {
                        date,
                        ticker: ticker.clone(),
                        reason: "no point-in-time market cap".to_string(),
                    });
                }
                has_cap
            })
            .collect();
        if set.is_empty() {
            skip(diagnostics, date, "empty optimization set".to_string());
            return Ok(None);
        }

        let series_refs: Vec<(Ticker, &PriceSeries)> = set
            .iter()
            .map(|ticker| (ticker.clone(), &price_map[ticker]))
            .collect();
        let sigma = match aligned_returns(&series_refs).and_then(|r| estimate_covariance(&r)) {
            Ok(estimate) => estimate.matrix,
            Err(err) => {
                tracing::warn!(%date, %err, "covariance estimation failed");
                diagnostics.failed.push(date);
                return Ok(None);
            }
        };

        let macro_scalar = if self.config.use_macro {
            macro_adjuster.scalar(&self.provider, date).await
        } else {
            1.0
        };

        let caps_vec: Vec<f64> = set.iter().map(|t| caps_map[t]).collect();
        let sectors: Vec<Sector> = set
            .iter()
            .map(|t| universe.sector_of(t).unwrap_or(Sector::Unknown))
            .collect();
        let z_total: Vec<f64> = set
            .iter()
            .map(|t| scores.total_of(t).unwrap_or(0.0))
            .collect();
        let z_components: Vec<(f64, f64, f64)> = set
            .iter()
            .map(|t| scores.z_components(t).unwrap_or((0.0, 0.0, 0.0)))
            .collect();

        let solve = |sigma: DMatrix<f64>| -> Result<(OptimizedPortfolio, Posterior)> {
            let volatilities: Vec<f64> =
                (0..sigma.nrows()).map(|i| sigma[(i, i)].max(0.0).sqrt()).collect();
            let prior = PriorBlock::new(
                set.clone(),
                &caps_vec,
                sigma,
                self.config.risk_aversion,
                macro_scalar,
            )?;
            let views = build_views(
                &set,
                &z_total,
                &z_components,
                &volatilities,
                self.config.alpha_scalar,
            );
            let post = posterior(&prior, &views)?;
            let problem = PortfolioProblem {
                tickers: set.clone(),
                mean: post.mean.clone(),
                covariance: post.covariance.clone(),
                sectors: sectors.clone(),
                composite: z_total.clone(),
            };
            let solved = optimizer.optimize(&problem)?;
            Ok((solved, post))
        };

        let (solved, post) = match solve(sigma.clone()) {
            Ok(result) => result,
            Err(first) => {
                tracing::warn!(%date, %first, "solve failed, retrying with diagonal shrinkage");
                diagnostics.retried.push(date);
                let mut shrunk = &sigma * 0.5;
                for i in 0..sigma.nrows() {
                    shrunk[(i, i)] = sigma[(i, i)];
                }
                match solve(shrunk) {
                    Ok(result) => result,
                    Err(second) => {
                        tracing::error!(%date, %second, "optimization failed, carrying weights");
                        diagnostics.failed.push(date);
                        return Ok(None);
                    }
                }
            }
        };

        let (regime, exposure) = if self.config.use_regime_adjustment {
            let regime = detector.classify(&self.provider, date).await;
            (Some(regime), self.config.regime_exposures.exposure_for(regime))
        } else {
            (None, 1.0)
        };

        let rf = self.config.risk_free_rate;
        let mut weights = BTreeMap::new();
        let mut holdings = Vec::new();
        for (i, ticker) in set.iter().enumerate() {
            let weight = solved.weights[i] * exposure;
            if weight == 0.0 {
                continue;
            }
            let mu = post.mean[i];
            let vol = post.covariance[(i, i)].max(0.0).sqrt();
            weights.insert(ticker.clone(), weight);
            holdings.push(HoldingRecord {
                ticker: ticker.clone(),
                weight,
                expected_return: mu,
                volatility: vol,
                sharpe: if vol > 0.0 { (mu - rf) / vol } else { f64::NAN },
            });
        }

        let net: f64 = weights.values().sum();
        let turnover = turnover_between(held, &weights);
        let volatility = solved.volatility * exposure;
        let expected_return = solved.expected_return * exposure;

        Ok(Some(LedgerEntry {
            date,
            weights,
            holdings,
            regime,
            exposure,
            cash: 1.0 - net,
            turnover,
            expected_return,
            volatility,
            sharpe: if volatility > 0.0 {
                (expected_return - rf) / volatility
            } else {
                f64::NAN
            },
        }))
    }

    /// Fetch prices and fundamentals for the universe, dropping tickers
    /// whose price history is unusable. Missing fundamentals keep the
    /// ticker: it scores neutral and stays eligible.
    async fn fetch_inputs(
        &self,
        date: Date,
        universe: &Universe,
        diagnostics: &mut Diagnostics,
    ) -> (Vec<TickerInput>, HashMap<Ticker, PriceSeries>) {
        let fetch_start = date - Days::new(PRICE_WINDOW_DAYS);
        let mut inputs = Vec::with_capacity(universe.len());
        let mut price_map = HashMap::new();
        for constituent in universe.constituents() {
            let ticker = &constituent.ticker;
            let prices = match self.provider.prices(ticker, fetch_start, date).await {
                Ok(series) => series,
                Err(err) => {
                    diagnostics.dropped.push(DroppedTicker {
                        date,
                        ticker: ticker.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            let fundamentals = self.provider.fundamentals(ticker, date).await.ok();
            price_map.insert(ticker.clone(), prices.clone());
            inputs.push(TickerInput {
                ticker: ticker.clone(),
                fundamentals,
                prices: Some(prices),
            });
        }
        (inputs, price_map)
    }

}

fn skip(diagnostics: &mut Diagnostics, date: Date, reason: String) {
    tracing::warn!(%date, reason, "skipping rebalance");
    diagnostics.skipped.push(SkippedRebalance { date, reason });
}

/// `sum |w_new - w_old|` over the union of both books.
fn turnover_between(old: &BTreeMap<Ticker, f64>, new: &BTreeMap<Ticker, f64>) -> f64 {
    let mut turnover = 0.0;
    for (ticker, &w_new) in new {
        turnover += (w_new - old.get(ticker).copied().unwrap_or(0.0)).abs();
    }
    for (ticker, &w_old) in old {
        if !new.contains_key(ticker) {
            turnover += w_old.abs();
        }
    }
    turnover
}
