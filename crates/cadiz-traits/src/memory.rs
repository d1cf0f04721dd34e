//! In-memory data provider and static universe resolver.
//!
//! [`InMemoryProvider`] serves seeded series with point-in-time
//! filtering, for offline runs and deterministic tests.
//! [`PointInTimeGuard`] wraps any provider with a hard trap that panics
//! on a request beyond its date ceiling or on a returned record after the
//! requested as-of date; backtests run under it to prove they never read
//! the future.

use crate::error::{CadizError, Result};
use crate::provider::{
    FactorHistory, FfFactor, MIN_PRICE_ROWS, MarketDataProvider, UniverseResolver, VixStructure,
};
use crate::types::{Constituent, Date, FundamentalSnapshot, PriceSeries, Ticker, Universe};
use async_trait::async_trait;
use std::collections::HashMap;

/// A deterministic, fully in-memory [`MarketDataProvider`].
///
/// All lookups filter to observations at or before the requested date.
/// Market caps are derived point-in-time as shares outstanding (from the
/// latest observable fundamental snapshot) times the latest observable
/// close.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    prices: HashMap<Ticker, PriceSeries>,
    fundamentals: HashMap<Ticker, Vec<(Date, FundamentalSnapshot)>>,
    benchmark: Option<PriceSeries>,
    indices: HashMap<String, PriceSeries>,
    cape: Vec<(Date, f64)>,
    ff: HashMap<FfFactor, Vec<(Date, f64)>>,
    vix: Vec<(Date, VixStructure)>,
}

impl InMemoryProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the adjusted-close series for a ticker.
    #[must_use]
    pub fn with_prices(mut self, ticker: impl Into<Ticker>, series: PriceSeries) -> Self {
        self.prices.insert(ticker.into(), series);
        self
    }

    /// Seed a fundamental snapshot observable from `date` onward.
    #[must_use]
    pub fn with_fundamentals(
        mut self,
        ticker: impl Into<Ticker>,
        date: Date,
        snapshot: FundamentalSnapshot,
    ) -> Self {
        let entry = self.fundamentals.entry(ticker.into()).or_default();
        entry.push((date, snapshot));
        entry.sort_by_key(|(d, _)| *d);
        self
    }

    /// Seed the benchmark series.
    #[must_use]
    pub fn with_benchmark(mut self, series: PriceSeries) -> Self {
        self.benchmark = Some(series);
        self
    }

    /// Seed an index series under a symbol.
    #[must_use]
    pub fn with_index(mut self, symbol: impl Into<String>, series: PriceSeries) -> Self {
        self.indices.insert(symbol.into(), series);
        self
    }

    /// Seed one CAPE observation.
    #[must_use]
    pub fn with_cape(mut self, date: Date, value: f64) -> Self {
        self.cape.push((date, value));
        self.cape.sort_by_key(|(d, _)| *d);
        self
    }

    /// Seed the monthly return series of one Fama-French factor.
    #[must_use]
    pub fn with_ff_series(mut self, factor: FfFactor, monthly: Vec<(Date, f64)>) -> Self {
        let entry = self.ff.entry(factor).or_default();
        entry.extend(monthly);
        entry.sort_by_key(|(d, _)| *d);
        self
    }

    /// Seed one VIX term-structure observation.
    #[must_use]
    pub fn with_vix(mut self, date: Date, structure: VixStructure) -> Self {
        self.vix.push((date, structure));
        self.vix.sort_by_key(|(d, _)| *d);
        self
    }

    fn window(series: &PriceSeries, start: Date, end: Date) -> PriceSeries {
        let pairs: Vec<(Date, f64)> = series
            .points()
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .map(|p| (p.date, p.close))
            .collect();
        PriceSeries::from_pairs(pairs).expect("windowing preserves ordering")
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryProvider {
    async fn prices(&self, ticker: &str, start: Date, end: Date) -> Result<PriceSeries> {
        let series = self.prices.get(ticker).ok_or_else(|| CadizError::DataUnavailable {
            ticker: ticker.to_string(),
            detail: "no price series".to_string(),
        })?;
        let observable = series.truncated_at(end);
        if observable.len() < MIN_PRICE_ROWS {
            return Err(CadizError::DataUnavailable {
                ticker: ticker.to_string(),
                detail: format!(
                    "only {} rows before {end}, need {MIN_PRICE_ROWS}",
                    observable.len()
                ),
            });
        }
        Ok(Self::window(series, start, end))
    }

    async fn fundamentals(&self, ticker: &str, as_of: Date) -> Result<FundamentalSnapshot> {
        self.fundamentals
            .get(ticker)
            .and_then(|snaps| {
                snaps
                    .iter()
                    .rev()
                    .find(|(d, _)| *d <= as_of)
                    .map(|(_, s)| *s)
            })
            .ok_or_else(|| CadizError::DataUnavailable {
                ticker: ticker.to_string(),
                detail: format!("no fundamentals observable by {as_of}"),
            })
    }

    async fn market_caps(
        &self,
        tickers: &[Ticker],
        as_of: Date,
    ) -> Result<HashMap<Ticker, f64>> {
        let mut caps = HashMap::new();
        for ticker in tickers {
            let shares = self
                .fundamentals
                .get(ticker)
                .and_then(|snaps| snaps.iter().rev().find(|(d, _)| *d <= as_of))
                .and_then(|(_, s)| s.shares_outstanding);
            let close = self
                .prices
                .get(ticker)
                .and_then(|series| series.at_or_before(as_of))
                .map(|p| p.close);
            if let (Some(shares), Some(close)) = (shares, close) {
                if shares > 0.0 {
                    caps.insert(ticker.clone(), shares * close);
                }
            }
        }
        Ok(caps)
    }

    async fn benchmark_prices(&self, start: Date, end: Date) -> Result<PriceSeries> {
        let series = self
            .benchmark
            .as_ref()
            .ok_or_else(|| CadizError::ProviderUnavailable("no benchmark series".to_string()))?;
        let window = Self::window(series, start, end);
        if window.is_empty() {
            return Err(CadizError::ProviderUnavailable(format!(
                "benchmark has no observations in [{start}, {end}]"
            )));
        }
        Ok(window)
    }

    async fn cape(&self, as_of: Date) -> Result<Option<f64>> {
        Ok(self
            .cape
            .iter()
            .rev()
            .find(|(d, _)| *d <= as_of)
            .map(|(_, v)| *v))
    }

    async fn ff_factor_window(
        &self,
        end: Date,
        months: usize,
    ) -> Result<HashMap<FfFactor, FactorHistory>> {
        if self.ff.is_empty() {
            return Err(CadizError::DataUnavailable {
                ticker: "fama-french".to_string(),
                detail: "no factor library seeded".to_string(),
            });
        }
        let mut out = HashMap::new();
        for (factor, series) in &self.ff {
            // Full-history moments are themselves point-in-time: only
            // observations at or before `end` enter them.
            let observable: Vec<f64> = series
                .iter()
                .filter(|(d, _)| *d <= end)
                .map(|(_, r)| *r)
                .collect();
            if observable.is_empty() {
                continue;
            }
            let n = observable.len();
            let full_mean = observable.iter().sum::<f64>() / n as f64;
            let full_std = if n > 1 {
                (observable.iter().map(|r| (r - full_mean).powi(2)).sum::<f64>()
                    / (n - 1) as f64)
                    .sqrt()
            } else {
                0.0
            };
            let trailing = observable[n.saturating_sub(months)..].to_vec();
            out.insert(
                *factor,
                FactorHistory {
                    trailing,
                    full_mean,
                    full_std,
                },
            );
        }
        Ok(out)
    }

    async fn index_history(
        &self,
        symbol: &str,
        end: Date,
        lookback_days: usize,
    ) -> Result<PriceSeries> {
        let series = self.indices.get(symbol).ok_or_else(|| CadizError::DataUnavailable {
            ticker: symbol.to_string(),
            detail: "no index series".to_string(),
        })?;
        let observable = series.truncated_at(end);
        let points = observable.points();
        let tail = &points[points.len().saturating_sub(lookback_days)..];
        PriceSeries::from_pairs(tail.iter().map(|p| (p.date, p.close)))
    }

    async fn vix_structure(&self, end: Date) -> Result<Option<VixStructure>> {
        Ok(self
            .vix
            .iter()
            .rev()
            .find(|(d, _)| *d <= end)
            .map(|(_, v)| *v))
    }
}

/// A [`UniverseResolver`] returning the same constituent set at every
/// date.
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    constituents: Vec<Constituent>,
}

impl StaticUniverse {
    /// Create a resolver over a fixed constituent set.
    #[must_use]
    pub const fn new(constituents: Vec<Constituent>) -> Self {
        Self { constituents }
    }
}

#[async_trait]
impl UniverseResolver for StaticUniverse {
    async fn resolve(&self, as_of: Date) -> Result<Universe> {
        Universe::new(as_of, self.constituents.clone())
    }
}

/// A provider wrapper that traps future reads.
///
/// Two violations panic:
///
/// 1. any call whose as-of/end parameter exceeds the guard's ceiling
///    (the core asked for data it could not have had), and
/// 2. any returned price record dated after the call's own as-of/end
///    (the inner provider leaked the future).
///
/// Backtests in tests run under a guard whose ceiling is the backtest end
/// date; a panic is a point-in-time bug, not a recoverable condition.
#[derive(Debug, Clone)]
pub struct PointInTimeGuard<P> {
    inner: P,
    ceiling: Date,
}

impl<P> PointInTimeGuard<P> {
    /// Wrap `inner` with a hard date ceiling.
    #[must_use]
    pub const fn new(inner: P, ceiling: Date) -> Self {
        Self { inner, ceiling }
    }

    fn check_request(&self, what: &str, requested: Date) {
        assert!(
            requested <= self.ceiling,
            "point-in-time violation: {what} requested {requested}, ceiling {}",
            self.ceiling
        );
    }

    fn check_series(what: &str, requested: Date, series: &PriceSeries) {
        if let Some(last) = series.last_date() {
            assert!(
                last <= requested,
                "point-in-time violation: {what} returned {last} after requested {requested}"
            );
        }
    }
}

#[async_trait]
impl<P: MarketDataProvider> MarketDataProvider for PointInTimeGuard<P> {
    async fn prices(&self, ticker: &str, start: Date, end: Date) -> Result<PriceSeries> {
        self.check_request("prices", end);
        let series = self.inner.prices(ticker, start, end).await?;
        Self::check_series("prices", end, &series);
        Ok(series)
    }

    async fn fundamentals(&self, ticker: &str, as_of: Date) -> Result<FundamentalSnapshot> {
        self.check_request("fundamentals", as_of);
        self.inner.fundamentals(ticker, as_of).await
    }

    async fn market_caps(
        &self,
        tickers: &[Ticker],
        as_of: Date,
    ) -> Result<HashMap<Ticker, f64>> {
        self.check_request("market_caps", as_of);
        self.inner.market_caps(tickers, as_of).await
    }

    async fn benchmark_prices(&self, start: Date, end: Date) -> Result<PriceSeries> {
        self.check_request("benchmark_prices", end);
        let series = self.inner.benchmark_prices(start, end).await?;
        Self::check_series("benchmark_prices", end, &series);
        Ok(series)
    }

    async fn cape(&self, as_of: Date) -> Result<Option<f64>> {
        self.check_request("cape", as_of);
        self.inner.cape(as_of).await
    }

    async fn ff_factor_window(
        &self,
        end: Date,
        months: usize,
    ) -> Result<HashMap<FfFactor, FactorHistory>> {
        self.check_request("ff_factor_window", end);
        self.inner.ff_factor_window(end, months).await
    }

    async fn index_history(
        &self,
        symbol: &str,
        end: Date,
        lookback_days: usize,
    ) -> Result<PriceSeries> {
        self.check_request("index_history", end);
        let series = self.inner.index_history(symbol, end, lookback_days).await?;
        Self::check_series("index_history", end, &series);
        Ok(series)
    }

    async fn vix_structure(&self, end: Date) -> Result<Option<VixStructure>> {
        self.check_request("vix_structure", end);
        self.inner.vix_structure(end).await
    }
}
