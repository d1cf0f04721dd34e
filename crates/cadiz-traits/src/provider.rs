//! The market-data and universe boundaries.
//!
//! [`MarketDataProvider`] is the sole external dependency of the core.
//! Every operation takes an explicit as-of or end date and must return
//! only data observable at that date; implementations own caching,
//! batching, retries, and timeouts. The compute core never suspends once
//! data is in hand.

use crate::error::Result;
use crate::types::{Date, FundamentalSnapshot, PriceSeries, Ticker, Universe};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum price-series length (trading days) for factor scoring.
pub const MIN_PRICE_ROWS: usize = 252;

/// Canonical Fama-French factor series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FfFactor {
    /// High-minus-low: the value factor.
    Hml,
    /// Robust-minus-weak: the profitability factor.
    Rmw,
    /// Small-minus-big: the size factor.
    Smb,
    /// Market excess return.
    MktRf,
}

impl FfFactor {
    /// Conventional series label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hml => "HML",
            Self::Rmw => "RMW",
            Self::Smb => "SMB",
            Self::MktRf => "Mkt-RF",
        }
    }
}

/// Trailing monthly returns of one factor plus its full-history moments.
///
/// The long-run mean and standard deviation come from the data source's
/// full history, so the regime z-score compares the recent window against
/// the factor's own long-run behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorHistory {
    /// Trailing monthly returns, oldest first, last observation <= end.
    pub trailing: Vec<f64>,
    /// Full-history mean monthly return.
    pub full_mean: f64,
    /// Full-history standard deviation of monthly returns.
    pub full_std: f64,
}

/// VIX term structure at one observation date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VixStructure {
    /// 9-day implied volatility index.
    pub vix9d: f64,
    /// 30-day implied volatility index.
    pub vix30d: f64,
    /// 3-month implied volatility index.
    pub vix3m: f64,
}

/// Point-in-time market data source.
///
/// Any operation may fail per request with
/// [`CadizError::DataUnavailable`](crate::CadizError::DataUnavailable);
/// the core absorbs that per ticker. Only the benchmark series and the
/// universe are mandatory for a backtest to proceed. Optional macro feeds
/// (CAPE, VIX) signal absence with `Ok(None)` and the consuming component
/// falls back to neutral behavior.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Adjusted-close prices for one ticker over `[start, end]`.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` when the series is empty or shorter than
    /// [`MIN_PRICE_ROWS`] before `end`.
    async fn prices(&self, ticker: &str, start: Date, end: Date) -> Result<PriceSeries>;

    /// Most recent fundamentals observable at `as_of`.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` when no snapshot is observable by `as_of`.
    async fn fundamentals(&self, ticker: &str, as_of: Date) -> Result<FundamentalSnapshot>;

    /// Point-in-time market caps (shares times price) for `tickers`.
    ///
    /// Tickers without an observable cap are absent from the map.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` only when the source itself is unreachable.
    async fn market_caps(&self, tickers: &[Ticker], as_of: Date)
    -> Result<HashMap<Ticker, f64>>;

    /// Benchmark adjusted-close prices over `[start, end]`.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when the benchmark cannot be served; the
    /// driver aborts the run on this error.
    async fn benchmark_prices(&self, start: Date, end: Date) -> Result<PriceSeries>;

    /// Shiller CAPE observable at `as_of`, if the feed covers it.
    ///
    /// # Errors
    ///
    /// Infrastructure failures only; a missing value is `Ok(None)`.
    async fn cape(&self, as_of: Date) -> Result<Option<f64>>;

    /// Trailing monthly Fama-French factor returns ending at or before
    /// `end`, with full-history moments, for HML, RMW, SMB, and Mkt-RF.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` when the factor library is absent.
    async fn ff_factor_window(
        &self,
        end: Date,
        months: usize,
    ) -> Result<HashMap<FfFactor, FactorHistory>>;

    /// Adjusted-close history of an index symbol ending at `end`.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` when the index is not covered.
    async fn index_history(
        &self,
        symbol: &str,
        end: Date,
        lookback_days: usize,
    ) -> Result<PriceSeries>;

    /// VIX term structure observable at `end`, if covered.
    ///
    /// # Errors
    ///
    /// Infrastructure failures only; a missing structure is `Ok(None)`.
    async fn vix_structure(&self, end: Date) -> Result<Option<VixStructure>>;
}

/// Yields the set of tickers eligible at an as-of date.
///
/// Implementations may wrap a static list, an index-membership scrape, or
/// a historical constituents file; the core only requires the
/// point-in-time contract: tickers absent at `as_of` must not appear.
#[async_trait]
pub trait UniverseResolver: Send + Sync {
    /// Resolve the universe eligible at `as_of`.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` aborts the run; there is no per-date retry.
    async fn resolve(&self, as_of: Date) -> Result<Universe>;
}
