//! Common types used throughout the cadiz engine.
//!
//! This module defines the point-in-time data model: tickers, sectors,
//! price series, fundamental snapshots, and resolved universes. All
//! containers are immutable after construction; the walk-forward driver
//! builds fresh instances at every rebalance date.

use crate::{CadizError, Result};
use serde::{Deserialize, Serialize};

// Re-export date type from chrono
pub use chrono::NaiveDate as Date;

/// A ticker symbol identifier.
///
/// Tickers are opaque, case-sensitive identifiers like "AAPL" or "MSFT".
pub type Ticker = String;

/// GICS-style sector tag.
///
/// The closed set of eleven sectors plus an [`Sector::Unknown`] sink for
/// coverage gaps. Sector membership drives the per-sector gross exposure
/// cap in the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sector {
    /// Information technology.
    Technology,
    /// Healthcare and pharmaceuticals.
    Healthcare,
    /// Banks, insurers, asset managers.
    FinancialServices,
    /// Discretionary consumer goods and services.
    ConsumerCyclical,
    /// Staples and defensive consumer goods.
    ConsumerDefensive,
    /// Telecom and media.
    CommunicationServices,
    /// Capital goods and transport.
    Industrials,
    /// Oil, gas, and energy equipment.
    Energy,
    /// Regulated utilities.
    Utilities,
    /// REITs and real estate operators.
    RealEstate,
    /// Chemicals, metals, and mining.
    BasicMaterials,
    /// Sector not covered by the data source.
    Unknown,
}

impl Sector {
    /// All classified sectors, excluding [`Sector::Unknown`].
    pub const ALL: [Self; 11] = [
        Self::Technology,
        Self::Healthcare,
        Self::FinancialServices,
        Self::ConsumerCyclical,
        Self::ConsumerDefensive,
        Self::CommunicationServices,
        Self::Industrials,
        Self::Energy,
        Self::Utilities,
        Self::RealEstate,
        Self::BasicMaterials,
    ];

    /// Human-readable sector name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "Technology",
            Self::Healthcare => "Healthcare",
            Self::FinancialServices => "Financial Services",
            Self::ConsumerCyclical => "Consumer Cyclical",
            Self::ConsumerDefensive => "Consumer Defensive",
            Self::CommunicationServices => "Communication Services",
            Self::Industrials => "Industrials",
            Self::Energy => "Energy",
            Self::Utilities => "Utilities",
            Self::RealEstate => "Real Estate",
            Self::BasicMaterials => "Basic Materials",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse a sector from its human-readable name.
    ///
    /// Unrecognized names map to [`Sector::Unknown`] rather than failing,
    /// matching the coverage-gap semantics of universe data sources.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "Technology" => Self::Technology,
            "Healthcare" => Self::Healthcare,
            "Financial Services" => Self::FinancialServices,
            "Consumer Cyclical" => Self::ConsumerCyclical,
            "Consumer Defensive" => Self::ConsumerDefensive,
            "Communication Services" => Self::CommunicationServices,
            "Industrials" => Self::Industrials,
            "Energy" => Self::Energy,
            "Utilities" => Self::Utilities,
            "Real Estate" => Self::RealEstate,
            "Basic Materials" => Self::BasicMaterials,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete market-state label used for tactical exposure scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    /// Benign conditions, full exposure.
    RiskOn,
    /// Mixed signals, reduced exposure.
    Caution,
    /// Stressed conditions, defensive exposure.
    RiskOff,
    /// Insufficient data to classify.
    Unknown,
}

impl Regime {
    /// Human-readable regime name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RiskOn => "RiskOn",
            Self::Caution => "Caution",
            Self::RiskOff => "RiskOff",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multiplicative tilts applied to the factor z-score columns before
/// compositing.
///
/// Produced by the factor-regime adjuster; `1.0` everywhere means no
/// tilt. Tilted z-scores are re-clipped to the standard `[-3, 3]` band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorTilts {
    /// Tilt on the value z-score column.
    pub value: f64,
    /// Tilt on the quality z-score column.
    pub quality: f64,
    /// Tilt on the momentum z-score column.
    pub momentum: f64,
}

impl Default for FactorTilts {
    fn default() -> Self {
        Self {
            value: 1.0,
            quality: 1.0,
            momentum: 1.0,
        }
    }
}

/// A single observation in an adjusted-close price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading date.
    pub date: Date,
    /// Split- and dividend-adjusted close.
    pub close: f64,
}

/// An ordered adjusted-close price series for one instrument.
///
/// Dates are strictly increasing; gaps are allowed only on non-trading
/// days. The constructor validates ordering so downstream lookback logic
/// can index the series without re-checking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Create a series from observations with strictly increasing dates.
    ///
    /// # Errors
    ///
    /// Returns [`CadizError::InvalidData`] if dates are out of order,
    /// duplicated, or any close is non-finite or non-positive.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(CadizError::InvalidData(format!(
                    "price series dates not strictly increasing at {}",
                    pair[1].date
                )));
            }
        }
        if let Some(p) = points.iter().find(|p| !p.close.is_finite() || p.close <= 0.0) {
            return Err(CadizError::InvalidData(format!(
                "non-positive close {} on {}",
                p.close, p.date
            )));
        }
        Ok(Self { points })
    }

    /// Build a series from `(date, close)` pairs.
    ///
    /// # Errors
    ///
    /// Same validation as [`PriceSeries::new`].
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Date, f64)>) -> Result<Self> {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, close)| PricePoint { date, close })
                .collect(),
        )
    }

    /// The underlying observations, oldest first.
    #[must_use]
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First observation date, if any.
    #[must_use]
    pub fn first_date(&self) -> Option<Date> {
        self.points.first().map(|p| p.date)
    }

    /// Last observation date, if any.
    #[must_use]
    pub fn last_date(&self) -> Option<Date> {
        self.points.last().map(|p| p.date)
    }

    /// The most recent observation on or before `date`.
    #[must_use]
    pub fn at_or_before(&self, date: Date) -> Option<PricePoint> {
        match self.points.partition_point(|p| p.date <= date) {
            0 => None,
            n => Some(self.points[n - 1]),
        }
    }

    /// A copy of the series truncated to observations on or before `date`.
    #[must_use]
    pub fn truncated_at(&self, date: Date) -> Self {
        let n = self.points.partition_point(|p| p.date <= date);
        Self {
            points: self.points[..n].to_vec(),
        }
    }

    /// Simple return from `lookback` trading days before the final
    /// observation to the final observation.
    ///
    /// Returns `None` when fewer than `lookback + 1` observations exist.
    #[must_use]
    pub fn trailing_return(&self, lookback: usize) -> Option<f64> {
        let n = self.points.len();
        if n <= lookback {
            return None;
        }
        let past = self.points[n - 1 - lookback].close;
        let last = self.points[n - 1].close;
        Some(last / past - 1.0)
    }

    /// Daily simple returns, one per consecutive observation pair.
    #[must_use]
    pub fn daily_returns(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| w[1].close / w[0].close - 1.0)
            .collect()
    }

    /// Simple return between the closest observations at or before
    /// `start` and `end`.
    #[must_use]
    pub fn return_between(&self, start: Date, end: Date) -> Option<f64> {
        let a = self.at_or_before(start)?;
        let b = self.at_or_before(end)?;
        if b.date <= a.date {
            return None;
        }
        Some(b.close / a.close - 1.0)
    }
}

/// Most recent point-in-time fundamentals for one ticker.
///
/// Flow quantities are trailing-twelve-month; balance-sheet quantities
/// are the latest reported values observable at the snapshot date. Any
/// field may be missing, and the factor engine treats a missing field as
/// a missing sub-metric rather than an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    /// Free cash flow, TTM.
    pub free_cash_flow: Option<f64>,
    /// Earnings before interest and taxes, TTM.
    pub ebit: Option<f64>,
    /// Revenue, TTM.
    pub revenue: Option<f64>,
    /// Gross profit, TTM.
    pub gross_profit: Option<f64>,
    /// Total assets.
    pub total_assets: Option<f64>,
    /// Current liabilities.
    pub current_liabilities: Option<f64>,
    /// Shares outstanding.
    pub shares_outstanding: Option<f64>,
}

/// One universe member: ticker, sector, and point-in-time market cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    /// Ticker symbol.
    pub ticker: Ticker,
    /// Sector tag.
    pub sector: Sector,
    /// Market capitalization, strictly positive.
    pub market_cap: f64,
}

/// The set of tickers eligible at one as-of date.
///
/// Immutable after construction; the driver resolves a fresh universe at
/// every rebalance date. Tickers absent from the universe at a date never
/// appear in that date's weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    as_of: Date,
    constituents: Vec<Constituent>,
}

impl Universe {
    /// Create a universe for one as-of date.
    ///
    /// # Errors
    ///
    /// Returns [`CadizError::InvalidData`] on a duplicate ticker or a
    /// non-positive market cap.
    pub fn new(as_of: Date, constituents: Vec<Constituent>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for c in &constituents {
            if !c.market_cap.is_finite() || c.market_cap <= 0.0 {
                return Err(CadizError::InvalidData(format!(
                    "non-positive market cap {} for {}",
                    c.market_cap, c.ticker
                )));
            }
            if !seen.insert(c.ticker.clone()) {
                return Err(CadizError::InvalidData(format!(
                    "duplicate ticker {} in universe",
                    c.ticker
                )));
            }
        }
        Ok(Self { as_of, constituents })
    }

    /// The as-of date this universe was resolved for.
    #[must_use]
    pub const fn as_of(&self) -> Date {
        self.as_of
    }

    /// Universe members in resolver order.
    #[must_use]
    pub fn constituents(&self) -> &[Constituent] {
        &self.constituents
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constituents.len()
    }

    /// Whether the universe is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constituents.is_empty()
    }

    /// Tickers in resolver order.
    #[must_use]
    pub fn tickers(&self) -> Vec<Ticker> {
        self.constituents.iter().map(|c| c.ticker.clone()).collect()
    }

    /// Whether `ticker` is a member.
    #[must_use]
    pub fn contains(&self, ticker: &str) -> bool {
        self.constituents.iter().any(|c| c.ticker == ticker)
    }

    /// Sector of a member ticker.
    #[must_use]
    pub fn sector_of(&self, ticker: &str) -> Option<Sector> {
        self.constituents
            .iter()
            .find(|c| c.ticker == ticker)
            .map(|c| c.sector)
    }

    /// Market cap of a member ticker.
    #[must_use]
    pub fn market_cap_of(&self, ticker: &str) -> Option<f64> {
        self.constituents
            .iter()
            .find(|c| c.ticker == ticker)
            .map(|c| c.market_cap)
    }
}
