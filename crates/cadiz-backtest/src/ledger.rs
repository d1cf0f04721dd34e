//! The append-only backtest ledger and its diagnostics record.

use cadiz_traits::{Date, Regime, Ticker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One held position at a rebalance date with its posterior statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    /// Ticker symbol.
    pub ticker: Ticker,
    /// Booked weight (after regime scaling).
    pub weight: f64,
    /// Posterior expected return of the ticker.
    pub expected_return: f64,
    /// Posterior volatility of the ticker.
    pub volatility: f64,
    /// Per-ticker ratio `(mu - r_f) / sigma`.
    pub sharpe: f64,
}

/// One rebalance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Rebalance date.
    pub date: Date,
    /// Booked weights by ticker (after regime scaling). Absent tickers
    /// are zero.
    pub weights: BTreeMap<Ticker, f64>,
    /// Per-holding posterior statistics.
    pub holdings: Vec<HoldingRecord>,
    /// Detected regime, when regime adjustment is enabled.
    pub regime: Option<Regime>,
    /// Applied equity exposure (1.0 without regime adjustment).
    pub exposure: f64,
    /// Cash remainder, `1 - sum(weights)` of the net book.
    pub cash: f64,
    /// Turnover against the previous weights, `sum |w_new - w_old|`.
    pub turnover: f64,
    /// Portfolio-level posterior expected return (after scaling).
    pub expected_return: f64,
    /// Portfolio-level posterior volatility (after scaling).
    pub volatility: f64,
    /// Portfolio-level Sharpe ratio.
    pub sharpe: f64,
}

/// A flattened ledger row in the fixed serialization schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    /// Rebalance date.
    pub date: Date,
    /// Ticker symbol.
    pub ticker: Ticker,
    /// Booked weight.
    pub weight: f64,
    /// Detected regime, if any.
    pub regime: Option<Regime>,
    /// Applied equity exposure.
    pub exposure: f64,
    /// Posterior expected return of the ticker.
    pub expected_return: f64,
    /// Posterior volatility of the ticker.
    pub volatility: f64,
    /// Per-ticker ratio.
    pub sharpe: f64,
}

/// Append-only sequence of rebalance records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a rebalance record. Dates must arrive in increasing order.
    pub fn push(&mut self, entry: LedgerEntry) {
        debug_assert!(
            self.entries.last().is_none_or(|last| last.date < entry.date),
            "ledger dates must increase"
        );
        self.entries.push(entry);
    }

    /// All records, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent record, if any.
    #[must_use]
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Flatten to one row per held ticker per rebalance date.
    #[must_use]
    pub fn weight_records(&self) -> Vec<WeightRecord> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry.holdings.iter().map(move |h| WeightRecord {
                    date: entry.date,
                    ticker: h.ticker.clone(),
                    weight: h.weight,
                    regime: entry.regime,
                    exposure: entry.exposure,
                    expected_return: h.expected_return,
                    volatility: h.volatility,
                    sharpe: h.sharpe,
                })
            })
            .collect()
    }
}

/// A rebalance date that produced no booking, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRebalance {
    /// The skipped date.
    pub date: Date,
    /// Why it was skipped.
    pub reason: String,
}

/// A ticker dropped from one rebalance, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedTicker {
    /// Rebalance date of the drop.
    pub date: Date,
    /// The dropped ticker.
    pub ticker: Ticker,
    /// Why it was dropped.
    pub reason: String,
}

/// Everything that went sideways during a run, without aborting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Rebalance dates skipped entirely.
    pub skipped: Vec<SkippedRebalance>,
    /// Tickers dropped per date.
    pub dropped: Vec<DroppedTicker>,
    /// Dates where the solver needed its shrinkage retry.
    pub retried: Vec<Date>,
    /// Dates where optimization failed twice and weights were carried
    /// forward.
    pub failed: Vec<Date>,
    /// Reason the run aborted early, if it did.
    pub aborted: Option<String>,
}

impl Diagnostics {
    /// Whether the run completed with nothing to report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
            && self.dropped.is_empty()
            && self.retried.is_empty()
            && self.failed.is_empty()
            && self.aborted.is_none()
    }
}
