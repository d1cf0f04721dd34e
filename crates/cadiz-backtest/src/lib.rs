//! Walk-forward backtesting for cadiz.
//!
//! The [`BacktestDriver`] runs the full pipeline at every rebalance
//! date (resolve universe, fetch point-in-time data, score factors,
//! build the posterior, optimize, optionally scale by regime) and books
//! the results into an append-only [`Ledger`] with a diagnostics record
//! of everything that was skipped, dropped, or retried.
//!
//! Point-in-time discipline is structural: every provider call the
//! driver makes is parameterized by the rebalance date being processed
//! (or the period end being accounted), never by "now". The driver is
//! deterministic for a deterministic provider.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod calendar;
pub mod driver;
pub mod ledger;
pub mod metrics;

pub use driver::{BacktestDriver, BacktestReport, CancelToken, PeriodReturn};
pub use ledger::{
    Diagnostics, DroppedTicker, HoldingRecord, Ledger, LedgerEntry, SkippedRebalance, WeightRecord,
};
pub use metrics::PerformanceMetrics;
