//! Multi-factor scoring engine for cadiz.
//!
//! Computes per-ticker Value / Quality / Momentum z-scores from
//! fundamentals and prices: raw factors, universe-median imputation,
//! winsorization, cross-sectional standardization, optional regime
//! tilts, and a configurable composite. Every ticker also gets an audit
//! recording how its scores were produced.
//!
//! The engine is pure compute: the walk-forward driver fetches data and
//! hands it in; nothing here performs I/O. A ticker with unusable data
//! is never an error; it scores neutral (z = 0) and is flagged in its
//! audit.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod audit;
pub mod engine;
pub mod raw;

pub use audit::{FactorAudit, FactorColumnAudit};
pub use engine::{FactorEngine, FactorScores, TickerInput};
pub use raw::{MOMENTUM_LOOKBACK_DAYS, RawFactors};
