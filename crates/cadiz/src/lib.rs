#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadiz/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # cadiz
//!
//! Systematic equity portfolio construction and backtesting.
//!
//! cadiz is an umbrella crate that re-exports the cadiz sub-crates for
//! convenience. It turns multi-factor stock scores into mean-variance
//! optimal portfolios through a Black-Litterman posterior and
//! walk-forward backtests the result with point-in-time data integrity.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cadiz::backtest::BacktestDriver;
//! use cadiz::traits::{StrategyConfig, Date};
//!
//! # async fn example(provider: impl cadiz::traits::MarketDataProvider,
//! #                  resolver: impl cadiz::traits::UniverseResolver)
//! #                  -> cadiz::Result<()> {
//! let driver = BacktestDriver::new(provider, resolver, StrategyConfig::default())?;
//! let report = driver
//!     .run(
//!         Date::from_ymd_opt(2020, 1, 1).unwrap(),
//!         Date::from_ymd_opt(2024, 12, 31).unwrap(),
//!     )
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&report.metrics).unwrap());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Organization
//!
//! - [`traits`] - Core types, configuration, and the provider boundary
//! - [`factors`] - Value / Quality / Momentum scoring with audits
//! - [`regime`] - CAPE, Fama-French, and market-state adjusters
//! - [`allocate`] - Black-Litterman posterior and constrained optimizer
//! - [`backtest`] - Walk-forward driver, ledger, and metrics
//!
//! ## Pipeline
//!
//! 1. **Universe** resolution yields the eligible tickers at a date
//! 2. **Factors** score each ticker cross-sectionally
//! 3. **Posterior** blends the market-cap prior with score-implied views
//! 4. **Optimizer** solves for weights under bounds and sector caps
//! 5. **Driver** books the weights and walks forward

/// Version information for the cadiz crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Core Types
// ============================================================================

/// Core types, configuration, and provider traits.
///
/// Re-exports [`cadiz_traits`]: the point-in-time data model, the
/// [`MarketDataProvider`] and [`UniverseResolver`] boundaries, the
/// [`StrategyConfig`] record, and the shared error type.
pub mod traits {
    pub use cadiz_traits::*;
}

pub use cadiz_traits::{
    CadizError, MarketDataProvider, Regime, Result, Sector, StrategyConfig, Ticker,
    UniverseResolver,
};

// ============================================================================
// Factor Scoring
// ============================================================================

/// Multi-factor scoring engine.
///
/// Re-exports [`cadiz_factors`]: raw factor computation, winsorized
/// z-scores, composites, and per-ticker audits.
pub mod factors {
    pub use cadiz_factors::*;
}

pub use cadiz_factors::{FactorEngine, FactorScores};

// ============================================================================
// Regime Conditioning
// ============================================================================

/// Macro, factor-regime, and market-state adjusters.
///
/// Re-exports [`cadiz_regime`]: the CAPE scalar, the Fama-French tilt
/// table, and the SMA / VIX regime detector.
pub mod regime {
    pub use cadiz_regime::*;
}

pub use cadiz_regime::{FactorRegimeAdjuster, MacroAdjuster, RegimeDetector};

// ============================================================================
// Allocation
// ============================================================================

/// Black-Litterman posterior and constrained optimization.
///
/// Re-exports [`cadiz_allocate`]: covariance estimation with shrinkage,
/// view construction, the posterior update, the five-objective
/// optimizer, and discrete share allocation.
pub mod allocate {
    pub use cadiz_allocate::*;
}

pub use cadiz_allocate::{PortfolioOptimizer, Posterior, PriorBlock};

// ============================================================================
// Backtesting
// ============================================================================

/// Walk-forward backtesting.
///
/// Re-exports [`cadiz_backtest`]: the rebalance calendar, the driver,
/// the append-only ledger with diagnostics, and performance metrics.
pub mod backtest {
    pub use cadiz_backtest::*;
}

pub use cadiz_backtest::{BacktestDriver, BacktestReport, PerformanceMetrics};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```ignore
/// use cadiz::prelude::*;
/// ```
pub mod prelude {
    pub use cadiz_allocate::{PortfolioOptimizer, PortfolioProblem};
    pub use cadiz_backtest::{BacktestDriver, BacktestReport, PerformanceMetrics};
    pub use cadiz_factors::{FactorEngine, FactorScores, TickerInput};
    pub use cadiz_regime::{FactorRegimeAdjuster, MacroAdjuster, RegimeDetector};
    pub use cadiz_traits::{
        CadizError, Date, MarketDataProvider, Regime, Result, Sector, StrategyConfig, Ticker,
        Universe, UniverseResolver,
    };
}

// ============================================================================
// Tests
// ============================================================================
