#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadiz/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core types and trait definitions for the cadiz portfolio engine.
//!
//! This crate provides the foundation the rest of the workspace builds on:
//! the point-in-time data model (universes, price series, fundamentals),
//! the [`MarketDataProvider`] and [`UniverseResolver`] boundaries, the
//! immutable [`StrategyConfig`], the shared error type, and the
//! cross-sectional statistics used by the factor pipeline.
//!
//! Every external read in cadiz is parameterized by an as-of date; the
//! types here are designed so that data observed after that date cannot
//! leak into a computation. The [`memory::PointInTimeGuard`] wrapper turns
//! that convention into a hard trap for tests.

/// The version of the cadiz-traits crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Module declarations
pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod stats;
pub mod types;

// Re-exports
pub use config::{
    CapeScalars, CapeThresholds, FactorWeights, Objective, RebalanceFrequency, RegimeExposures,
    RegimeMethod, StrategyConfig, TradingMode,
};
pub use error::{CadizError, Result};
pub use provider::{FactorHistory, FfFactor, MarketDataProvider, UniverseResolver, VixStructure};
pub use types::{
    Constituent, Date, FactorTilts, FundamentalSnapshot, PricePoint, PriceSeries, Regime, Sector,
    Ticker, Universe,
};
