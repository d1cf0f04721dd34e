//! Error types for the cadiz engine.
//!
//! One error enum serves the whole workspace. The variants mirror the
//! failure taxonomy of the walk-forward pipeline: per-ticker data
//! problems are absorbed locally by the factor engine, per-date solver
//! problems trigger a single retry, and only run-level failures abort a
//! backtest.

use crate::types::Date;
use thiserror::Error;

/// The main error type for cadiz operations.
#[derive(Debug, Error)]
pub enum CadizError {
    /// Data source has no usable data for a request.
    #[error("Data unavailable for {ticker}: {detail}")]
    DataUnavailable {
        /// Ticker (or series name) the request was for.
        ticker: String,
        /// What was missing.
        detail: String,
    },

    /// A ticker lacks the history required for scoring.
    #[error("Insufficient data for {0}")]
    InsufficientData(String),

    /// Fewer tickers survived resolution than the rebalance minimum.
    #[error("Insufficient universe at {date}: {count} tickers")]
    InsufficientUniverse {
        /// Rebalance date that was skipped.
        date: Date,
        /// Number of surviving tickers.
        count: usize,
    },

    /// Covariance matrix is not positive semidefinite after shrinkage.
    #[error("Covariance ill-conditioned: {0}")]
    CovarianceIllConditioned(String),

    /// The optimizer failed at a rebalance date after its retry.
    #[error("Optimization failed at {0}")]
    OptimizationFailed(Date),

    /// The constraint set admits no feasible weights.
    #[error("Solver infeasible: {0}")]
    SolverInfeasible(String),

    /// Configuration rejected at construction.
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A mandatory data source (benchmark, universe) is unreachable.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// No tickers remain to optimize over.
    #[error("Empty optimization set")]
    EmptyOptimizationSet,

    /// Malformed input data (unordered series, non-positive caps, ...).
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl CadizError {
    /// Whether this error is local to a single ticker and should be
    /// absorbed by dropping the ticker from the current rebalance.
    #[must_use]
    pub const fn is_ticker_local(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. } | Self::InsufficientData(_)
        )
    }
}

/// A specialized Result type for cadiz operations.
pub type Result<T> = std::result::Result<T, CadizError>;
