//! Black-Litterman posterior and constrained portfolio optimizer.
//!
//! This crate turns factor scores into portfolio weights:
//!
//! 1. [`covariance`] estimates an annualized return covariance from
//!    trailing daily prices, falling back to Ledoit-Wolf shrinkage when
//!    the sample estimate is not positive semidefinite;
//! 2. [`views`] converts composite z-scores into absolute-return views
//!    with dispersion-based confidences;
//! 3. [`posterior`] blends a market-cap equilibrium prior with the views
//!    through the standard Black-Litterman update, sizing the view
//!    uncertainty Idzorek-style so each confidence is the posterior
//!    blend weight;
//! 4. [`optimizer`] solves the constrained problem under one of five
//!    objectives, in long-only or decomposed long/short form;
//! 5. [`allocation`] converts continuous weights into integer share
//!    counts without touching them.
//!
//! Everything here is pure compute: deterministic for identical inputs,
//! no I/O, no shared state across calls.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod allocation;
pub mod covariance;
pub mod optimizer;
pub mod posterior;
mod solver;
pub mod views;

pub use allocation::{DiscreteAllocation, discrete_allocation};
pub use covariance::{CovarianceEstimate, aligned_returns, estimate_covariance};
pub use optimizer::{OptimizedPortfolio, PortfolioOptimizer, PortfolioProblem};
pub use posterior::{Posterior, PriorBlock, posterior};
pub use views::{View, build_views, confidence_from_dispersion};
