//! Regime-conditioning components for cadiz.
//!
//! Three adjusters sit between factor scoring and optimization:
//!
//! - [`MacroAdjuster`] maps the Shiller CAPE level to a scalar on
//!   equilibrium returns;
//! - [`FactorRegimeAdjuster`] maps trailing Fama-French factor returns to
//!   per-factor z-score tilts;
//! - [`RegimeDetector`] classifies the market state from the benchmark
//!   SMA and the VIX term structure for tactical exposure scaling.
//!
//! Each component reads the [`MarketDataProvider`] boundary with an
//! explicit as-of date and degrades to neutral behavior when its feed is
//! unavailable: a missing CAPE is a scalar of 1.0, a missing factor
//! library is a unit tilt, an unclassifiable market is
//! [`Regime::Unknown`].
//!
//! [`MarketDataProvider`]: cadiz_traits::MarketDataProvider
//! [`Regime::Unknown`]: cadiz_traits::Regime::Unknown

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod detector;
pub mod factor_tilts;
pub mod macro_adjust;

pub use detector::{RegimeDetector, SMA_WINDOW};
pub use factor_tilts::FactorRegimeAdjuster;
pub use macro_adjust::MacroAdjuster;
