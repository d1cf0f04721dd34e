//! Strategy configuration.
//!
//! The whole engine is parameterized by a single immutable
//! [`StrategyConfig`] record. Validation happens once, at driver
//! construction; a config that fails [`StrategyConfig::validate`] refuses
//! to start a backtest.

use crate::error::{CadizError, Result};
use crate::provider::FfFactor;
use crate::types::Regime;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Composite factor weights for Value / Quality / Momentum.
///
/// Non-negative, summing to 1. The composite score is
/// `value * z_value + quality * z_quality + momentum * z_momentum`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    /// Weight on the value z-score.
    pub value: f64,
    /// Weight on the quality z-score.
    pub quality: f64,
    /// Weight on the momentum z-score.
    pub momentum: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            value: 0.40,
            quality: 0.40,
            momentum: 0.20,
        }
    }
}

impl FactorWeights {
    /// Sum of the three weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.value + self.quality + self.momentum
    }
}

/// Optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Display, Serialize, Deserialize)]
pub enum Objective {
    /// Maximize `(mu - r_f) . w / sqrt(w . Sigma . w)`.
    #[display("max-sharpe")]
    MaxSharpe,
    /// Minimize `w . Sigma . w`.
    #[display("min-variance")]
    MinVariance,
    /// Maximize `mu . w - 0.5 * delta * w . Sigma . w`.
    #[display("max-quadratic-utility")]
    MaxQuadraticUtility,
    /// Maximize `mu . w` subject to a volatility ceiling.
    #[display("efficient-risk({target_volatility})")]
    EfficientRisk {
        /// Annualized volatility ceiling.
        target_volatility: f64,
    },
    /// Minimize variance subject to a return floor.
    #[display("efficient-return({target_return})")]
    EfficientReturn {
        /// Annualized expected-return floor.
        target_return: f64,
    },
}

/// Long-only or long/short portfolio construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TradingMode {
    /// Fully invested long book, net exposure 1.
    LongOnly,
    /// Decomposed long and short books (e.g. 130/30).
    LongShort {
        /// Gross long exposure, e.g. 1.3.
        long_exposure: f64,
        /// Gross short exposure, e.g. 0.3.
        short_exposure: f64,
    },
}

impl TradingMode {
    /// Net exposure: long minus short.
    #[must_use]
    pub const fn net_exposure(&self) -> f64 {
        match self {
            Self::LongOnly => 1.0,
            Self::LongShort {
                long_exposure,
                short_exposure,
            } => *long_exposure - *short_exposure,
        }
    }

    /// Gross exposure: long plus short.
    #[must_use]
    pub const fn gross_exposure(&self) -> f64 {
        match self {
            Self::LongOnly => 1.0,
            Self::LongShort {
                long_exposure,
                short_exposure,
            } => *long_exposure + *short_exposure,
        }
    }
}

/// Rebalance cadence of the walk-forward loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum RebalanceFrequency {
    /// Calendar month ends.
    #[display("monthly")]
    Monthly,
    /// Calendar quarter ends.
    #[display("quarterly")]
    Quarterly,
}

impl RebalanceFrequency {
    /// Rebalance periods per year, used to annualize period returns.
    #[must_use]
    pub const fn periods_per_year(&self) -> f64 {
        match self {
            Self::Monthly => 12.0,
            Self::Quarterly => 4.0,
        }
    }
}

/// Regime classification method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum RegimeMethod {
    /// 200-day simple moving average of the benchmark index.
    #[display("sma")]
    Sma,
    /// VIX term structure (9d / 30d / 3m).
    #[display("vix")]
    Vix,
    /// VIX first, SMA as confirmation.
    #[display("combined")]
    Combined,
}

/// Equity exposure per regime, in `[0, 1]`.
///
/// [`Regime::Unknown`] always maps to full exposure: an unclassifiable
/// market is not a defensible reason to de-risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeExposures {
    /// Exposure under [`Regime::RiskOff`].
    pub risk_off: f64,
    /// Exposure under [`Regime::Caution`].
    pub caution: f64,
    /// Exposure under [`Regime::RiskOn`].
    pub risk_on: f64,
}

impl Default for RegimeExposures {
    fn default() -> Self {
        Self {
            risk_off: 0.50,
            caution: 0.75,
            risk_on: 1.00,
        }
    }
}

impl RegimeExposures {
    /// Exposure multiplier for a regime.
    #[must_use]
    pub const fn exposure_for(&self, regime: Regime) -> f64 {
        match regime {
            Regime::RiskOff => self.risk_off,
            Regime::Caution => self.caution,
            Regime::RiskOn => self.risk_on,
            Regime::Unknown => 1.0,
        }
    }
}

/// CAPE levels bounding the macro adjustment band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapeThresholds {
    /// CAPE at or below this level applies the full low-valuation scalar.
    pub low: f64,
    /// CAPE at or above this level applies the full high-valuation scalar.
    pub high: f64,
}

impl Default for CapeThresholds {
    fn default() -> Self {
        Self { low: 15.0, high: 35.0 }
    }
}

/// Equilibrium-return scalars at the CAPE band edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapeScalars {
    /// Scalar applied at or below the low threshold.
    pub low: f64,
    /// Scalar applied at or above the high threshold.
    pub high: f64,
}

impl Default for CapeScalars {
    fn default() -> Self {
        Self { low: 1.20, high: 0.70 }
    }
}

/// Immutable configuration record for the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Composite weights on the three factor z-scores.
    pub factor_weights: FactorWeights,
    /// Annual excess return per unit of composite z in the views.
    pub alpha_scalar: f64,
    /// Risk aversion `delta` in the equilibrium prior.
    pub risk_aversion: f64,
    /// Per-ticker weight bounds `(min, max)`.
    pub weight_bounds: (f64, f64),
    /// Per-sector gross exposure cap.
    pub sector_cap: f64,
    /// Optimization objective.
    pub objective: Objective,
    /// Long-only or long/short construction.
    pub mode: TradingMode,
    /// Walk-forward rebalance cadence.
    pub rebalance_frequency: RebalanceFrequency,
    /// Number of top composite scores passed to the optimizer.
    pub top_n: usize,
    /// Scale equilibrium returns by the CAPE-implied macro scalar.
    pub use_macro: bool,
    /// Tilt factor z-scores by trailing Fama-French regime.
    pub use_factor_regimes: bool,
    /// Scale final weights by the detected regime's exposure.
    pub use_regime_adjustment: bool,
    /// Regime classification method.
    pub regime_method: RegimeMethod,
    /// Exposure per regime.
    pub regime_exposures: RegimeExposures,
    /// Warn if the achieved Sharpe misses 95% of this floor.
    pub min_target_sharpe: Option<f64>,
    /// Softening of factor-regime tilts, in `[0, 1]`.
    pub tilt_strength: f64,
    /// Trailing window for factor-regime z-scores, in months.
    pub ff_window_months: usize,
    /// CAPE band edges.
    pub cape_thresholds: CapeThresholds,
    /// Scalars at the CAPE band edges.
    pub cape_scalars: CapeScalars,
    /// Annualized risk-free rate for Sharpe computations.
    pub risk_free_rate: f64,
    /// Optional flat per-turnover slippage, in basis points.
    pub slippage_bps: Option<f64>,
    /// Index symbol the SMA regime detector reads.
    pub regime_symbol: String,
    /// Optional Fama-French factor driving the momentum tilt.
    pub momentum_regime_factor: Option<FfFactor>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            factor_weights: FactorWeights::default(),
            alpha_scalar: 0.02,
            risk_aversion: 2.5,
            weight_bounds: (0.0, 0.30),
            sector_cap: 0.35,
            objective: Objective::MaxSharpe,
            mode: TradingMode::LongOnly,
            rebalance_frequency: RebalanceFrequency::Monthly,
            top_n: 50,
            use_macro: false,
            use_factor_regimes: false,
            use_regime_adjustment: false,
            regime_method: RegimeMethod::Combined,
            regime_exposures: RegimeExposures::default(),
            min_target_sharpe: None,
            tilt_strength: 0.5,
            ff_window_months: 12,
            cape_thresholds: CapeThresholds::default(),
            cape_scalars: CapeScalars::default(),
            risk_free_rate: 0.0,
            slippage_bps: None,
            regime_symbol: "SPY".to_string(),
            momentum_regime_factor: None,
        }
    }
}

impl StrategyConfig {
    /// Tolerance for the factor-weight sum check.
    const WEIGHT_SUM_TOL: f64 = 1e-9;

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CadizError::ConfigurationInvalid`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<()> {
        let fw = &self.factor_weights;
        if fw.value < 0.0 || fw.quality < 0.0 || fw.momentum < 0.0 {
            return Err(invalid("factor_weights must be non-negative"));
        }
        if (fw.sum() - 1.0).abs() > Self::WEIGHT_SUM_TOL {
            return Err(invalid(format!(
                "factor_weights must sum to 1, got {}",
                fw.sum()
            )));
        }
        if !(self.alpha_scalar.is_finite() && self.alpha_scalar > 0.0) {
            return Err(invalid("alpha_scalar must be positive"));
        }
        if !(self.risk_aversion.is_finite() && self.risk_aversion > 0.0) {
            return Err(invalid("risk_aversion must be positive"));
        }
        let (lo, hi) = self.weight_bounds;
        if !(lo.is_finite() && hi.is_finite()) || lo > hi {
            return Err(invalid(format!("weight_bounds ({lo}, {hi}) are inverted")));
        }
        if matches!(self.mode, TradingMode::LongOnly) && lo < 0.0 {
            return Err(invalid("weight_bounds.0 must be >= 0 in long-only mode"));
        }
        if hi <= 0.0 {
            return Err(invalid("weight_bounds.1 must be positive"));
        }
        if !(self.sector_cap.is_finite() && self.sector_cap > 0.0) {
            return Err(invalid("sector_cap must be positive"));
        }
        if self.top_n == 0 {
            return Err(invalid("top_n must be at least 1"));
        }
        match self.objective {
            Objective::EfficientRisk { target_volatility } if target_volatility <= 0.0 => {
                return Err(invalid("efficient-risk target volatility must be positive"));
            }
            Objective::EfficientReturn { target_return } if !target_return.is_finite() => {
                return Err(invalid("efficient-return target must be finite"));
            }
            _ => {}
        }
        if let TradingMode::LongShort {
            long_exposure,
            short_exposure,
        } = self.mode
        {
            if long_exposure <= 0.0 || short_exposure < 0.0 {
                return Err(invalid(format!(
                    "long/short exposures ({long_exposure}, {short_exposure}) out of range"
                )));
            }
            if long_exposure - short_exposure <= 0.0 {
                return Err(invalid("net exposure must be positive in long/short mode"));
            }
        }
        for (name, e) in [
            ("risk_off", self.regime_exposures.risk_off),
            ("caution", self.regime_exposures.caution),
            ("risk_on", self.regime_exposures.risk_on),
        ] {
            if !(0.0..=1.0).contains(&e) {
                return Err(invalid(format!("regime exposure {name}={e} outside [0, 1]")));
            }
        }
        if !(0.0..=1.0).contains(&self.tilt_strength) {
            return Err(invalid("tilt_strength must lie in [0, 1]"));
        }
        if self.ff_window_months == 0 {
            return Err(invalid("ff_window_months must be at least 1"));
        }
        if self.cape_thresholds.low >= self.cape_thresholds.high {
            return Err(invalid("cape_thresholds.low must be below cape_thresholds.high"));
        }
        if let Some(floor) = self.min_target_sharpe {
            if !floor.is_finite() {
                return Err(invalid("min_target_sharpe must be finite"));
            }
        }
        if let Some(bps) = self.slippage_bps {
            if !(bps.is_finite() && bps >= 0.0) {
                return Err(invalid("slippage_bps must be non-negative"));
            }
        }
        if self.regime_symbol.is_empty() {
            return Err(invalid("regime_symbol must not be empty"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> CadizError {
    CadizError::ConfigurationInvalid(msg.into())
}
