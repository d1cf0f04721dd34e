//! Point-in-time market-state classification.

use cadiz_traits::provider::VixStructure;
use cadiz_traits::{Date, MarketDataProvider, PriceSeries, Regime, RegimeMethod, StrategyConfig};

/// Trading-day window of the trend-following moving average.
pub const SMA_WINDOW: usize = 200;

/// Extra history requested beyond the SMA window so holidays and data
/// gaps do not starve the average.
const SMA_FETCH_DAYS: usize = 320;

/// Classifies the market state at an as-of date.
///
/// Three methods: `sma` compares the benchmark close against its 200-day
/// average; `vix` reads the term structure (backwardation is risk-off,
/// a 30d/3m inversion is caution, contango is risk-on); `combined` lets
/// the VIX veto and the SMA confirm. Every call is parameterized by the
/// as-of date; nothing here reads "current" data.
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    method: RegimeMethod,
    symbol: String,
}

impl RegimeDetector {
    /// Create a detector with an explicit method and index symbol.
    #[must_use]
    pub const fn new(method: RegimeMethod, symbol: String) -> Self {
        Self { method, symbol }
    }

    /// Create a detector from the strategy configuration.
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.regime_method, config.regime_symbol.clone())
    }

    /// Classify from an index series ending at the as-of date.
    ///
    /// Risk-on when the latest close is above its 200-day average,
    /// risk-off below; unknown with fewer than 200 observations.
    #[must_use]
    pub fn classify_sma(series: &PriceSeries) -> Regime {
        let points = series.points();
        if points.len() < SMA_WINDOW {
            return Regime::Unknown;
        }
        let tail = &points[points.len() - SMA_WINDOW..];
        let sma = tail.iter().map(|p| p.close).sum::<f64>() / SMA_WINDOW as f64;
        let close = points[points.len() - 1].close;
        if close > sma {
            Regime::RiskOn
        } else {
            Regime::RiskOff
        }
    }

    /// Classify from the VIX term structure.
    ///
    /// Backwardation of the short leg (`vix9d > vix30d`) is risk-off; a
    /// mid-curve inversion (`vix30d > vix3m`) without it is caution;
    /// contango is risk-on. A missing or non-finite leg is unknown.
    #[must_use]
    pub fn classify_vix(structure: Option<VixStructure>) -> Regime {
        let Some(VixStructure { vix9d, vix30d, vix3m }) = structure else {
            return Regime::Unknown;
        };
        if !(vix9d.is_finite() && vix30d.is_finite() && vix3m.is_finite()) {
            return Regime::Unknown;
        }
        if vix9d > vix30d {
            Regime::RiskOff
        } else if vix30d > vix3m {
            Regime::Caution
        } else {
            Regime::RiskOn
        }
    }

    /// Combine the VIX and SMA classifications.
    ///
    /// VIX risk-off is a veto; risk-on requires both to agree; anything
    /// else is caution. An unknown leg defers to the other, and two
    /// unknowns stay unknown.
    #[must_use]
    pub const fn combine(vix: Regime, sma: Regime) -> Regime {
        match (vix, sma) {
            (Regime::Unknown, Regime::Unknown) => Regime::Unknown,
            (Regime::Unknown, other) | (other, Regime::Unknown) => other,
            (Regime::RiskOff, _) => Regime::RiskOff,
            (Regime::RiskOn, Regime::RiskOn) => Regime::RiskOn,
            _ => Regime::Caution,
        }
    }

    /// Classify the market state observable at `as_of`.
    pub async fn classify<P: MarketDataProvider + ?Sized>(
        &self,
        provider: &P,
        as_of: Date,
    ) -> Regime {
        match self.method {
            RegimeMethod::Sma => self.sma_regime(provider, as_of).await,
            RegimeMethod::Vix => Self::vix_regime(provider, as_of).await,
            RegimeMethod::Combined => {
                let vix = Self::vix_regime(provider, as_of).await;
                let sma = self.sma_regime(provider, as_of).await;
                Self::combine(vix, sma)
            }
        }
    }

    async fn sma_regime<P: MarketDataProvider + ?Sized>(
        &self,
        provider: &P,
        as_of: Date,
    ) -> Regime {
        match provider
            .index_history(&self.symbol, as_of, SMA_FETCH_DAYS)
            .await
        {
            Ok(series) => Self::classify_sma(&series),
            Err(err) => {
                tracing::debug!(%as_of, symbol = %self.symbol, %err, "index history unavailable");
                Regime::Unknown
            }
        }
    }

    async fn vix_regime<P: MarketDataProvider + ?Sized>(provider: &P, as_of: Date) -> Regime {
        match provider.vix_structure(as_of).await {
            Ok(structure) => Self::classify_vix(structure),
            Err(err) => {
                tracing::debug!(%as_of, %err, "VIX structure unavailable");
                Regime::Unknown
            }
        }
    }
}
