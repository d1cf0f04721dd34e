//! CAPE-based macro adjustment of equilibrium returns.

use cadiz_traits::{CapeScalars, CapeThresholds, Date, MarketDataProvider, StrategyConfig};

/// Maps the Shiller CAPE level to a scalar multiplier on equilibrium
/// returns.
///
/// Cheap markets (CAPE at or below the low threshold) scale the prior up
/// by the low scalar; expensive markets scale it down by the high
/// scalar; levels in between interpolate linearly. A missing CAPE feed
/// is neutral (scalar 1.0), never an error.
#[derive(Debug, Clone, Copy)]
pub struct MacroAdjuster {
    thresholds: CapeThresholds,
    scalars: CapeScalars,
}

impl MacroAdjuster {
    /// Create an adjuster with explicit band parameters.
    #[must_use]
    pub const fn new(thresholds: CapeThresholds, scalars: CapeScalars) -> Self {
        Self { thresholds, scalars }
    }

    /// Create an adjuster from the strategy configuration.
    #[must_use]
    pub const fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.cape_thresholds, config.cape_scalars)
    }

    /// The scalar for a known CAPE level.
    #[must_use]
    pub fn scalar_for_cape(&self, cape: f64) -> f64 {
        let CapeThresholds { low, high } = self.thresholds;
        let CapeScalars {
            low: s_low,
            high: s_high,
        } = self.scalars;
        if !cape.is_finite() {
            return 1.0;
        }
        if cape <= low {
            s_low
        } else if cape >= high {
            s_high
        } else {
            let t = (cape - low) / (high - low);
            s_low + t * (s_high - s_low)
        }
    }

    /// The scalar observable at `as_of`.
    ///
    /// Reads the provider's CAPE feed; a missing value or an unavailable
    /// feed yields the neutral scalar 1.0.
    pub async fn scalar<P: MarketDataProvider + ?Sized>(&self, provider: &P, as_of: Date) -> f64 {
        match provider.cape(as_of).await {
            Ok(Some(cape)) => self.scalar_for_cape(cape),
            Ok(None) => 1.0,
            Err(err) => {
                tracing::debug!(%as_of, %err, "CAPE feed unavailable, macro scalar neutral");
                1.0
            }
        }
    }
}
