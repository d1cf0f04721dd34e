//! Fama-French factor-regime tilts.

use cadiz_traits::provider::{FactorHistory, FfFactor};
use cadiz_traits::stats::MIN_STD_THRESHOLD;
use cadiz_traits::{Date, FactorTilts, MarketDataProvider, StrategyConfig};

/// Maps trailing Fama-French factor performance to multiplicative tilts
/// on the factor z-score columns.
///
/// HML drives the value tilt and RMW the quality tilt. Momentum has no
/// Fama-French analogue and stays at 1.0 unless a factor is configured
/// for it. The trailing-window mean is z-scored against the factor's
/// full-history moments and mapped through a piecewise tilt table, then
/// softened toward 1.0 by the configured tilt strength.
#[derive(Debug, Clone)]
pub struct FactorRegimeAdjuster {
    window_months: usize,
    tilt_strength: f64,
    momentum_source: Option<FfFactor>,
}

impl FactorRegimeAdjuster {
    /// Create an adjuster with explicit parameters.
    #[must_use]
    pub const fn new(
        window_months: usize,
        tilt_strength: f64,
        momentum_source: Option<FfFactor>,
    ) -> Self {
        Self {
            window_months,
            tilt_strength,
            momentum_source,
        }
    }

    /// Create an adjuster from the strategy configuration.
    #[must_use]
    pub const fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.ff_window_months,
            config.tilt_strength,
            config.momentum_regime_factor,
        )
    }

    /// Raw tilt for a trailing-mean z-score.
    fn raw_tilt(z: f64) -> f64 {
        if z >= 1.5 {
            1.30
        } else if z >= 0.5 {
            1.15
        } else if z > -0.5 {
            1.00
        } else if z > -1.5 {
            0.85
        } else {
            0.70
        }
    }

    /// Tilt implied by one factor's history, softened by tilt strength.
    #[must_use]
    pub fn tilt_from_history(&self, history: &FactorHistory) -> f64 {
        if history.trailing.is_empty() || history.full_std <= MIN_STD_THRESHOLD {
            return 1.0;
        }
        let trailing_mean =
            history.trailing.iter().sum::<f64>() / history.trailing.len() as f64;
        let z = (trailing_mean - history.full_mean) / history.full_std;
        if !z.is_finite() {
            return 1.0;
        }
        1.0 + self.tilt_strength * (Self::raw_tilt(z) - 1.0)
    }

    /// Tilts observable at `as_of`.
    ///
    /// An unavailable factor library yields unit tilts.
    pub async fn tilts<P: MarketDataProvider + ?Sized>(
        &self,
        provider: &P,
        as_of: Date,
    ) -> FactorTilts {
        let windows = match provider.ff_factor_window(as_of, self.window_months).await {
            Ok(windows) => windows,
            Err(err) => {
                tracing::debug!(%as_of, %err, "factor library unavailable, tilts neutral");
                return FactorTilts::default();
            }
        };

        let tilt_for = |factor: FfFactor| {
            windows
                .get(&factor)
                .map_or(1.0, |history| self.tilt_from_history(history))
        };

        FactorTilts {
            value: tilt_for(FfFactor::Hml),
            quality: tilt_for(FfFactor::Rmw),
            momentum: self.momentum_source.map_or(1.0, tilt_for),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadiz_traits::memory::InMemoryProvider;

    fn history(trailing_mean: f64) -> FactorHistory {
        FactorHistory {
            trailing: vec![trailing_mean; 12],
            full_mean: 0.0,
            full_std: 0.01,
        }
    }

    #[test]
    fn test_tilt_table_bands() {
        // Full strength so the table values come through unsoftened
        let adjuster = FactorRegimeAdjuster::new(12, 1.0, None);
        assert_relative_eq!(adjuster.tilt_from_history(&history(0.020)), 1.30); // z = 2
        assert_relative_eq!(adjuster.tilt_from_history(&history(0.010)), 1.15); // z = 1
        assert_relative_eq!(adjuster.tilt_from_history(&history(0.000)), 1.00); // z = 0
        assert_relative_eq!(adjuster.tilt_from_history(&history(-0.010)), 0.85); // z = -1
        assert_relative_eq!(adjuster.tilt_from_history(&history(-0.020)), 0.70); // z = -2
    }

    #[test]
    fn test_tilt_table_boundaries() {
        let adjuster = FactorRegimeAdjuster::new(12, 1.0, None);
        assert_relative_eq!(adjuster.tilt_from_history(&history(0.015)), 1.30); // z = 1.5
        assert_relative_eq!(adjuster.tilt_from_history(&history(0.005)), 1.15); // z = 0.5
        assert_relative_eq!(adjuster.tilt_from_history(&history(-0.005)), 0.85); // z = -0.5
        assert_relative_eq!(adjuster.tilt_from_history(&history(-0.015)), 0.70); // z = -1.5
    }

    #[test]
    fn test_default_strength_halves_the_tilt() {
        let adjuster = FactorRegimeAdjuster::new(12, 0.5, None);
        assert_relative_eq!(adjuster.tilt_from_history(&history(0.020)), 1.15);
        assert_relative_eq!(adjuster.tilt_from_history(&history(-0.020)), 0.85);
    }

    #[test]
    fn test_degenerate_history_is_neutral() {
        let adjuster = FactorRegimeAdjuster::new(12, 1.0, None);
        let flat = FactorHistory {
            trailing: vec![0.01; 12],
            full_mean: 0.01,
            full_std: 0.0,
        };
        assert_relative_eq!(adjuster.tilt_from_history(&flat), 1.0);
        let empty = FactorHistory {
            trailing: vec![],
            full_mean: 0.0,
            full_std: 0.01,
        };
        assert_relative_eq!(adjuster.tilt_from_history(&empty), 1.0);
    }

    #[tokio::test]
    async fn test_momentum_neutral_without_source() {
        let date = Date::from_ymd_opt(2023, 6, 30).unwrap();
        let monthly: Vec<(Date, f64)> = (1..=24)
            .map(|i| {
                let year = 2021 + (i - 1) / 12;
                let month = ((i - 1) % 12) + 1;
                (
                    Date::from_ymd_opt(year, month as u32, 28).unwrap(),
                    if i > 18 { 0.05 } else { 0.0 },
                )
            })
            .collect();
        let provider = InMemoryProvider::new()
            .with_ff_series(FfFactor::Hml, monthly.clone())
            .with_ff_series(FfFactor::Rmw, monthly.clone())
            .with_ff_series(FfFactor::MktRf, monthly);

        let adjuster = FactorRegimeAdjuster::new(12, 1.0, None);
        let tilts = adjuster.tilts(&provider, date).await;
        assert!(tilts.value > 1.0);
        assert!(tilts.quality > 1.0);
        assert_relative_eq!(tilts.momentum, 1.0);

        let with_source = FactorRegimeAdjuster::new(12, 1.0, Some(FfFactor::MktRf));
        let tilts = with_source.tilts(&provider, date).await;
        assert!(tilts.momentum > 1.0);
    }

    #[tokio::test]
    async fn test_unavailable_library_is_neutral() {
        let provider = InMemoryProvider::new();
        let adjuster = FactorRegimeAdjuster::new(12, 0.5, None);
        let tilts = adjuster
            .tilts(&provider, Date::from_ymd_opt(2023, 6, 30).unwrap())
            .await;
        assert_eq!(tilts, FactorTilts::default());
    }
}
