//! The factor scoring engine.

use crate::audit::{FactorAudit, FactorColumnAudit};
use crate::raw::RawFactors;
use cadiz_traits::provider::MIN_PRICE_ROWS;
use cadiz_traits::stats::{self, CrossSectionMoments};
use cadiz_traits::{
    Date, FactorTilts, FactorWeights, FundamentalSnapshot, PriceSeries, StrategyConfig, Ticker,
};
use ndarray::Array1;

/// Winsorization tail probability applied to each raw factor column.
const WINSOR_PCT: f64 = 0.01;

/// Z-score clip bound, re-applied after regime tilts.
const Z_CLIP: f64 = cadiz_traits::stats::Z_CLIP;

/// Sub-metric weight inside the value and quality composites.
const HALF: f64 = 0.5;

/// Data handed to the engine for one ticker.
///
/// The driver fetches; the engine computes. Either field may be absent,
/// in which case the ticker scores neutral and its audit says why.
#[derive(Debug, Clone)]
pub struct TickerInput {
    /// Ticker symbol.
    pub ticker: Ticker,
    /// Most recent fundamentals observable at the as-of date.
    pub fundamentals: Option<FundamentalSnapshot>,
    /// Adjusted-close history ending at the as-of date.
    pub prices: Option<PriceSeries>,
}

/// Cross-sectional factor scores for one rebalance date.
///
/// Immutable after construction. Columns are aligned with
/// [`FactorScores::tickers`]; every z-score lies in `[-3, 3]`.
#[derive(Debug, Clone)]
pub struct FactorScores {
    as_of: Date,
    tickers: Vec<Ticker>,
    z_value: Array1<f64>,
    z_quality: Array1<f64>,
    z_momentum: Array1<f64>,
    total: Array1<f64>,
    value_moments: CrossSectionMoments,
    quality_moments: CrossSectionMoments,
    momentum_moments: CrossSectionMoments,
    audits: Vec<FactorAudit>,
}

impl FactorScores {
    /// Rebalance date the scores were computed for.
    #[must_use]
    pub const fn as_of(&self) -> Date {
        self.as_of
    }

    /// Number of scored tickers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    /// Whether no tickers were scored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Tickers in scoring order, aligned with the score columns.
    #[must_use]
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    /// Value z-score column.
    #[must_use]
    pub const fn z_value(&self) -> &Array1<f64> {
        &self.z_value
    }

    /// Quality z-score column.
    #[must_use]
    pub const fn z_quality(&self) -> &Array1<f64> {
        &self.z_quality
    }

    /// Momentum z-score column.
    #[must_use]
    pub const fn z_momentum(&self) -> &Array1<f64> {
        &self.z_momentum
    }

    /// Composite score column.
    #[must_use]
    pub const fn total(&self) -> &Array1<f64> {
        &self.total
    }

    /// Universe moments of the winsorized value column.
    #[must_use]
    pub const fn value_moments(&self) -> CrossSectionMoments {
        self.value_moments
    }

    /// Universe moments of the winsorized quality column.
    #[must_use]
    pub const fn quality_moments(&self) -> CrossSectionMoments {
        self.quality_moments
    }

    /// Universe moments of the winsorized momentum column.
    #[must_use]
    pub const fn momentum_moments(&self) -> CrossSectionMoments {
        self.momentum_moments
    }

    /// Per-ticker audits, aligned with [`FactorScores::tickers`].
    #[must_use]
    pub fn audits(&self) -> &[FactorAudit] {
        &self.audits
    }

    /// Column index of a ticker.
    #[must_use]
    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Composite score of a ticker.
    #[must_use]
    pub fn total_of(&self, ticker: &str) -> Option<f64> {
        self.index_of(ticker).map(|i| self.total[i])
    }

    /// The `(value, quality, momentum)` z-scores of a ticker.
    #[must_use]
    pub fn z_components(&self, ticker: &str) -> Option<(f64, f64, f64)> {
        self.index_of(ticker)
            .map(|i| (self.z_value[i], self.z_quality[i], self.z_momentum[i]))
    }

    /// Audit of a ticker.
    #[must_use]
    pub fn audit_of(&self, ticker: &str) -> Option<&FactorAudit> {
        self.index_of(ticker).map(|i| &self.audits[i])
    }

    /// The top `n` tickers by composite score, descending, ties broken
    /// by ticker for determinism.
    #[must_use]
    pub fn top_n(&self, n: usize) -> Vec<Ticker> {
        let mut order: Vec<usize> = (0..self.tickers.len()).collect();
        order.sort_by(|&a, &b| {
            self.total[b]
                .partial_cmp(&self.total[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.tickers[a].cmp(&self.tickers[b]))
        });
        order
            .into_iter()
            .take(n)
            .map(|i| self.tickers[i].clone())
            .collect()
    }
}

/// Computes [`FactorScores`] from per-ticker inputs.
///
/// Stateless apart from configuration; `score` takes inputs by reference
/// and returns a fresh result, so nothing is shared across rebalances.
#[derive(Debug, Clone)]
pub struct FactorEngine {
    weights: FactorWeights,
}

impl FactorEngine {
    /// Create an engine with explicit composite weights.
    #[must_use]
    pub const fn new(weights: FactorWeights) -> Self {
        Self { weights }
    }

    /// Create an engine from the strategy configuration.
    #[must_use]
    pub const fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.factor_weights)
    }

    /// Score a universe of ticker inputs at one rebalance date.
    ///
    /// The pipeline per column: combine sub-metrics (imputing missing
    /// ones with the universe median), winsorize at 1%/99%, standardize
    /// and clip to `[-3, 3]`, apply regime tilts, composite. Tickers with
    /// no fundamentals or fewer than 252 price rows score 0 on every
    /// factor and are flagged `insufficient_data` in their audit.
    #[must_use]
    pub fn score(
        &self,
        as_of: Date,
        inputs: &[TickerInput],
        tilts: Option<FactorTilts>,
    ) -> FactorScores {
        let n = inputs.len();
        let tilts = tilts.unwrap_or_default();

        let mut raws = Vec::with_capacity(n);
        let mut sufficient = Vec::with_capacity(n);
        for input in inputs {
            let ok = input.fundamentals.is_some()
                && input
                    .prices
                    .as_ref()
                    .is_some_and(|p| p.len() >= MIN_PRICE_ROWS);
            if ok {
                let fundamentals = input.fundamentals.as_ref().expect("checked above");
                let prices = input.prices.as_ref().expect("checked above");
                raws.push(RawFactors::compute(fundamentals, prices));
            } else {
                raws.push(RawFactors::default());
            }
            sufficient.push(ok);
        }

        // Sub-metric columns, NaN where missing.
        let mut fcf = column(&raws, |r| r.fcf_yield);
        let mut ey = column(&raws, |r| r.earnings_yield);
        let mut roic = column(&raws, |r| r.roic);
        let mut gm = column(&raws, |r| r.gross_margin);
        let mut mom = column(&raws, |r| r.momentum_12m);

        // Universe medians for imputation, from observed values only.
        let medians = [
            stats::median(&fcf),
            stats::median(&ey),
            stats::median(&roic),
            stats::median(&gm),
            stats::median(&mom),
        ];

        let mut imputed: Vec<Vec<String>> = vec![Vec::new(); n];
        let columns: [(&mut Vec<f64>, &str, usize); 5] = [
            (&mut fcf, "fcf_yield", 0),
            (&mut ey, "earnings_yield", 1),
            (&mut roic, "roic", 2),
            (&mut gm, "gross_margin", 3),
            (&mut mom, "momentum_12m", 4),
        ];
        for (col, name, median_idx) in columns {
            let Some(median) = medians[median_idx] else {
                continue;
            };
            for i in 0..n {
                if sufficient[i] && !col[i].is_finite() {
                    col[i] = median;
                    imputed[i].push(name.to_string());
                }
            }
        }

        // Composite raw factors; NaN propagates from unimputable inputs.
        let mut raw_value: Vec<f64> =
            (0..n).map(|i| HALF * fcf[i] + HALF * ey[i]).collect();
        let mut raw_quality: Vec<f64> =
            (0..n).map(|i| HALF * roic[i] + HALF * gm[i]).collect();
        let mut raw_momentum: Vec<f64> = mom.clone();

        stats::winsorize(&mut raw_value, WINSOR_PCT);
        stats::winsorize(&mut raw_quality, WINSOR_PCT);
        stats::winsorize(&mut raw_momentum, WINSOR_PCT);

        let (z_value, value_moments) = stats::zscores(&raw_value);
        let (z_quality, quality_moments) = stats::zscores(&raw_quality);
        let (z_momentum, momentum_moments) = stats::zscores(&raw_momentum);

        // Neutralize missing scores, tilt, re-clip, composite.
        let finish = |z: &[f64], tilt: f64| -> Vec<f64> {
            z.iter()
                .map(|&v| {
                    if v.is_finite() {
                        (v * tilt).clamp(-Z_CLIP, Z_CLIP)
                    } else {
                        0.0
                    }
                })
                .collect()
        };
        let z_value = finish(&z_value, tilts.value);
        let z_quality = finish(&z_quality, tilts.quality);
        let z_momentum = finish(&z_momentum, tilts.momentum);

        let w = &self.weights;
        let total: Vec<f64> = (0..n)
            .map(|i| w.value * z_value[i] + w.quality * z_quality[i] + w.momentum * z_momentum[i])
            .collect();

        let audits = (0..n)
            .map(|i| {
                let column_audit = |raw: &[f64], z: &[f64], weight: f64| {
                    if raw[i].is_finite() {
                        FactorColumnAudit {
                            raw: Some(raw[i]),
                            percentile: stats::percentile_rank(raw, raw[i]),
                            z: z[i],
                            contribution: weight * z[i],
                        }
                    } else {
                        FactorColumnAudit::neutral()
                    }
                };
                FactorAudit {
                    ticker: inputs[i].ticker.clone(),
                    insufficient_data: !sufficient[i],
                    imputed: imputed[i].clone(),
                    raw: raws[i],
                    value: column_audit(&raw_value, &z_value, w.value),
                    quality: column_audit(&raw_quality, &z_quality, w.quality),
                    momentum: column_audit(&raw_momentum, &z_momentum, w.momentum),
                    total: total[i],
                }
            })
            .collect();

        FactorScores {
            as_of,
            tickers: inputs.iter().map(|i| i.ticker.clone()).collect(),
            z_value: Array1::from_vec(z_value),
            z_quality: Array1::from_vec(z_quality),
            z_momentum: Array1::from_vec(z_momentum),
            total: Array1::from_vec(total),
            value_moments,
            quality_moments,
            momentum_moments,
            audits,
        }
    }
}

fn column(raws: &[RawFactors], get: impl Fn(&RawFactors) -> Option<f64>) -> Vec<f64> {
    raws.iter().map(|r| get(r).unwrap_or(f64::NAN)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(n: usize, start_close: f64, end_close: f64) -> PriceSeries {
        let start = d(2022, 1, 3);
        let step = (end_close / start_close).powf(1.0 / (n - 1) as f64);
        let mut close = start_close;
        let pairs: Vec<(Date, f64)> = (0..n)
            .map(|i| {
                let date = start + chrono::Days::new(i as u64);
                let pair = (date, close);
                close *= step;
                pair
            })
            .collect();
        PriceSeries::from_pairs(pairs).unwrap()
    }

    fn input(ticker: &str, fcf: f64, momentum_end: f64) -> TickerInput {
        TickerInput {
            ticker: ticker.to_string(),
            fundamentals: Some(FundamentalSnapshot {
                free_cash_flow: Some(fcf),
                ebit: Some(fcf * 1.2),
                revenue: Some(1000.0),
                gross_profit: Some(fcf * 4.0),
                total_assets: Some(900.0),
                current_liabilities: Some(300.0),
                shares_outstanding: Some(100.0),
            }),
            prices: Some(series(300, 10.0, momentum_end)),
        }
    }

    #[test]
    fn test_scores_aligned_and_bounded() {
        let engine = FactorEngine::new(FactorWeights::default());
        let inputs = vec![
            input("A", 100.0, 14.0),
            input("B", 60.0, 12.0),
            input("C", 20.0, 9.0),
        ];
        let scores = engine.score(d(2023, 6, 30), &inputs, None);

        assert_eq!(scores.len(), 3);
        assert_eq!(scores.tickers(), &["A", "B", "C"]);
        for z in scores
            .z_value()
            .iter()
            .chain(scores.z_quality())
            .chain(scores.z_momentum())
        {
            assert!(z.abs() <= 3.0 + 1e-12);
        }
        // Higher cash flow and momentum rank higher
        assert!(scores.total_of("A").unwrap() > scores.total_of("C").unwrap());
    }

    #[test]
    fn test_composite_linear_in_weights() {
        let inputs = vec![
            input("A", 100.0, 14.0),
            input("B", 60.0, 12.0),
            input("C", 20.0, 9.0),
        ];
        let value_only = FactorEngine::new(FactorWeights {
            value: 1.0,
            quality: 0.0,
            momentum: 0.0,
        });
        let scores = value_only.score(d(2023, 6, 30), &inputs, None);
        for i in 0..scores.len() {
            assert_relative_eq!(scores.total()[i], scores.z_value()[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_insufficient_ticker_scores_neutral() {
        let engine = FactorEngine::new(FactorWeights::default());
        let inputs = vec![
            input("A", 100.0, 14.0),
            input("B", 60.0, 12.0),
            TickerInput {
                ticker: "BAD".to_string(),
                fundamentals: None,
                prices: Some(series(300, 10.0, 20.0)),
            },
            TickerInput {
                ticker: "SHORT".to_string(),
                fundamentals: input("X", 50.0, 11.0).fundamentals,
                prices: Some(series(100, 10.0, 20.0)),
            },
        ];
        let scores = engine.score(d(2023, 6, 30), &inputs, None);

        for ticker in ["BAD", "SHORT"] {
            assert_relative_eq!(scores.total_of(ticker).unwrap(), 0.0);
            let audit = scores.audit_of(ticker).unwrap();
            assert!(audit.insufficient_data);
            assert!(audit.imputed.is_empty());
        }
        assert!(!scores.audit_of("A").unwrap().insufficient_data);
    }

    #[test]
    fn test_missing_submetric_imputed_with_median() {
        let engine = FactorEngine::new(FactorWeights::default());
        let mut partial = input("P", 60.0, 12.0);
        partial.fundamentals.as_mut().unwrap().gross_profit = None;
        let inputs = vec![input("A", 100.0, 14.0), input("B", 20.0, 9.0), partial];
        let scores = engine.score(d(2023, 6, 30), &inputs, None);

        let audit = scores.audit_of("P").unwrap();
        assert_eq!(audit.imputed, vec!["gross_margin".to_string()]);
        assert!(!audit.insufficient_data);
        // Quality still scored thanks to the imputation
        assert!(audit.quality.raw.is_some());
    }

    #[test]
    fn test_constant_cross_section_scores_zero() {
        let engine = FactorEngine::new(FactorWeights::default());
        let inputs = vec![
            input("A", 50.0, 12.0),
            input("B", 50.0, 12.0),
            input("C", 50.0, 12.0),
        ];
        let scores = engine.score(d(2023, 6, 30), &inputs, None);
        for ticker in ["A", "B", "C"] {
            assert_relative_eq!(scores.total_of(ticker).unwrap(), 0.0);
        }
        assert!(!scores.value_moments().applied);
    }

    #[test]
    fn test_tilts_scale_z_columns() {
        let inputs = vec![
            input("A", 100.0, 14.0),
            input("B", 60.0, 12.0),
            input("C", 20.0, 9.0),
        ];
        let engine = FactorEngine::new(FactorWeights::default());
        let base = engine.score(d(2023, 6, 30), &inputs, None);
        let tilted = engine.score(
            d(2023, 6, 30),
            &inputs,
            Some(FactorTilts {
                value: 1.15,
                quality: 1.0,
                momentum: 0.85,
            }),
        );

        for i in 0..base.len() {
            assert_relative_eq!(
                tilted.z_value()[i],
                (base.z_value()[i] * 1.15).clamp(-3.0, 3.0),
                epsilon = 1e-12
            );
            assert_relative_eq!(tilted.z_quality()[i], base.z_quality()[i], epsilon = 1e-12);
            assert_relative_eq!(
                tilted.z_momentum()[i],
                (base.z_momentum()[i] * 0.85).clamp(-3.0, 3.0),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_contributions_sum_to_total() {
        let engine = FactorEngine::new(FactorWeights::default());
        let inputs = vec![
            input("A", 100.0, 14.0),
            input("B", 60.0, 12.0),
            input("C", 20.0, 9.0),
        ];
        let scores = engine.score(d(2023, 6, 30), &inputs, None);
        for audit in scores.audits() {
            let sum =
                audit.value.contribution + audit.quality.contribution + audit.momentum.contribution;
            assert_relative_eq!(sum, audit.total, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_top_n_ordering_and_ties() {
        let engine = FactorEngine::new(FactorWeights::default());
        let inputs = vec![
            input("B", 50.0, 12.0),
            input("A", 50.0, 12.0),
            input("C", 100.0, 15.0),
        ];
        let scores = engine.score(d(2023, 6, 30), &inputs, None);
        let top = scores.top_n(3);
        assert_eq!(top[0], "C");
        // A and B tie at neutral; ticker order breaks the tie
        assert_eq!(&top[1..], &["A".to_string(), "B".to_string()]);
        assert_eq!(scores.top_n(1).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_z_scores_always_clipped(
            fcfs in proptest::collection::vec(-500.0f64..500.0, 3..12),
            ends in proptest::collection::vec(5.0f64..50.0, 3..12),
        ) {
            let n = fcfs.len().min(ends.len());
            let inputs: Vec<TickerInput> = (0..n)
                .map(|i| input(&format!("T{i}"), fcfs[i], ends[i]))
                .collect();
            let engine = FactorEngine::new(FactorWeights::default());
            let scores = engine.score(d(2023, 6, 30), &inputs, None);
            for i in 0..scores.len() {
                prop_assert!(scores.z_value()[i].abs() <= 3.0 + 1e-9);
                prop_assert!(scores.z_quality()[i].abs() <= 3.0 + 1e-9);
                prop_assert!(scores.z_momentum()[i].abs() <= 3.0 + 1e-9);
                prop_assert!(scores.total()[i].is_finite());
            }
        }
    }
}
