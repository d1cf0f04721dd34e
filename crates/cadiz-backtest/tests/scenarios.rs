//! End-to-end scenarios across the scoring, posterior, optimization,
//! and walk-forward layers, driven by the in-memory provider.

use approx::assert_relative_eq;
use cadiz_allocate::{PortfolioOptimizer, PortfolioProblem, PriorBlock, build_views, posterior};
use cadiz_backtest::BacktestDriver;
use cadiz_factors::{FactorEngine, TickerInput};
use cadiz_traits::memory::{InMemoryProvider, PointInTimeGuard, StaticUniverse};
use cadiz_traits::provider::{FfFactor, VixStructure};
use cadiz_traits::{
    Constituent, Date, FactorWeights, FundamentalSnapshot, MarketDataProvider, PriceSeries,
    Regime, RegimeMethod, Sector, StrategyConfig, TradingMode,
};
use chrono::Datelike;
use nalgebra::DMatrix;

fn d(y: i32, m: u32, day: u32) -> Date {
    Date::from_ymd_opt(y, m, day).unwrap()
}

fn business_days(from: Date, to: Date) -> Vec<Date> {
    let mut days = Vec::new();
    let mut date = from;
    while date <= to {
        if date.weekday().number_from_monday() <= 5 {
            days.push(date);
        }
        date = date.succ_opt().unwrap();
    }
    days
}

/// Deterministic per-ticker price path: geometric drift plus bounded
/// LCG noise, strictly positive.
fn make_series(days: &[Date], base: f64, daily_drift: f64, seed: u64, noise: f64) -> PriceSeries {
    let mut state = seed;
    let mut close = base;
    let pairs: Vec<(Date, f64)> = days
        .iter()
        .map(|&date| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let u = (state >> 11) as f64 / (1u64 << 53) as f64;
            let shock = (u - 0.5) * 2.0 * noise;
            let pair = (date, close);
            close *= 1.0 + daily_drift + shock;
            pair
        })
        .collect();
    PriceSeries::from_pairs(pairs).unwrap()
}

fn snapshot(shares: f64, fcf: f64, ebit: f64, revenue: f64, gross: f64) -> FundamentalSnapshot {
    FundamentalSnapshot {
        free_cash_flow: Some(fcf),
        ebit: Some(ebit),
        revenue: Some(revenue),
        gross_profit: Some(gross),
        total_assets: Some(revenue * 1.5),
        current_liabilities: Some(revenue * 0.4),
        shares_outstanding: Some(shares),
    }
}

/// Correlated covariance with equal pairwise correlation.
fn covariance(vols: &[f64], correlation: f64) -> DMatrix<f64> {
    let n = vols.len();
    let mut sigma = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            sigma[(i, j)] = if i == j {
                vols[i] * vols[i]
            } else {
                correlation * vols[i] * vols[j]
            };
        }
    }
    sigma
}

/// S1: two tickers with opposed factor profiles. The long-only
/// max-Sharpe portfolio overweights the strong one.
#[test]
fn s1_two_ticker_degenerate() {
    let as_of = d(2023, 6, 30);
    let days = business_days(d(2022, 1, 3), as_of);

    // Raw factors: A = (0.10, 0.20, 0.30), B = (0.02, 0.05, -0.10).
    // Shares 100, final price forced to 10, so market value is 1000.
    let momentum_series = |total_return: f64| {
        let n = days.len();
        let start = 10.0 / (1.0 + total_return);
        let step = (10.0f64 / start).powf(1.0 / (n - 1) as f64);
        let mut close = start;
        let pairs: Vec<(Date, f64)> = days
            .iter()
            .map(|&date| {
                let pair = (date, close);
                close *= step;
                pair
            })
            .collect();
        PriceSeries::from_pairs(pairs).unwrap()
    };

    let input_a = TickerInput {
        ticker: "A".to_string(),
        // fcf 100 and ebit 100 over market value 1000 give both value
        // yields 0.10; roic 100/500 = 0.20 and gross margin 0.20.
        fundamentals: Some(FundamentalSnapshot {
            free_cash_flow: Some(100.0),
            ebit: Some(100.0),
            revenue: Some(1000.0),
            gross_profit: Some(200.0),
            total_assets: Some(800.0),
            current_liabilities: Some(300.0),
            shares_outstanding: Some(100.0),
        }),
        prices: Some(momentum_series(0.30)),
    };
    let input_b = TickerInput {
        ticker: "B".to_string(),
        fundamentals: Some(FundamentalSnapshot {
            free_cash_flow: Some(20.0),
            ebit: Some(20.0),
            revenue: Some(1000.0),
            gross_profit: Some(50.0),
            total_assets: Some(700.0),
            current_liabilities: Some(300.0),
            shares_outstanding: Some(100.0),
        }),
        prices: Some(momentum_series(-0.10)),
    };

    let engine = FactorEngine::new(FactorWeights::default());
    let scores = engine.score(as_of, &[input_a, input_b], None);
    let total_a = scores.total_of("A").unwrap();
    let total_b = scores.total_of("B").unwrap();
    assert!(total_a > 0.0, "A composite must be positive, got {total_a}");
    assert!(total_b < 0.0, "B composite must be negative, got {total_b}");

    let tickers = vec!["A".to_string(), "B".to_string()];
    let sigma = covariance(&[0.20, 0.20], 0.2);
    let prior = PriorBlock::new(tickers.clone(), &[1.0e9, 1.0e9], sigma, 2.5, 1.0).unwrap();
    let views = build_views(
        &tickers,
        &[total_a, total_b],
        &[
            scores.z_components("A").unwrap(),
            scores.z_components("B").unwrap(),
        ],
        &[0.20, 0.20],
        0.02,
    );
    let post = posterior(&prior, &views).unwrap();

    let config = StrategyConfig {
        weight_bounds: (0.0, 1.0),
        sector_cap: 1.0,
        ..Default::default()
    };
    let optimizer = PortfolioOptimizer::from_config(&config);
    let result = optimizer
        .optimize(&PortfolioProblem {
            tickers,
            mean: post.mean,
            covariance: post.covariance,
            sectors: vec![Sector::Technology, Sector::Energy],
            composite: vec![total_a, total_b],
        })
        .unwrap();

    assert_relative_eq!(result.net_exposure(), 1.0, epsilon = 1e-6);
    assert!(result.weights.iter().all(|&w| w >= -1e-12));
    assert!(
        result.weights[0] > result.weights[1],
        "w_A {} must exceed w_B {}",
        result.weights[0],
        result.weights[1]
    );
}

/// S2: ten identical-score tickers in one sector. The sector cap binds,
/// the largest caps carry the budget, and the shortfall stays in cash.
#[test]
fn s2_sector_cap_binds() {
    let n = 10;
    let tickers: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
    // Identical scores: no views, posterior equals the cap-implied prior.
    let caps: Vec<f64> = vec![
        1.0e12, 8.0e11, 6.0e11, 1.0e6, 1.0e6, 1.0e6, 1.0e6, 1.0e6, 1.0e6, 1.0e6,
    ];
    let sigma = covariance(&vec![0.20; n], 0.3);
    let prior = PriorBlock::new(tickers.clone(), &caps, sigma, 2.5, 1.0).unwrap();
    let post = posterior(&prior, &[]).unwrap();

    let optimizer = PortfolioOptimizer::from_config(&StrategyConfig::default());
    let result = optimizer
        .optimize(&PortfolioProblem {
            tickers,
            mean: post.mean,
            covariance: post.covariance,
            sectors: vec![Sector::Technology; n],
            composite: vec![0.0; n],
        })
        .unwrap();

    // Gross equals the sector cap; the rest of the budget is cash.
    assert_relative_eq!(result.gross_exposure(), 0.35, epsilon = 1e-6);
    assert!(result.weights.iter().all(|&w| w <= 0.30 + 1e-9));
    // Top three by market cap carry the sector budget.
    let top3: f64 = result.weights[..3].iter().sum();
    assert!(top3 > 0.34, "top three carry {top3} of 0.35");
    for &w in &result.weights[3..] {
        assert!(w < 1e-3, "negligible-cap ticker carries {w}");
    }
    // Ordered by market cap.
    assert!(result.weights[0] >= result.weights[1]);
    assert!(result.weights[1] >= result.weights[2]);
}

/// Builds a provider and resolver over `n` tickers with distinct factor
/// profiles and enough history for scoring from `start` to `end`.
fn seeded_market(
    n: usize,
    history_start: Date,
    end: Date,
) -> (InMemoryProvider, StaticUniverse, Vec<String>) {
    let days = business_days(history_start, end);
    let sectors = [
        Sector::Technology,
        Sector::Healthcare,
        Sector::FinancialServices,
        Sector::Energy,
    ];

    let mut provider = InMemoryProvider::new()
        .with_benchmark(make_series(&days, 400.0, 0.0003, 99, 0.004))
        .with_index("SPY", make_series(&days, 400.0, 0.0003, 99, 0.004));

    let mut constituents = Vec::new();
    let mut tickers = Vec::new();
    for i in 0..n {
        let ticker = format!("S{i}");
        let drift = 0.0002 + 0.0001 * (i % 5) as f64;
        let series = make_series(&days, 50.0 + 5.0 * i as f64, drift, 1000 + i as u64, 0.006);
        let shares = 1.0e9 * (1.0 + i as f64);
        let revenue = 1.0e10;
        provider = provider
            .with_prices(ticker.clone(), series)
            .with_fundamentals(
                ticker.clone(),
                history_start,
                snapshot(
                    shares,
                    4.0e8 * (1.0 + i as f64 * 0.3),
                    6.0e8 * (1.0 + i as f64 * 0.2),
                    revenue,
                    3.0e9 * (1.0 + i as f64 * 0.1),
                ),
            );
        constituents.push(Constituent {
            ticker: ticker.clone(),
            sector: sectors[i % sectors.len()],
            market_cap: shares * 50.0,
        });
        tickers.push(ticker);
    }
    (provider, StaticUniverse::new(constituents), tickers)
}

/// S3: risk-off regime halves the booked exposure, the rest is cash.
#[tokio::test]
async fn s3_regime_risk_off_scaling() {
    let start = d(2023, 1, 1);
    let end = d(2023, 2, 28);
    let (provider, resolver, _) = seeded_market(8, d(2021, 1, 4), end);
    // Backwardated short leg: 9d above 30d means risk-off.
    let provider = provider.with_vix(
        d(2022, 12, 30),
        VixStructure {
            vix9d: 32.0,
            vix30d: 26.0,
            vix3m: 25.0,
        },
    );

    let config = StrategyConfig {
        use_regime_adjustment: true,
        regime_method: RegimeMethod::Vix,
        ..Default::default()
    };
    let driver = BacktestDriver::new(provider, resolver, config).unwrap();
    let report = driver.run(start, end).await.unwrap();

    assert!(!report.ledger.is_empty());
    let entry = &report.ledger.entries()[0];
    assert_eq!(entry.regime, Some(Regime::RiskOff));
    assert_relative_eq!(entry.exposure, 0.50, epsilon = 1e-12);
    let equity: f64 = entry.weights.values().sum();
    assert_relative_eq!(equity, 0.50, epsilon = 1e-6);
    assert_relative_eq!(entry.cash, 0.50, epsilon = 1e-6);
}

/// S4: two monthly rebalances; the booked period return equals the
/// weighted sum of per-ticker returns under the first date's weights.
#[tokio::test]
async fn s4_monthly_two_dates() {
    let start = d(2023, 1, 31);
    let end = d(2023, 2, 28);
    let (provider, resolver, _) = seeded_market(5, d(2021, 1, 4), end);

    let driver = BacktestDriver::new(provider.clone(), resolver, StrategyConfig::default()).unwrap();
    let report = driver.run(start, end).await.unwrap();

    assert_eq!(report.ledger.len(), 2, "exactly two rebalance records");
    assert_eq!(report.periods.len(), 1);
    let first = &report.ledger.entries()[0];
    assert_eq!(first.date, d(2023, 1, 31));
    assert_eq!(report.ledger.entries()[1].date, d(2023, 2, 28));

    // Reconstruct the period return by hand from the same provider data.
    let mut expected = 0.0;
    for (ticker, &weight) in &first.weights {
        let series = provider
            .prices(ticker, d(2022, 1, 1), end)
            .await
            .unwrap();
        let r = series.return_between(d(2023, 1, 31), d(2023, 2, 28)).unwrap();
        expected += weight * r;
    }
    assert_relative_eq!(report.periods[0].portfolio, expected, epsilon = 1e-12);
}

/// S5: a full two-year quarterly backtest under the point-in-time guard
/// with every optional feed enabled. Any future read panics.
#[tokio::test]
async fn s5_point_in_time_trap() {
    let start = d(2022, 1, 1);
    let end = d(2023, 12, 29);
    let (provider, resolver, _) = seeded_market(8, d(2020, 1, 6), end);

    let mut provider = provider;
    // CAPE, VIX, and factor history feeds, observable monthly.
    let mut month = d(2021, 1, 29);
    let mut hml = Vec::new();
    let mut rmw = Vec::new();
    while month <= end {
        provider = provider
            .with_cape(month, 24.0 + (month.month() as f64) * 0.5)
            .with_vix(
                month,
                VixStructure {
                    vix9d: 16.0,
                    vix30d: 18.0,
                    vix3m: 20.0,
                },
            );
        hml.push((month, 0.004 * f64::from(month.month() % 3)));
        rmw.push((month, 0.002 * f64::from(month.month() % 4)));
        month = month_end_next(month);
    }
    let provider = provider
        .with_ff_series(FfFactor::Hml, hml)
        .with_ff_series(FfFactor::Rmw, rmw);

    let guarded = PointInTimeGuard::new(provider, end);
    let config = StrategyConfig {
        rebalance_frequency: cadiz_traits::RebalanceFrequency::Quarterly,
        use_macro: true,
        use_factor_regimes: true,
        use_regime_adjustment: true,
        ..Default::default()
    };
    let driver = BacktestDriver::new(guarded, resolver, config).unwrap();
    let report = driver.run(start, end).await.unwrap();

    assert!(report.diagnostics.aborted.is_none());
    assert_eq!(report.ledger.len(), 8, "eight quarterly rebalances");
    for entry in report.ledger.entries() {
        assert!(entry.exposure > 0.0);
    }
}

fn month_end_next(date: Date) -> Date {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    // Last weekday-ish observation near month end is fine for feeds.
    Date::from_ymd_opt(y, m, 27).unwrap()
}

/// S6: 130/30 construction over a symmetric composite mix.
#[test]
fn s6_long_short_130_30() {
    let n = 20;
    let tickers: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
    let composite: Vec<f64> = (0..n).map(|i| 1.9 - 0.2 * i as f64).collect();
    let z_components: Vec<(f64, f64, f64)> =
        composite.iter().map(|&z| (z, z, z)).collect();
    let vols: Vec<f64> = (0..n).map(|i| 0.18 + 0.01 * (i % 5) as f64).collect();
    let sigma = covariance(&vols, 0.15);
    let caps: Vec<f64> = (0..n).map(|i| 1.0e10 * (1.0 + i as f64 * 0.2)).collect();

    let prior = PriorBlock::new(tickers.clone(), &caps, sigma, 2.5, 1.0).unwrap();
    let views = build_views(&tickers, &composite, &z_components, &vols, 0.02);
    let post = posterior(&prior, &views).unwrap();

    let config = StrategyConfig {
        mode: TradingMode::LongShort {
            long_exposure: 1.3,
            short_exposure: 0.3,
        },
        ..Default::default()
    };
    let optimizer = PortfolioOptimizer::from_config(&config);
    let sectors: Vec<Sector> = (0..n)
        .map(|i| match i % 5 {
            0 => Sector::Technology,
            1 => Sector::Healthcare,
            2 => Sector::Energy,
            3 => Sector::Industrials,
            _ => Sector::Utilities,
        })
        .collect();
    let result = optimizer
        .optimize(&PortfolioProblem {
            tickers,
            mean: post.mean,
            covariance: post.covariance,
            sectors,
            composite,
        })
        .unwrap();

    assert_relative_eq!(result.net_exposure(), 1.0, epsilon = 1e-6);
    assert!(result.gross_exposure() <= 1.6 + 1e-6);
    assert!(result.weights.iter().any(|&w| w < 0.0), "has a short");
    assert!(result.weights.iter().any(|&w| w >= 0.10), "has a 10%+ long");
}

/// Fewer than five resolvable tickers skips every rebalance and books
/// nothing, while the diagnostics say why.
#[tokio::test]
async fn insufficient_universe_skips_all_dates() {
    let start = d(2023, 1, 1);
    let end = d(2023, 2, 28);
    let (provider, _, _) = seeded_market(3, d(2021, 1, 4), end);
    let resolver = StaticUniverse::new(vec![
        Constituent {
            ticker: "S0".to_string(),
            sector: Sector::Technology,
            market_cap: 1.0e10,
        },
        Constituent {
            ticker: "S1".to_string(),
            sector: Sector::Healthcare,
            market_cap: 1.0e10,
        },
        Constituent {
            ticker: "S2".to_string(),
            sector: Sector::Energy,
            market_cap: 1.0e10,
        },
    ]);

    let driver = BacktestDriver::new(provider, resolver, StrategyConfig::default()).unwrap();
    let report = driver.run(start, end).await.unwrap();

    assert!(report.ledger.is_empty());
    assert_eq!(report.diagnostics.skipped.len(), 2);
    assert!(report.diagnostics.aborted.is_none());
}

/// A pre-cancelled token returns immediately with an empty ledger and
/// the abort reason recorded.
#[tokio::test]
async fn cancellation_returns_partial_state() {
    let start = d(2023, 1, 1);
    let end = d(2023, 6, 30);
    let (provider, resolver, _) = seeded_market(6, d(2021, 1, 4), end);

    let driver = BacktestDriver::new(provider, resolver, StrategyConfig::default()).unwrap();
    driver.cancel_token().cancel();
    let report = driver.run(start, end).await.unwrap();

    assert!(report.ledger.is_empty());
    assert_eq!(report.diagnostics.aborted.as_deref(), Some("cancelled"));
}

/// Slippage subtracts exactly turnover times the configured drag from
/// the period that follows each rebalance.
#[tokio::test]
async fn slippage_drags_period_returns() {
    let start = d(2023, 1, 1);
    let end = d(2023, 2, 28);
    let (provider, resolver, _) = seeded_market(6, d(2021, 1, 4), end);

    let base_driver = BacktestDriver::new(
        provider.clone(),
        resolver.clone(),
        StrategyConfig::default(),
    )
    .unwrap();
    let base = base_driver.run(start, end).await.unwrap();

    let costly = BacktestDriver::new(
        provider,
        resolver,
        StrategyConfig {
            slippage_bps: Some(50.0),
            ..Default::default()
        },
    )
    .unwrap();
    let dragged = costly.run(start, end).await.unwrap();

    assert_eq!(base.periods.len(), dragged.periods.len());
    // Entering from cash, first-rebalance turnover equals the booked
    // net exposure (1.0), so the drag on the first period is 50 bps.
    let turnover = dragged.ledger.entries()[0].turnover;
    assert_relative_eq!(turnover, 1.0, epsilon = 1e-6);
    assert_relative_eq!(
        dragged.periods[0].portfolio,
        base.periods[0].portfolio - turnover * 50.0 / 10_000.0,
        epsilon = 1e-9
    );
}

/// The composite is linear in the configured factor weights: an
/// all-value weighting reproduces the value z column as the total.
#[test]
fn composite_linearity_in_weights() {
    let as_of = d(2023, 6, 30);
    let days = business_days(d(2022, 1, 3), as_of);
    let inputs: Vec<TickerInput> = (0..4)
        .map(|i| TickerInput {
            ticker: format!("T{i}"),
            fundamentals: Some(snapshot(
                1.0e9,
                2.0e8 * (1.0 + i as f64),
                3.0e8 * (1.0 + i as f64),
                1.0e10,
                2.0e9,
            )),
            prices: Some(make_series(&days, 40.0, 0.0002 * i as f64, 7 + i as u64, 0.005)),
        })
        .collect();

    let engine = FactorEngine::new(FactorWeights {
        value: 1.0,
        quality: 0.0,
        momentum: 0.0,
    });
    let scores = engine.score(as_of, &inputs, None);
    for i in 0..4 {
        assert_relative_eq!(scores.total()[i], scores.z_value()[i], epsilon = 1e-12);
    }
}
