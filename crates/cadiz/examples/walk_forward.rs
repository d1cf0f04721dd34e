//! Walk-forward backtest over a synthetic in-memory market.
//!
//! Demonstrates the full pipeline without any network access: seed an
//! [`InMemoryProvider`] with deterministic price paths and fundamentals,
//! run the monthly driver over a year, and print the ledger rows and
//! terminal metrics as JSON.

use cadiz::prelude::*;
use cadiz::traits::memory::{InMemoryProvider, StaticUniverse};
use cadiz::traits::{Constituent, FundamentalSnapshot, PriceSeries};
use chrono::Datelike;

const TICKERS: &[(&str, Sector, f64)] = &[
    ("ALPHA", Sector::Technology, 0.0008),
    ("BRAVO", Sector::Technology, 0.0005),
    ("CHARLIE", Sector::Healthcare, 0.0004),
    ("DELTA", Sector::FinancialServices, 0.0003),
    ("ECHO", Sector::Energy, 0.0001),
    ("FOXTROT", Sector::ConsumerDefensive, 0.0002),
];

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

fn price_path(days: &[Date], base: f64, drift: f64, seed: u64) -> PriceSeries {
    let mut state = seed;
    let mut close = base;
    let pairs: Vec<(Date, f64)> = days
        .iter()
        .map(|&date| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let shock = ((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 0.012;
            let pair = (date, close);
            close *= 1.0 + drift + shock;
            pair
        })
        .collect();
    PriceSeries::from_pairs(pairs).expect("generated dates are increasing")
}

#[tokio::main]
async fn main() -> Result<()> {
    let history_start = Date::from_ymd_opt(2021, 1, 4).unwrap();
    let start = Date::from_ymd_opt(2023, 1, 1).unwrap();
    let end = Date::from_ymd_opt(2023, 12, 29).unwrap();
    let days = business_days(history_start, end);

    let mut provider =
        InMemoryProvider::new().with_benchmark(price_path(&days, 400.0, 0.0003, 42));
    let mut constituents = Vec::new();
    for (i, &(ticker, sector, drift)) in TICKERS.iter().enumerate() {
        let shares = 2.0e9 + 1.0e9 * i as f64;
        provider = provider
            .with_prices(ticker, price_path(&days, 60.0 + 10.0 * i as f64, drift, 7 + i as u64))
            .with_fundamentals(
                ticker,
                history_start,
                FundamentalSnapshot {
                    free_cash_flow: Some(3.0e9 + 1.0e9 * i as f64),
                    ebit: Some(4.0e9 + 1.2e9 * i as f64),
                    revenue: Some(4.0e10),
                    gross_profit: Some(1.5e10 + 1.0e9 * i as f64),
                    total_assets: Some(6.0e10),
                    current_liabilities: Some(1.5e10),
                    shares_outstanding: Some(shares),
                },
            );
        constituents.push(Constituent {
            ticker: ticker.to_string(),
            sector,
            market_cap: shares * 60.0,
        });
    }

    let driver = BacktestDriver::new(
        provider,
        StaticUniverse::new(constituents),
        StrategyConfig::default(),
    )?;
    let report = driver.run(start, end).await?;

    for record in report.weight_records() {
        println!(
            "{} {:>8} {:>8.4} exp {:.2} er {:>7.4} vol {:>7.4}",
            record.date,
            record.ticker,
            record.weight,
            record.exposure,
            record.expected_return,
            record.volatility,
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&report.metrics).expect("metrics serialize")
    );
    Ok(())
}
