//! Discrete share allocation.
//!
//! Converts continuous weights into integer share counts for a cash
//! budget by a largest-remainder method. Pure bookkeeping: the
//! continuous weights are never altered, and the identity
//! `sum(shares * price) + leftover = budget` holds exactly (up to float
//! arithmetic).

use cadiz_traits::{CadizError, Result, Ticker};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Integer share counts and the cash that could not be deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAllocation {
    /// Shares per ticker; negative counts are short positions.
    pub shares: HashMap<Ticker, i64>,
    /// Undeployed cash, smaller than the cheapest share price across
    /// the whole ticker list.
    pub leftover: f64,
}

/// Allocate `budget` across `tickers` following `weights` at `prices`.
///
/// Each ticker first receives `trunc(budget * w / price)` shares; the
/// remaining cash then buys single shares in order of largest
/// fractional remainder, positively-weighted tickers first, until no
/// share on the list is affordable. The sweep covers every ticker, so
/// the leftover always ends below `min(prices)`.
///
/// # Errors
///
/// [`CadizError::InvalidData`] on mismatched input lengths, a
/// non-positive price, a non-finite weight, or a negative budget.
pub fn discrete_allocation(
    tickers: &[Ticker],
    weights: &[f64],
    prices: &[f64],
    budget: f64,
) -> Result<DiscreteAllocation> {
    let n = tickers.len();
    if weights.len() != n || prices.len() != n {
        return Err(CadizError::InvalidData(format!(
            "allocation inputs misaligned: {n} tickers, {} weights, {} prices",
            weights.len(),
            prices.len()
        )));
    }
    if !(budget.is_finite() && budget >= 0.0) {
        return Err(CadizError::InvalidData(format!("negative budget {budget}")));
    }
    for i in 0..n {
        if !(prices[i].is_finite() && prices[i] > 0.0) {
            return Err(CadizError::InvalidData(format!(
                "non-positive price {} for {}",
                prices[i], tickers[i]
            )));
        }
        if !weights[i].is_finite() {
            return Err(CadizError::InvalidData(format!(
                "non-finite weight for {}",
                tickers[i]
            )));
        }
    }

    let mut shares: Vec<i64> = Vec::with_capacity(n);
    let mut spent = 0.0;
    for i in 0..n {
        let target_shares = budget * weights[i] / prices[i];
        let count = target_shares.trunc() as i64;
        shares.push(count);
        spent += count as f64 * prices[i];
    }
    let mut leftover = budget - spent;

    // Largest-remainder top-up over every ticker, long positions first,
    // cycling until no share on the list is affordable.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let long_a = weights[a] > 0.0;
        let long_b = weights[b] > 0.0;
        let ra = (budget * weights[a] / prices[a]).fract();
        let rb = (budget * weights[b] / prices[b]).fract();
        long_b
            .cmp(&long_a)
            .then_with(|| rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| tickers[a].cmp(&tickers[b]))
    });
    loop {
        let mut bought = false;
        for &i in &order {
            if prices[i] <= leftover {
                shares[i] += 1;
                leftover -= prices[i];
                bought = true;
            }
        }
        if !bought {
            break;
        }
    }

    Ok(DiscreteAllocation {
        shares: tickers
            .iter()
            .cloned()
            .zip(shares.iter().copied())
            .collect(),
        leftover,
    })
}
