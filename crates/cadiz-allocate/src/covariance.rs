//! Return covariance estimation.
//!
//! Sample covariance of aligned daily returns, annualized by 252. When
//! the sample estimate's smallest eigenvalue falls below tolerance it is
//! replaced by a Ledoit-Wolf shrinkage toward a scaled identity, which
//! is positive definite whenever the returns are not all zero.

use cadiz_traits::{CadizError, Date, PriceSeries, Result, Ticker};
use nalgebra::{DMatrix, DVector};

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Eigenvalue floor below which the sample covariance is considered
/// ill-conditioned and shrinkage is substituted.
pub const MIN_EIGENVALUE: f64 = 1e-8;

/// Minimum aligned return rows required for a usable estimate.
pub const MIN_ALIGNED_ROWS: usize = 60;

/// An annualized covariance estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceEstimate {
    /// Annualized covariance matrix, symmetric PSD.
    pub matrix: DMatrix<f64>,
    /// Whether Ledoit-Wolf shrinkage replaced the sample estimate.
    pub shrunk: bool,
}

impl CovarianceEstimate {
    /// Per-ticker annualized volatilities, `sqrt` of the diagonal.
    #[must_use]
    pub fn volatilities(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.matrix.nrows(),
            self.matrix.diagonal().iter().map(|v| v.max(0.0).sqrt()),
        )
    }
}

/// Align price series on their common trading dates and compute the
/// daily return matrix (rows are dates, columns follow `series` order).
///
/// # Errors
///
/// [`CadizError::CovarianceIllConditioned`] when fewer than
/// [`MIN_ALIGNED_ROWS`] aligned returns remain.
pub fn aligned_returns(series: &[(Ticker, &PriceSeries)]) -> Result<DMatrix<f64>> {
    if series.is_empty() {
        return Err(CadizError::EmptyOptimizationSet);
    }

    let mut common: Vec<Date> = series[0].1.points().iter().map(|p| p.date).collect();
    for (_, s) in &series[1..] {
        let dates: std::collections::HashSet<Date> =
            s.points().iter().map(|p| p.date).collect();
        common.retain(|d| dates.contains(d));
    }

    if common.len() < MIN_ALIGNED_ROWS + 1 {
        return Err(CadizError::CovarianceIllConditioned(format!(
            "only {} aligned observations across {} tickers",
            common.len(),
            series.len()
        )));
    }

    let t = common.len() - 1;
    let n = series.len();
    let mut returns = DMatrix::zeros(t, n);
    for (j, (_, s)) in series.iter().enumerate() {
        let closes: std::collections::HashMap<Date, f64> =
            s.points().iter().map(|p| (p.date, p.close)).collect();
        for i in 0..t {
            let prev = closes[&common[i]];
            let next = closes[&common[i + 1]];
            returns[(i, j)] = next / prev - 1.0;
        }
    }
    Ok(returns)
}

/// Estimate the annualized covariance from a daily return matrix.
///
/// # Errors
///
/// [`CadizError::CovarianceIllConditioned`] when even the shrunk
/// estimate fails the eigenvalue floor (returns with no variation at
/// all).
pub fn estimate_covariance(returns: &DMatrix<f64>) -> Result<CovarianceEstimate> {
    let t = returns.nrows();
    let n = returns.ncols();
    if n == 0 || t < 2 {
        return Err(CadizError::CovarianceIllConditioned(format!(
            "{t} observations for {n} tickers"
        )));
    }

    let sample = sample_covariance(returns) * TRADING_DAYS_PER_YEAR;
    if min_eigenvalue(&sample) >= MIN_EIGENVALUE {
        return Ok(CovarianceEstimate {
            matrix: sample,
            shrunk: false,
        });
    }

    let shrunk = ledoit_wolf(returns) * TRADING_DAYS_PER_YEAR;
    if min_eigenvalue(&shrunk) >= MIN_EIGENVALUE * 1e-3 {
        Ok(CovarianceEstimate {
            matrix: shrunk,
            shrunk: true,
        })
    } else {
        Err(CadizError::CovarianceIllConditioned(
            "shrunk covariance still rank-deficient".to_string(),
        ))
    }
}

/// Sample covariance of daily returns (N-1 denominator), symmetrized.
fn sample_covariance(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let t = returns.nrows();
    let demeaned = demean(returns);
    let cov = demeaned.transpose() * &demeaned / (t as f64 - 1.0);
    symmetrize(&cov)
}

/// Ledoit-Wolf shrinkage of the daily covariance toward a scaled
/// identity, with the analytic optimal intensity.
fn ledoit_wolf(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let t = returns.nrows() as f64;
    let n = returns.ncols();
    let demeaned = demean(returns);
    // 1/T normalization per the original estimator
    let s = symmetrize(&(demeaned.transpose() * &demeaned / t));

    let mu = s.trace() / n as f64;
    let target = DMatrix::identity(n, n) * mu;

    let diff = &s - &target;
    let d2 = diff.norm_squared() / n as f64;
    if d2 <= f64::EPSILON {
        return target;
    }

    let mut b_bar2 = 0.0;
    for row in demeaned.row_iter() {
        let x = row.transpose();
        let outer = &x * x.transpose();
        b_bar2 += (&outer - &s).norm_squared() / n as f64;
    }
    b_bar2 /= t * t;

    let b2 = b_bar2.min(d2);
    let rho = b2 / d2;

    symmetrize(&(target * rho + s * (1.0 - rho)))
}

fn demean(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let t = returns.nrows();
    let mut out = returns.clone();
    for j in 0..returns.ncols() {
        let mean = returns.column(j).sum() / t as f64;
        for i in 0..t {
            out[(i, j)] -= mean;
        }
    }
    out
}

fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

fn min_eigenvalue(m: &DMatrix<f64>) -> f64 {
    m.clone()
        .symmetric_eigen()
        .eigenvalues
        .iter()
        .fold(f64::INFINITY, |a, &b| a.min(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    fn series_from_returns(returns: &[f64]) -> PriceSeries {
        let start = d(2022, 1, 3);
        let mut close = 100.0;
        let mut pairs = vec![(start, close)];
        for (i, r) in returns.iter().enumerate() {
            close *= 1.0 + r;
            pairs.push((start + chrono::Days::new(i as u64 + 1), close));
        }
        PriceSeries::from_pairs(pairs).unwrap()
    }

    /// Deterministic pseudo-random returns from a simple LCG.
    fn noise(seed: u64, n: usize, scale: f64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let u = (state >> 11) as f64 / (1u64 << 53) as f64;
                (u - 0.5) * scale
            })
            .collect()
    }

    #[test]
    fn test_aligned_returns_intersects_dates() {
        let a = series_from_returns(&noise(1, 100, 0.02));
        let mut b_points: Vec<(Date, f64)> = a
            .points()
            .iter()
            .map(|p| (p.date, p.close * 2.0))
            .collect();
        // Drop one interior date from b
        b_points.remove(50);
        let b = PriceSeries::from_pairs(b_points).unwrap();

        let returns =
            aligned_returns(&[("A".to_string(), &a), ("B".to_string(), &b)]).unwrap();
        assert_eq!(returns.ncols(), 2);
        assert_eq!(returns.nrows(), 99);
    }

    #[test]
    fn test_aligned_returns_requires_overlap() {
        let a = series_from_returns(&noise(1, 100, 0.02));
        let b = series_from_returns(&noise(2, 30, 0.02));
        let err = aligned_returns(&[("A".to_string(), &a), ("B".to_string(), &b)]);
        assert!(matches!(err, Err(CadizError::CovarianceIllConditioned(_))));
    }

    #[test]
    fn test_sample_covariance_annualized() {
        // Two independent noisy columns
        let r1 = noise(7, 500, 0.02);
        let r2 = noise(13, 500, 0.02);
        let mut returns = DMatrix::zeros(500, 2);
        for i in 0..500 {
            returns[(i, 0)] = r1[i];
            returns[(i, 1)] = r2[i];
        }
        let estimate = estimate_covariance(&returns).unwrap();
        assert!(!estimate.shrunk);
        assert_eq!(estimate.matrix.nrows(), 2);
        // Diagonal is annualized daily variance
        let daily_var: f64 = {
            let mean = r1.iter().sum::<f64>() / 500.0;
            r1.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 499.0
        };
        assert_relative_eq!(
            estimate.matrix[(0, 0)],
            daily_var * TRADING_DAYS_PER_YEAR,
            epsilon = 1e-12
        );
        // Symmetry
        assert_relative_eq!(estimate.matrix[(0, 1)], estimate.matrix[(1, 0)]);
    }

    #[test]
    fn test_duplicate_columns_trigger_shrinkage() {
        // Perfectly collinear columns make the sample estimate singular
        let r = noise(11, 300, 0.02);
        let mut returns = DMatrix::zeros(300, 3);
        for i in 0..300 {
            returns[(i, 0)] = r[i];
            returns[(i, 1)] = r[i];
            returns[(i, 2)] = r[i] * 2.0;
        }
        let estimate = estimate_covariance(&returns).unwrap();
        assert!(estimate.shrunk);
        let min_ev = min_eigenvalue(&estimate.matrix);
        assert!(min_ev > 0.0, "shrunk estimate must be positive definite");
    }

    #[test]
    fn test_zero_returns_fail() {
        let returns = DMatrix::zeros(100, 2);
        assert!(matches!(
            estimate_covariance(&returns),
            Err(CadizError::CovarianceIllConditioned(_))
        ));
    }

    #[test]
    fn test_volatilities_are_sqrt_diagonal() {
        let r1 = noise(3, 400, 0.02);
        let r2 = noise(5, 400, 0.01);
        let mut returns = DMatrix::zeros(400, 2);
        for i in 0..400 {
            returns[(i, 0)] = r1[i];
            returns[(i, 1)] = r2[i];
        }
        let estimate = estimate_covariance(&returns).unwrap();
        let vols = estimate.volatilities();
        assert_relative_eq!(vols[0], estimate.matrix[(0, 0)].sqrt(), epsilon = 1e-12);
        assert!(vols[0] > vols[1]);
    }

    #[test]
    fn test_estimation_is_deterministic() {
        let r = noise(21, 300, 0.02);
        let mut returns = DMatrix::zeros(300, 1);
        for i in 0..300 {
            returns[(i, 0)] = r[i];
        }
        let a = estimate_covariance(&returns).unwrap();
        let b = estimate_covariance(&returns).unwrap();
        assert_eq!(a, b);
    }
}
