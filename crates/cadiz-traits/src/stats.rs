//! Cross-sectional statistics for the factor pipeline.
//!
//! Winsorization, z-score standardization, and clipping, shared by the
//! factor engine and the regime adjusters. All functions treat non-finite
//! inputs as missing: they are excluded from the computed moments and
//! propagate as NaN in the output.

use serde::{Deserialize, Serialize};

/// Minimum threshold for standard deviation to avoid division by zero.
/// Below this threshold a cross-section is treated as constant and every
/// z-score is 0.
pub const MIN_STD_THRESHOLD: f64 = 1e-10;

/// Z-scores are clipped to `[-Z_CLIP, Z_CLIP]` after standardization.
pub const Z_CLIP: f64 = 3.0;

/// Moments computed during standardization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossSectionMoments {
    /// Mean of the finite values.
    pub mean: f64,
    /// Sample standard deviation (N-1 denominator) of the finite values.
    pub std: f64,
    /// Whether standardization was applied (false when variance is
    /// below [`MIN_STD_THRESHOLD`]).
    pub applied: bool,
}

/// Median of the finite values in `values`, or `None` if none are finite.
///
/// Used for imputing missing sub-metrics with the universe median at the
/// current rebalance.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).expect("finite values are comparable"));
    let n = finite.len();
    if n % 2 == 1 {
        Some(finite[n / 2])
    } else {
        Some((finite[n / 2 - 1] + finite[n / 2]) / 2.0)
    }
}

/// Winsorize `values` in place at the `pct` / `1 - pct` quantiles.
///
/// Finite values beyond the quantile bounds are replaced by the bounds
/// themselves; non-finite values pass through untouched. Re-applying on
/// already-winsorized data is a no-op.
pub fn winsorize(values: &mut [f64], pct: f64) {
    if values.is_empty() || pct <= 0.0 {
        return;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if sorted.is_empty() {
        return;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values are comparable"));

    let n = sorted.len();
    let lower_idx = ((n as f64) * pct).floor() as usize;
    let upper_idx = (((n as f64) * (1.0 - pct)).ceil() as usize).min(n - 1);

    let lower_bound = sorted[lower_idx.min(n - 1)];
    let upper_bound = sorted[upper_idx];

    for v in values.iter_mut() {
        if v.is_finite() {
            *v = v.clamp(lower_bound, upper_bound);
        }
    }
}

/// Standardize `values` to z-scores clipped to `[-3, +3]`.
///
/// Uses sample standard deviation (N-1). Non-finite values are excluded
/// from the moments and come out as NaN. A cross-section with variance
/// below [`MIN_STD_THRESHOLD`] standardizes to all zeros.
///
/// # Examples
///
/// ```
/// use cadiz_traits::stats::zscores;
///
/// let (z, moments) = zscores(&[1.0, 2.0, 3.0, 4.0, 5.0]);
/// assert!(moments.applied);
/// assert!((moments.mean - 3.0).abs() < 1e-10);
/// assert!(z.iter().all(|v| v.abs() <= 3.0));
/// ```
#[must_use]
pub fn zscores(values: &[f64]) -> (Vec<f64>, CrossSectionMoments) {
    if values.is_empty() {
        return (
            Vec::new(),
            CrossSectionMoments {
                mean: f64::NAN,
                std: f64::NAN,
                applied: false,
            },
        );
    }

    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return (
            vec![f64::NAN; values.len()],
            CrossSectionMoments {
                mean: f64::NAN,
                std: f64::NAN,
                applied: false,
            },
        );
    }

    let n = finite.len();
    let mean = finite.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        finite.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let std = variance.sqrt();
    let applied = std > MIN_STD_THRESHOLD;

    let scores = values
        .iter()
        .map(|x| {
            if !x.is_finite() {
                f64::NAN
            } else if applied {
                ((x - mean) / std).clamp(-Z_CLIP, Z_CLIP)
            } else {
                0.0
            }
        })
        .collect();

    (scores, CrossSectionMoments { mean, std, applied })
}

/// Percentile rank of `value` within `values`, in `[0, 1]`.
///
/// Fraction of finite values at or below `value`; `None` when the
/// cross-section has no finite values or `value` is not finite.
#[must_use]
pub fn percentile_rank(values: &[f64], value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let at_or_below = finite.iter().filter(|&&x| x <= value).count();
    Some(at_or_below as f64 / finite.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_even() {
        assert_relative_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_relative_eq!(median(&[4.0, 1.0, 2.0, 3.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_median_ignores_nan() {
        assert_relative_eq!(median(&[1.0, f64::NAN, 3.0]).unwrap(), 2.0);
        assert!(median(&[f64::NAN, f64::NAN]).is_none());
        assert!(median(&[]).is_none());
    }

    #[test]
    fn test_winsorize_clamps_tails() {
        let mut values: Vec<f64> = (1..=100).map(f64::from).collect();
        values[0] = -1000.0;
        values[99] = 1000.0;
        winsorize(&mut values, 0.01);
        assert!(values[0] > -1000.0);
        assert!(values[99] < 1000.0);
        // Interior values untouched
        assert_relative_eq!(values[49], 50.0);
    }

    #[test]
    fn test_winsorize_idempotent() {
        let mut values: Vec<f64> = vec![-50.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 90.0];
        winsorize(&mut values, 0.01);
        let once = values.clone();
        winsorize(&mut values, 0.01);
        assert_eq!(values, once);
    }

    #[test]
    fn test_winsorize_passes_nan_through() {
        let mut values = vec![1.0, f64::NAN, 3.0];
        winsorize(&mut values, 0.01);
        assert!(values[1].is_nan());
    }

    #[test]
    fn test_zscores_basic() {
        let (z, moments) = zscores(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(moments.applied);
        assert_relative_eq!(moments.mean, 3.0);
        let z_mean: f64 = z.iter().sum::<f64>() / z.len() as f64;
        assert!(z_mean.abs() < 1e-10);
    }

    #[test]
    fn test_zscores_clip_bound() {
        // One extreme outlier in a tight cluster exceeds 3 sigma raw
        let mut values = vec![0.0; 20];
        values.push(1000.0);
        let (z, _) = zscores(&values);
        assert!(z.iter().all(|v| v.abs() <= Z_CLIP + 1e-12));
        assert_relative_eq!(*z.last().unwrap(), Z_CLIP);
    }

    #[test]
    fn test_zscores_constant_cross_section() {
        let (z, moments) = zscores(&[5.0, 5.0, 5.0, 5.0]);
        assert!(!moments.applied);
        assert!(z.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_zscores_nan_propagates() {
        let (z, moments) = zscores(&[1.0, 2.0, f64::NAN, 4.0, 5.0]);
        assert!(moments.applied);
        assert_relative_eq!(moments.mean, 3.0);
        assert!(z[2].is_nan());
    }

    #[test]
    fn test_zscores_empty_and_single() {
        let (z, moments) = zscores(&[]);
        assert!(z.is_empty());
        assert!(!moments.applied);

        let (z, moments) = zscores(&[42.0]);
        assert_eq!(z, vec![0.0]);
        assert!(!moments.applied);
    }

    #[test]
    fn test_winsorize_then_standardize_idempotent_on_winsorized() {
        let mut values: Vec<f64> = vec![-300.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 400.0];
        winsorize(&mut values, 0.01);
        let snapshot = values.clone();
        winsorize(&mut values, 0.01);
        assert_eq!(values, snapshot);
        let (z1, _) = zscores(&snapshot);
        let (z2, _) = zscores(&values);
        assert_eq!(z1, z2);
    }

    #[test]
    fn test_percentile_rank() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile_rank(&values, 2.0).unwrap(), 0.5);
        assert_relative_eq!(percentile_rank(&values, 4.0).unwrap(), 1.0);
        assert!(percentile_rank(&values, f64::NAN).is_none());
    }
}
