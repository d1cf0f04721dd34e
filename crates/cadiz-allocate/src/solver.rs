//! Box-and-budget QP solver.
//!
//! Minimizes `0.5 w'Qw - c'w` over `{sum w = b, l <= w <= u}` by
//! accelerated projected gradient descent. The projection onto the
//! capped simplex is exact (bisection on the shift multiplier), the step
//! size comes from the largest eigenvalue of `Q`, and initialization,
//! iteration budget, and tolerances are fixed, so the solve is
//! deterministic.

use nalgebra::{DMatrix, DVector};

/// Fixed iteration budget of the accelerated gradient loop.
const MAX_ITER: usize = 2_000;

/// Convergence tolerance on the infinity norm of the iterate step.
const STEP_TOL: f64 = 1e-11;

/// Bisection iterations for the simplex projection.
const PROJECTION_ITER: usize = 100;

/// Project `y` onto `{w : sum w = budget, lower <= w <= upper}`.
///
/// The projection is `w_i = clamp(y_i - lambda, lower_i, upper_i)` for
/// the unique shift `lambda` matching the budget; `sum w(lambda)` is
/// non-increasing in `lambda`, so bisection finds it. The caller must
/// supply a reachable budget (`sum lower <= budget <= sum upper`).
pub(crate) fn project_capped_simplex(
    y: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    budget: f64,
) -> DVector<f64> {
    let n = y.len();
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for i in 0..n {
        lo = lo.min(y[i] - upper[i]);
        hi = hi.max(y[i] - lower[i]);
    }
    let mut lo = lo - 1.0;
    let mut hi = hi + 1.0;

    let sum_at = |lambda: f64| -> f64 {
        (0..n)
            .map(|i| (y[i] - lambda).clamp(lower[i], upper[i]))
            .sum()
    };

    for _ in 0..PROJECTION_ITER {
        let mid = 0.5 * (lo + hi);
        if sum_at(mid) > budget {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let lambda = 0.5 * (lo + hi);
    DVector::from_iterator(n, (0..n).map(|i| (y[i] - lambda).clamp(lower[i], upper[i])))
}

/// Solve the box-and-budget QP.
///
/// `budget` is clamped into the reachable interval
/// `[sum lower, sum upper]`; callers that must reject an unreachable
/// budget check it before calling.
pub(crate) fn solve_box_qp(
    q: &DMatrix<f64>,
    c: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    budget: f64,
) -> DVector<f64> {
    let n = c.len();
    debug_assert_eq!(q.nrows(), n);
    let budget = budget.clamp(lower.sum(), upper.sum());

    if n == 1 {
        return DVector::from_element(1, budget.clamp(lower[0], upper[0]));
    }

    let lipschitz = q
        .clone()
        .symmetric_eigen()
        .eigenvalues
        .iter()
        .fold(0.0f64, |a, &b| a.max(b))
        .max(1e-12);
    let step = 1.0 / lipschitz;

    let uniform = DVector::from_element(n, budget / n as f64);
    let mut x = project_capped_simplex(&uniform, lower, upper, budget);
    let mut momentum = x.clone();
    let mut t = 1.0f64;

    for _ in 0..MAX_ITER {
        let gradient = q * &momentum - c;
        let x_next = project_capped_simplex(&(&momentum - gradient * step), lower, upper, budget);

        let advance = (&x_next - &x).amax();
        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        momentum = &x_next + (&x_next - &x) * ((t - 1.0) / t_next);
        x = x_next;
        t = t_next;

        if advance < STEP_TOL {
            break;
        }
    }
    x
}
