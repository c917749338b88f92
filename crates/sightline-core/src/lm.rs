//! Dense Levenberg–Marquardt for small nonlinear least-squares problems.
//!
//! Used to refine PnP poses and camera calibrations. Problems supply the
//! residual vector; the Jacobian defaults to central differences and may be
//! overridden when the structure is known.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

pub trait LeastSquaresProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    /// Fill `out` (length [`Self::num_residuals`]) for parameters `x`.
    fn residuals(&self, x: &DVector<f64>, out: &mut DVector<f64>);

    /// Fill `jac` (`num_residuals x num_params`).
    fn jacobian(&self, x: &DVector<f64>, jac: &mut DMatrix<f64>) {
        numeric_jacobian(self, x, jac);
    }
}

/// Central-difference Jacobian with a per-parameter relative step.
pub fn numeric_jacobian<P: LeastSquaresProblem + ?Sized>(
    problem: &P,
    x: &DVector<f64>,
    jac: &mut DMatrix<f64>,
) {
    let m = problem.num_residuals();
    let mut xp = x.clone();
    let mut rp = DVector::zeros(m);
    let mut rm = DVector::zeros(m);
    for j in 0..problem.num_params() {
        let h = 1e-6 * x[j].abs().max(1e-3);
        let orig = xp[j];
        xp[j] = orig + h;
        problem.residuals(&xp, &mut rp);
        xp[j] = orig - h;
        problem.residuals(&xp, &mut rm);
        xp[j] = orig;
        let col = (&rp - &rm) / (2.0 * h);
        jac.set_column(j, &col);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LmParams {
    pub max_iters: usize,
    pub initial_lambda: f64,
    /// Stop when the relative cost decrease falls below this.
    pub cost_tol: f64,
    /// Stop when the step norm falls below this (relative to `|x|`).
    pub step_tol: f64,
}

impl Default for LmParams {
    fn default() -> Self {
        Self {
            max_iters: 100,
            initial_lambda: 1e-3,
            cost_tol: 1e-14,
            step_tol: 1e-12,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LmReport {
    pub iterations: usize,
    /// Half the squared residual norm before optimisation.
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
}

fn cost(r: &DVector<f64>) -> f64 {
    0.5 * r.norm_squared()
}

/// Minimise `0.5 * |r(x)|^2` in place.
pub fn levenberg_marquardt<P: LeastSquaresProblem + ?Sized>(
    problem: &P,
    x: &mut DVector<f64>,
    params: &LmParams,
) -> LmReport {
    let m = problem.num_residuals();
    let n = problem.num_params();
    let mut r = DVector::zeros(m);
    let mut jac = DMatrix::zeros(m, n);
    let mut r_new = DVector::zeros(m);

    problem.residuals(x, &mut r);
    let initial_cost = cost(&r);
    let mut current = initial_cost;
    let mut lambda = params.initial_lambda;
    let mut converged = false;
    let mut iterations = 0;

    if !current.is_finite() {
        return LmReport {
            iterations,
            initial_cost,
            final_cost: current,
            converged,
        };
    }

    'outer: while iterations < params.max_iters {
        iterations += 1;
        problem.jacobian(x, &mut jac);
        let jtj = jac.transpose() * &jac;
        let g = jac.transpose() * &r;

        if g.amax() < 1e-15 {
            converged = true;
            break;
        }

        // Retry with growing damping until a step lowers the cost.
        loop {
            let mut a = jtj.clone();
            for i in 0..n {
                let d = jtj[(i, i)].max(1e-12);
                a[(i, i)] += lambda * d;
            }
            let Some(chol) = a.cholesky() else {
                lambda *= 10.0;
                if lambda > 1e16 {
                    break 'outer;
                }
                continue;
            };
            let delta = -chol.solve(&g);
            let candidate = &*x + &delta;
            problem.residuals(&candidate, &mut r_new);
            let new_cost = cost(&r_new);

            if new_cost.is_finite() && new_cost < current {
                let rel = (current - new_cost) / current.max(1e-300);
                let small_step = delta.norm() <= params.step_tol * (x.norm() + params.step_tol);
                *x = candidate;
                std::mem::swap(&mut r, &mut r_new);
                current = new_cost;
                lambda = (lambda / 10.0).max(1e-15);
                if rel < params.cost_tol || small_step {
                    converged = true;
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > 1e16 {
                converged = true;
                break 'outer;
            }
        }
    }

    LmReport {
        iterations,
        initial_cost,
        final_cost: current,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// y = a * exp(b * t)
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpFit {
        fn num_params(&self) -> usize {
            2
        }
        fn num_residuals(&self) -> usize {
            self.t.len()
        }
        fn residuals(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
            for (i, (&t, &y)) in self.t.iter().zip(&self.y).enumerate() {
                out[i] = x[0] * (x[1] * t).exp() - y;
            }
        }
    }

    #[test]
    fn recovers_exponential_parameters() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|&t| 2.5 * (-1.3 * t).exp()).collect();
        let problem = ExpFit { t, y };
        let mut x = DVector::from_vec(vec![1.0, 0.0]);
        let report = levenberg_marquardt(&problem, &mut x, &LmParams::default());
        assert!(report.final_cost < 1e-12, "{report:?}");
        assert_relative_eq!(x[0], 2.5, epsilon = 1e-6);
        assert_relative_eq!(x[1], -1.3, epsilon = 1e-6);
    }

    #[test]
    fn rosenbrock_as_residuals() {
        struct Rosen;
        impl LeastSquaresProblem for Rosen {
            fn num_params(&self) -> usize {
                2
            }
            fn num_residuals(&self) -> usize {
                2
            }
            fn residuals(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
                out[0] = 1.0 - x[0];
                out[1] = 10.0 * (x[1] - x[0] * x[0]);
            }
        }
        let mut x = DVector::from_vec(vec![-1.2, 1.0]);
        levenberg_marquardt(&Rosen, &mut x, &LmParams::default());
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
    }
}
