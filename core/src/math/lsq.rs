//! Damped Gauss-Newton (Levenberg-Marquardt) curve fitting for small models.
//!
//! The covariance follows unweighted curve-fit conventions: the inverse of
//! `JᵀJ` at the solution scaled by the residual variance `SSR / (n - p)`.

use crate::math::matrix::MatrixHelper;
use crate::prelude::{ScreenError, ScreenResult};
use ndarray::{Array1, Array2};

/// A scalar model `y = f(x; params)` that can be fitted by [`CurveFit`].
pub trait FitModel {
    fn parameter_count(&self) -> usize;

    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Partial derivatives with respect to each parameter.
    fn gradient(&self, x: f64, params: &[f64]) -> Vec<f64> {
        let base = self.evaluate(x, params);
        let mut shifted = params.to_vec();
        (0..params.len())
            .map(|k| {
                let step = f64::EPSILON.sqrt() * params[k].abs().max(1.0);
                shifted[k] = params[k] + step;
                let value = (self.evaluate(x, &shifted) - base) / step;
                shifted[k] = params[k];
                value
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FitSolution {
    pub params: Vec<f64>,
    pub covariance: Array2<f64>,
    pub residual_sum_squares: f64,
    pub iterations: usize,
}

impl FitSolution {
    /// One-sigma parameter errors from the covariance diagonal.
    pub fn standard_errors(&self) -> Vec<f64> {
        self.covariance
            .diag()
            .iter()
            .map(|&v| v.max(0.0).sqrt())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CurveFit {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for CurveFit {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-12,
        }
    }
}

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e16;

impl CurveFit {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Default::default()
        }
    }

    pub fn solve<M: FitModel>(
        &self,
        model: &M,
        xdata: &[f64],
        ydata: &[f64],
        initial: &[f64],
    ) -> ScreenResult<FitSolution> {
        let n = xdata.len();
        let p = model.parameter_count();
        if ydata.len() != n {
            return Err(ScreenError::Fit(format!(
                "{} abscissae but {} observations",
                n,
                ydata.len()
            )));
        }
        if initial.len() != p {
            return Err(ScreenError::Fit(format!(
                "expected {} initial parameters, got {}",
                p,
                initial.len()
            )));
        }
        if n <= p {
            return Err(ScreenError::Fit(format!(
                "{} observations cannot constrain {} parameters",
                n, p
            )));
        }
        if xdata.iter().chain(ydata).any(|v| !v.is_finite()) {
            return Err(ScreenError::Fit("non-finite input data".into()));
        }

        let mut params = initial.to_vec();
        let mut ssr = self.residual_sum(model, xdata, ydata, &params)?;
        let mut damping = INITIAL_DAMPING;
        let mut converged = ssr == 0.0;
        let mut iterations = 0;

        while !converged {
            if iterations >= self.max_iterations {
                return Err(ScreenError::Fit(format!(
                    "no convergence after {} iterations (SSR {:.3e})",
                    iterations, ssr
                )));
            }
            iterations += 1;

            let jacobian = jacobian(model, xdata, &params);
            let residuals: Array1<f64> = xdata
                .iter()
                .zip(ydata)
                .map(|(&x, &y)| y - model.evaluate(x, &params))
                .collect();
            let normal = MatrixHelper::multiply(jacobian.t(), jacobian.view());
            let gradient = jacobian.t().dot(&residuals);

            let mut damped = normal.clone();
            for k in 0..p {
                let diag = normal[[k, k]];
                damped[[k, k]] += damping * if diag > 0.0 { diag } else { 1.0 };
            }
            let step = MatrixHelper::invert(damped.view())
                .ok_or_else(|| ScreenError::Fit("singular normal equations".into()))?
                .dot(&gradient);

            let small_step = step
                .iter()
                .zip(&params)
                .all(|(d, value)| d.abs() <= self.tolerance * (value.abs() + self.tolerance));

            let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(v, d)| v + d).collect();
            let trial_ssr = self.residual_sum(model, xdata, ydata, &trial)?;

            if trial_ssr <= ssr {
                let small_gain = ssr - trial_ssr <= self.tolerance * ssr;
                params = trial;
                ssr = trial_ssr;
                damping = (damping / 10.0).max(f64::MIN_POSITIVE);
                converged = small_step || small_gain || ssr == 0.0;
            } else if small_step {
                converged = true;
            } else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    return Err(ScreenError::Fit(format!(
                        "damping diverged after {} iterations",
                        iterations
                    )));
                }
            }
        }

        let jacobian = jacobian(model, xdata, &params);
        let normal = MatrixHelper::multiply(jacobian.t(), jacobian.view());
        let inverse = MatrixHelper::invert(normal.view())
            .ok_or_else(|| ScreenError::Fit("covariance is singular at the solution".into()))?;
        let variance = ssr / (n - p) as f64;

        Ok(FitSolution {
            params,
            covariance: inverse * variance,
            residual_sum_squares: ssr,
            iterations,
        })
    }

    fn residual_sum<M: FitModel>(
        &self,
        model: &M,
        xdata: &[f64],
        ydata: &[f64],
        params: &[f64],
    ) -> ScreenResult<f64> {
        let ssr: f64 = xdata
            .iter()
            .zip(ydata)
            .map(|(&x, &y)| {
                let r = y - model.evaluate(x, params);
                r * r
            })
            .sum();
        if ssr.is_finite() {
            Ok(ssr)
        } else {
            Err(ScreenError::Fit("model produced non-finite residuals".into()))
        }
    }
}

fn jacobian<M: FitModel>(model: &M, xdata: &[f64], params: &[f64]) -> Array2<f64> {
    let p = params.len();
    let mut jacobian = Array2::<f64>::zeros((xdata.len(), p));
    for (row, &x) in xdata.iter().enumerate() {
        for (col, value) in model.gradient(x, params).into_iter().enumerate().take(p) {
            jacobian[[row, col]] = value;
        }
    }
    jacobian
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Line;

    impl FitModel for Line {
        fn parameter_count(&self) -> usize {
            2
        }

        fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
            params[0] * x + params[1]
        }
    }

    struct Decay;

    impl FitModel for Decay {
        fn parameter_count(&self) -> usize {
            2
        }

        fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
            params[0] * (-params[1] * x).exp()
        }
    }

    #[test]
    fn fits_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.5 * x - 1.0).collect();
        let solution = CurveFit::default().solve(&Line, &xs, &ys, &[1.0, 1.0]).unwrap();
        assert_relative_eq!(solution.params[0], 2.5, max_relative = 1e-9);
        assert_relative_eq!(solution.params[1], -1.0, max_relative = 1e-9);
        assert!(solution.standard_errors().iter().all(|e| *e < 1e-6));
    }

    #[test]
    fn fits_nonlinear_decay() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * (-0.7 * x).exp()).collect();
        let solution = CurveFit::default().solve(&Decay, &xs, &ys, &[1.0, 1.0]).unwrap();
        assert_relative_eq!(solution.params[0], 3.0, max_relative = 1e-6);
        assert_relative_eq!(solution.params[1], 0.7, max_relative = 1e-6);
    }

    #[test]
    fn noisy_line_reports_nonzero_error() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [0.1, 0.9, 2.1, 2.9, 4.1];
        let solution = CurveFit::default().solve(&Line, &xs, &ys, &[1.0, 0.0]).unwrap();
        assert!(solution.standard_errors()[0] > 0.0);
    }

    #[test]
    fn rejects_underdetermined_problem() {
        let err = CurveFit::default()
            .solve(&Line, &[1.0, 2.0], &[1.0, 2.0], &[1.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, ScreenError::Fit(_)));
    }

    #[test]
    fn iteration_cap_surfaces_fit_error() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * (-0.7 * x).exp()).collect();
        let err = CurveFit::new(1)
            .solve(&Decay, &xs, &ys, &[10.0, 5.0])
            .unwrap_err();
        assert!(matches!(err, ScreenError::Fit(_)));
    }
}
