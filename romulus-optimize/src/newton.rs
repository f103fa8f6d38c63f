use crate::calculus::ResidualFunction;
use itertools::iterate;
use log::{debug, warn};
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Settings for the Newton iteration.
///
/// The defaults (`tolerance = 1e-5`, `max_iterations = 100`) match the
/// convergence criterion reduced problems are usually judged against.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 100,
        }
    }
}

/// The result of a completed Newton run.
///
/// Exhausting the iteration budget is *not* an error: the solver leaves its
/// best iterate in the unknown vector and reports `converged = false`.
/// Callers that need strict correctness must inspect `residual_norm`
/// themselves.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutcome {
    pub iterations: usize,
    pub residual_norm: f64,
    pub converged: bool,
}

/// A hard failure of the Newton procedure.
///
/// Unlike a stalled iteration, these indicate that no usable step could be
/// produced at all.
#[derive(Debug)]
pub enum NewtonError {
    /// The Jacobian system could not be solved (singular to working precision).
    SingularJacobian { iteration: usize },
    /// The line search failed to produce a valid step.
    LineSearchError(String),
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            &NewtonError::SingularJacobian { iteration } => {
                write!(f, "Jacobian is singular to working precision at iteration {}.", iteration)
            }
            NewtonError::LineSearchError(msg) => {
                write!(f, "Line search failed to produce valid step direction. {}", msg)
            }
        }
    }
}

impl Error for NewtonError {}

/// Attempts to solve the nonlinear equation `F(x) = 0` with full Newton steps.
///
/// The solution is said to have converged if `|F(x)|_2 <= tolerance`. A
/// residual that is linear in `x` with an exact Jacobian converges in a
/// single iteration from any starting point.
pub fn newton<F>(function: &F, x: &mut DVector<f64>, settings: &NewtonSettings) -> Result<NewtonOutcome, NewtonError>
where
    F: ResidualFunction,
{
    newton_line_search(function, x, settings, &mut FullStep)
}

/// Same as [`newton`], but allows specifying a line search.
pub fn newton_line_search<F>(
    function: &F,
    x: &mut DVector<f64>,
    settings: &NewtonSettings,
    line_search: &mut impl LineSearch<F>,
) -> Result<NewtonOutcome, NewtonError>
where
    F: ResidualFunction,
{
    assert_eq!(
        function.inputs(),
        function.values(),
        "Newton iteration requires a square system (inputs() == values())"
    );
    assert_eq!(
        x.nrows(),
        function.inputs(),
        "unknown vector length must match the declared number of inputs"
    );

    let n = function.inputs();
    let mut f = DVector::zeros(n);
    let mut jacobian = DMatrix::zeros(n, n);

    function.residual(&DVectorView::from(&*x), &mut DVectorViewMut::from(&mut f));

    let mut iter = 0;

    while f.norm() > settings.tolerance {
        if iter == settings.max_iterations {
            let residual_norm = f.norm();
            warn!(
                "Newton iteration budget ({}) exhausted, |F(x)| = {:e}; returning best iterate",
                settings.max_iterations, residual_norm
            );
            return Ok(NewtonOutcome {
                iterations: iter,
                residual_norm,
                converged: false,
            });
        }

        function.jacobian(&DVectorView::from(&*x), &mut DMatrixViewMut::from(&mut jacobian));

        // Solve J p = -f
        let p = jacobian
            .clone()
            .lu()
            .solve(&f)
            .map(|mut minus_dx| {
                minus_dx.neg_mut();
                minus_dx
            })
            .ok_or(NewtonError::SingularJacobian { iteration: iter })?;

        let step_length = line_search.step(function, &mut f, x, &p)?;
        debug!("Newton step length at iter {}: {}", iter, step_length);
        iter += 1;
    }

    let residual_norm = f.norm();
    debug!("Newton converged in {} iterations, |F(x)| = {:e}", iter, residual_norm);
    Ok(NewtonOutcome {
        iterations: iter,
        residual_norm,
        converged: true,
    })
}

pub trait LineSearch<F: ResidualFunction> {
    /// Advances `x` along `direction`, updating `f` to hold the residual at
    /// the new iterate, and returns the accepted step length.
    fn step(
        &mut self,
        function: &F,
        f: &mut DVector<f64>,
        x: &mut DVector<f64>,
        direction: &DVector<f64>,
    ) -> Result<f64, NewtonError>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct FullStep;

impl<F> LineSearch<F> for FullStep
where
    F: ResidualFunction,
{
    fn step(
        &mut self,
        function: &F,
        f: &mut DVector<f64>,
        x: &mut DVector<f64>,
        direction: &DVector<f64>,
    ) -> Result<f64, NewtonError> {
        x.axpy(1.0, direction, 1.0);
        function.residual(&DVectorView::from(&*x), &mut DVectorViewMut::from(f));
        Ok(1.0)
    }
}

/// Standard backtracking line search using the Armijo condition.
///
/// See Nocedal & Wright (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug)]
pub struct BacktrackingLineSearch;

impl<F> LineSearch<F> for BacktrackingLineSearch
where
    F: ResidualFunction,
{
    fn step(
        &mut self,
        function: &F,
        f: &mut DVector<f64>,
        x: &mut DVector<f64>,
        direction: &DVector<f64>,
    ) -> Result<f64, NewtonError> {
        // We seek to solve
        //  F(x) = 0
        // by minimizing
        //  g(x) = (1/2) || F(x) ||^2
        // The sufficient decrease condition becomes
        //  g(x_k + alpha * p_k) <= (1 - c * alpha) * g(x_k)
        // under the assumption that p_k is the exact solution of the Newton
        // step equation, so that grad F^T p_k ~= -F(x_k).
        let c = 1e-4;
        let alpha_min = 1e-6;

        let p = direction;
        let g_initial = 0.5 * f.norm_squared();

        // Start out with some alphas that don't decrease too quickly, then
        // start decreasing them much faster if the first few iterations don't
        // let us take a step.
        let initial_alphas = [0.0, 1.0, 0.75, 0.5];
        let mut alpha_iter = initial_alphas
            .iter()
            .copied()
            .chain(iterate(0.25, |alpha_i| 0.25 * *alpha_i));

        let mut alpha_prev = alpha_iter.next().unwrap();
        let mut alpha = alpha_iter.next().unwrap();

        loop {
            // x^{k+1} = x^0 + alpha^k p = x^k + (alpha^k - alpha^{k-1}) p,
            // which avoids storing the starting point
            let delta_alpha = alpha - alpha_prev;
            x.axpy(delta_alpha, p, 1.0);
            function.residual(&DVectorView::from(&*x), &mut DVectorViewMut::from(&mut *f));

            let g = 0.5 * f.norm_squared();
            if g <= (1.0 - c * alpha) * g_initial {
                return Ok(alpha);
            } else if alpha < alpha_min {
                return Err(NewtonError::LineSearchError(format!(
                    "Alpha {} is smaller than minimum allowed alpha {}.",
                    alpha, alpha_min
                )));
            } else {
                alpha_prev = alpha;
                alpha = alpha_iter.next().unwrap();
            }
        }
    }
}
