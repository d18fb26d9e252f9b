//! Nonlinear least squares over a rigid pose.
//!
//! Both solvers minimize `0.5 * sum(r_i^2)` over a 6-DoF left perturbation of the pose and
//! solve the 6x6 normal equations with a Cholesky factorization.

use faer::prelude::SpSolver;
use scanbench_3d::pose::Rigid3;
use thiserror::Error;

use crate::config::ScanMatcherConfig;
use crate::summary::{SolverSummary, TerminationType};

/// Errors that prevent a solver from starting.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The problem has no residuals.
    #[error("the problem has no residuals")]
    EmptyProblem,

    /// The initial estimate contains non-finite values.
    #[error("initial pose is not finite: {0}")]
    NonFiniteInitialPose(Rigid3),

    /// The cost at the initial estimate is not finite.
    #[error("initial cost is not finite: {0}")]
    NonFiniteInitialCost(f64),
}

/// Gauss-Newton normal equations `J^T J` and `J^T r` of a pose problem.
#[derive(Debug, Clone, Default)]
pub struct NormalEquations {
    /// Approximate Hessian.
    pub jtj: [[f64; 6]; 6],
    /// Gradient of the cost.
    pub jtr: [f64; 6],
    /// Cost `0.5 * sum(r^2)` at the linearization point.
    pub cost: f64,
}

impl NormalEquations {
    /// Add one residual with its Jacobian row.
    #[inline]
    pub fn accumulate(&mut self, jacobian: &[f64; 6], residual: f64) {
        // only the upper triangle of J^T J is accumulated
        for i in 0..6 {
            self.jtr[i] += jacobian[i] * residual;
            for j in i..6 {
                self.jtj[i][j] += jacobian[i] * jacobian[j];
            }
        }
        self.cost += 0.5 * residual * residual;
    }

    fn symmetrized(&self) -> [[f64; 6]; 6] {
        let mut jtj = self.jtj;
        for i in 1..6 {
            for j in 0..i {
                jtj[i][j] = jtj[j][i];
            }
        }
        jtj
    }

    fn is_finite(&self) -> bool {
        self.cost.is_finite()
            && self.jtr.iter().all(|v| v.is_finite())
            && self.jtj.iter().flatten().all(|v| v.is_finite())
    }

    fn gradient_max_norm(&self) -> f64 {
        self.jtr.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }
}

/// A least squares problem over a single rigid pose.
pub trait PoseProblem {
    /// Number of residuals of the problem.
    fn num_residuals(&self) -> usize;

    /// Cost `0.5 * sum(r^2)` at `pose`.
    fn cost(&self, pose: &Rigid3) -> f64;

    /// Normal equations at `pose`.
    fn linearize(&self, pose: &Rigid3) -> NormalEquations;
}

/// Snapshot of the solver state handed to iteration callbacks.
#[derive(Debug, Clone, Copy)]
pub struct IterationState {
    /// Iterations performed so far.
    pub iteration: usize,
    /// Cost at the current estimate.
    pub cost: f64,
    /// Norm of the last step.
    pub step_norm: f64,
    /// Whether the last step was accepted.
    pub step_accepted: bool,
}

/// What an iteration callback asks the solver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackReturn {
    /// Keep iterating.
    Continue,
    /// Stop and report [`TerminationType::UserSuccess`].
    Finish,
    /// Stop and report [`TerminationType::UserFailure`].
    Abort,
}

/// Stopping criteria shared by both solvers.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of iterations, successful and unsuccessful.
    pub max_iterations: usize,
    /// Relative cost decrease below which the solver converges.
    pub function_tolerance: f64,
    /// Max-norm of the gradient below which the solver converges.
    pub gradient_tolerance: f64,
    /// Relative step size below which the solver converges.
    pub parameter_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self::from(&ScanMatcherConfig::default())
    }
}

impl From<&ScanMatcherConfig> for SolverOptions {
    fn from(config: &ScanMatcherConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            function_tolerance: config.function_tolerance,
            gradient_tolerance: config.gradient_tolerance,
            parameter_tolerance: config.parameter_tolerance,
        }
    }
}

// step norm of a 6-DoF perturbation, the rotation part is an angle in radians
fn step_norm(delta: &[f64; 6]) -> f64 {
    delta.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn pose_norm(pose: &Rigid3) -> f64 {
    let angle = pose.rotation().to_scaled_axis().length();
    (pose.translation().length_squared() + angle * angle).sqrt()
}

/// Solve `(J^T J + D) delta = -J^T r` where `D` adds `lambda` times the clamped diagonal.
fn solve_damped(normal: &NormalEquations, lambda: f64, min_diagonal: f64) -> Option<[f64; 6]> {
    let jtj = normal.symmetrized();
    let hessian = faer::Mat::<f64>::from_fn(6, 6, |i, j| {
        if i == j {
            jtj[i][i] + lambda * jtj[i][i].max(min_diagonal)
        } else {
            jtj[i][j]
        }
    });
    let rhs = faer::Mat::<f64>::from_fn(6, 1, |i, _| -normal.jtr[i]);

    let llt = hessian.cholesky(faer::Side::Lower).ok()?;
    let solution = llt.solve(&rhs);

    let mut delta = [0.0; 6];
    for (i, d) in delta.iter_mut().enumerate() {
        *d = solution.read(i, 0);
    }
    delta.iter().all(|v| v.is_finite()).then_some(delta)
}

fn scaled(delta: &[f64; 6], alpha: f64) -> [f64; 6] {
    delta.map(|v| v * alpha)
}

// book-keeping shared by the two solvers
struct Run {
    pose: Rigid3,
    cost: f64,
    initial_cost: f64,
    successful: usize,
    unsuccessful: usize,
}

impl Run {
    fn start<P: PoseProblem + ?Sized>(problem: &P, initial: &Rigid3) -> Result<Self, SolverError> {
        if problem.num_residuals() == 0 {
            return Err(SolverError::EmptyProblem);
        }
        if !initial.is_finite() {
            return Err(SolverError::NonFiniteInitialPose(*initial));
        }
        let cost = problem.cost(initial);
        if !cost.is_finite() {
            return Err(SolverError::NonFiniteInitialCost(cost));
        }
        Ok(Self {
            pose: *initial,
            cost,
            initial_cost: cost,
            successful: 0,
            unsuccessful: 0,
        })
    }

    fn iterations(&self) -> usize {
        self.successful + self.unsuccessful
    }

    fn finish(self, termination_type: TerminationType, message: impl Into<String>) -> (Rigid3, SolverSummary) {
        let message = message.into();
        log::debug!(
            "solver stopped after {} iterations ({}): {}",
            self.iterations(),
            termination_type,
            message
        );
        let summary = SolverSummary {
            num_successful_steps: self.successful,
            num_unsuccessful_steps: self.unsuccessful,
            initial_cost: self.initial_cost,
            final_cost: self.cost,
            termination_type,
            message,
        };
        (self.pose, summary)
    }

    fn state(&self, step_norm: f64, step_accepted: bool) -> IterationState {
        IterationState {
            iteration: self.iterations(),
            cost: self.cost,
            step_norm,
            step_accepted,
        }
    }
}

fn callback_termination(answer: CallbackReturn) -> Option<(TerminationType, &'static str)> {
    match answer {
        CallbackReturn::Continue => None,
        CallbackReturn::Finish => Some((TerminationType::UserSuccess, "stopped by callback")),
        CallbackReturn::Abort => Some((TerminationType::UserFailure, "aborted by callback")),
    }
}

/// Levenberg-Marquardt solver with multiplicative damping updates.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Stopping criteria.
    pub options: SolverOptions,
    /// Initial damping parameter.
    pub lambda_init: f64,
    /// Factor used to grow and shrink the damping.
    pub lambda_factor: f64,
    /// Damping above which the trust region is considered collapsed.
    pub lambda_max: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

impl LevenbergMarquardt {
    const MIN_DIAGONAL: f64 = 1e-6;
    const MIN_LAMBDA: f64 = 1e-12;

    /// Create a solver with the default damping schedule.
    pub fn new(options: SolverOptions) -> Self {
        Self {
            options,
            lambda_init: 1e-4,
            lambda_factor: 10.0,
            lambda_max: 1e16,
        }
    }

    /// Minimize `problem` starting from `initial`.
    pub fn minimize<P: PoseProblem + ?Sized>(
        &self,
        problem: &P,
        initial: &Rigid3,
    ) -> Result<(Rigid3, SolverSummary), SolverError> {
        self.minimize_with_callback(problem, initial, |state| {
            log::debug!(
                "lm iteration {}: cost {:e}, step {:e}, accepted {}",
                state.iteration,
                state.cost,
                state.step_norm,
                state.step_accepted
            );
            CallbackReturn::Continue
        })
    }

    /// Minimize `problem` starting from `initial`, calling `callback` after every iteration.
    pub fn minimize_with_callback<P, F>(
        &self,
        problem: &P,
        initial: &Rigid3,
        mut callback: F,
    ) -> Result<(Rigid3, SolverSummary), SolverError>
    where
        P: PoseProblem + ?Sized,
        F: FnMut(&IterationState) -> CallbackReturn,
    {
        let options = &self.options;
        let mut run = Run::start(problem, initial)?;
        let mut lambda = self.lambda_init;
        let mut normal = problem.linearize(&run.pose);

        loop {
            if run.iterations() >= options.max_iterations {
                return Ok(run.finish(TerminationType::NoConvergence, "maximum number of iterations reached"));
            }

            if !normal.is_finite() {
                return Ok(run.finish(TerminationType::Failure, "non-finite normal equations"));
            }

            if normal.gradient_max_norm() <= options.gradient_tolerance {
                return Ok(run.finish(TerminationType::Convergence, "gradient tolerance reached"));
            }

            let Some(delta) = solve_damped(&normal, lambda, Self::MIN_DIAGONAL) else {
                run.unsuccessful += 1;
                lambda *= self.lambda_factor;
                if lambda > self.lambda_max {
                    return Ok(run.finish(TerminationType::Failure, "linear solver failed"));
                }
                continue;
            };

            let norm = step_norm(&delta);
            if norm <= options.parameter_tolerance * (pose_norm(&run.pose) + options.parameter_tolerance) {
                return Ok(run.finish(TerminationType::Convergence, "parameter tolerance reached"));
            }

            let candidate = run.pose.plus(&delta);
            let candidate_cost = problem.cost(&candidate);

            let accepted = candidate_cost.is_finite() && candidate_cost < run.cost;
            if accepted {
                let relative_decrease = (run.cost - candidate_cost) / run.cost;
                run.pose = candidate;
                run.cost = candidate_cost;
                run.successful += 1;
                lambda = (lambda / self.lambda_factor).max(Self::MIN_LAMBDA);

                if relative_decrease < options.function_tolerance {
                    return Ok(run.finish(TerminationType::Convergence, "function tolerance reached"));
                }
                normal = problem.linearize(&run.pose);
            } else {
                run.unsuccessful += 1;
                lambda *= self.lambda_factor;
                if lambda > self.lambda_max {
                    return Ok(run.finish(TerminationType::Convergence, "minimum trust region radius reached"));
                }
            }

            if let Some((termination, message)) = callback_termination(callback(&run.state(norm, accepted))) {
                return Ok(run.finish(termination, message));
            }
        }
    }
}

/// Gauss-Newton solver with a backtracking line search along the Newton direction.
#[derive(Debug, Clone)]
pub struct GaussNewton {
    /// Stopping criteria.
    pub options: SolverOptions,
    /// Maximum number of step halvings per iteration.
    pub max_backtracks: usize,
}

impl Default for GaussNewton {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

impl GaussNewton {
    // keeps the normal equations positive definite along unobservable directions
    const REGULARIZATION: f64 = 1e-9;

    /// Create a solver with the default line search.
    pub fn new(options: SolverOptions) -> Self {
        Self {
            options,
            max_backtracks: 10,
        }
    }

    /// Minimize `problem` starting from `initial`.
    pub fn minimize<P: PoseProblem + ?Sized>(
        &self,
        problem: &P,
        initial: &Rigid3,
    ) -> Result<(Rigid3, SolverSummary), SolverError> {
        self.minimize_with_callback(problem, initial, |state| {
            log::debug!(
                "gn iteration {}: cost {:e}, step {:e}, accepted {}",
                state.iteration,
                state.cost,
                state.step_norm,
                state.step_accepted
            );
            CallbackReturn::Continue
        })
    }

    /// Minimize `problem` starting from `initial`, calling `callback` after every iteration.
    pub fn minimize_with_callback<P, F>(
        &self,
        problem: &P,
        initial: &Rigid3,
        mut callback: F,
    ) -> Result<(Rigid3, SolverSummary), SolverError>
    where
        P: PoseProblem + ?Sized,
        F: FnMut(&IterationState) -> CallbackReturn,
    {
        let options = &self.options;
        let mut run = Run::start(problem, initial)?;

        loop {
            if run.iterations() >= options.max_iterations {
                return Ok(run.finish(TerminationType::NoConvergence, "maximum number of iterations reached"));
            }

            let normal = problem.linearize(&run.pose);
            if !normal.is_finite() {
                return Ok(run.finish(TerminationType::Failure, "non-finite normal equations"));
            }

            if normal.gradient_max_norm() <= options.gradient_tolerance {
                return Ok(run.finish(TerminationType::Convergence, "gradient tolerance reached"));
            }

            let Some(delta) = solve_damped(&normal, Self::REGULARIZATION, 1.0) else {
                return Ok(run.finish(TerminationType::Failure, "linear solver failed"));
            };

            let full_norm = step_norm(&delta);
            if full_norm <= options.parameter_tolerance * (pose_norm(&run.pose) + options.parameter_tolerance) {
                return Ok(run.finish(TerminationType::Convergence, "parameter tolerance reached"));
            }

            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..=self.max_backtracks {
                let candidate = run.pose.plus(&scaled(&delta, alpha));
                let candidate_cost = problem.cost(&candidate);
                if candidate_cost.is_finite() && candidate_cost < run.cost {
                    accepted = Some((candidate, candidate_cost));
                    break;
                }
                alpha *= 0.5;
            }

            let Some((candidate, candidate_cost)) = accepted else {
                run.unsuccessful += 1;
                return Ok(run.finish(TerminationType::Convergence, "line search found no descent"));
            };

            let relative_decrease = (run.cost - candidate_cost) / run.cost;
            run.pose = candidate;
            run.cost = candidate_cost;
            run.successful += 1;

            if relative_decrease < options.function_tolerance {
                return Ok(run.finish(TerminationType::Convergence, "function tolerance reached"));
            }

            if let Some((termination, message)) =
                callback_termination(callback(&run.state(alpha * full_norm, true)))
            {
                return Ok(run.finish(termination, message));
            }
        }
    }
}
