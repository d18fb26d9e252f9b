use std::fmt;

/// Reason why a solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationType {
    /// One of the convergence tolerances was met.
    Convergence,
    /// The iteration budget ran out before convergence.
    NoConvergence,
    /// The solver, or the matcher around it, failed.
    Failure,
    /// An iteration callback asked the solver to stop and keep the current estimate.
    UserSuccess,
    /// An iteration callback aborted the solve.
    UserFailure,
}

impl TerminationType {
    /// Upper snake case label written to result logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationType::Convergence => "CONVERGENCE",
            TerminationType::NoConvergence => "NO_CONVERGENCE",
            TerminationType::Failure => "FAILURE",
            TerminationType::UserSuccess => "USER_SUCCESS",
            TerminationType::UserFailure => "USER_FAILURE",
        }
    }
}

impl fmt::Display for TerminationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report of a single solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSummary {
    /// Number of steps that decreased the cost.
    pub num_successful_steps: usize,
    /// Number of rejected steps.
    pub num_unsuccessful_steps: usize,
    /// Cost at the initial estimate.
    pub initial_cost: f64,
    /// Cost at the returned estimate.
    pub final_cost: f64,
    /// Why the solver stopped.
    pub termination_type: TerminationType,
    /// Human readable detail about the termination.
    pub message: String,
}

impl SolverSummary {
    /// A report for a run that did not produce any iteration.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            num_successful_steps: 0,
            num_unsuccessful_steps: 0,
            initial_cost: f64::NAN,
            final_cost: f64::NAN,
            termination_type: TerminationType::Failure,
            message: message.into(),
        }
    }

    /// Total number of iterations, successful and unsuccessful.
    pub fn num_iterations(&self) -> usize {
        self.num_successful_steps + self.num_unsuccessful_steps
    }

    /// One line summary of the run.
    pub fn brief_report(&self) -> String {
        format!(
            "Solver Report: Iterations: {}, Initial cost: {:e}, Final cost: {:e}, Termination: {}",
            self.num_iterations(),
            self.initial_cost,
            self.final_cost,
            self.termination_type
        )
    }
}
