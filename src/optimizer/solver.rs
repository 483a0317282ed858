//! External solver boundary.
//!
//! The modelling core never looks inside the solver: it submits an
//! [`OptimizationProblem`] and gets back a terminal [`SolveStatus`] plus, when
//! the status is optimal, the value of every declared variable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use good_lp::{ResolutionError, Solution, SolverModel, Variable};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{info, warn};

use super::OptimizationProblem;

/// Terminal status of one solve call. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    TimedOut,
    #[strum(to_string = "solver_error: {0}")]
    SolverError(String),
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

/// Values of every declared variable after an optimal solve.
#[derive(Debug, Clone, Default)]
pub struct SolvedValues {
    values: HashMap<Variable, f64>,
}

impl SolvedValues {
    pub fn value(&self, var: Variable) -> Option<f64> {
        self.values.get(&var).copied()
    }

    /// Values of `vars` in order; variables absent from the solution read as 0.
    pub fn vector(&self, vars: &[Variable]) -> Vec<f64> {
        vars.iter().map(|v| self.value(*v).unwrap_or(0.0)).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Variable, f64)> for SolvedValues {
    fn from_iter<I: IntoIterator<Item = (Variable, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Result of submitting a problem.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub values: Option<SolvedValues>,
    pub elapsed: Duration,
}

impl SolveOutcome {
    fn failed(status: SolveStatus, elapsed: Duration) -> Self {
        Self {
            status,
            values: None,
            elapsed,
        }
    }
}

#[async_trait]
pub trait ExternalSolver: Send + Sync {
    async fn solve(&self, problem: OptimizationProblem) -> SolveOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolverBackend {
    /// Pure-Rust simplex with branch-and-bound, handles LP and MIP.
    Microlp,
    /// HiGHS (requires the `highs` feature)
    Highs,
    /// COIN-OR CBC (requires the `cbc` feature)
    Cbc,
}

/// [`ExternalSolver`] backed by `good_lp`.
///
/// The blocking solve runs on tokio's blocking pool under a wall-clock budget.
/// An expired budget reports [`SolveStatus::TimedOut`]; the abandoned solve is
/// left to finish on its worker thread.
pub struct GoodLpSolver {
    backend: SolverBackend,
    time_limit: Duration,
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Microlp,
            time_limit: Duration::from_secs(30),
        }
    }
}

impl GoodLpSolver {
    pub fn new(backend: SolverBackend, time_limit: Duration) -> Self {
        Self { backend, time_limit }
    }

    pub fn backend(&self) -> SolverBackend {
        self.backend
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }
}

#[async_trait]
impl ExternalSolver for GoodLpSolver {
    async fn solve(&self, problem: OptimizationProblem) -> SolveOutcome {
        let started = Instant::now();
        let backend = self.backend;
        let mixed_integer = problem.mixed_integer;
        let budget = self.time_limit;
        let task = tokio::task::spawn_blocking(move || solve_blocking(backend, budget, problem));

        let (status, values) = match tokio::time::timeout(self.time_limit, task).await {
            Ok(Ok(Ok(values))) => (SolveStatus::Optimal, Some(values)),
            Ok(Ok(Err(status))) => (status, None),
            Ok(Err(join_error)) => (SolveStatus::SolverError(join_error.to_string()), None),
            Err(_) => {
                warn!(
                    time_limit_ms = self.time_limit.as_millis() as u64,
                    "solver exceeded its time budget"
                );
                return SolveOutcome::failed(SolveStatus::TimedOut, started.elapsed());
            }
        };

        let elapsed = started.elapsed();
        info!(
            backend = %backend,
            mixed_integer,
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "solve finished"
        );
        SolveOutcome {
            status,
            values,
            elapsed,
        }
    }
}

/// Runs one backend to completion. HiGHS and CBC get `time_limit` as their
/// own limit; microlp cannot be interrupted and is bounded only by the
/// caller's timeout.
#[cfg_attr(not(any(feature = "highs", feature = "cbc")), allow(unused_variables))]
fn solve_blocking(
    backend: SolverBackend,
    time_limit: Duration,
    problem: OptimizationProblem,
) -> Result<SolvedValues, SolveStatus> {
    let OptimizationProblem {
        variables,
        declared,
        objective,
        constraints,
        ..
    } = problem;
    let unsolved = variables.minimise(objective.into_minimization());

    match backend {
        SolverBackend::Microlp => {
            let mut model = unsolved.using(good_lp::microlp);
            for c in constraints {
                model = model.with(c);
            }
            read_back(model.solve(), &declared)
        }
        #[cfg(feature = "highs")]
        SolverBackend::Highs => {
            let mut model = unsolved
                .using(good_lp::highs)
                .set_time_limit(time_limit.as_secs_f64());
            for c in constraints {
                model = model.with(c);
            }
            read_back(model.solve(), &declared)
        }
        #[cfg(feature = "cbc")]
        SolverBackend::Cbc => {
            let mut model = unsolved.using(good_lp::coin_cbc);
            model.set_parameter("seconds", &time_limit.as_secs_f64().to_string());
            for c in constraints {
                model = model.with(c);
            }
            read_back(model.solve(), &declared)
        }
        #[allow(unreachable_patterns)]
        other => Err(SolveStatus::SolverError(format!(
            "backend '{other}' is not compiled into this build"
        ))),
    }
}

fn read_back<S: Solution>(
    result: Result<S, ResolutionError>,
    declared: &[Variable],
) -> Result<SolvedValues, SolveStatus> {
    match result {
        Ok(solution) => Ok(declared.iter().map(|v| (*v, solution.value(*v))).collect()),
        Err(ResolutionError::Infeasible) => Err(SolveStatus::Infeasible),
        Err(ResolutionError::Unbounded) => Err(SolveStatus::Unbounded),
        Err(other) => Err(SolveStatus::SolverError(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{Bounds, Objective, ProblemBuilder};
    use good_lp::constraint;

    #[test]
    fn test_status_display() {
        assert_eq!(SolveStatus::Optimal.to_string(), "optimal");
        assert_eq!(SolveStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(
            SolveStatus::SolverError("boom".into()).to_string(),
            "solver_error: boom"
        );
    }

    #[tokio::test]
    async fn test_solves_small_lp() {
        let mut builder = ProblemBuilder::new();
        let x = builder.scalar("x", Bounds::Range { min: 0.0, max: 10.0 }).unwrap();
        let y = builder.scalar("y", Bounds::NonNegative).unwrap();
        let constraints = vec![constraint!(x + y <= 4.0)];
        let problem = builder.finish(Objective::maximize(x * 2.0 + y), constraints);

        let outcome = GoodLpSolver::default().solve(problem).await;
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let values = outcome.values.unwrap();
        assert!((values.value(x).unwrap() - 4.0).abs() < 1e-6);
        assert!(values.value(y).unwrap().abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_reports_infeasible_status() {
        let mut builder = ProblemBuilder::new();
        let x = builder.scalar("x", Bounds::NonNegative).unwrap();
        let constraints = vec![constraint!(x <= -1.0)];
        let problem = builder.finish(Objective::minimize(x), constraints);

        let outcome = GoodLpSolver::default().solve(problem).await;
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());
    }

    #[tokio::test]
    async fn test_reports_unbounded_status() {
        let mut builder = ProblemBuilder::new();
        let x = builder.scalar("x", Bounds::Free).unwrap();
        let problem = builder.finish(Objective::maximize(x), Vec::new());

        let outcome = GoodLpSolver::default().solve(problem).await;
        assert_eq!(outcome.status, SolveStatus::Unbounded);
    }
}
