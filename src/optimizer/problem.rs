//! Symbolic problem assembly.
//!
//! Asset models declare their decision variables through a [`ProblemBuilder`],
//! emit linear constraints over the returned handles, and an orchestrator
//! finishes the run by pairing the constraint set with an [`Objective`] into an
//! [`OptimizationProblem`] that is handed to an external solver.

use std::collections::HashSet;

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use tracing::debug;

use crate::error::{ModelError, ModelResult};

/// Bounds attached to a declared variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    Free,
    NonNegative,
    Range { min: f64, max: f64 },
}

/// Registry of decision variables for one optimization run.
pub struct ProblemBuilder {
    variables: ProblemVariables,
    declared: Vec<Variable>,
    names: HashSet<String>,
    mixed_integer: bool,
}

impl Default for ProblemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProblemBuilder {
    pub fn new() -> Self {
        Self {
            variables: ProblemVariables::new(),
            declared: Vec::new(),
            names: HashSet::new(),
            mixed_integer: false,
        }
    }

    fn reserve_name(&mut self, name: &str) -> ModelResult<()> {
        if !self.names.insert(name.to_string()) {
            return Err(ModelError::DuplicateVariable(name.to_string()));
        }
        Ok(())
    }

    fn push(&mut self, name: String, bounds: Bounds, binary: bool) -> Variable {
        let mut def = variable().name(name);
        if binary {
            def = def.binary();
        } else {
            def = match bounds {
                Bounds::Free => def,
                Bounds::NonNegative => def.min(0.0),
                Bounds::Range { min, max } => def.min(min).max(max),
            };
        }
        let var = self.variables.add(def);
        self.declared.push(var);
        var
    }

    /// Declares a single continuous variable.
    pub fn scalar(&mut self, name: &str, bounds: Bounds) -> ModelResult<Variable> {
        self.reserve_name(name)?;
        Ok(self.push(name.to_string(), bounds, false))
    }

    /// Declares `len` continuous variables named `name[i]`.
    pub fn continuous(
        &mut self,
        name: &str,
        len: usize,
        bounds: Bounds,
    ) -> ModelResult<Vec<Variable>> {
        self.reserve_name(name)?;
        Ok((0..len)
            .map(|i| self.push(format!("{name}[{i}]"), bounds, false))
            .collect())
    }

    /// Declares `len` boolean variables; the problem becomes mixed-integer.
    pub fn boolean(&mut self, name: &str, len: usize) -> ModelResult<Vec<Variable>> {
        self.reserve_name(name)?;
        self.mixed_integer = true;
        Ok((0..len)
            .map(|i| self.push(format!("{name}[{i}]"), Bounds::Free, true))
            .collect())
    }

    /// `max(exprs)` as an epigraph variable. Only valid where the objective
    /// pushes the returned variable down (a minimized term with a nonnegative weight).
    pub fn max_of(
        &mut self,
        name: &str,
        exprs: &[Expression],
    ) -> ModelResult<(Variable, Vec<Constraint>)> {
        let bound = self.scalar(name, Bounds::Free)?;
        let constraints = exprs
            .iter()
            .map(|e| constraint!(bound >= e.clone()))
            .collect();
        Ok((bound, constraints))
    }

    /// `min(exprs)` as a hypograph variable; the objective must push it up.
    pub fn min_of(
        &mut self,
        name: &str,
        exprs: &[Expression],
    ) -> ModelResult<(Variable, Vec<Constraint>)> {
        let bound = self.scalar(name, Bounds::Free)?;
        let constraints = exprs
            .iter()
            .map(|e| constraint!(bound <= e.clone()))
            .collect();
        Ok((bound, constraints))
    }

    pub fn variable_count(&self) -> usize {
        self.declared.len()
    }

    pub fn is_mixed_integer(&self) -> bool {
        self.mixed_integer
    }

    pub fn finish(self, objective: Objective, constraints: Vec<Constraint>) -> OptimizationProblem {
        debug!(
            variables = self.declared.len(),
            constraints = constraints.len(),
            mixed_integer = self.mixed_integer,
            "optimization problem assembled"
        );
        OptimizationProblem {
            variables: self.variables,
            declared: self.declared,
            objective,
            constraints,
            mixed_integer: self.mixed_integer,
        }
    }
}

/// One additive term of the objective.
#[derive(Clone)]
pub enum ObjectiveTerm {
    Minimize(Expression),
    Maximize(Expression),
}

/// Sum of minimize/maximize terms.
#[derive(Clone, Default)]
pub struct Objective {
    terms: Vec<ObjectiveTerm>,
}

impl Objective {
    pub fn minimize(expr: impl Into<Expression>) -> Self {
        Self::default().then_minimize(expr)
    }

    pub fn maximize(expr: impl Into<Expression>) -> Self {
        Self::default().then_maximize(expr)
    }

    pub fn then_minimize(mut self, expr: impl Into<Expression>) -> Self {
        self.terms.push(ObjectiveTerm::Minimize(expr.into()));
        self
    }

    pub fn then_maximize(mut self, expr: impl Into<Expression>) -> Self {
        self.terms.push(ObjectiveTerm::Maximize(expr.into()));
        self
    }

    pub fn terms(&self) -> &[ObjectiveTerm] {
        &self.terms
    }

    /// Single expression to minimize: minimized terms minus maximized terms.
    pub fn into_minimization(self) -> Expression {
        self.terms
            .into_iter()
            .map(|term| match term {
                ObjectiveTerm::Minimize(e) => e,
                ObjectiveTerm::Maximize(e) => e * -1.0,
            })
            .sum()
    }
}

/// A fully assembled problem, submitted once and then discarded.
pub struct OptimizationProblem {
    pub(crate) variables: ProblemVariables,
    pub(crate) declared: Vec<Variable>,
    pub(crate) objective: Objective,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) mixed_integer: bool,
}

impl OptimizationProblem {
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn variable_count(&self) -> usize {
        self.declared.len()
    }

    pub fn is_mixed_integer(&self) -> bool {
        self.mixed_integer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut builder = ProblemBuilder::new();
        builder.continuous("ev_0_power_state", 4, Bounds::NonNegative).unwrap();
        let err = builder
            .continuous("ev_0_power_state", 4, Bounds::NonNegative)
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateVariable(name) if name == "ev_0_power_state"));
    }

    #[test]
    fn test_boolean_marks_problem_mixed_integer() {
        let mut builder = ProblemBuilder::new();
        builder.continuous("x", 3, Bounds::Free).unwrap();
        assert!(!builder.is_mixed_integer());
        builder.boolean("flag", 3).unwrap();
        assert!(builder.is_mixed_integer());
        assert_eq!(builder.variable_count(), 6);
    }

    #[test]
    fn test_epigraph_emits_one_constraint_per_expression() {
        let mut builder = ProblemBuilder::new();
        let x = builder.continuous("x", 5, Bounds::Free).unwrap();
        let exprs: Vec<Expression> = x.iter().map(|v| Expression::from(*v)).collect();
        let (_, upper) = builder.max_of("peak", &exprs).unwrap();
        let (_, lower) = builder.min_of("floor", &exprs).unwrap();
        assert_eq!(upper.len(), 5);
        assert_eq!(lower.len(), 5);
        assert_eq!(builder.variable_count(), 7);
    }

    #[test]
    fn test_objective_keeps_term_order() {
        let mut builder = ProblemBuilder::new();
        let x = builder.scalar("x", Bounds::Free).unwrap();
        let objective = Objective::minimize(x).then_maximize(x * 2.0);
        assert!(matches!(objective.terms()[0], ObjectiveTerm::Minimize(_)));
        assert!(matches!(objective.terms()[1], ObjectiveTerm::Maximize(_)));
        let problem = builder.finish(objective, Vec::new());
        assert_eq!(problem.variable_count(), 1);
        assert_eq!(problem.constraint_count(), 0);
    }
}
