use good_lp::{Constraint, Expression, Variable};

use super::TimeBase;
use crate::error::{ModelError, ModelResult};
use crate::optimizer::SolvedValues;

/// One physical unit bound to a [`TimeBase`].
///
/// Implementations build on [`AssetModel::base_constraints`] before appending
/// their own relations, and only learn their schedule through
/// [`AssetModel::apply_solution`] after the solver returns.
pub trait AssetModel {
    fn name(&self) -> &str;

    fn time_base(&self) -> &TimeBase;

    /// Constraints common to every asset. Empty today.
    fn base_constraints(&self) -> Vec<Constraint> {
        Vec::new()
    }

    fn constraints(&self) -> Vec<Constraint>;

    /// Copies solved values into the model's schedule.
    fn apply_solution(&mut self, values: &SolvedValues);
}

/// Elementwise sum of member flow variables.
///
/// Keeps the member handles per step so the aggregate can be turned into
/// solver expressions before the solve and evaluated from solved values after it.
#[derive(Debug, Clone)]
pub struct SummedFlow {
    terms: Vec<Vec<Variable>>,
}

impl SummedFlow {
    /// Sums `members` step by step; every member must have the same length.
    pub fn from_members(what: &str, members: &[&[Variable]]) -> ModelResult<Self> {
        let first = members.first().ok_or(ModelError::EmptyAggregate)?;
        let n = first.len();
        let mut terms = vec![Vec::with_capacity(members.len()); n];
        for member in members {
            if member.len() != n {
                return Err(ModelError::dimension(what, n, member.len()));
            }
            for (step, var) in member.iter().enumerate() {
                terms[step].push(*var);
            }
        }
        Ok(Self { terms })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.terms.first().map_or(0, Vec::len)
    }

    pub fn expressions(&self) -> Vec<Expression> {
        self.terms
            .iter()
            .map(|step| step.iter().map(|v| Expression::from(*v)).sum())
            .collect()
    }

    pub fn evaluate(&self, values: &SolvedValues) -> Vec<f64> {
        self.terms
            .iter()
            .map(|step| values.vector(step).iter().sum())
            .collect()
    }
}

/// Checks that every member shares the first member's time base.
pub(crate) fn ensure_shared_time_base<'a, M, I>(members: I) -> ModelResult<()>
where
    M: AssetModel + 'a,
    I: IntoIterator<Item = &'a M>,
{
    let mut iter = members.into_iter();
    let first = iter.next().ok_or(ModelError::EmptyAggregate)?;
    for other in iter {
        if other.time_base() != first.time_base() {
            return Err(ModelError::dimension(
                format!("time base of {}", other.name()),
                first.time_base().n(),
                other.time_base().n(),
            ));
        }
    }
    Ok(())
}
